use crate::error::OrmResult;
use crate::row::{FromRow, Row};
use serde::Serialize;

/// One page of results plus the numbers needed to render pagination controls.
///
/// `from` and `to` are 1-based positions of the first and last row on this page
/// within the whole result; both are 0 when the result is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T = Row> {
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub from: u64,
    pub to: u64,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Page<Row> {
    /// Map every row on the page through [`FromRow`].
    pub fn into_typed<T: FromRow>(self) -> OrmResult<Page<T>> {
        let data = self
            .data
            .iter()
            .map(T::from_row)
            .collect::<OrmResult<Vec<_>>>()?;
        Ok(Page {
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
            total_pages: self.total_pages,
            from: self.from,
            to: self.to,
            data,
        })
    }
}

/// Pagination window for `total` rows: `(total_pages, current_page, offset, from, to)`.
pub(crate) fn window(total: u64, per_page: u64, page: u64) -> (u64, u64, u64, u64, u64) {
    let total_pages = total.div_ceil(per_page).max(1);
    let current_page = page.clamp(1, total_pages);
    let offset = (current_page - 1) * per_page;
    let (from, to) = if total == 0 {
        (0, 0)
    } else {
        (offset + 1, (offset + per_page).min(total))
    };
    (total_pages, current_page, offset, from, to)
}
