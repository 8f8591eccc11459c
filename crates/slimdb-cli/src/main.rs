#[tokio::main]
async fn main() {
    slimdb_cli::init_tracing();
    let registry = match slimdb::migrate::MigrationRegistry::collect() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = slimdb_cli::run(std::env::args().collect(), registry).await {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
