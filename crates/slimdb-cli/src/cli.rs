use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "slimdb.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Migrate,
    Rollback { steps: usize },
    Status,
    New { name: String },
    Reset,
}

impl Command {
    /// Whether the command talks to the database.
    pub fn needs_connection(&self) -> bool {
        !matches!(self, Command::Help | Command::New { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub command: Command,
    pub config: PathBuf,
    pub dir: Option<PathBuf>,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Cli> {
    let mut it = args.iter().skip(1).map(|s| s.as_str());

    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut dir: Option<PathBuf> = None;
    let mut positional: Vec<&str> = Vec::new();

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => {
                return Ok(Cli {
                    command: Command::Help,
                    config,
                    dir,
                });
            }
            "--config" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--config requires a value");
                };
                config = PathBuf::from(v);
            }
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            "--dir" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--dir requires a value");
                };
                dir = Some(PathBuf::from(v));
            }
            _ if token.starts_with("--dir=") => {
                dir = Some(PathBuf::from(token.trim_start_matches("--dir=")));
            }
            _ if token.starts_with('-') && token.parse::<i64>().is_err() => {
                anyhow::bail!("unknown flag: {token}");
            }
            _ => positional.push(token),
        }
    }

    let command = parse_command(&positional)?;
    Ok(Cli {
        command,
        config,
        dir,
    })
}

fn parse_command(positional: &[&str]) -> anyhow::Result<Command> {
    let Some((&name, rest)) = positional.split_first() else {
        return Ok(Command::Help);
    };

    let command = match name {
        "help" => Command::Help,
        "migrate" => Command::Migrate,
        "status" => Command::Status,
        "reset" => Command::Reset,
        "rollback" => {
            let steps = match rest.first() {
                None => 1,
                Some(raw) => match raw.parse::<usize>() {
                    Ok(n) if n > 0 => n,
                    _ => anyhow::bail!("rollback steps must be a positive integer, got `{raw}`"),
                },
            };
            return expect_no_more(Command::Rollback { steps }, rest.get(1..));
        }
        "new" => {
            let Some(name) = rest.first() else {
                anyhow::bail!("usage: slimdb new <name>");
            };
            return expect_no_more(
                Command::New {
                    name: name.to_string(),
                },
                rest.get(1..),
            );
        }
        other => anyhow::bail!("unknown command: {other} (run `slimdb help`)"),
    };
    expect_no_more(command, Some(rest))
}

fn expect_no_more(command: Command, extra: Option<&[&str]>) -> anyhow::Result<Command> {
    match extra {
        Some([first, ..]) => anyhow::bail!("unexpected argument: {first}"),
        _ => Ok(command),
    }
}

pub fn print_help() {
    println!(
        "\
slimdb - MySQL migration runner

USAGE:
  slimdb <COMMAND> [OPTIONS]

COMMANDS:
  migrate             Run every pending migration
  rollback [n]        Revert the last n migrations (default: 1)
  status              Show applied and pending migrations
  new <name>          Create a new migration file
  reset               Empty the migration ledger (tables are kept)
  help                Print this message

OPTIONS:
  --config <FILE>     Config file path (default: slimdb.toml)
  --dir <DIR>         Override migrations.directory from config
  -h, --help          Print help

ENVIRONMENT:
  SLIMDB_HOST, SLIMDB_PORT, SLIMDB_DATABASE, SLIMDB_USERNAME, SLIMDB_PASSWORD and
  SLIMDB_CHARSET override the [database] table of the config file. A `.env` file
  in the working directory is loaded first. RUST_LOG controls log output."
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(tokens: &[&str]) -> Vec<String> {
        std::iter::once("slimdb")
            .chain(tokens.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn no_arguments_prints_help() {
        assert_eq!(parse_args(&args(&[])).unwrap().command, Command::Help);
        assert_eq!(parse_args(&args(&["help"])).unwrap().command, Command::Help);
        assert_eq!(
            parse_args(&args(&["migrate", "--help"])).unwrap().command,
            Command::Help
        );
    }

    #[test]
    fn parse_rollback_steps() {
        assert_eq!(
            parse_args(&args(&["rollback"])).unwrap().command,
            Command::Rollback { steps: 1 }
        );
        assert_eq!(
            parse_args(&args(&["rollback", "3"])).unwrap().command,
            Command::Rollback { steps: 3 }
        );
        assert!(parse_args(&args(&["rollback", "0"])).is_err());
        assert!(parse_args(&args(&["rollback", "-2"])).is_err());
        assert!(parse_args(&args(&["rollback", "many"])).is_err());
    }

    #[test]
    fn parse_new_requires_name() {
        assert_eq!(
            parse_args(&args(&["new", "create_users_table"])).unwrap().command,
            Command::New {
                name: "create_users_table".to_string()
            }
        );
        let err = parse_args(&args(&["new"])).unwrap_err();
        assert!(err.to_string().contains("usage"));
    }

    #[test]
    fn parse_global_options() {
        let cli = parse_args(&args(&[
            "--config",
            "deploy/slimdb.toml",
            "status",
            "--dir=db/migrations",
        ]))
        .unwrap();
        assert_eq!(cli.command, Command::Status);
        assert_eq!(cli.config, PathBuf::from("deploy/slimdb.toml"));
        assert_eq!(cli.dir, Some(PathBuf::from("db/migrations")));
    }

    #[test]
    fn unknown_input_is_rejected() {
        assert!(parse_args(&args(&["migrat"])).is_err());
        assert!(parse_args(&args(&["migrate", "--force"])).is_err());
        assert!(parse_args(&args(&["status", "extra"])).is_err());
        assert!(parse_args(&args(&["--config"])).is_err());
    }

    #[test]
    fn only_database_commands_connect() {
        assert!(Command::Migrate.needs_connection());
        assert!(Command::Reset.needs_connection());
        assert!(!Command::Help.needs_connection());
        assert!(
            !Command::New {
                name: "x".to_string()
            }
            .needs_connection()
        );
    }
}
