use clap::{Arg, ArgAction, ArgMatches, Command};
use std::env;
use std::path::PathBuf;

pub enum Action {
    Check {
        interval: Option<u64>,
        notify: bool,
    },
    Restart {
        status: bool,
        targets: Vec<String>,
    },
}

pub struct Config {
    pub config_path: Option<PathBuf>,
    pub action: Action,
}

impl From<ArgMatches> for Config {
    fn from(matches: ArgMatches) -> Self {
        let config_path = matches.get_one::<PathBuf>("config").cloned();
        let action = match matches.subcommand() {
            Some(("restart", sub)) => Action::Restart {
                status: sub.get_flag("status"),
                targets: sub
                    .get_many::<String>("targets")
                    .map(|values| values.cloned().collect())
                    .unwrap_or_default(),
            },
            Some(("check", sub)) => Action::Check {
                interval: sub.get_one::<u64>("watch").copied(),
                notify: sub.get_flag("notify"),
            },
            _ => unreachable!("subcommand is required"),
        };
        Config {
            config_path,
            action,
        }
    }
}

pub fn command() -> Command {
    let default_watch_interval =
        env::var("STACKKEEPER_WATCH_INTERVAL").unwrap_or_else(|_| "86400".to_string());
    Command::new("stackkeeper")
        .version(env!("CARGO_PKG_VERSION"))
        .about("check for image updates and restart compose services safely")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .help("TOML file overriding the built-in service table")
                .value_name("FILE")
                .env("STACKKEEPER_CONFIG")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("check")
                .about("report services whose remote image is newer than the running one")
                .arg(
                    Arg::new("watch")
                        .short('w')
                        .long("watch")
                        .help(format!(
                            "Watch mode: re-run every N seconds (default: {default_watch_interval})"
                        ))
                        .value_name("SECONDS")
                        .num_args(0..=1)
                        .default_missing_value(default_watch_interval)
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("notify")
                        .long("notify")
                        .help("send a summary to the configured Slack/Telegram dispatcher")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("restart")
                .about("remove stale containers and bring services up")
                .after_help("Pass `all` to restart every managed service.")
                .arg(
                    Arg::new("status")
                        .short('s')
                        .long("status")
                        .help("only print the state of every managed service")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("targets")
                        .value_name("SERVICE")
                        .help("`all` or one or more service names")
                        .num_args(0..),
                ),
        )
}

pub(crate) fn configure_cli() -> Config {
    command().get_matches().into()
}
