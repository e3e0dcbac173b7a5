use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_OTLP_ENDPOINT: &str = "otlp-endpoint";

/// Names accepted by `CAT_LOG_LEVEL`, in `-v` count order.
const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accept either a level name or its `-v` count.
fn parse_log_level(raw: &str) -> Result<u8, String> {
    let raw = raw.trim().to_ascii_lowercase();
    if let Ok(count) = raw.parse::<u8>() {
        return if usize::from(count) < LEVEL_NAMES.len() {
            Ok(count)
        } else {
            Err(format!("log level count must be below {}", LEVEL_NAMES.len()))
        };
    }
    LEVEL_NAMES
        .iter()
        .position(|name| *name == raw)
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("unknown log level '{raw}', expected one of {}", LEVEL_NAMES.join(", ")))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity: -v warn, -vv info, -vvv debug, -vvvv trace (default: error)")
                .env("CAT_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(parse_log_level),
        )
        .arg(
            Arg::new(ARG_OTLP_ENDPOINT)
                .long(ARG_OTLP_ENDPOINT)
                .help("OTLP gRPC collector for request spans, example: http://localhost:4317")
                .env("OTEL_EXPORTER_OTLP_ENDPOINT"),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub level: Option<Level>,
    pub otlp_endpoint: Option<String>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let count = matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0);
        Self {
            level: level_for(count),
            otlp_endpoint: matches
                .get_one::<String>(ARG_OTLP_ENDPOINT)
                .map(|endpoint| endpoint.trim().to_string())
                .filter(|endpoint| !endpoint.is_empty()),
        }
    }
}

/// No flag keeps the default filter; each `-v` opens one more level.
const fn level_for(count: u8) -> Option<Level> {
    match count {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_and_counts() {
        assert_eq!(parse_log_level("error"), Ok(0));
        assert_eq!(parse_log_level(" Debug "), Ok(3));
        assert_eq!(parse_log_level("4"), Ok(4));
        assert!(parse_log_level("5").is_err());
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn counts_map_to_levels() {
        assert_eq!(level_for(0), None);
        assert_eq!(level_for(1), Some(Level::WARN));
        assert_eq!(level_for(2), Some(Level::INFO));
        assert_eq!(level_for(3), Some(Level::DEBUG));
        assert_eq!(level_for(9), Some(Level::TRACE));
    }

    #[test]
    fn otlp_endpoint_is_optional() {
        temp_env::with_vars(
            [
                ("OTEL_EXPORTER_OTLP_ENDPOINT", None::<&str>),
                ("CAT_LOG_LEVEL", None),
            ],
            || {
                let matches = with_args(Command::new("logging")).get_matches_from(vec!["logging"]);
                let options = Options::parse(&matches);
                assert_eq!(options.level, None);
                assert_eq!(options.otlp_endpoint, None);
            },
        );

        temp_env::with_vars(
            [
                ("OTEL_EXPORTER_OTLP_ENDPOINT", Some("http://collector:4317")),
                ("CAT_LOG_LEVEL", Some("debug")),
            ],
            || {
                let matches = with_args(Command::new("logging")).get_matches_from(vec!["logging"]);
                let options = Options::parse(&matches);
                assert_eq!(options.level, Some(Level::DEBUG));
                assert_eq!(options.otlp_endpoint.as_deref(), Some("http://collector:4317"));
            },
        );
    }
}
