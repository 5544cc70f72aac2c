//! Verbosity flag: repeat `-v`, or name a level in `CHARASHEET_LOG_LEVEL`.

use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names indexed by verbosity count.
const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const MAX_VERBOSITY: u8 = 5;

fn parse_log_level(level: &str) -> Result<u8, String> {
    let level = level.trim();
    if let Ok(count) = level.parse::<u8>() {
        return if count <= MAX_VERBOSITY {
            Ok(count)
        } else {
            Err(format!("verbosity {count} is above {MAX_VERBOSITY}"))
        };
    }

    LEVEL_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(level))
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| {
            format!(
                "unknown log level '{level}', expected a count or one of: {}",
                LEVEL_NAMES.join(", ")
            )
        })
}

#[must_use]
pub fn log_level_parser() -> ValueParser {
    ValueParser::from(parse_log_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Increase log verbosity, repeatable (default: errors only)")
            .long_help(
                "Increase log verbosity. -v warn, -vv info, -vvv debug, -vvvv trace. CHARASHEET_LOG_LEVEL takes a level name or the same count.",
            )
            .env("CHARASHEET_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(log_level_parser()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_map_to_counts() {
        assert_eq!(parse_log_level("error"), Ok(0));
        assert_eq!(parse_log_level("WARN"), Ok(1));
        assert_eq!(parse_log_level(" info "), Ok(2));
        assert_eq!(parse_log_level("Debug"), Ok(3));
        assert_eq!(parse_log_level("trace"), Ok(4));
    }

    #[test]
    fn counts_are_capped() {
        assert_eq!(parse_log_level("0"), Ok(0));
        assert_eq!(parse_log_level("5"), Ok(5));
        assert!(parse_log_level("6").is_err());
    }

    #[test]
    fn unknown_levels_are_rejected() {
        let err = parse_log_level("chatty").unwrap_err();
        assert!(err.contains("chatty"));
        assert!(err.contains("trace"));
    }
}
