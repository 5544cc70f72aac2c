use clap::{Arg, ArgAction, Command};

pub const ARG_SESSION_SECRET_KEY: &str = "session-secret-key";
pub const ARG_SESSION_OLD_SECRET_KEY: &str = "session-old-secret-key";
pub const ARG_COOKIE_INSECURE: &str = "cookie-insecure";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_SECRET_KEY)
                .long(ARG_SESSION_SECRET_KEY)
                .help("Secret used to encrypt new session cookies")
                .env("CHARASHEET_SESSION_SECRET_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_OLD_SECRET_KEY)
                .long(ARG_SESSION_OLD_SECRET_KEY)
                .help("Retired session secret, still accepted for decryption (repeatable)")
                .long_help(
                    "Retired session secret, still accepted for decryption. Repeat the flag once per secret; values are taken verbatim, commas included.",
                )
                .env("CHARASHEET_SESSION_OLD_SECRET_KEY")
                .hide_env_values(true)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_COOKIE_INSECURE)
                .long(ARG_COOKIE_INSECURE)
                .help("Drop the Secure attribute from cookies, for plain HTTP development")
                .env("CHARASHEET_COOKIE_INSECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Lifetime of password reset links in seconds")
                .default_value("86400")
                .env("CHARASHEET_RESET_TOKEN_TTL_SECONDS")
                .value_parser(clap::value_parser!(u32).range(60..)),
        )
}
