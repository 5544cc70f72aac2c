use crate::cli::{
    actions::{server::Args, Action},
    commands::session,
};
use anyhow::{Context, Result};
use chrono::TimeDelta;
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let base_url = matches
        .get_one::<String>("base-url")
        .cloned()
        .context("missing required argument: --base-url")?;

    let session_secret = matches
        .get_one::<String>(session::ARG_SESSION_SECRET_KEY)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --session-secret-key")?;
    let old_session_secrets = matches
        .get_many::<String>(session::ARG_SESSION_OLD_SECRET_KEY)
        .map(|values| {
            values
                .filter(|value| !value.is_empty())
                .cloned()
                .map(SecretString::from)
                .collect()
        })
        .unwrap_or_default();

    let storage_timeout = Duration::from_secs(
        matches
            .get_one::<u64>("storage-timeout-seconds")
            .copied()
            .unwrap_or(3),
    );
    let reset_token_ttl = TimeDelta::seconds(i64::from(
        matches
            .get_one::<u32>(session::ARG_RESET_TOKEN_TTL_SECONDS)
            .copied()
            .unwrap_or(86_400),
    ));

    Ok(Action::Server(Args {
        port,
        dsn,
        base_url,
        session_secret,
        old_session_secrets,
        secure_cookies: !matches.get_flag(session::ARG_COOKIE_INSECURE),
        storage_timeout,
        reset_token_ttl,
        automigrate: matches.get_flag("db-automigrate"),
    }))
}
