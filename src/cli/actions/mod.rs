//! What the binary does once arguments are parsed.

pub mod server;

/// A fully resolved command, ready to run.
#[derive(Debug)]
pub enum Action {
    /// Serve the web application until interrupted.
    Server(server::Args),
}

impl Action {
    /// # Errors
    /// Returns an error if storage, the listener or the server fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        match self {
            Self::Server(args) => server::execute(args).await,
        }
    }
}
