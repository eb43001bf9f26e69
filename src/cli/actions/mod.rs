//! What the binary does once the command line has been validated.

pub mod server;

mod run;

/// A validated command line, ready to run.
#[derive(Debug)]
pub enum Action {
    /// Serve the login pipeline in front of the application routes.
    Server(server::Args),
}

impl Action {
    /// Run the action to completion, then flush telemetry.
    ///
    /// # Errors
    /// Returns the action's own failure; telemetry is shut down either way.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
