use super::{server, Action};
use anyhow::Result;

pub(super) async fn execute(action: Action) -> Result<()> {
    let result = match action {
        Action::Server(args) => server::execute(args).await,
    };

    crate::cli::telemetry::shutdown_tracer();

    result
}
