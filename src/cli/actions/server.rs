use crate::{
    api::{self, Storage},
    iplogin::IpLoginConfig,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{path::PathBuf, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub seed_file: Option<PathBuf>,
    pub auto_login: bool,
    pub form_login: bool,
    pub session_ttl_seconds: i64,
    pub session_cookie_secure: bool,
    pub trust_forwarded_headers: bool,
    pub page_cache_ttl_seconds: u64,
}

impl Args {
    #[must_use]
    pub fn config(&self) -> IpLoginConfig {
        IpLoginConfig::new()
            .with_auto_login(self.auto_login)
            .with_form_login(self.form_login)
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_session_cookie_secure(self.session_cookie_secure)
            .with_trust_forwarded_headers(self.trust_forwarded_headers)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if storage cannot be opened or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.config();
    debug!("IP login config: {:?}", config);

    let storage = match (&args.dsn, &args.seed_file) {
        (Some(dsn), _) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn.expose_secret())
                .await
                .context("Failed to connect to database")?;
            Storage::postgres(pool)
        }
        (None, Some(path)) => {
            info!("Using in-memory storage seeded from {}", path.display());
            Storage::from_seed_file(path)?
        }
        (None, None) => anyhow::bail!("either a database DSN or a seed file is required"),
    };

    api::new(
        args.port,
        storage,
        config,
        Duration::from_secs(args.page_cache_ttl_seconds),
    )
    .await
}
