use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::notify::relay_from_config;
use crate::services::{
    AccountLifecycle, ApprovalConsole, EmailRelay, IdentityProvider, LoginGate,
    SeaOrmAccountLifecycle, SeaOrmIdentityProvider,
};

/// Services shared by the HTTP server and the CLI commands.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub identity: Arc<dyn IdentityProvider>,

    pub lifecycle: Arc<dyn AccountLifecycle>,

    pub gate: Arc<LoginGate>,

    pub console: Arc<ApprovalConsole>,

    pub relay: Arc<dyn EmailRelay>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let relay = relay_from_config(&config.notifications)?;
        Ok(Self::with_relay(config, store, relay))
    }

    /// Wires the services over an existing store and relay.
    #[must_use]
    pub fn with_relay(config: Config, store: Store, relay: Arc<dyn EmailRelay>) -> Self {
        let identity: Arc<dyn IdentityProvider> = Arc::new(SeaOrmIdentityProvider::new(
            store.clone(),
            config.security.clone(),
        ));

        let lifecycle: Arc<dyn AccountLifecycle> = Arc::new(SeaOrmAccountLifecycle::new(
            store.clone(),
            identity.clone(),
            relay.clone(),
            config.notifications.approval_recipients.clone(),
        ));

        let gate = Arc::new(LoginGate::new(identity.clone(), lifecycle.clone()));
        let console = Arc::new(ApprovalConsole::new(lifecycle.clone()));

        Self {
            config: Arc::new(config),
            store,
            identity,
            lifecycle,
            gate,
            console,
            relay,
        }
    }
}
