//! First super administrator

use crate::config::Config;
use crate::state::SharedState;

pub async fn cmd_bootstrap(
    config: Config,
    email: &str,
    password: &str,
    name: Option<String>,
) -> anyhow::Result<()> {
    let state = SharedState::new(config).await?;

    let account = state
        .lifecycle
        .bootstrap_super_admin(email, password, name)
        .await?;

    println!("✓ Super administrator ready: {}", account.email);
    println!("  ID: {}", account.id);

    Ok(())
}
