//! Account listing command handlers

use crate::config::Config;
use crate::db::Store;

pub async fn cmd_pending(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let pending = store.list_pending_profiles().await?;

    if pending.is_empty() {
        println!("No accounts waiting for approval.");
        return Ok(());
    }

    println!("Pending Accounts ({} total)", pending.len());
    println!("{:-<70}", "");

    for account in pending {
        let name = account.full_name.as_deref().unwrap_or("(no name)");
        println!("• {} <{}>", name, account.email);
        println!("  ID: {} | Registered: {}", account.id, account.created_at);
    }

    Ok(())
}

pub async fn cmd_active(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let active = store.list_active_accounts().await?;

    if active.is_empty() {
        println!("No active accounts.");
        println!();
        println!("Create the first one with: staffdesk bootstrap --email <email> --password <password>");
        return Ok(());
    }

    println!("Active Accounts ({} total)", active.len());
    println!("{:-<70}", "");

    for entry in active {
        let name = entry.account.full_name.as_deref().unwrap_or("(no name)");
        println!("• {} <{}> [{}]", name, entry.account.email, entry.role);
        println!(
            "  ID: {} | Role since: {}",
            entry.account.id, entry.role_assigned_at
        );
    }

    Ok(())
}
