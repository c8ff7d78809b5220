mod accounts;
mod bootstrap;

pub use accounts::{cmd_active, cmd_pending};
pub use bootstrap::cmd_bootstrap;
