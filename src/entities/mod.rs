pub mod prelude;

pub mod auth_sessions;
pub mod identities;
pub mod profiles;
pub mod user_roles;
