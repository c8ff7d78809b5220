pub use super::auth_sessions::Entity as AuthSessions;
pub use super::identities::Entity as Identities;
pub use super::profiles::Entity as Profiles;
pub use super::user_roles::Entity as UserRoles;
