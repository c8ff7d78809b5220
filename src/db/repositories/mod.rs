pub mod access;
pub mod identity;
