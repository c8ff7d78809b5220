pub mod identity_service;
pub mod identity_service_impl;
pub use identity_service::{IdentityError, IdentityProvider, IssuedSession};
pub use identity_service_impl::SeaOrmIdentityProvider;

pub mod lifecycle_service;
pub mod lifecycle_service_impl;
pub use lifecycle_service::{AccountLifecycle, LifecycleError};
pub use lifecycle_service_impl::SeaOrmAccountLifecycle;

pub mod eligibility;
pub use eligibility::{DenialReason, Eligibility, EligibilityResponse, LoginGate};

pub mod guard;
pub use guard::GuardDecision;

pub mod console;
pub use console::{ApprovalConsole, ConsoleError};

pub mod notify;
pub use notify::{ContactSubmission, EmailMessage, EmailRelay, RelayError};
