//! # Auth Module
//!
//! Tenant-scoped authentication on top of the hosted backend.
//!
//! Sign-in, sign-up, sessions and profiles all run through a tenant's
//! cached client handle. Tenant identity is written into every signup and
//! profile, and re-verified on every session read.

pub mod errors;
pub mod magic_link;
pub mod oauth;
pub mod profile;
pub mod service;

pub use errors::{AuthError, AuthResult};
pub use magic_link::MagicLinkGuard;
pub use oauth::{OAuthProvider, OAuthRequest};
pub use profile::{NewProfile, Profile, ProfileUpdate, SubscriberRole};
pub use service::TenantAuthService;
