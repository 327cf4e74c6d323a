//! # Control Plane Module
//!
//! Tenant isolation and usage-quota governance.
//!
//! ## Components
//!
//! - `tenant`: Tenant model, isolation levels and auth settings
//! - `directory`: Onboarded tenants, indexed by id and domain
//! - `clients`: Cached tenant-scoped backend client handles
//! - `tier`: Subscription tier catalog
//! - `usage`: Billing-period date math and usage records
//! - `quota`: Metered-action admission
//! - `errors`: Control plane errors
//!
//! ## Isolation Models
//!
//! 1. **Database**: separate backend project and credentials per tenant
//! 2. **Schema**: shared backend, per-tenant schema
//! 3. **RLS**: shared backend, tenant headers evaluated by row policies

pub mod clients;
pub mod directory;
pub mod errors;
pub mod quota;
pub mod tenant;
pub mod tier;
pub mod usage;

pub use clients::*;
pub use directory::*;
pub use errors::*;
pub use quota::*;
pub use tenant::*;
pub use tier::*;
pub use usage::*;
