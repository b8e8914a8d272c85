//! Provisioning domain for Hookwire.
//!
//! This crate contains every domain concept, newtype identifier, provider
//! record, and error type used when provisioning a webhook pipeline
//! (role → function → gateway → subscription), together with the port traits
//! each external system is reached through. Infrastructure crates implement
//! the traits defined here; they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Domain + port definitions.** This crate performs no I/O.
//! It defines *what* is needed; infrastructure crates define *how* to supply it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`FunctionName`, `GatewayId`, etc.) |
//! | [`types`] | Provider records and value types (`Function`, `EventKinds`, etc.) |
//! | [`marker`] | Ownership marker and record predicates |
//! | [`errors`] | Provider/provisioner error taxonomy and retry policy |
//! | [`config`] | Deploy configuration handed to the orchestrator |
//! | [`ports`] | One trait per external system |

pub mod config;
pub mod errors;
pub mod identifiers;
pub mod marker;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use config::{DeployConfig, ReadinessPolicy};
pub use errors::{ConfigError, ProviderError, ProviderErrorKind, ProvisionError, RetryPolicy};
pub use identifiers::{
    AccountId, BasePath, DeploymentRunId, EmptyIdentifier, EntryPoint, FunctionArn, FunctionName,
    GatewayId, LayerArn, Region, RoleArn, RoleName, RouteId, RuntimeTag, StageName, SubscriptionId,
};
pub use marker::{Marker, RecordPredicate};
pub use ports::{EventSource, FunctionHost, GatewayHost, IdentityStore};
pub use types::{
    Authorization, DeploymentPackage, EnvVars, EventKinds, Function, FunctionSpec, FunctionState,
    Gateway, Integration, InvokePermission, Page, ResourceKind, Role, Subscription, Tags,
    Timestamp, TrustPolicy,
};
