//! Provisioners and orchestrator for Hookwire.
//!
//! One provisioner per external system (identity store, function host,
//! gateway host, event source) plus the [`Orchestrator`] that sequences them
//! into the deploy, list, delete, and update workflows.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Provisioners translate provider errors into the
//! [`pipeline::ProvisionError`] taxonomy and apply the ownership marker. The
//! orchestrator owns ordering and the partial-failure policy. Neither retries
//! anything automatically.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identity`] | Get-or-create of the execution role |
//! | [`bundle`] | Deployment package builder |
//! | [`function`] | Function create/update/get/delete/list and readiness wait |
//! | [`gateway`] | Gateway wiring, invoke grant, public URL |
//! | [`subscription`] | Event-source webhook registration |
//! | [`orchestrator`] | Orchestrator construction and the update workflow |
//! | [`deploy`] | Deploy state machine and partial-failure report |
//! | [`inventory`] | List fan-out and best-effort delete |

pub mod bundle;
pub mod deploy;
pub mod function;
pub mod gateway;
pub mod identity;
pub mod inventory;
pub mod orchestrator;
pub mod subscription;

pub use bundle::{BundleBuilder, BundleError, Skeleton, HANDLER_FILE};
pub use deploy::{
    DeployError, DeployRequest, DeployState, DeployStep, Deployment, PartialDeployment,
};
pub use function::{FunctionProvisioner, NewFunction};
pub use gateway::{EndpointConvention, GatewayCreateError, GatewayProvisioner, NewGateway};
pub use identity::{EnsuredRole, IdentityProvisioner, BASIC_EXECUTION_POLICY};
pub use inventory::{DeleteTarget, DeletedResource, DeletionFailure, DeletionReport, Inventory};
pub use orchestrator::{Orchestrator, Providers, UpdateRequest};
pub use subscription::SubscriptionProvisioner;
