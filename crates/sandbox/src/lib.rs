//! In-memory Hookwire provider.
//!
//! [`SandboxCloud`] implements all four [`pipeline`] ports against one
//! simulated account: an identity store, a function host, a gateway host and
//! an event source sharing a single [`World`]. It behaves like the real
//! systems where the orchestrator depends on their behaviour:
//!
//! - ids are assigned by the provider, never chosen by the caller;
//! - list calls paginate (see [`SandboxOptions::page_size`]);
//! - functions start `Pending` and turn `Active` only after being polled;
//! - newly created roles can be made to propagate with a delay
//!   ([`SandboxOptions::role_propagation`]);
//! - every call can be made to fail once via [`SandboxCloud::inject_fault`],
//!   and every call is counted ([`SandboxCloud::calls`]).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Used as the test double for workflow tests and by the
//! CLI's sandbox mode, where the world is persisted as a JSON snapshot between
//! invocations.

mod event_source;
mod function_host;
mod gateway_host;
mod identity;
pub mod world;

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pipeline::{AccountId, ProviderError, ProviderErrorKind, Region};
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

pub use world::{SnapshotError, StoredFunction, StoredGateway, StoredMethod, StoredRoute, World};

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Every provider call the sandbox answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxOp {
    GetRole,
    CreateRole,
    CreateFunction,
    UpdateFunctionCode,
    UpdateFunctionConfiguration,
    GetFunction,
    DeleteFunction,
    ListFunctions,
    CreateApi,
    GetRootResource,
    CreateResource,
    PutMethod,
    PutIntegration,
    CreateDeployment,
    AddInvokePermission,
    DeleteApi,
    ListApis,
    CreateSubscription,
    DeleteSubscription,
    ListSubscriptions,
}

impl SandboxOp {
    /// The provider's own name for the call.
    pub fn name(self) -> &'static str {
        match self {
            Self::GetRole => "GetRole",
            Self::CreateRole => "CreateRole",
            Self::CreateFunction => "CreateFunction",
            Self::UpdateFunctionCode => "UpdateFunctionCode",
            Self::UpdateFunctionConfiguration => "UpdateFunctionConfiguration",
            Self::GetFunction => "GetFunction",
            Self::DeleteFunction => "DeleteFunction",
            Self::ListFunctions => "ListFunctions",
            Self::CreateApi => "CreateRestApi",
            Self::GetRootResource => "GetResources",
            Self::CreateResource => "CreateResource",
            Self::PutMethod => "PutMethod",
            Self::PutIntegration => "PutIntegration",
            Self::CreateDeployment => "CreateDeployment",
            Self::AddInvokePermission => "AddPermission",
            Self::DeleteApi => "DeleteRestApi",
            Self::ListApis => "GetRestApis",
            Self::CreateSubscription => "CreateWebhookEndpoint",
            Self::DeleteSubscription => "DeleteWebhookEndpoint",
            Self::ListSubscriptions => "ListWebhookEndpoints",
        }
    }

    /// Calls answered by the event-source side of the sandbox.
    pub fn is_event_source(self) -> bool {
        matches!(
            self,
            Self::CreateSubscription | Self::DeleteSubscription | Self::ListSubscriptions
        )
    }

    pub(crate) fn error(self, kind: ProviderErrorKind, message: impl Into<String>) -> ProviderError {
        ProviderError::new(kind, self.name(), message)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Tunables of the simulated account.
#[derive(Debug, Clone)]
pub struct SandboxOptions {
    pub account_id: AccountId,
    pub region: Region,
    /// Items per page returned by list calls.
    pub page_size: usize,
    /// Reads a new or updated function reports `Pending` before turning active.
    pub activation_reads: u32,
    /// How long a new role stays invisible to the function host.
    pub role_propagation: Duration,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            account_id: AccountId::from_static("000000000000"),
            region: Region::from_static("us-east-1"),
            page_size: 50,
            activation_reads: 1,
            role_propagation: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Instrumentation {
    faults: HashMap<SandboxOp, VecDeque<ProviderErrorKind>>,
    calls: HashMap<SandboxOp, usize>,
    race_role_creation: bool,
}

/// A simulated provider account. Cloning shares the same account.
#[derive(Debug, Clone)]
pub struct SandboxCloud {
    world: Arc<RwLock<World>>,
    /// When each role becomes visible to the function host. Not persisted.
    role_ready_at: Arc<Mutex<HashMap<String, Instant>>>,
    instrumentation: Arc<Mutex<Instrumentation>>,
    options: SandboxOptions,
}

impl Default for SandboxCloud {
    fn default() -> Self {
        Self::new(SandboxOptions::default())
    }
}

impl SandboxCloud {
    pub fn new(options: SandboxOptions) -> Self {
        Self::with_world(World::default(), options)
    }

    pub fn with_world(world: World, options: SandboxOptions) -> Self {
        Self {
            world: Arc::new(RwLock::new(world)),
            role_ready_at: Arc::default(),
            instrumentation: Arc::default(),
            options,
        }
    }

    /// Opens the account persisted at `path`, or an empty one.
    pub async fn load(path: &Path, options: SandboxOptions) -> Result<Self, SnapshotError> {
        let world = World::load(path).await?;
        tracing::debug!(path = %path.display(), "Loaded sandbox snapshot");
        Ok(Self::with_world(world, options))
    }

    /// Persists the account to `path`.
    pub async fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        self.world.read().await.save(path).await?;
        tracing::debug!(path = %path.display(), "Saved sandbox snapshot");
        Ok(())
    }

    pub fn options(&self) -> &SandboxOptions {
        &self.options
    }

    /// Returns a copy of the current account state.
    pub async fn snapshot(&self) -> World {
        self.world.read().await.clone()
    }

    /// Makes the next call to `op` fail with `kind`. Faults queue up per operation.
    pub fn inject_fault(&self, op: SandboxOp, kind: ProviderErrorKind) {
        self.instrumentation()
            .faults
            .entry(op)
            .or_default()
            .push_back(kind);
    }

    /// Makes the next role creation lose a race: the role appears as if some
    /// other caller created it, and the create call fails with AlreadyExists.
    pub fn race_next_role_creation(&self) {
        self.instrumentation().race_role_creation = true;
    }

    /// Number of times `op` has been called, including failed calls.
    pub fn calls(&self, op: SandboxOp) -> usize {
        self.instrumentation().calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls that reached the event-source side.
    pub fn event_source_calls(&self) -> usize {
        self.instrumentation()
            .calls
            .iter()
            .filter(|(op, _)| op.is_event_source())
            .map(|(_, n)| n)
            .sum()
    }

    fn instrumentation(&self) -> std::sync::MutexGuard<'_, Instrumentation> {
        self.instrumentation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a call to `op` and returns the injected fault, if one is queued.
    pub(crate) fn enter(&self, op: SandboxOp) -> Result<(), ProviderError> {
        let mut inst = self.instrumentation();
        *inst.calls.entry(op).or_default() += 1;
        match inst.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(kind) => {
                tracing::debug!(operation = op.name(), %kind, "Injected sandbox fault");
                Err(op.error(kind, "injected fault"))
            }
            None => Ok(()),
        }
    }

    pub(crate) fn take_role_race(&self) -> bool {
        std::mem::take(&mut self.instrumentation().race_role_creation)
    }

    pub(crate) fn mark_role_created(&self, name: &str) {
        let ready_at = Instant::now() + self.options.role_propagation;
        self.role_ready_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), ready_at);
    }

    pub(crate) fn role_is_propagated(&self, name: &str) -> bool {
        self.role_ready_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map_or(true, |ready_at| Instant::now() >= *ready_at)
    }
}

/// A fresh provider-style identifier of `len` lowercase alphanumerics.
pub(crate) fn random_id(len: usize) -> String {
    let mut id = String::with_capacity(len);
    while id.len() < len {
        id.push_str(&Uuid::new_v4().simple().to_string());
    }
    id.truncate(len);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_fire_once_in_order() {
        let cloud = SandboxCloud::default();
        cloud.inject_fault(SandboxOp::ListApis, ProviderErrorKind::Throttled);
        cloud.inject_fault(SandboxOp::ListApis, ProviderErrorKind::Unavailable);

        assert_eq!(
            cloud.enter(SandboxOp::ListApis).unwrap_err().kind,
            ProviderErrorKind::Throttled
        );
        assert_eq!(
            cloud.enter(SandboxOp::ListApis).unwrap_err().kind,
            ProviderErrorKind::Unavailable
        );
        assert!(cloud.enter(SandboxOp::ListApis).is_ok());
        assert_eq!(cloud.calls(SandboxOp::ListApis), 3);
    }

    #[test]
    fn event_source_calls_are_counted_separately() {
        let cloud = SandboxCloud::default();
        cloud.enter(SandboxOp::CreateApi).unwrap();
        cloud.enter(SandboxOp::ListSubscriptions).unwrap();
        assert_eq!(cloud.event_source_calls(), 1);
    }

    #[tokio::test]
    async fn snapshot_round_trips_a_populated_account() {
        use pipeline::{
            Authorization, DeploymentPackage, EntryPoint, EnvVars, EventKinds, EventSource,
            FunctionHost, FunctionName, FunctionSpec, GatewayHost, IdentityStore, Integration,
            RoleName, RuntimeTag, StageName, Tags, TrustPolicy,
        };

        let cloud = SandboxCloud::default();
        let role = cloud
            .create_role(
                &RoleName::new("hookwire-role").unwrap(),
                &TrustPolicy::function_execution(),
                "arn:policy",
            )
            .await
            .unwrap();
        let tags = Tags::from([("hookwire".to_owned(), "true".to_owned())]);
        let function = cloud
            .create_function(&FunctionSpec {
                name: FunctionName::new("demo").unwrap(),
                entry_point: EntryPoint::new("main.handler").unwrap(),
                role: role.arn,
                runtime: RuntimeTag::new("python3.11").unwrap(),
                package: DeploymentPackage::new(vec![1, 2, 3]),
                layers: Vec::new(),
                environment: EnvVars::from([("API_KEY".to_owned(), "sk_test".to_owned())]),
                description: "hookwire=true".to_owned(),
                tags: tags.clone(),
            })
            .await
            .unwrap();
        let api = cloud.create_api("demo", &tags).await.unwrap();
        let root = cloud.get_root_resource(&api.id).await.unwrap();
        let route = cloud.create_resource(&api.id, &root, "webhook").await.unwrap();
        cloud
            .put_method(&api.id, &route, "ANY", Authorization::None)
            .await
            .unwrap();
        let integration = Integration {
            http_method: "POST".to_owned(),
            uri: format!("arn:integration/{function}"),
            proxy: true,
        };
        cloud
            .put_integration(&api.id, &route, "ANY", &integration)
            .await
            .unwrap();
        cloud
            .create_deployment(&api.id, &StageName::new("prod").unwrap())
            .await
            .unwrap();
        cloud
            .create_subscription(&EventKinds::All, "https://example.test/prod/webhook", &tags)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("sandbox.json");
        cloud.save(&path).await.unwrap();
        let reloaded = SandboxCloud::load(&path, SandboxOptions::default())
            .await
            .unwrap();

        let before = cloud.snapshot().await;
        assert_eq!(before.roles.len(), 1);
        assert_eq!(before.functions.len(), 1);
        assert_eq!(before.gateways.len(), 1);
        assert_eq!(before.subscriptions.len(), 1);
        assert_eq!(reloaded.snapshot().await, before);
    }

    #[test]
    fn random_ids_have_the_requested_length() {
        assert_eq!(random_id(10).len(), 10);
        assert_eq!(random_id(40).len(), 40);
        assert!(random_id(10).chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
