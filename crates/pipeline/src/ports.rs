//! Provider port definitions.
//!
//! One trait per external system the orchestrator talks to. Infrastructure
//! crates supply the implementations; the provisioners only ever see these
//! traits. Every method is a single remote call and is never retried here.
//!
//! | Trait | External system |
//! |-------|-----------------|
//! | [`IdentityStore`] | identity/role store |
//! | [`FunctionHost`] | function-execution host |
//! | [`GatewayHost`] | public HTTP front door |
//! | [`EventSource`] | event-source webhook registry |

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::{
    Authorization, DeploymentPackage, EnvVars, EventKinds, Function, FunctionArn, FunctionName,
    FunctionSpec, FunctionState, Gateway, GatewayId, Integration, InvokePermission, Page,
    ProviderError, ProviderErrorKind, ReadinessPolicy, Role, RoleName, RouteId, StageName,
    Subscription, SubscriptionId, Tags, TrustPolicy,
};

/// Identity/role store.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetches a role by name. A missing role is a [`ProviderErrorKind::NotFound`] error.
    async fn get_role(&self, name: &RoleName) -> Result<Role, ProviderError>;

    /// Creates a role with `trust_policy` and attaches `policy_arn` to it.
    ///
    /// Fails with [`ProviderErrorKind::AlreadyExists`] if the name is taken.
    async fn create_role(
        &self,
        name: &RoleName,
        trust_policy: &TrustPolicy,
        policy_arn: &str,
    ) -> Result<Role, ProviderError>;
}

/// Function-execution host.
#[async_trait]
pub trait FunctionHost: Send + Sync {
    /// Starts creating a function and returns its identifier. The function is
    /// usually not invokable yet; see [`FunctionHost::wait_until_active`].
    async fn create_function(&self, spec: &FunctionSpec) -> Result<FunctionArn, ProviderError>;

    async fn update_function_code(
        &self,
        name: &FunctionName,
        package: &DeploymentPackage,
    ) -> Result<Function, ProviderError>;

    async fn update_function_configuration(
        &self,
        name: &FunctionName,
        environment: &EnvVars,
    ) -> Result<Function, ProviderError>;

    /// A missing function is a [`ProviderErrorKind::NotFound`] error.
    async fn get_function(&self, name: &FunctionName) -> Result<Function, ProviderError>;

    async fn delete_function(&self, name: &FunctionName) -> Result<(), ProviderError>;

    /// Lists one page of every function in the account, owned or not.
    async fn list_functions(&self, cursor: Option<String>) -> Result<Page<Function>, ProviderError>;

    /// Blocks until `name` reports [`FunctionState::Active`].
    ///
    /// The default polls [`FunctionHost::get_function`]; adapters with a
    /// native waiter should override it.
    async fn wait_until_active(
        &self,
        name: &FunctionName,
        policy: &ReadinessPolicy,
    ) -> Result<(), ProviderError> {
        let deadline = Instant::now() + policy.timeout;
        loop {
            let function = self.get_function(name).await?;
            match function.state {
                FunctionState::Active => return Ok(()),
                FunctionState::Failed => {
                    return Err(ProviderError::new(
                        ProviderErrorKind::Other,
                        "WaitFunctionActive",
                        format!("function {name} entered the failed state"),
                    ));
                }
                FunctionState::Pending | FunctionState::Inactive => {}
            }

            if Instant::now() + policy.poll_interval > deadline {
                return Err(ProviderError::new(
                    ProviderErrorKind::Timeout,
                    "WaitFunctionActive",
                    format!("function {name} not active after {:?}", policy.timeout),
                ));
            }
            debug!(function = %name, state = ?function.state, "Function not active yet");
            tokio::time::sleep(policy.poll_interval).await;
        }
    }
}

/// Public HTTP front door.
#[async_trait]
pub trait GatewayHost: Send + Sync {
    /// Creates an empty gateway. The provider assigns its id.
    async fn create_api(&self, name: &str, tags: &Tags) -> Result<Gateway, ProviderError>;

    /// Returns the id of the gateway's `/` route.
    async fn get_root_resource(&self, api: &GatewayId) -> Result<RouteId, ProviderError>;

    async fn create_resource(
        &self,
        api: &GatewayId,
        parent: &RouteId,
        path_part: &str,
    ) -> Result<RouteId, ProviderError>;

    async fn put_method(
        &self,
        api: &GatewayId,
        resource: &RouteId,
        http_method: &str,
        authorization: Authorization,
    ) -> Result<(), ProviderError>;

    async fn put_integration(
        &self,
        api: &GatewayId,
        resource: &RouteId,
        http_method: &str,
        integration: &Integration,
    ) -> Result<(), ProviderError>;

    /// Publishes the gateway's current routes under `stage`.
    async fn create_deployment(
        &self,
        api: &GatewayId,
        stage: &StageName,
    ) -> Result<(), ProviderError>;

    /// Adds a statement to a function's resource policy. A statement id that
    /// already exists is an [`ProviderErrorKind::AlreadyExists`] error.
    async fn add_invoke_permission(
        &self,
        permission: &InvokePermission,
    ) -> Result<(), ProviderError>;

    /// Deletes a gateway with all of its routes and deployments.
    async fn delete_api(&self, api: &GatewayId) -> Result<(), ProviderError>;

    /// Lists one page of every gateway in the account, owned or not.
    async fn list_apis(&self, cursor: Option<String>) -> Result<Page<Gateway>, ProviderError>;
}

/// Event-source webhook registry.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn create_subscription(
        &self,
        events: &EventKinds,
        url: &str,
        metadata: &Tags,
    ) -> Result<Subscription, ProviderError>;

    async fn delete_subscription(&self, id: &SubscriptionId) -> Result<(), ProviderError>;

    /// Lists one page of every subscription, owned or not. Filtering happens
    /// client-side.
    async fn list_subscriptions(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Subscription>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::{EntryPoint, RoleArn, RuntimeTag, Timestamp};

    /// Reports `Pending` for the first `pending_reads` reads, then `final_state`.
    struct SlowHost {
        reads: AtomicUsize,
        pending_reads: usize,
        final_state: FunctionState,
    }

    impl SlowHost {
        fn new(pending_reads: usize, final_state: FunctionState) -> Self {
            Self {
                reads: AtomicUsize::new(0),
                pending_reads,
                final_state,
            }
        }

        fn record(&self, name: &FunctionName, state: FunctionState) -> Function {
            Function {
                name: name.clone(),
                arn: FunctionArn::new(format!("arn:fn:{name}")).unwrap(),
                entry_point: EntryPoint::new("main.handler").unwrap(),
                role: RoleArn::new("arn:role").unwrap(),
                runtime: RuntimeTag::new("python3.11").unwrap(),
                description: String::new(),
                environment: EnvVars::new(),
                layers: Vec::new(),
                state,
                last_modified: Timestamp::now(),
            }
        }
    }

    #[async_trait]
    impl FunctionHost for SlowHost {
        async fn create_function(&self, _: &FunctionSpec) -> Result<FunctionArn, ProviderError> {
            unimplemented!()
        }

        async fn update_function_code(
            &self,
            _: &FunctionName,
            _: &DeploymentPackage,
        ) -> Result<Function, ProviderError> {
            unimplemented!()
        }

        async fn update_function_configuration(
            &self,
            _: &FunctionName,
            _: &EnvVars,
        ) -> Result<Function, ProviderError> {
            unimplemented!()
        }

        async fn get_function(&self, name: &FunctionName) -> Result<Function, ProviderError> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst);
            let state = if read < self.pending_reads {
                FunctionState::Pending
            } else {
                self.final_state
            };
            Ok(self.record(name, state))
        }

        async fn delete_function(&self, _: &FunctionName) -> Result<(), ProviderError> {
            unimplemented!()
        }

        async fn list_functions(&self, _: Option<String>) -> Result<Page<Function>, ProviderError> {
            unimplemented!()
        }
    }

    fn policy() -> ReadinessPolicy {
        ReadinessPolicy {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_pending_reads() {
        let host = SlowHost::new(3, FunctionState::Active);
        let name = FunctionName::new("demo").unwrap();

        host.wait_until_active(&name, &policy()).await.unwrap();
        assert_eq!(host.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_timeout() {
        let host = SlowHost::new(usize::MAX, FunctionState::Active);
        let name = FunctionName::new("demo").unwrap();

        let err = host.wait_until_active(&name, &policy()).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_state_ends_the_wait() {
        let host = SlowHost::new(0, FunctionState::Failed);
        let name = FunctionName::new("demo").unwrap();

        let err = host.wait_until_active(&name, &policy()).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Other);
        assert_eq!(host.reads.load(Ordering::SeqCst), 1);
    }
}
