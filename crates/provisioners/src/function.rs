//! Function provisioner: create, update, inspect, delete and list the
//! compute function.

use std::sync::Arc;

use pipeline::{
    DeploymentPackage, EntryPoint, EnvVars, Function, FunctionArn, FunctionHost, FunctionName,
    FunctionSpec, LayerArn, Marker, Page, ProvisionError, ReadinessPolicy, RecordPredicate,
    ResourceKind, RoleArn, RuntimeTag,
};
use tracing::{debug, info, instrument};

/// Inputs for [`FunctionProvisioner::create`].
#[derive(Debug, Clone)]
pub struct NewFunction {
    pub name: FunctionName,
    pub entry_point: EntryPoint,
    pub role: RoleArn,
    pub runtime: RuntimeTag,
    pub package: DeploymentPackage,
    pub layers: Vec<LayerArn>,
    pub environment: EnvVars,
}

pub struct FunctionProvisioner {
    host: Arc<dyn FunctionHost>,
    marker: Marker,
    owned: RecordPredicate<Function>,
    readiness: ReadinessPolicy,
}

impl FunctionProvisioner {
    pub fn new(host: Arc<dyn FunctionHost>, marker: Marker, readiness: ReadinessPolicy) -> Self {
        let owned = marker.function_predicate();
        Self {
            host,
            marker,
            owned,
            readiness,
        }
    }

    /// Returns `true` if `function` carries this tool's marker.
    pub fn owns(&self, function: &Function) -> bool {
        (self.owned)(function)
    }

    /// Creates the function and waits until it is invokable.
    ///
    /// Does not upsert: an existing function of the same name is an
    /// [`ProvisionError::AlreadyExists`] error.
    #[instrument(skip_all, fields(function = %request.name))]
    pub async fn create(&self, request: NewFunction) -> Result<FunctionArn, ProvisionError> {
        let name = request.name.clone();
        let spec = FunctionSpec {
            name: request.name,
            entry_point: request.entry_point,
            role: request.role,
            runtime: request.runtime,
            package: request.package,
            layers: request.layers,
            environment: request.environment,
            description: self.marker.description(),
            tags: self.marker.tags(),
        };

        let arn = self
            .host
            .create_function(&spec)
            .await
            .map_err(|e| {
                ProvisionError::from_provider(ResourceKind::Function, &name, "create function", e)
            })?;
        debug!(%arn, "Function created, waiting for it to become active");

        self.wait_until_active(&name).await?;
        info!(%arn, "Function active");
        Ok(arn)
    }

    /// Blocks until the function is invokable, bounded by the readiness policy.
    pub async fn wait_until_active(&self, name: &FunctionName) -> Result<(), ProvisionError> {
        self.host
            .wait_until_active(name, &self.readiness)
            .await
            .map_err(|e| {
                ProvisionError::from_provider(ResourceKind::Function, name, "wait for function", e)
            })
    }

    #[instrument(skip(self, package), fields(function = %name, bytes = package.len()))]
    pub async fn update_code(
        &self,
        name: &FunctionName,
        package: &DeploymentPackage,
    ) -> Result<Function, ProvisionError> {
        let function = self
            .host
            .update_function_code(name, package)
            .await
            .map_err(|e| {
                ProvisionError::from_provider(ResourceKind::Function, name, "update function code", e)
            })?;
        info!("Function code updated");
        Ok(function)
    }

    #[instrument(skip(self, environment), fields(function = %name, variables = environment.len()))]
    pub async fn update_config(
        &self,
        name: &FunctionName,
        environment: &EnvVars,
    ) -> Result<Function, ProvisionError> {
        let function = self
            .host
            .update_function_configuration(name, environment)
            .await
            .map_err(|e| {
                ProvisionError::from_provider(
                    ResourceKind::Function,
                    name,
                    "update function configuration",
                    e,
                )
            })?;
        info!("Function configuration updated");
        Ok(function)
    }

    /// Fetches a function. A missing function is `Ok(None)`.
    pub async fn get(&self, name: &FunctionName) -> Result<Option<Function>, ProvisionError> {
        match self.host.get_function(name).await {
            Ok(function) => Ok(Some(function)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ProvisionError::from_provider(
                ResourceKind::Function,
                name,
                "get function",
                e,
            )),
        }
    }

    /// Deletes a function. A missing function is a [`ProvisionError::NotFound`] error.
    #[instrument(skip(self), fields(function = %name))]
    pub async fn delete(&self, name: &FunctionName) -> Result<(), ProvisionError> {
        self.host.delete_function(name).await.map_err(|e| {
            ProvisionError::from_provider(ResourceKind::Function, name, "delete function", e)
        })?;
        info!("Function deleted");
        Ok(())
    }

    /// Lists every function carrying this tool's marker, across all pages.
    pub async fn list(&self) -> Result<Vec<Function>, ProvisionError> {
        let mut owned = Vec::new();
        let mut cursor = None;
        loop {
            let Page { items, next } = self.host.list_functions(cursor).await.map_err(|e| {
                ProvisionError::from_provider(ResourceKind::Function, "*", "list functions", e)
            })?;
            owned.extend(items.into_iter().filter(|f| self.owns(f)));
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(count = owned.len(), "Listed owned functions");
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pipeline::{FunctionState, IdentityStore, ProviderErrorKind, RoleName, TrustPolicy};
    use sandbox::{SandboxCloud, SandboxOp, SandboxOptions};

    use super::*;

    fn readiness() -> ReadinessPolicy {
        ReadinessPolicy {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(1),
        }
    }

    fn provisioner(cloud: &Arc<SandboxCloud>) -> FunctionProvisioner {
        FunctionProvisioner::new(cloud.clone(), Marker::default(), readiness())
    }

    async fn request(cloud: &SandboxCloud, name: &str) -> NewFunction {
        let role_name = RoleName::new("role").unwrap();
        let role = match cloud.get_role(&role_name).await {
            Ok(role) => role,
            Err(_) => cloud
                .create_role(&role_name, &TrustPolicy::function_execution(), "arn:policy")
                .await
                .unwrap(),
        };
        NewFunction {
            name: FunctionName::new(name).unwrap(),
            entry_point: EntryPoint::new("lambda_handler_rest.lambda_handler").unwrap(),
            role: role.arn,
            runtime: RuntimeTag::new("python3.11").unwrap(),
            package: DeploymentPackage::new(b"PK".to_vec()),
            layers: Vec::new(),
            environment: EnvVars::from([("API_KEY".to_owned(), "sk_test".to_owned())]),
        }
    }

    /// Seeds a function some other tool created.
    async fn seed_foreign(cloud: &SandboxCloud, name: &str) {
        let provisioner = FunctionProvisioner::new(
            Arc::new(cloud.clone()),
            Marker::new("other-tool", "yes"),
            readiness(),
        );
        provisioner.create(request(cloud, name).await).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn create_returns_only_once_active() {
        let cloud = Arc::new(SandboxCloud::new(SandboxOptions {
            activation_reads: 5,
            ..SandboxOptions::default()
        }));
        let provisioner = provisioner(&cloud);

        provisioner.create(request(&cloud, "demo").await).await.unwrap();

        let function = provisioner
            .get(&FunctionName::new("demo").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(function.state, FunctionState::Active);
        assert_eq!(function.description, Marker::default().description());
        assert!(cloud.calls(SandboxOp::GetFunction) >= 6);
    }

    #[tokio::test]
    async fn create_does_not_upsert() {
        let cloud = Arc::new(SandboxCloud::default());
        let provisioner = provisioner(&cloud);
        provisioner.create(request(&cloud, "demo").await).await.unwrap();

        let err = provisioner
            .create(request(&cloud, "demo").await)
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn permission_errors_on_create_are_fatal() {
        let cloud = Arc::new(SandboxCloud::default());
        cloud.inject_fault(SandboxOp::CreateFunction, ProviderErrorKind::AccessDenied);
        let provisioner = provisioner(&cloud);

        let err = provisioner
            .create(request(&cloud, "demo").await)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Provider { .. }));
        assert!(err.to_string().contains("demo"));
    }

    #[tokio::test]
    async fn missing_function_is_absent_not_an_error() {
        let cloud = Arc::new(SandboxCloud::default());
        let provisioner = provisioner(&cloud);
        let found = provisioner
            .get(&FunctionName::new("ghost").unwrap())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn updates_fail_for_missing_functions() {
        let cloud = Arc::new(SandboxCloud::default());
        let provisioner = provisioner(&cloud);
        let name = FunctionName::new("ghost").unwrap();

        let err = provisioner
            .update_code(&name, &DeploymentPackage::new(vec![1]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let err = provisioner
            .update_config(&name, &EnvVars::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn update_config_replaces_the_environment() {
        let cloud = Arc::new(SandboxCloud::default());
        let provisioner = provisioner(&cloud);
        provisioner.create(request(&cloud, "demo").await).await.unwrap();

        let env = EnvVars::from([("MODE".to_owned(), "live".to_owned())]);
        let function = provisioner
            .update_config(&FunctionName::new("demo").unwrap(), &env)
            .await
            .unwrap();
        assert_eq!(function.environment, env);
    }

    #[tokio::test]
    async fn delete_surfaces_not_found() {
        let cloud = Arc::new(SandboxCloud::default());
        let provisioner = provisioner(&cloud);
        let err = provisioner
            .delete(&FunctionName::new("ghost").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_returns_exactly_the_marked_functions_across_pages() {
        let orders: [&[&str]; 3] = [
            &["mine-a", "theirs-a", "mine-b", "theirs-b", "mine-c"],
            &["theirs-a", "theirs-b", "mine-c", "mine-b", "mine-a"],
            &["mine-c", "theirs-b", "mine-a", "theirs-a", "mine-b"],
        ];
        for order in orders {
            let cloud = Arc::new(SandboxCloud::new(SandboxOptions {
                page_size: 2,
                ..SandboxOptions::default()
            }));
            let provisioner = provisioner(&cloud);
            for name in order {
                if name.starts_with("mine") {
                    provisioner.create(request(&cloud, name).await).await.unwrap();
                } else {
                    seed_foreign(&cloud, name).await;
                }
            }

            let listed = provisioner.list().await.unwrap();
            let mut names: Vec<_> = listed.iter().map(|f| f.name.to_string()).collect();
            names.sort();
            assert_eq!(names, ["mine-a", "mine-b", "mine-c"], "order {order:?}");
        }
    }

    #[tokio::test]
    async fn list_failure_mid_pagination_is_an_error_not_a_partial_result() {
        let cloud = Arc::new(SandboxCloud::new(SandboxOptions {
            page_size: 1,
            ..SandboxOptions::default()
        }));
        let provisioner = provisioner(&cloud);
        provisioner.create(request(&cloud, "a").await).await.unwrap();
        provisioner.create(request(&cloud, "b").await).await.unwrap();

        // First page succeeds, second page fails.
        let host = Arc::new(FailSecondPage {
            inner: cloud.clone(),
            pages: std::sync::atomic::AtomicUsize::new(0),
        });
        let provisioner = FunctionProvisioner::new(host, Marker::default(), readiness());
        assert!(provisioner.list().await.is_err());
    }

    /// Delegates to the sandbox but fails the second list page.
    struct FailSecondPage {
        inner: Arc<SandboxCloud>,
        pages: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FunctionHost for FailSecondPage {
        async fn create_function(
            &self,
            spec: &FunctionSpec,
        ) -> Result<FunctionArn, pipeline::ProviderError> {
            self.inner.create_function(spec).await
        }

        async fn update_function_code(
            &self,
            name: &FunctionName,
            package: &DeploymentPackage,
        ) -> Result<Function, pipeline::ProviderError> {
            self.inner.update_function_code(name, package).await
        }

        async fn update_function_configuration(
            &self,
            name: &FunctionName,
            environment: &EnvVars,
        ) -> Result<Function, pipeline::ProviderError> {
            self.inner.update_function_configuration(name, environment).await
        }

        async fn get_function(&self, name: &FunctionName) -> Result<Function, pipeline::ProviderError> {
            self.inner.get_function(name).await
        }

        async fn delete_function(&self, name: &FunctionName) -> Result<(), pipeline::ProviderError> {
            self.inner.delete_function(name).await
        }

        async fn list_functions(
            &self,
            cursor: Option<String>,
        ) -> Result<Page<Function>, pipeline::ProviderError> {
            let page = self
                .pages
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if page == 1 {
                return Err(pipeline::ProviderError::new(
                    ProviderErrorKind::Unavailable,
                    "ListFunctions",
                    "connection reset",
                ));
            }
            self.inner.list_functions(cursor).await
        }
    }
}
