//! The orchestrator: sequences the four provisioners into the deploy, list,
//! delete, and update workflows.
//!
//! The orchestrator holds no state between calls. Everything it reports is
//! read back from the providers at call time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pipeline::{
    ConfigError, DeployConfig, DeploymentPackage, EnvVars, EventSource, Function, FunctionHost,
    FunctionName, GatewayHost, IdentityStore, ProvisionError, ResourceKind,
};
use tracing::{info, instrument};

use crate::bundle::BundleBuilder;
use crate::function::FunctionProvisioner;
use crate::gateway::{EndpointConvention, GatewayProvisioner};
use crate::identity::IdentityProvisioner;
use crate::subscription::SubscriptionProvisioner;

/// One adapter per external system.
#[derive(Clone)]
pub struct Providers {
    pub identity: Arc<dyn IdentityStore>,
    pub functions: Arc<dyn FunctionHost>,
    pub gateways: Arc<dyn GatewayHost>,
    pub events: Arc<dyn EventSource>,
}

impl Providers {
    /// Uses a single adapter that implements every port.
    pub fn uniform<P>(provider: Arc<P>) -> Self
    where
        P: IdentityStore + FunctionHost + GatewayHost + EventSource + 'static,
    {
        Self {
            identity: provider.clone(),
            functions: provider.clone(),
            gateways: provider.clone(),
            events: provider,
        }
    }

    /// Replaces the event-source adapter.
    pub fn with_events(mut self, events: Arc<dyn EventSource>) -> Self {
        self.events = events;
        self
    }
}

/// Inputs for [`Orchestrator::update`].
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub name: FunctionName,
    pub handler: PathBuf,
    /// Variables overlaid on the function's current environment. `None`
    /// leaves the configuration untouched.
    pub environment: Option<EnvVars>,
}

pub struct Orchestrator {
    pub(crate) config: DeployConfig,
    pub(crate) identity: IdentityProvisioner,
    pub(crate) functions: FunctionProvisioner,
    pub(crate) gateways: GatewayProvisioner,
    pub(crate) subscriptions: SubscriptionProvisioner,
    pub(crate) bundler: BundleBuilder,
}

impl Orchestrator {
    /// Validates `config` and wires one provisioner per provider.
    pub fn new(
        config: DeployConfig,
        providers: Providers,
        bundler: BundleBuilder,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let marker = config.marker.clone();
        Ok(Self {
            identity: IdentityProvisioner::new(providers.identity),
            functions: FunctionProvisioner::new(
                providers.functions,
                marker.clone(),
                config.readiness,
            ),
            gateways: GatewayProvisioner::new(
                providers.gateways,
                marker.clone(),
                EndpointConvention::new(config.region.clone()),
            ),
            subscriptions: SubscriptionProvisioner::new(providers.events, marker),
            bundler,
            config,
        })
    }

    /// Builds the deployment package on the blocking pool.
    pub(crate) async fn build_package(
        &self,
        handler: &Path,
    ) -> Result<DeploymentPackage, ProvisionError> {
        let bundler = self.bundler.clone();
        let handler = handler.to_path_buf();
        let package = tokio::task::spawn_blocking(move || bundler.build(&handler))
            .await
            .map_err(|e| ProvisionError::Package(format!("bundle task failed: {e}")))??;
        Ok(package)
    }

    /// Replaces the code of an existing function and, when `environment` is
    /// given, overlays it on the function's current environment.
    ///
    /// Only functions carrying this tool's marker can be updated; any other
    /// function of the same name is reported as missing.
    #[instrument(skip_all, fields(function = %request.name))]
    pub async fn update(&self, request: &UpdateRequest) -> Result<Function, ProvisionError> {
        let name = &request.name;
        let missing = || ProvisionError::NotFound {
            resource: ResourceKind::Function,
            id: name.to_string(),
            operation: "update function",
            source: None,
        };
        let existing = self
            .functions
            .get(name)
            .await?
            .filter(|f| self.functions.owns(f))
            .ok_or_else(missing)?;

        let package = self.build_package(&request.handler).await?;
        self.functions.update_code(name, &package).await?;
        self.functions.wait_until_active(name).await?;

        if let Some(overrides) = &request.environment {
            let mut environment = existing.environment;
            environment.extend(overrides.clone());
            self.functions.update_config(name, &environment).await?;
            self.functions.wait_until_active(name).await?;
        }

        let function = self.functions.get(name).await?.ok_or_else(missing)?;
        info!("Function updated");
        Ok(function)
    }
}
