//! The deploy workflow.
//!
//! Deploy walks a linear state machine:
//!
//! ```text
//! Init → RoleEnsured → PackageBuilt → FunctionCreated → GatewayCreated → SubscriptionCreated → Done
//! ```
//!
//! Each transition is one provisioner call. A failed transition aborts the
//! run and leaves everything created so far in place; the error carries a
//! [`PartialDeployment`] naming those resources.

use std::fmt;
use std::path::PathBuf;

use pipeline::{
    DeploymentRunId, EventKinds, FunctionArn, FunctionName, GatewayId, ProvisionError, RoleName,
    SubscriptionId,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, Span};

use crate::function::NewFunction;
use crate::gateway::NewGateway;
use crate::orchestrator::Orchestrator;

/// Inputs for [`Orchestrator::deploy`].
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Name of the function. Also used as the gateway name.
    pub name: FunctionName,
    /// Handler source packaged with the runtime skeleton.
    pub handler: PathBuf,
    /// Event kinds to subscribe to. `None` uses the configured default.
    pub events: Option<EventKinds>,
}

/// A completed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub run_id: DeploymentRunId,
    pub function_name: FunctionName,
    pub function_arn: FunctionArn,
    pub role: RoleName,
    pub role_created: bool,
    pub gateway_id: GatewayId,
    pub url: String,
    pub subscription_id: SubscriptionId,
}

/// Position in the deploy state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    Init,
    RoleEnsured,
    PackageBuilt,
    FunctionCreated,
    GatewayCreated,
    SubscriptionCreated,
    Done,
}

/// The transition a failed deploy was attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStep {
    EnsureRole,
    BuildPackage,
    CreateFunction,
    CreateGateway,
    CreateSubscription,
}

impl DeployStep {
    /// The state the run was in when this step started.
    pub fn from_state(self) -> DeployState {
        match self {
            Self::EnsureRole => DeployState::Init,
            Self::BuildPackage => DeployState::RoleEnsured,
            Self::CreateFunction => DeployState::PackageBuilt,
            Self::CreateGateway => DeployState::FunctionCreated,
            Self::CreateSubscription => DeployState::GatewayCreated,
        }
    }
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EnsureRole => "ensure role",
            Self::BuildPackage => "build package",
            Self::CreateFunction => "create function",
            Self::CreateGateway => "create gateway",
            Self::CreateSubscription => "create subscription",
        };
        f.write_str(s)
    }
}

/// What a failed deploy had already put in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialDeployment {
    pub role: Option<RoleName>,
    pub role_created: bool,
    pub function_name: Option<FunctionName>,
    pub function_arn: Option<FunctionArn>,
    pub gateway_id: Option<GatewayId>,
    pub url: Option<String>,
}

impl PartialDeployment {
    /// Whether a function or gateway was left behind.
    ///
    /// Roles do not count: they are shared between deployments and never
    /// removed by this tool.
    pub fn has_live_resources(&self) -> bool {
        self.function_name.is_some() || self.gateway_id.is_some()
    }
}

/// A deploy run stopped before reaching [`DeployState::Done`].
#[derive(Debug, Error)]
#[error("deploy failed at step '{step}': {source}")]
pub struct DeployError {
    pub step: DeployStep,
    pub partial: PartialDeployment,
    #[source]
    pub source: ProvisionError,
}

impl DeployError {
    /// `true` when the failure left pipeline resources live that no
    /// subscription points at. They need a targeted delete or delete-all.
    pub fn is_inconsistent(&self) -> bool {
        self.partial.has_live_resources()
    }
}

struct Run {
    state: DeployState,
    partial: PartialDeployment,
}

impl Run {
    fn fail(&self, step: DeployStep, source: ProvisionError) -> DeployError {
        error!(
            %step,
            state = ?self.state,
            function = ?self.partial.function_name,
            gateway = ?self.partial.gateway_id,
            error = %source,
            "Deploy step failed"
        );
        DeployError {
            step,
            partial: self.partial.clone(),
            source,
        }
    }

    fn advance(&mut self, state: DeployState) {
        info!(from = ?self.state, to = ?state, "Deploy state transition");
        self.state = state;
    }
}

impl Orchestrator {
    /// Provisions role, function, gateway and subscription for one handler.
    ///
    /// Strictly sequential. Nothing is rolled back on failure: retrying the
    /// same name fails at the first resource that already exists.
    #[instrument(skip_all, fields(function = %request.name, run_id = tracing::field::Empty))]
    pub async fn deploy(&self, request: &DeployRequest) -> Result<Deployment, DeployError> {
        let run_id = DeploymentRunId::new_random();
        Span::current().record("run_id", tracing::field::display(run_id));

        let config = &self.config;
        let mut run = Run {
            state: DeployState::Init,
            partial: PartialDeployment::default(),
        };

        let ensured = self
            .identity
            .ensure_role(&config.role_name)
            .await
            .map_err(|e| run.fail(DeployStep::EnsureRole, e))?;
        run.partial.role = Some(ensured.role.name.clone());
        run.partial.role_created = ensured.created;
        run.advance(DeployState::RoleEnsured);

        let package = self
            .build_package(&request.handler)
            .await
            .map_err(|e| run.fail(DeployStep::BuildPackage, e))?;
        run.advance(DeployState::PackageBuilt);

        // A new role is not visible to the function host straight away.
        if ensured.created && !config.settle_delay.is_zero() {
            info!(delay = ?config.settle_delay, "Waiting for the new role to propagate");
            tokio::time::sleep(config.settle_delay).await;
        }

        let function_arn = self
            .functions
            .create(NewFunction {
                name: request.name.clone(),
                entry_point: config.entry_point.clone(),
                role: ensured.role.arn.clone(),
                runtime: config.runtime.clone(),
                package,
                layers: config.layers.clone(),
                environment: config.environment.clone(),
            })
            .await
            .map_err(|e| run.fail(DeployStep::CreateFunction, e))?;
        run.partial.function_name = Some(request.name.clone());
        run.partial.function_arn = Some(function_arn.clone());
        run.advance(DeployState::FunctionCreated);

        let gateway_id = match self
            .gateways
            .create(&NewGateway {
                name: request.name.to_string(),
                base_path: config.base_path.clone(),
                stage: config.stage.clone(),
                account_id: config.account_id.clone(),
                function: function_arn.clone(),
            })
            .await
        {
            Ok(id) => id,
            Err(e) => {
                run.partial.gateway_id = e.created;
                return Err(run.fail(DeployStep::CreateGateway, e.source));
            }
        };
        let url = self
            .gateways
            .url(&gateway_id, &config.stage, &config.base_path);
        run.partial.gateway_id = Some(gateway_id.clone());
        run.partial.url = Some(url.clone());
        run.advance(DeployState::GatewayCreated);

        let events = request
            .events
            .clone()
            .unwrap_or_else(|| config.default_events.clone());
        let subscription_id = self
            .subscriptions
            .create(&events, &url)
            .await
            .map_err(|e| run.fail(DeployStep::CreateSubscription, e))?;
        run.advance(DeployState::SubscriptionCreated);

        run.advance(DeployState::Done);
        info!(%url, gateway = %gateway_id, subscription = %subscription_id, "Deployment complete");
        Ok(Deployment {
            run_id,
            function_name: request.name.clone(),
            function_arn,
            role: ensured.role.name,
            role_created: ensured.created,
            gateway_id,
            url,
            subscription_id,
        })
    }
}
