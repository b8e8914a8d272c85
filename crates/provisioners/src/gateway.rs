//! Gateway provisioner: the public HTTP front door of a deployment.
//!
//! A gateway owns exactly one catch-all route under its base path. Every HTTP
//! verb on that route is proxied to one function, without caller
//! authentication at the gateway layer.

use std::sync::Arc;

use pipeline::{
    AccountId, Authorization, BasePath, FunctionArn, Gateway, GatewayHost, GatewayId,
    Integration, InvokePermission, Marker, Page, ProviderError, ProvisionError, RecordPredicate,
    Region, ResourceKind, StageName,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// HTTP method value meaning "every verb".
const ANY_METHOD: &str = "ANY";

/// Principal the gateway invokes functions as.
const GATEWAY_PRINCIPAL: &str = "apigateway.amazonaws.com";

/// The provider's naming convention for endpoints and resource identifiers.
///
/// Everything here is string formatting; nothing calls the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConvention {
    pub region: Region,
    /// DNS suffix of the provider's public endpoints.
    pub domain: String,
}

impl EndpointConvention {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            domain: "amazonaws.com".to_owned(),
        }
    }

    /// The externally reachable URL of a deployed gateway route.
    pub fn url(&self, gateway: &GatewayId, stage: &StageName, base_path: &BasePath) -> String {
        format!(
            "https://{gateway}.execute-api.{}.{}/{stage}/{base_path}",
            self.region, self.domain
        )
    }

    /// The URI a proxy integration uses to invoke `function`.
    pub fn integration_uri(&self, function: &FunctionArn) -> String {
        format!(
            "arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/{function}/invocations",
            self.region
        )
    }

    /// Restricts an invoke grant to requests arriving through `gateway`'s route.
    pub fn source_arn(
        &self,
        account: &AccountId,
        gateway: &GatewayId,
        base_path: &BasePath,
    ) -> String {
        format!(
            "arn:aws:execute-api:{}:{account}:{gateway}/*/*/{base_path}",
            self.region
        )
    }
}

/// Inputs for [`GatewayProvisioner::create`].
#[derive(Debug, Clone)]
pub struct NewGateway {
    pub name: String,
    pub base_path: BasePath,
    pub stage: StageName,
    pub account_id: AccountId,
    pub function: FunctionArn,
}

/// [`GatewayProvisioner::create`] failed.
///
/// `created` holds the gateway id when the gateway entity itself was created
/// before a later sub-step failed. Sub-resources are left in place.
#[derive(Debug, Error)]
#[error("gateway creation failed: {source}")]
pub struct GatewayCreateError {
    pub created: Option<GatewayId>,
    #[source]
    pub source: ProvisionError,
}

pub struct GatewayProvisioner {
    host: Arc<dyn GatewayHost>,
    marker: Marker,
    owned: RecordPredicate<Gateway>,
    endpoints: EndpointConvention,
}

impl GatewayProvisioner {
    pub fn new(host: Arc<dyn GatewayHost>, marker: Marker, endpoints: EndpointConvention) -> Self {
        let owned = marker.gateway_predicate();
        Self {
            host,
            marker,
            owned,
            endpoints,
        }
    }

    /// The public URL of a gateway route. Pure; never calls the provider.
    pub fn url(&self, gateway: &GatewayId, stage: &StageName, base_path: &BasePath) -> String {
        self.endpoints.url(gateway, stage, base_path)
    }

    /// Statement id of the invoke grant for `gateway`. Stable per gateway.
    pub fn statement_id(gateway: &GatewayId, base_path: &BasePath) -> String {
        format!("{base_path}-{gateway}-invoke")
    }

    /// Creates the gateway, its catch-all route, the proxy integration to
    /// `request.function`, a stage deployment, and the invoke grant.
    ///
    /// Runs as one unit: there is no per-step retry, and a failure leaves the
    /// already-created parts in place.
    #[instrument(skip_all, fields(gateway_name = %request.name, base_path = %request.base_path))]
    pub async fn create(&self, request: &NewGateway) -> Result<GatewayId, GatewayCreateError> {
        let gateway = self
            .host
            .create_api(&request.name, &self.marker.tags())
            .await
            .map_err(|e| GatewayCreateError {
                created: None,
                source: ProvisionError::from_provider(
                    ResourceKind::Gateway,
                    &request.name,
                    "create gateway",
                    e,
                ),
            })?;
        let id = gateway.id;
        debug!(gateway = %id, "Gateway entity created");

        self.wire(&id, request)
            .await
            .map_err(|source| GatewayCreateError {
                created: Some(id.clone()),
                source,
            })?;

        info!(gateway = %id, "Gateway deployed");
        Ok(id)
    }

    async fn wire(&self, id: &GatewayId, request: &NewGateway) -> Result<(), ProvisionError> {
        let step = |operation: &'static str| {
            move |e: ProviderError| {
                ProvisionError::from_provider(ResourceKind::Gateway, id, operation, e)
            }
        };

        let root = self
            .host
            .get_root_resource(id)
            .await
            .map_err(step("locate root route"))?;

        let route = self
            .host
            .create_resource(id, &root, request.base_path.as_str())
            .await
            .map_err(step("create route"))?;

        self.host
            .put_method(id, &route, ANY_METHOD, Authorization::None)
            .await
            .map_err(step("create catch-all method"))?;

        let integration = Integration {
            http_method: "POST".to_owned(),
            uri: self.endpoints.integration_uri(&request.function),
            proxy: true,
        };
        self.host
            .put_integration(id, &route, ANY_METHOD, &integration)
            .await
            .map_err(step("bind function"))?;

        self.host
            .create_deployment(id, &request.stage)
            .await
            .map_err(step("deploy stage"))?;

        let permission = InvokePermission {
            function: request.function.clone(),
            statement_id: Self::statement_id(id, &request.base_path),
            principal: GATEWAY_PRINCIPAL.to_owned(),
            action: "lambda:InvokeFunction".to_owned(),
            source_arn: self
                .endpoints
                .source_arn(&request.account_id, id, &request.base_path),
        };
        match self.host.add_invoke_permission(&permission).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_already_exists() => {
                warn!(statement_id = %permission.statement_id, "Invoke permission already granted");
                Ok(())
            }
            Err(e) => Err(step("grant invoke permission")(e)),
        }
    }

    /// Deletes a gateway together with its routes and deployments.
    #[instrument(skip(self), fields(gateway = %id))]
    pub async fn delete(&self, id: &GatewayId) -> Result<(), ProvisionError> {
        self.host.delete_api(id).await.map_err(|e| {
            ProvisionError::from_provider(ResourceKind::Gateway, id, "delete gateway", e)
        })?;
        info!("Gateway deleted");
        Ok(())
    }

    /// Lists every gateway carrying this tool's marker, across all pages.
    pub async fn list(&self) -> Result<Vec<Gateway>, ProvisionError> {
        let mut owned = Vec::new();
        let mut cursor = None;
        loop {
            let Page { items, next } = self.host.list_apis(cursor).await.map_err(|e| {
                ProvisionError::from_provider(ResourceKind::Gateway, "*", "list gateways", e)
            })?;
            owned.extend(items.into_iter().filter(|g| (self.owned)(g)));
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(count = owned.len(), "Listed owned gateways");
        Ok(owned)
    }
}
