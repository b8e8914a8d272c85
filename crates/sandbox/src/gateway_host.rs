use std::collections::BTreeMap;

use async_trait::async_trait;
use pipeline::{
    Authorization, Gateway, GatewayHost, GatewayId, Integration, InvokePermission, Page,
    ProviderError, ProviderErrorKind, RouteId, StageName, Tags, Timestamp,
};

use crate::world::{page_after, StoredGateway, StoredMethod, StoredRoute};
use crate::{random_id, SandboxCloud, SandboxOp};

fn api_not_found(op: SandboxOp, api: &GatewayId) -> ProviderError {
    op.error(
        ProviderErrorKind::NotFound,
        format!("Invalid API identifier specified {api}"),
    )
}

fn route_not_found(op: SandboxOp, route: &RouteId) -> ProviderError {
    op.error(
        ProviderErrorKind::NotFound,
        format!("Invalid Resource identifier specified {route}"),
    )
}

fn route_id(id: &str) -> Result<RouteId, ProviderError> {
    RouteId::new(id).ok_or_else(|| {
        ProviderError::new(ProviderErrorKind::Other, "GetResources", "route has an empty id")
    })
}

#[async_trait]
impl GatewayHost for SandboxCloud {
    async fn create_api(&self, name: &str, tags: &Tags) -> Result<Gateway, ProviderError> {
        let op = SandboxOp::CreateApi;
        self.enter(op)?;

        let mut world = self.world.write().await;
        if world.gateways.values().any(|g| g.record.name == name) {
            return Err(op.error(
                ProviderErrorKind::AlreadyExists,
                format!("A REST API named {name} already exists"),
            ));
        }

        let id = GatewayId::new(random_id(10))
            .ok_or_else(|| op.error(ProviderErrorKind::Other, "could not assign an id"))?;
        let record = Gateway {
            id: id.clone(),
            name: name.to_owned(),
            tags: tags.clone(),
            created_at: Timestamp::now(),
        };
        let root = StoredRoute {
            id: random_id(10),
            parent: None,
            path: "/".to_owned(),
            methods: BTreeMap::new(),
        };
        world.gateways.insert(
            id.to_string(),
            StoredGateway {
                record: record.clone(),
                routes: vec![root],
                stages: Vec::new(),
            },
        );
        tracing::debug!(gateway = %id, name, "Sandbox gateway created");
        Ok(record)
    }

    async fn get_root_resource(&self, api: &GatewayId) -> Result<RouteId, ProviderError> {
        let op = SandboxOp::GetRootResource;
        self.enter(op)?;

        let world = self.world.read().await;
        let gateway = world
            .gateways
            .get(api.as_str())
            .ok_or_else(|| api_not_found(op, api))?;
        let root = gateway
            .route_by_path("/")
            .ok_or_else(|| op.error(ProviderErrorKind::Other, "gateway has no root route"))?;
        route_id(&root.id)
    }

    async fn create_resource(
        &self,
        api: &GatewayId,
        parent: &RouteId,
        path_part: &str,
    ) -> Result<RouteId, ProviderError> {
        let op = SandboxOp::CreateResource;
        self.enter(op)?;

        if path_part.is_empty() || path_part.contains('/') {
            return Err(op.error(
                ProviderErrorKind::InvalidRequest,
                format!("invalid path part {path_part:?}"),
            ));
        }

        let mut world = self.world.write().await;
        let gateway = world
            .gateways
            .get_mut(api.as_str())
            .ok_or_else(|| api_not_found(op, api))?;
        let parent_path = gateway
            .route(parent.as_str())
            .map(|r| r.path.clone())
            .ok_or_else(|| route_not_found(op, parent))?;
        let path = if parent_path == "/" {
            format!("/{path_part}")
        } else {
            format!("{parent_path}/{path_part}")
        };
        if gateway.route_by_path(&path).is_some() {
            return Err(op.error(
                ProviderErrorKind::AlreadyExists,
                format!("Another resource with the same parent already has this name: {path_part}"),
            ));
        }

        let id = random_id(6);
        gateway.routes.push(StoredRoute {
            id: id.clone(),
            parent: Some(parent.to_string()),
            path,
            methods: BTreeMap::new(),
        });
        route_id(&id)
    }

    async fn put_method(
        &self,
        api: &GatewayId,
        resource: &RouteId,
        http_method: &str,
        authorization: Authorization,
    ) -> Result<(), ProviderError> {
        let op = SandboxOp::PutMethod;
        self.enter(op)?;

        let mut world = self.world.write().await;
        let route = world
            .gateways
            .get_mut(api.as_str())
            .ok_or_else(|| api_not_found(op, api))?
            .route_mut(resource.as_str())
            .ok_or_else(|| route_not_found(op, resource))?;
        if route.methods.contains_key(http_method) {
            return Err(op.error(
                ProviderErrorKind::AlreadyExists,
                format!("Method already exists for this resource: {http_method}"),
            ));
        }
        route.methods.insert(
            http_method.to_owned(),
            StoredMethod {
                authorization,
                integration: None,
            },
        );
        Ok(())
    }

    async fn put_integration(
        &self,
        api: &GatewayId,
        resource: &RouteId,
        http_method: &str,
        integration: &Integration,
    ) -> Result<(), ProviderError> {
        let op = SandboxOp::PutIntegration;
        self.enter(op)?;

        let mut world = self.world.write().await;
        let method = world
            .gateways
            .get_mut(api.as_str())
            .ok_or_else(|| api_not_found(op, api))?
            .route_mut(resource.as_str())
            .ok_or_else(|| route_not_found(op, resource))?
            .methods
            .get_mut(http_method)
            .ok_or_else(|| {
                op.error(
                    ProviderErrorKind::NotFound,
                    format!("Invalid Method identifier specified {http_method}"),
                )
            })?;
        method.integration = Some(integration.clone());
        Ok(())
    }

    async fn create_deployment(
        &self,
        api: &GatewayId,
        stage: &StageName,
    ) -> Result<(), ProviderError> {
        let op = SandboxOp::CreateDeployment;
        self.enter(op)?;

        let mut world = self.world.write().await;
        let gateway = world
            .gateways
            .get_mut(api.as_str())
            .ok_or_else(|| api_not_found(op, api))?;
        if !gateway.has_integrated_method() {
            return Err(op.error(
                ProviderErrorKind::InvalidRequest,
                "The REST API doesn't contain any methods",
            ));
        }
        if !gateway.stages.contains(stage) {
            gateway.stages.push(stage.clone());
        }
        Ok(())
    }

    async fn add_invoke_permission(
        &self,
        permission: &InvokePermission,
    ) -> Result<(), ProviderError> {
        let op = SandboxOp::AddInvokePermission;
        self.enter(op)?;

        let mut world = self.world.write().await;
        let function = world
            .functions
            .values_mut()
            .find(|f| f.record.arn == permission.function)
            .ok_or_else(|| {
                op.error(
                    ProviderErrorKind::NotFound,
                    format!("Function not found: {}", permission.function),
                )
            })?;
        if function
            .permissions
            .iter()
            .any(|p| p.statement_id == permission.statement_id)
        {
            return Err(op.error(
                ProviderErrorKind::AlreadyExists,
                format!(
                    "The statement id ({}) provided already exists.",
                    permission.statement_id
                ),
            ));
        }
        function.permissions.push(permission.clone());
        Ok(())
    }

    async fn delete_api(&self, api: &GatewayId) -> Result<(), ProviderError> {
        let op = SandboxOp::DeleteApi;
        self.enter(op)?;

        match self.world.write().await.gateways.remove(api.as_str()) {
            Some(_) => Ok(()),
            None => Err(api_not_found(op, api)),
        }
    }

    async fn list_apis(&self, cursor: Option<String>) -> Result<Page<Gateway>, ProviderError> {
        self.enter(SandboxOp::ListApis)?;

        let world = self.world.read().await;
        let (keys, next) = page_after(
            world.gateways.keys().map(String::as_str),
            cursor.as_deref(),
            self.options().page_size,
        );
        let items = keys
            .into_iter()
            .filter_map(|k| world.gateways.get(k))
            .map(|stored| stored.record.clone())
            .collect();
        Ok(Page { items, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> Integration {
        Integration {
            http_method: "POST".to_owned(),
            uri: "arn:backend".to_owned(),
            proxy: true,
        }
    }

    #[tokio::test]
    async fn routes_hang_off_the_root() {
        let cloud = SandboxCloud::default();
        let api = cloud.create_api("demo", &Tags::new()).await.unwrap();
        let root = cloud.get_root_resource(&api.id).await.unwrap();
        let route = cloud.create_resource(&api.id, &root, "webhook").await.unwrap();

        let world = cloud.snapshot().await;
        let stored = &world.gateways[api.id.as_str()];
        assert_eq!(stored.route(route.as_str()).unwrap().path, "/webhook");
        assert_eq!(api.id.as_str().len(), 10);
    }

    #[tokio::test]
    async fn deployment_requires_an_integrated_method() {
        let cloud = SandboxCloud::default();
        let api = cloud.create_api("demo", &Tags::new()).await.unwrap();
        let stage = StageName::new("prod").unwrap();

        let err = cloud.create_deployment(&api.id, &stage).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);

        let root = cloud.get_root_resource(&api.id).await.unwrap();
        cloud
            .put_method(&api.id, &root, "ANY", Authorization::None)
            .await
            .unwrap();
        cloud
            .put_integration(&api.id, &root, "ANY", &proxy())
            .await
            .unwrap();
        cloud.create_deployment(&api.id, &stage).await.unwrap();

        let world = cloud.snapshot().await;
        assert_eq!(world.gateways[api.id.as_str()].stages, [stage]);
    }

    #[tokio::test]
    async fn integration_needs_an_existing_method() {
        let cloud = SandboxCloud::default();
        let api = cloud.create_api("demo", &Tags::new()).await.unwrap();
        let root = cloud.get_root_resource(&api.id).await.unwrap();

        let err = cloud
            .put_integration(&api.id, &root, "ANY", &proxy())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn gateway_names_are_unique() {
        let cloud = SandboxCloud::default();
        cloud.create_api("demo", &Tags::new()).await.unwrap();
        let err = cloud.create_api("demo", &Tags::new()).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn delete_cascades_and_second_delete_is_not_found() {
        let cloud = SandboxCloud::default();
        let api = cloud.create_api("demo", &Tags::new()).await.unwrap();
        let root = cloud.get_root_resource(&api.id).await.unwrap();
        cloud.create_resource(&api.id, &root, "webhook").await.unwrap();

        cloud.delete_api(&api.id).await.unwrap();
        assert!(cloud.snapshot().await.gateways.is_empty());
        assert!(cloud.delete_api(&api.id).await.unwrap_err().is_not_found());
    }
}
