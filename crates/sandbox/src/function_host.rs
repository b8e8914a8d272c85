use async_trait::async_trait;
use pipeline::{
    DeploymentPackage, EnvVars, Function, FunctionArn, FunctionHost, FunctionName, FunctionSpec,
    FunctionState, Page, ProviderError, ProviderErrorKind, Timestamp,
};

use crate::world::{page_after, StoredFunction};
use crate::{SandboxCloud, SandboxOp};

impl SandboxCloud {
    pub(crate) fn function_arn(&self, name: &FunctionName) -> FunctionArn {
        let options = self.options();
        FunctionArn::new(format!(
            "arn:aws:lambda:{}:{}:function:{name}",
            options.region, options.account_id
        ))
        .unwrap_or_else(|| FunctionArn::from_static("arn:aws:lambda:function:unknown"))
    }

    fn function_not_found(op: SandboxOp, name: &str) -> ProviderError {
        op.error(
            ProviderErrorKind::NotFound,
            format!("Function not found: {name}"),
        )
    }
}

/// Starts a new activation cycle after a create or update.
fn restart_activation(stored: &mut StoredFunction, activation_reads: u32) {
    stored.record.last_modified = Timestamp::now();
    if activation_reads == 0 {
        stored.record.state = FunctionState::Active;
    } else {
        stored.record.state = FunctionState::Pending;
        stored.pending_reads = activation_reads;
    }
}

#[async_trait]
impl FunctionHost for SandboxCloud {
    async fn create_function(&self, spec: &FunctionSpec) -> Result<FunctionArn, ProviderError> {
        let op = SandboxOp::CreateFunction;
        self.enter(op)?;

        let mut world = self.world.write().await;
        if world.functions.contains_key(spec.name.as_str()) {
            return Err(op.error(
                ProviderErrorKind::AlreadyExists,
                format!("Function already exist: {}", spec.name),
            ));
        }
        let role_name = spec.role.as_str().rsplit('/').next().unwrap_or_default();
        if !world.roles.values().any(|r| r.arn == spec.role) || !self.role_is_propagated(role_name)
        {
            return Err(op.error(
                ProviderErrorKind::InvalidRequest,
                "The role defined for the function cannot be assumed by Lambda.",
            ));
        }
        if spec.package.is_empty() {
            return Err(op.error(
                ProviderErrorKind::InvalidRequest,
                "Uploaded file must be a non-empty zip",
            ));
        }

        let arn = self.function_arn(&spec.name);
        let mut stored = StoredFunction {
            record: Function {
                name: spec.name.clone(),
                arn: arn.clone(),
                entry_point: spec.entry_point.clone(),
                role: spec.role.clone(),
                runtime: spec.runtime.clone(),
                description: spec.description.clone(),
                environment: spec.environment.clone(),
                layers: spec.layers.clone(),
                state: FunctionState::Pending,
                last_modified: Timestamp::now(),
            },
            tags: spec.tags.clone(),
            code_size: spec.package.len(),
            pending_reads: 0,
            permissions: Vec::new(),
        };
        restart_activation(&mut stored, self.options().activation_reads);
        world.functions.insert(spec.name.to_string(), stored);
        tracing::debug!(function = %spec.name, "Sandbox function created");
        Ok(arn)
    }

    async fn update_function_code(
        &self,
        name: &FunctionName,
        package: &DeploymentPackage,
    ) -> Result<Function, ProviderError> {
        let op = SandboxOp::UpdateFunctionCode;
        self.enter(op)?;

        let mut world = self.world.write().await;
        let stored = world
            .functions
            .get_mut(name.as_str())
            .ok_or_else(|| Self::function_not_found(op, name.as_str()))?;
        stored.code_size = package.len();
        restart_activation(stored, self.options().activation_reads);
        Ok(stored.record.clone())
    }

    async fn update_function_configuration(
        &self,
        name: &FunctionName,
        environment: &EnvVars,
    ) -> Result<Function, ProviderError> {
        let op = SandboxOp::UpdateFunctionConfiguration;
        self.enter(op)?;

        let mut world = self.world.write().await;
        let stored = world
            .functions
            .get_mut(name.as_str())
            .ok_or_else(|| Self::function_not_found(op, name.as_str()))?;
        stored.record.environment = environment.clone();
        restart_activation(stored, self.options().activation_reads);
        Ok(stored.record.clone())
    }

    async fn get_function(&self, name: &FunctionName) -> Result<Function, ProviderError> {
        let op = SandboxOp::GetFunction;
        self.enter(op)?;

        let mut world = self.world.write().await;
        let stored = world
            .functions
            .get_mut(name.as_str())
            .ok_or_else(|| Self::function_not_found(op, name.as_str()))?;
        if stored.record.state == FunctionState::Pending {
            if stored.pending_reads == 0 {
                stored.record.state = FunctionState::Active;
            } else {
                stored.pending_reads -= 1;
            }
        }
        Ok(stored.record.clone())
    }

    async fn delete_function(&self, name: &FunctionName) -> Result<(), ProviderError> {
        let op = SandboxOp::DeleteFunction;
        self.enter(op)?;

        match self.world.write().await.functions.remove(name.as_str()) {
            Some(_) => Ok(()),
            None => Err(Self::function_not_found(op, name.as_str())),
        }
    }

    async fn list_functions(&self, cursor: Option<String>) -> Result<Page<Function>, ProviderError> {
        self.enter(SandboxOp::ListFunctions)?;

        let world = self.world.read().await;
        let (keys, next) = page_after(
            world.functions.keys().map(String::as_str),
            cursor.as_deref(),
            self.options().page_size,
        );
        let items = keys
            .into_iter()
            .filter_map(|k| world.functions.get(k))
            .map(|stored| stored.record.clone())
            .collect();
        Ok(Page { items, next })
    }
}
