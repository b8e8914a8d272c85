use async_trait::async_trait;
use pipeline::{
    IdentityStore, ProviderError, ProviderErrorKind, Role, RoleArn, RoleName, Timestamp,
    TrustPolicy,
};

use crate::{SandboxCloud, SandboxOp};

impl SandboxCloud {
    fn role_arn(&self, name: &RoleName) -> RoleArn {
        RoleArn::new(format!(
            "arn:aws:iam::{}:role/{name}",
            self.options().account_id
        ))
        .unwrap_or_else(|| RoleArn::from_static("arn:aws:iam::role/unknown"))
    }

    fn new_role(&self, name: &RoleName, trust_policy: &TrustPolicy, policy_arn: &str) -> Role {
        Role {
            name: name.clone(),
            arn: self.role_arn(name),
            assume_role_policy: trust_policy.document(),
            attached_policies: vec![policy_arn.to_owned()],
            created_at: Timestamp::now(),
        }
    }
}

#[async_trait]
impl IdentityStore for SandboxCloud {
    async fn get_role(&self, name: &RoleName) -> Result<Role, ProviderError> {
        let op = SandboxOp::GetRole;
        self.enter(op)?;
        self.world
            .read()
            .await
            .roles
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| {
                op.error(
                    ProviderErrorKind::NotFound,
                    format!("The role with name {name} cannot be found."),
                )
            })
    }

    async fn create_role(
        &self,
        name: &RoleName,
        trust_policy: &TrustPolicy,
        policy_arn: &str,
    ) -> Result<Role, ProviderError> {
        let op = SandboxOp::CreateRole;
        self.enter(op)?;

        let mut world = self.world.write().await;
        if self.take_role_race() {
            world
                .roles
                .insert(name.to_string(), self.new_role(name, trust_policy, policy_arn));
            self.mark_role_created(name.as_str());
        }
        if world.roles.contains_key(name.as_str()) {
            return Err(op.error(
                ProviderErrorKind::AlreadyExists,
                format!("Role with name {name} already exists."),
            ));
        }
        if trust_policy.service_principal.is_empty() {
            return Err(op.error(
                ProviderErrorKind::InvalidRequest,
                "trust policy names no principal",
            ));
        }

        let role = self.new_role(name, trust_policy, policy_arn);
        world.roles.insert(name.to_string(), role.clone());
        self.mark_role_created(name.as_str());
        tracing::debug!(role = %name, "Sandbox role created");
        Ok(role)
    }
}
