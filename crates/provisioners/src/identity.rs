//! Identity provisioner: get-or-create of the function execution role.

use std::sync::Arc;

use pipeline::{IdentityStore, ProvisionError, ResourceKind, Role, RoleName, TrustPolicy};
use tracing::{info, instrument, warn};

/// Baseline policy attached to every role this tool creates: permission to
/// write logs, nothing else.
pub const BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

/// Result of [`IdentityProvisioner::ensure_role`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredRole {
    pub role: Role,
    /// `true` when this call created the role. The caller must then allow the
    /// identity store time to propagate it before referencing it.
    pub created: bool,
}

pub struct IdentityProvisioner {
    store: Arc<dyn IdentityStore>,
    trust_policy: TrustPolicy,
    policy_arn: String,
}

impl IdentityProvisioner {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            trust_policy: TrustPolicy::function_execution(),
            policy_arn: BASIC_EXECUTION_POLICY.to_owned(),
        }
    }

    /// Looks up a role. A missing role is `Ok(None)`; every other failure is
    /// an error.
    pub async fn lookup(&self, name: &RoleName) -> Result<Option<Role>, ProvisionError> {
        match self.store.get_role(name).await {
            Ok(role) => Ok(Some(role)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ProvisionError::from_provider(
                ResourceKind::Role,
                name,
                "lookup role",
                e,
            )),
        }
    }

    /// Returns the role named `name`, creating it if it does not exist.
    ///
    /// An existing role is reused as-is, whatever its policies. Losing a
    /// creation race to a concurrent caller counts as reuse.
    #[instrument(skip(self), fields(role = %name))]
    pub async fn ensure_role(&self, name: &RoleName) -> Result<EnsuredRole, ProvisionError> {
        if let Some(role) = self.lookup(name).await? {
            info!("Reusing existing role");
            return Ok(EnsuredRole {
                role,
                created: false,
            });
        }

        match self
            .store
            .create_role(name, &self.trust_policy, &self.policy_arn)
            .await
        {
            Ok(role) => {
                info!(arn = %role.arn, "Created role");
                Ok(EnsuredRole {
                    role,
                    created: true,
                })
            }
            Err(e) if e.is_already_exists() => {
                warn!("Role appeared concurrently; reusing it");
                let role = self.lookup(name).await?.ok_or(ProvisionError::NotFound {
                    resource: ResourceKind::Role,
                    id: name.to_string(),
                    operation: "ensure role",
                    source: None,
                })?;
                Ok(EnsuredRole {
                    role,
                    created: false,
                })
            }
            Err(e) => Err(ProvisionError::from_provider(
                ResourceKind::Role,
                name,
                "create role",
                e,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use pipeline::ProviderErrorKind;
    use sandbox::{SandboxCloud, SandboxOp};

    use super::*;

    fn name() -> RoleName {
        RoleName::new("R").unwrap()
    }

    #[tokio::test]
    async fn second_call_reuses_the_role() {
        let cloud = Arc::new(SandboxCloud::default());
        let provisioner = IdentityProvisioner::new(cloud.clone());

        let first = provisioner.ensure_role(&name()).await.unwrap();
        let second = provisioner.ensure_role(&name()).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.role.name, name());
        assert_eq!(second.role.name, name());
        assert_eq!(cloud.calls(SandboxOp::CreateRole), 1);
    }

    #[tokio::test]
    async fn created_role_carries_the_baseline_policy() {
        let cloud = Arc::new(SandboxCloud::default());
        let provisioner = IdentityProvisioner::new(cloud);

        let ensured = provisioner.ensure_role(&name()).await.unwrap();
        assert_eq!(ensured.role.attached_policies, [BASIC_EXECUTION_POLICY]);
    }

    #[tokio::test]
    async fn lost_creation_race_is_reuse() {
        let cloud = Arc::new(SandboxCloud::default());
        cloud.race_next_role_creation();
        let provisioner = IdentityProvisioner::new(cloud.clone());

        let ensured = provisioner.ensure_role(&name()).await.unwrap();
        assert!(!ensured.created);
        assert_eq!(ensured.role.name, name());
        assert_eq!(cloud.calls(SandboxOp::GetRole), 2);
    }

    #[tokio::test]
    async fn lookup_failures_other_than_not_found_propagate() {
        let cloud = Arc::new(SandboxCloud::default());
        cloud.inject_fault(SandboxOp::GetRole, ProviderErrorKind::AccessDenied);
        let provisioner = IdentityProvisioner::new(cloud.clone());

        let err = provisioner.ensure_role(&name()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Provider { .. }));
        assert_eq!(cloud.calls(SandboxOp::CreateRole), 0);
    }

    #[tokio::test]
    async fn create_failures_other_than_already_exists_are_fatal() {
        let cloud = Arc::new(SandboxCloud::default());
        cloud.inject_fault(SandboxOp::CreateRole, ProviderErrorKind::Throttled);
        let provisioner = IdentityProvisioner::new(cloud);

        let err = provisioner.ensure_role(&name()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Transient { .. }));
    }
}
