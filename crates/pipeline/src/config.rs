//! Deploy configuration.
//!
//! All settings that would otherwise be read from the environment ad hoc
//! (role name, layers, API keys handed to the function, account and region)
//! are gathered here once, validated, and handed to the orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    AccountId, BasePath, ConfigError, EntryPoint, EnvVars, EventKinds, LayerArn, Marker, Region,
    RoleName, RuntimeTag, StageName,
};

/// Bounds for waiting on a newly created function to become invokable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// Delay between state polls.
    pub poll_interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Configuration for one orchestrator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Execution role assumed by every deployed function. Reused if present.
    pub role_name: RoleName,
    /// Entry point of the runtime skeleton inside the package.
    pub entry_point: EntryPoint,
    pub runtime: RuntimeTag,
    /// Layers attached to every function (e.g. the event-source SDK).
    pub layers: Vec<LayerArn>,
    /// Environment handed to every function.
    pub environment: EnvVars,
    pub account_id: AccountId,
    pub region: Region,
    /// Path segment the gateway's catch-all route is mounted at.
    pub base_path: BasePath,
    pub stage: StageName,
    pub marker: Marker,
    /// Wait inserted after creating a role before it is referenced.
    pub settle_delay: Duration,
    pub readiness: ReadinessPolicy,
    /// Event kinds used when a deploy request does not name any.
    pub default_events: EventKinds,
}

impl DeployConfig {
    /// Creates a configuration for `account_id` in `region` with the
    /// defaults for everything else.
    pub fn new(account_id: AccountId, region: Region) -> Self {
        Self {
            role_name: RoleName::from_static("hookwire-function-role"),
            entry_point: EntryPoint::from_static("lambda_handler_rest.lambda_handler"),
            runtime: RuntimeTag::from_static("python3.11"),
            layers: Vec::new(),
            environment: EnvVars::new(),
            account_id,
            region,
            base_path: BasePath::from_static("webhook"),
            stage: StageName::from_static("prod"),
            marker: Marker::default(),
            settle_delay: Duration::from_secs(5),
            readiness: ReadinessPolicy::default(),
            default_events: EventKinds::All,
        }
    }

    /// Checks the invariants provider calls rely on.
    ///
    /// Names need no check here: identifiers cannot be empty, even when
    /// deserialised.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_path.as_str().contains('/') {
            return Err(ConfigError::Invalid {
                field: "base_path",
                reason: "must be a single path segment".to_owned(),
            });
        }
        if self.marker.key.is_empty() {
            return Err(ConfigError::Missing("marker.key"));
        }
        if self.readiness.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "readiness.timeout",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.readiness.poll_interval > self.readiness.timeout {
            return Err(ConfigError::Invalid {
                field: "readiness.poll_interval",
                reason: "must not exceed the readiness timeout".to_owned(),
            });
        }
        if let Some(key) = self.environment.keys().find(|k| k.is_empty()) {
            return Err(ConfigError::Invalid {
                field: "environment",
                reason: format!("variable name {key:?} is empty"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DeployConfig {
        DeployConfig::new(
            AccountId::new("123456789012").unwrap(),
            Region::new("us-east-1").unwrap(),
        )
    }

    #[test]
    fn defaults_are_valid() {
        let config = config();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.stage.as_str(), "prod");
        assert_eq!(config.settle_delay, Duration::from_secs(5));
        assert_eq!(config.default_events, EventKinds::All);
    }

    #[test]
    fn empty_role_name_does_not_load() {
        let mut raw = serde_json::to_value(config()).unwrap();
        raw["role_name"] = serde_json::json!("");
        assert!(serde_json::from_value::<DeployConfig>(raw).is_err());
    }

    #[test]
    fn nested_base_path_is_rejected() {
        let mut config = config();
        config.base_path = BasePath::new("hooks/stripe").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "base_path",
                ..
            })
        ));
    }

    #[test]
    fn zero_readiness_timeout_is_rejected() {
        let mut config = config();
        config.readiness.timeout = Duration::ZERO;
        config.readiness.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
