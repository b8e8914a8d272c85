//! Newtype identifiers for provisioned resources.
//!
//! Every name or provider-assigned identifier handled by the provisioners is a
//! distinct newtype wrapping a `String`. This prevents accidentally passing a
//! [`GatewayId`] where a [`FunctionName`] is expected even though both are
//! plain strings on the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// An identifier was given an empty value, e.g. while deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0} must not be empty")]
pub struct EmptyIdentifier(pub &'static str);

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, from_static(), as_str(),
// Display, AsRef<str>, and serde conversions that go through new().
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Creates an identifier from a non-empty string literal.
            ///
            /// Intended for compile-time constants; empty literals are a bug.
            pub fn from_static(value: &'static str) -> Self {
                debug_assert!(!value.is_empty());
                Self(value.to_owned())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = EmptyIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(EmptyIdentifier(stringify!($name)))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single deploy invocation.
///
/// Generated fresh for every call to the orchestrator's deploy workflow and
/// recorded on its span so all provider calls of one run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentRunId(Uuid);

impl DeploymentRunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for DeploymentRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers — caller-chosen names
// ---------------------------------------------------------------------------

string_id! {
    /// Name of an execution role in the identity store.
    ///
    /// Roles are looked up by name and reused across deployments.
    RoleName
}

string_id! {
    /// Name of a compute function. Unique per account and used as its lookup key.
    FunctionName
}

string_id! {
    /// Deployment stage a gateway is published under (e.g. `"prod"`).
    StageName
}

string_id! {
    /// Single path segment the gateway's catch-all route is mounted at.
    BasePath
}

string_id! {
    /// Handler entry point inside the deployment package
    /// (e.g. `"lambda_handler_rest.lambda_handler"`).
    EntryPoint
}

string_id! {
    /// Runtime tag the function host executes the package with (e.g. `"python3.11"`).
    RuntimeTag
}

// ---------------------------------------------------------------------------
// Identifiers — provider-assigned
// ---------------------------------------------------------------------------

string_id! {
    /// Provider resource identifier of a role.
    RoleArn
}

string_id! {
    /// Provider resource identifier of a function.
    FunctionArn
}

string_id! {
    /// Identifier of a layer/extension attached to a function.
    LayerArn
}

string_id! {
    /// Identifier the gateway host assigned to a gateway. Never chosen by the caller.
    GatewayId
}

string_id! {
    /// Identifier of a route (resource) inside a gateway.
    RouteId
}

string_id! {
    /// Identifier the event source assigned to a webhook subscription.
    SubscriptionId
}

// ---------------------------------------------------------------------------
// Identifiers — account scope
// ---------------------------------------------------------------------------

string_id! {
    /// Account that owns every provisioned resource.
    AccountId
}

string_id! {
    /// Provider region the gateway and function live in (e.g. `"us-east-1"`).
    Region
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(FunctionName::new("").is_none());
        assert!(GatewayId::new(String::new()).is_none());
    }

    #[test]
    fn identifiers_serialise_as_plain_strings() {
        let name = FunctionName::new("demo").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"demo\"");
        let back: FunctionName = serde_json::from_str("\"demo\"").unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn empty_strings_do_not_deserialise() {
        let err = serde_json::from_str::<FunctionName>("\"\"").unwrap_err();
        assert!(err.to_string().contains("FunctionName must not be empty"));
        assert!(serde_json::from_str::<SubscriptionId>("\"\"").is_err());
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(DeploymentRunId::new_random(), DeploymentRunId::new_random());
    }
}
