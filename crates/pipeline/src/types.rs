//! Shared value types for the provisioning domain.
//!
//! These are the records exchanged between the provisioners and the provider
//! ports: what a role, function, gateway, or subscription looks like once the
//! provider has it, plus the inputs needed to create one.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    EntryPoint, FunctionArn, FunctionName, GatewayId, LayerArn, RoleArn, RoleName, RuntimeTag,
    SubscriptionId,
};

/// Environment variables handed to a function at execution time.
pub type EnvVars = BTreeMap<String, String>;

/// Free-form key/value tags or metadata attached to a provider record.
pub type Tags = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Resource kinds
// ---------------------------------------------------------------------------

/// The kinds of resource this tool provisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Role,
    Function,
    Gateway,
    Subscription,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Role => "role",
            Self::Function => "function",
            Self::Gateway => "gateway",
            Self::Subscription => "subscription",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Trust policy attached to an execution role at creation time.
///
/// Only the function-execution principal may assume roles created by this tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustPolicy {
    /// Service principal allowed to assume the role.
    pub service_principal: String,
}

impl TrustPolicy {
    /// Trust policy permitting only the function-execution service.
    pub fn function_execution() -> Self {
        Self {
            service_principal: "lambda.amazonaws.com".to_owned(),
        }
    }

    /// Renders the policy as the JSON document the identity store expects.
    pub fn document(&self) -> String {
        serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": self.service_principal },
                "Action": "sts:AssumeRole",
            }],
        })
        .to_string()
    }
}

/// An execution role as recorded by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: RoleName,
    pub arn: RoleArn,
    /// Rendered trust policy document, as returned by the identity store.
    pub assume_role_policy: String,
    /// Permission policies attached to the role.
    pub attached_policies: Vec<String>,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Function
// ---------------------------------------------------------------------------

/// An immutable deployment archive.
///
/// Built fresh for each deploy call and consumed once by the function host.
/// Cloning shares the underlying bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct DeploymentPackage(Arc<[u8]>);

impl DeploymentPackage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for DeploymentPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentPackage")
            .field("len", &self.0.len())
            .finish()
    }
}

/// Lifecycle state reported by the function host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionState {
    /// Created but not yet invokable.
    Pending,
    /// Invokable.
    Active,
    /// Idle long enough that the host reclaimed it; still valid.
    Inactive,
    /// Creation or update failed; the function cannot be invoked.
    Failed,
}

/// Everything the function host needs to create a function.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: FunctionName,
    pub entry_point: EntryPoint,
    pub role: RoleArn,
    pub runtime: RuntimeTag,
    pub package: DeploymentPackage,
    pub layers: Vec<LayerArn>,
    pub environment: EnvVars,
    /// Free-text description. Carries the ownership marker because the host
    /// does not return tags from its list call.
    pub description: String,
    pub tags: Tags,
}

/// A function as recorded by the function host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: FunctionName,
    pub arn: FunctionArn,
    pub entry_point: EntryPoint,
    pub role: RoleArn,
    pub runtime: RuntimeTag,
    pub description: String,
    pub environment: EnvVars,
    pub layers: Vec<LayerArn>,
    pub state: FunctionState,
    pub last_modified: Timestamp,
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// A gateway as recorded by the gateway host.
///
/// The public URL is deliberately absent: it is derived from the id, stage and
/// base path whenever it is needed and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub id: GatewayId,
    pub name: String,
    pub tags: Tags,
    pub created_at: Timestamp,
}

/// Caller authorization required by a gateway method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authorization {
    /// No caller authentication at the gateway layer.
    None,
}

impl Authorization {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
        }
    }
}

/// How a gateway method forwards requests to its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Integration {
    /// HTTP method used towards the backend (always `POST` for proxy mode).
    pub http_method: String,
    /// Backend invocation URI.
    pub uri: String,
    /// Whether the whole request is passed through unchanged.
    pub proxy: bool,
}

/// Resource policy statement allowing a gateway to invoke a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokePermission {
    pub function: FunctionArn,
    /// Stable per gateway so a re-grant collides instead of duplicating.
    pub statement_id: String,
    pub principal: String,
    pub action: String,
    pub source_arn: String,
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// The set of event types a subscription is enabled for.
///
/// Either every event (except those the source requires explicit opt-in for),
/// or a non-empty ordered list of distinct event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub enum EventKinds {
    All,
    Only(Vec<String>),
}

impl EventKinds {
    /// Wire value of the wildcard.
    pub const WILDCARD: &'static str = "*";

    /// Builds an event set from raw event-type strings.
    ///
    /// Duplicates are dropped keeping first occurrence order. A lone `"*"`
    /// selects every event; mixing `"*"` with explicit types is rejected.
    pub fn parse<I, S>(kinds: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut distinct: Vec<String> = Vec::new();
        for kind in kinds {
            let kind = kind.into();
            let kind = kind.trim();
            if kind.is_empty() {
                return Err("event type must not be empty".to_owned());
            }
            if !distinct.iter().any(|k| k == kind) {
                distinct.push(kind.to_owned());
            }
        }

        match distinct.as_slice() {
            [] => Err("at least one event type is required".to_owned()),
            [only] if only == Self::WILDCARD => Ok(Self::All),
            kinds if kinds.iter().any(|k| k == Self::WILDCARD) => {
                Err("the wildcard cannot be combined with explicit event types".to_owned())
            }
            _ => Ok(Self::Only(distinct)),
        }
    }

    /// Returns the event types as sent to the event source.
    pub fn to_wire(&self) -> Vec<String> {
        match self {
            Self::All => vec![Self::WILDCARD.to_owned()],
            Self::Only(kinds) => kinds.clone(),
        }
    }
}

impl From<EventKinds> for Vec<String> {
    fn from(kinds: EventKinds) -> Self {
        kinds.to_wire()
    }
}

impl TryFrom<Vec<String>> for EventKinds {
    type Error = String;

    fn try_from(kinds: Vec<String>) -> Result<Self, Self::Error> {
        Self::parse(kinds)
    }
}

impl std::fmt::Display for EventKinds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_wire().join(","))
    }
}

/// A webhook subscription as recorded by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// Delivery target; always a deployed gateway's public URL.
    pub url: String,
    pub enabled_events: EventKinds,
    pub metadata: Tags,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// One page of a provider list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque cursor for the next page; `None` on the last page.
    pub next: Option<String>,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
