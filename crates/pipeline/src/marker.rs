//! Ownership marker.
//!
//! Every resource this tool creates carries a fixed marker so that listing and
//! bulk deletion never touch unrelated resources sharing the same account.
//! How the marker is encoded differs per provider record (description text for
//! functions, tags for gateways, metadata for subscriptions); callers only see
//! the [`RecordPredicate`] built from it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Function, Gateway, Subscription, Tags};

/// Predicate over raw provider records deciding whether a record belongs to
/// this tool.
pub type RecordPredicate<R> = Arc<dyn Fn(&R) -> bool + Send + Sync>;

/// A single key/value pair identifying resources owned by this tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub key: String,
    pub value: String,
}

impl Default for Marker {
    fn default() -> Self {
        Self {
            key: "hookwire".to_owned(),
            value: "true".to_owned(),
        }
    }
}

impl Marker {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The marker as a tag/metadata map.
    pub fn tags(&self) -> Tags {
        Tags::from([(self.key.clone(), self.value.clone())])
    }

    /// The marker encoded as a description string.
    ///
    /// The function host does not return tags from its list call, so functions
    /// are recognised by an exact description match instead.
    pub fn description(&self) -> String {
        serde_json::to_string(&self.tags()).unwrap_or_default()
    }

    /// Returns `true` if `tags` carries this marker.
    pub fn is_carried_by(&self, tags: &Tags) -> bool {
        tags.get(&self.key) == Some(&self.value)
    }

    /// Matches functions whose description is exactly this marker's encoding.
    pub fn function_predicate(&self) -> RecordPredicate<Function> {
        let description = self.description();
        Arc::new(move |function: &Function| function.description == description)
    }

    /// Matches gateways tagged with this marker.
    pub fn gateway_predicate(&self) -> RecordPredicate<Gateway> {
        let marker = self.clone();
        Arc::new(move |gateway: &Gateway| marker.is_carried_by(&gateway.tags))
    }

    /// Matches subscriptions whose metadata is exactly this marker.
    pub fn subscription_predicate(&self) -> RecordPredicate<Subscription> {
        let tags = self.tags();
        Arc::new(move |subscription: &Subscription| subscription.metadata == tags)
    }
}
