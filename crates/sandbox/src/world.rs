//! Simulated account state and its JSON snapshot format.

use std::collections::BTreeMap;
use std::path::Path;

use pipeline::{
    Authorization, Function, Gateway, Integration, InvokePermission, Role, StageName,
    Subscription, Tags,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reading or writing a sandbox snapshot file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
}

/// A function plus the host-side state that never leaves the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFunction {
    pub record: Function,
    pub tags: Tags,
    /// Size of the most recently uploaded package.
    pub code_size: usize,
    /// How many more reads report `Pending` before the function turns active.
    pub pending_reads: u32,
    /// Resource policy statements granting invoke access.
    pub permissions: Vec<InvokePermission>,
}

/// One HTTP method configured on a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMethod {
    pub authorization: Authorization,
    pub integration: Option<Integration>,
}

/// A route (resource) inside a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRoute {
    pub id: String,
    pub parent: Option<String>,
    /// Full path from the root, e.g. `/webhook`.
    pub path: String,
    pub methods: BTreeMap<String, StoredMethod>,
}

/// A gateway with its routes and published stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGateway {
    pub record: Gateway,
    pub routes: Vec<StoredRoute>,
    pub stages: Vec<StageName>,
}

impl StoredGateway {
    pub fn route(&self, id: &str) -> Option<&StoredRoute> {
        self.routes.iter().find(|r| r.id == id)
    }

    pub fn route_by_path(&self, path: &str) -> Option<&StoredRoute> {
        self.routes.iter().find(|r| r.path == path)
    }

    pub(crate) fn route_mut(&mut self, id: &str) -> Option<&mut StoredRoute> {
        self.routes.iter_mut().find(|r| r.id == id)
    }

    pub(crate) fn has_integrated_method(&self) -> bool {
        self.routes
            .iter()
            .flat_map(|r| r.methods.values())
            .any(|m| m.integration.is_some())
    }
}

/// Everything the simulated account holds.
///
/// Maps are keyed by name or id so listing order is deterministic.
/// Subscriptions keep creation order, like the event source's own listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    pub roles: BTreeMap<String, Role>,
    pub functions: BTreeMap<String, StoredFunction>,
    pub gateways: BTreeMap<String, StoredGateway>,
    pub subscriptions: Vec<Subscription>,
}

impl World {
    /// Reads a snapshot, returning an empty world when the file does not exist.
    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes a pretty-printed snapshot, replacing any existing file.
    pub async fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

/// Returns the next page of `keys` (already in listing order) after `cursor`.
///
/// The cursor is `"{position}:{key}"` for the last item of the previous page.
/// When that key has since been removed, listing resumes at its old position,
/// which is where the following items moved to.
pub(crate) fn page_after<'a, I>(keys: I, cursor: Option<&str>, page_size: usize) -> (Vec<&'a str>, Option<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keys: Vec<&str> = keys.into_iter().collect();
    let start = match cursor.and_then(|c| c.split_once(':')) {
        None => 0,
        Some((position, key)) => match keys.iter().position(|k| *k == key) {
            Some(index) => index + 1,
            None => position.parse::<usize>().unwrap_or(keys.len()),
        },
    };
    keys.drain(..start.min(keys.len()));

    let page_size = page_size.max(1);
    let next = if keys.len() > page_size {
        keys.truncate(page_size);
        keys.last().map(|k| format!("{}:{k}", start + page_size - 1))
    } else {
        None
    };
    (keys, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_resume_after_the_cursor() {
        let keys = ["a", "b", "c", "d", "e"];

        let (first, next) = page_after(keys, None, 2);
        assert_eq!(first, ["a", "b"]);
        assert_eq!(next.as_deref(), Some("1:b"));

        let (second, next) = page_after(keys, next.as_deref(), 2);
        assert_eq!(second, ["c", "d"]);

        let (third, next) = page_after(keys, next.as_deref(), 2);
        assert_eq!(third, ["e"]);
        assert_eq!(next, None);
    }

    #[test]
    fn exact_multiple_of_page_size_ends_without_cursor() {
        let (page, next) = page_after(["a", "b"], None, 2);
        assert_eq!(page, ["a", "b"]);
        assert_eq!(next, None);
    }

    #[test]
    fn removed_cursor_resumes_by_position() {
        // Creation order, not sorted: "zz" sorts after everything left.
        let before = ["m", "zz", "b", "q"];
        let (first, next) = page_after(before, None, 2);
        assert_eq!(first, ["m", "zz"]);

        let after = ["m", "b", "q"];
        let (second, next) = page_after(after, next.as_deref(), 2);
        assert_eq!(second, ["b", "q"]);
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn missing_snapshot_loads_as_empty_world() {
        let dir = tempfile::tempdir().unwrap();
        let world = World::load(&dir.path().join("absent.json")).await.unwrap();
        assert_eq!(world, World::default());
    }
}
