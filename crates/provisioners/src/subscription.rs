//! Subscription provisioner: registers the gateway URL with the event source.

use std::sync::Arc;

use pipeline::{
    EventKinds, EventSource, Marker, Page, ProvisionError, RecordPredicate, ResourceKind,
    Subscription, SubscriptionId,
};
use tracing::{debug, info, instrument};

pub struct SubscriptionProvisioner {
    source: Arc<dyn EventSource>,
    marker: Marker,
    owned: RecordPredicate<Subscription>,
}

impl SubscriptionProvisioner {
    pub fn new(source: Arc<dyn EventSource>, marker: Marker) -> Self {
        let owned = marker.subscription_predicate();
        Self {
            source,
            marker,
            owned,
        }
    }

    /// Registers `url` to receive `events`. The subscription carries this
    /// tool's marker as metadata.
    #[instrument(skip(self, events), fields(events = %events))]
    pub async fn create(
        &self,
        events: &EventKinds,
        url: &str,
    ) -> Result<SubscriptionId, ProvisionError> {
        let subscription = self
            .source
            .create_subscription(events, url, &self.marker.tags())
            .await
            .map_err(|e| {
                ProvisionError::from_provider(
                    ResourceKind::Subscription,
                    url,
                    "create subscription",
                    e,
                )
            })?;
        info!(subscription = %subscription.id, "Subscription created");
        Ok(subscription.id)
    }

    #[instrument(skip(self), fields(subscription = %id))]
    pub async fn delete(&self, id: &SubscriptionId) -> Result<(), ProvisionError> {
        self.source.delete_subscription(id).await.map_err(|e| {
            ProvisionError::from_provider(ResourceKind::Subscription, id, "delete subscription", e)
        })?;
        info!("Subscription deleted");
        Ok(())
    }

    /// Lists every subscription carrying this tool's marker, across all pages.
    pub async fn list(&self) -> Result<Vec<Subscription>, ProvisionError> {
        let mut owned = Vec::new();
        let mut cursor = None;
        loop {
            let Page { items, next } =
                self.source.list_subscriptions(cursor).await.map_err(|e| {
                    ProvisionError::from_provider(
                        ResourceKind::Subscription,
                        "*",
                        "list subscriptions",
                        e,
                    )
                })?;
            owned.extend(items.into_iter().filter(|s| (self.owned)(s)));
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(count = owned.len(), "Listed owned subscriptions");
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use pipeline::{ProviderErrorKind, Tags};
    use sandbox::{SandboxCloud, SandboxOp, SandboxOptions};

    use super::*;

    const URL: &str = "https://abc.execute-api.us-east-1.amazonaws.com/prod/webhook";

    #[tokio::test]
    async fn created_subscription_carries_the_marker() {
        let cloud = Arc::new(SandboxCloud::default());
        let provisioner = SubscriptionProvisioner::new(cloud.clone(), Marker::default());

        let events = EventKinds::parse(["charge.succeeded"]).unwrap();
        let id = provisioner.create(&events, URL).await.unwrap();

        let world = cloud.snapshot().await;
        let stored = world.subscriptions.iter().find(|s| s.id == id).unwrap();
        assert_eq!(stored.url, URL);
        assert_eq!(stored.enabled_events, events);
        assert_eq!(stored.metadata, Marker::default().tags());
        assert!(id.as_str().starts_with("we_"));
    }

    #[tokio::test]
    async fn list_skips_foreign_subscriptions_across_pages() {
        let cloud = Arc::new(SandboxCloud::new(SandboxOptions {
            page_size: 1,
            ..SandboxOptions::default()
        }));
        let provisioner = SubscriptionProvisioner::new(cloud.clone(), Marker::default());
        cloud
            .create_subscription(&EventKinds::All, "https://other.example/hook", &Tags::new())
            .await
            .unwrap();
        let mine = provisioner.create(&EventKinds::All, URL).await.unwrap();
        cloud
            .create_subscription(
                &EventKinds::All,
                "https://other.example/hook2",
                &Tags::from([("hookwire".to_owned(), "false".to_owned())]),
            )
            .await
            .unwrap();

        let listed = provisioner.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, mine);
        assert_eq!(cloud.calls(SandboxOp::ListSubscriptions), 3);
    }

    #[tokio::test]
    async fn rejected_create_is_a_provider_error() {
        let cloud = Arc::new(SandboxCloud::default());
        cloud.inject_fault(SandboxOp::CreateSubscription, ProviderErrorKind::InvalidRequest);
        let provisioner = SubscriptionProvisioner::new(cloud, Marker::default());

        let err = provisioner.create(&EventKinds::All, URL).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Provider { .. }));
    }

    #[tokio::test]
    async fn delete_surfaces_not_found() {
        let cloud = Arc::new(SandboxCloud::default());
        let provisioner = SubscriptionProvisioner::new(cloud, Marker::default());
        let err = provisioner
            .delete(&SubscriptionId::new("we_missing").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
