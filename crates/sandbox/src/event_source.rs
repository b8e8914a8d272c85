use async_trait::async_trait;
use pipeline::{
    EventKinds, EventSource, Page, ProviderError, ProviderErrorKind, Subscription, SubscriptionId,
    Tags,
};

use crate::world::page_after;
use crate::{random_id, SandboxCloud, SandboxOp};

#[async_trait]
impl EventSource for SandboxCloud {
    async fn create_subscription(
        &self,
        events: &EventKinds,
        url: &str,
        metadata: &Tags,
    ) -> Result<Subscription, ProviderError> {
        let op = SandboxOp::CreateSubscription;
        self.enter(op)?;

        if !url.starts_with("https://") {
            return Err(op.error(
                ProviderErrorKind::InvalidRequest,
                format!("Invalid URL: {url}. URLs must use https"),
            ));
        }

        let id = SubscriptionId::new(format!("we_{}", random_id(24)))
            .ok_or_else(|| op.error(ProviderErrorKind::Other, "could not assign an id"))?;
        let subscription = Subscription {
            id,
            url: url.to_owned(),
            enabled_events: events.clone(),
            metadata: metadata.clone(),
        };
        self.world
            .write()
            .await
            .subscriptions
            .push(subscription.clone());
        tracing::debug!(subscription = %subscription.id, url, "Sandbox subscription created");
        Ok(subscription)
    }

    async fn delete_subscription(&self, id: &SubscriptionId) -> Result<(), ProviderError> {
        let op = SandboxOp::DeleteSubscription;
        self.enter(op)?;

        let mut world = self.world.write().await;
        let before = world.subscriptions.len();
        world.subscriptions.retain(|s| &s.id != id);
        if world.subscriptions.len() == before {
            return Err(op.error(
                ProviderErrorKind::NotFound,
                format!("No such webhook endpoint: '{id}'"),
            ));
        }
        Ok(())
    }

    async fn list_subscriptions(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Subscription>, ProviderError> {
        self.enter(SandboxOp::ListSubscriptions)?;

        let world = self.world.read().await;
        let (ids, next) = page_after(
            world.subscriptions.iter().map(|s| s.id.as_str()),
            cursor.as_deref(),
            self.options().page_size,
        );
        let items = ids
            .into_iter()
            .filter_map(|id| world.subscriptions.iter().find(|s| s.id.as_str() == id))
            .cloned()
            .collect();
        Ok(Page { items, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SandboxOptions;

    #[tokio::test]
    async fn subscriptions_list_in_creation_order_across_pages() {
        let cloud = SandboxCloud::new(SandboxOptions {
            page_size: 1,
            ..SandboxOptions::default()
        });
        let first = cloud
            .create_subscription(&EventKinds::All, "https://a.example/hook", &Tags::new())
            .await
            .unwrap();
        let second = cloud
            .create_subscription(&EventKinds::All, "https://b.example/hook", &Tags::new())
            .await
            .unwrap();

        let page = cloud.list_subscriptions(None).await.unwrap();
        assert_eq!(page.items, [first]);
        let page = cloud.list_subscriptions(page.next).await.unwrap();
        assert_eq!(page.items, [second]);
        assert_eq!(page.next, None);
    }

    #[tokio::test]
    async fn listing_survives_deletion_of_the_cursor_subscription() {
        let cloud = SandboxCloud::new(SandboxOptions {
            page_size: 1,
            ..SandboxOptions::default()
        });
        let mut created = Vec::new();
        for host in ["a", "b", "c"] {
            let url = format!("https://{host}.example/hook");
            created.push(
                cloud
                    .create_subscription(&EventKinds::All, &url, &Tags::new())
                    .await
                    .unwrap(),
            );
        }

        let page = cloud.list_subscriptions(None).await.unwrap();
        assert_eq!(page.items, [created[0].clone()]);
        cloud.delete_subscription(&created[0].id).await.unwrap();

        let page = cloud.list_subscriptions(page.next).await.unwrap();
        assert_eq!(page.items, [created[1].clone()]);
        let page = cloud.list_subscriptions(page.next).await.unwrap();
        assert_eq!(page.items, [created[2].clone()]);
        assert_eq!(page.next, None);
    }

    #[tokio::test]
    async fn plain_http_targets_are_rejected() {
        let cloud = SandboxCloud::default();
        let err = cloud
            .create_subscription(&EventKinds::All, "http://insecure", &Tags::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn deleting_an_unknown_subscription_fails() {
        let cloud = SandboxCloud::default();
        let err = cloud
            .delete_subscription(&SubscriptionId::new("we_missing").unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
