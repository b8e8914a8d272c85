//! The list and delete workflows.
//!
//! Both fan out over the three resource kinds independently: a failure on one
//! kind never hides the results of the others.

use pipeline::{
    Function, FunctionName, Gateway, GatewayId, ProvisionError, ResourceKind, Subscription,
    SubscriptionId,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::orchestrator::Orchestrator;

/// Everything this tool owns, per resource kind.
#[derive(Debug)]
pub struct Inventory {
    pub functions: Result<Vec<Function>, ProvisionError>,
    pub gateways: Result<Vec<Gateway>, ProvisionError>,
    pub subscriptions: Result<Vec<Subscription>, ProvisionError>,
}

impl Inventory {
    /// `true` when every kind was listed successfully.
    pub fn is_complete(&self) -> bool {
        self.functions.is_ok() && self.gateways.is_ok() && self.subscriptions.is_ok()
    }
}

/// What [`Orchestrator::delete`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// Exactly the named resources. Any subset may be given.
    Targeted {
        function: Option<FunctionName>,
        gateway: Option<GatewayId>,
        subscription: Option<SubscriptionId>,
    },
    /// Every marked resource of every kind.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedResource {
    pub kind: ResourceKind,
    pub id: String,
}

#[derive(Debug)]
pub struct DeletionFailure {
    pub kind: ResourceKind,
    /// `None` when listing the kind failed, so nothing of it was attempted.
    pub id: Option<String>,
    pub error: ProvisionError,
}

/// Outcome of a best-effort delete.
#[derive(Debug, Default)]
pub struct DeletionReport {
    pub deleted: Vec<DeletedResource>,
    pub failures: Vec<DeletionFailure>,
}

impl DeletionReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, kind: ResourceKind, id: String, outcome: Result<(), ProvisionError>) {
        match outcome {
            Ok(()) => self.deleted.push(DeletedResource { kind, id }),
            Err(error) => {
                warn!(%kind, %id, %error, "Deletion failed");
                self.failures.push(DeletionFailure {
                    kind,
                    id: Some(id),
                    error,
                });
            }
        }
    }

    fn listing_failed(&mut self, kind: ResourceKind, error: ProvisionError) {
        warn!(%kind, %error, "Listing failed; nothing of this kind was deleted");
        self.failures.push(DeletionFailure {
            kind,
            id: None,
            error,
        });
    }

    fn merge(&mut self, other: DeletionReport) {
        self.deleted.extend(other.deleted);
        self.failures.extend(other.failures);
    }
}

impl Orchestrator {
    /// Lists every marked function, gateway and subscription.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Inventory {
        let (functions, gateways, subscriptions) = tokio::join!(
            self.functions.list(),
            self.gateways.list(),
            self.subscriptions.list(),
        );
        Inventory {
            functions,
            gateways,
            subscriptions,
        }
    }

    /// Deletes resources best-effort. Every attempted deletion is reported;
    /// one failure never stops the others.
    #[instrument(skip(self))]
    pub async fn delete(&self, target: &DeleteTarget) -> DeletionReport {
        let report = match target {
            DeleteTarget::Targeted {
                function,
                gateway,
                subscription,
            } => {
                let mut report = DeletionReport::default();
                if let Some(id) = gateway {
                    report.record(
                        ResourceKind::Gateway,
                        id.to_string(),
                        self.gateways.delete(id).await,
                    );
                }
                if let Some(name) = function {
                    report.record(
                        ResourceKind::Function,
                        name.to_string(),
                        self.functions.delete(name).await,
                    );
                }
                if let Some(id) = subscription {
                    report.record(
                        ResourceKind::Subscription,
                        id.to_string(),
                        self.subscriptions.delete(id).await,
                    );
                }
                report
            }
            DeleteTarget::All => {
                let (gateways, functions, subscriptions) = tokio::join!(
                    self.delete_all_gateways(),
                    self.delete_all_functions(),
                    self.delete_all_subscriptions(),
                );
                let mut report = gateways;
                report.merge(functions);
                report.merge(subscriptions);
                report
            }
        };

        info!(
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "Delete finished"
        );
        report
    }

    async fn delete_all_gateways(&self) -> DeletionReport {
        let mut report = DeletionReport::default();
        match self.gateways.list().await {
            Ok(gateways) => {
                for gateway in gateways {
                    let outcome = self.gateways.delete(&gateway.id).await;
                    report.record(ResourceKind::Gateway, gateway.id.to_string(), outcome);
                }
            }
            Err(e) => report.listing_failed(ResourceKind::Gateway, e),
        }
        report
    }

    async fn delete_all_functions(&self) -> DeletionReport {
        let mut report = DeletionReport::default();
        match self.functions.list().await {
            Ok(functions) => {
                for function in functions {
                    let outcome = self.functions.delete(&function.name).await;
                    report.record(ResourceKind::Function, function.name.to_string(), outcome);
                }
            }
            Err(e) => report.listing_failed(ResourceKind::Function, e),
        }
        report
    }

    async fn delete_all_subscriptions(&self) -> DeletionReport {
        let mut report = DeletionReport::default();
        match self.subscriptions.list().await {
            Ok(subscriptions) => {
                for subscription in subscriptions {
                    let outcome = self.subscriptions.delete(&subscription.id).await;
                    report.record(
                        ResourceKind::Subscription,
                        subscription.id.to_string(),
                        outcome,
                    );
                }
            }
            Err(e) => report.listing_failed(ResourceKind::Subscription, e),
        }
        report
    }
}
