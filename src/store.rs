use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::types::{
    DeliveryId, DeliverySummary, EndpointId, EndpointUpdate, EventId, TenantId, WebhookDelivery,
    WebhookEndpoint, WebhookEvent,
};

/// Repository of webhook endpoint configurations.
///
/// `record_dispatched` and `record_outcome` mutate statistics under
/// the store's own synchronization: two deliveries for the same
/// endpoint can complete concurrently, and implementations must not
/// lose updates.
#[async_trait]
pub trait EndpointStore: Send + Sync {
    async fn insert(&self, endpoint: WebhookEndpoint);
    async fn get(&self, id: &EndpointId) -> Option<WebhookEndpoint>;

    /// Merge the provided fields and refresh `updated_at`. Returns the
    /// updated record, or `None` for an unknown id.
    async fn apply_update(&self, id: &EndpointId, update: EndpointUpdate)
        -> Option<WebhookEndpoint>;

    /// Remove the record. Returns whether it existed.
    async fn remove(&self, id: &EndpointId) -> bool;

    async fn list(&self, tenant_id: &TenantId) -> Vec<WebhookEndpoint>;

    /// Bump `total_deliveries` when a delivery is created at fan-out.
    async fn record_dispatched(&self, id: &EndpointId);

    /// Record a terminal delivery outcome: bump the success or failure
    /// counter and refresh the last-delivery summary. Called exactly
    /// once per terminal outcome, never per intermediate retry.
    async fn record_outcome(&self, id: &EndpointId, summary: DeliverySummary);
}

/// Repository of triggered events.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: WebhookEvent);
    async fn get(&self, id: &EventId) -> Option<WebhookEvent>;
    async fn append_delivery(&self, id: &EventId, delivery_id: DeliveryId);

    /// Events for the tenant, most-recent-first, bounded by `limit`.
    async fn list_recent(&self, tenant_id: &TenantId, limit: usize) -> Vec<WebhookEvent>;
}

/// Repository of delivery records.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn insert(&self, delivery: WebhookDelivery);
    async fn get(&self, id: &DeliveryId) -> Option<WebhookDelivery>;

    /// Replace the stored record wholesale.
    async fn put(&self, delivery: WebhookDelivery);

    /// Deliveries for the endpoint, most-recent-first, bounded by
    /// `limit`.
    async fn list_recent_for_endpoint(
        &self,
        endpoint_id: &EndpointId,
        limit: usize,
    ) -> Vec<WebhookDelivery>;
}

/// In-memory endpoint store for single-process deployments.
#[derive(Default)]
pub struct InMemoryEndpointStore {
    endpoints: RwLock<HashMap<EndpointId, WebhookEndpoint>>,
}

impl InMemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EndpointStore for InMemoryEndpointStore {
    async fn insert(&self, endpoint: WebhookEndpoint) {
        self.endpoints
            .write()
            .await
            .insert(endpoint.id.clone(), endpoint);
    }

    async fn get(&self, id: &EndpointId) -> Option<WebhookEndpoint> {
        self.endpoints.read().await.get(id).cloned()
    }

    async fn apply_update(
        &self,
        id: &EndpointId,
        update: EndpointUpdate,
    ) -> Option<WebhookEndpoint> {
        let mut guard = self.endpoints.write().await;
        let endpoint = guard.get_mut(id)?;

        if let Some(name) = update.name {
            endpoint.name = name;
        }
        if let Some(url) = update.url {
            endpoint.url = url;
        }
        if let Some(description) = update.description {
            endpoint.description = Some(description);
        }
        if let Some(events) = update.events {
            endpoint.events = events;
        }
        if let Some(status) = update.status {
            endpoint.status = status;
        }
        if let Some(headers) = update.headers {
            endpoint.headers = headers;
        }
        if let Some(retry_policy) = update.retry_policy {
            endpoint.retry_policy = retry_policy;
        }
        endpoint.updated_at = Utc::now();

        Some(endpoint.clone())
    }

    async fn remove(&self, id: &EndpointId) -> bool {
        self.endpoints.write().await.remove(id).is_some()
    }

    async fn list(&self, tenant_id: &TenantId) -> Vec<WebhookEndpoint> {
        let guard = self.endpoints.read().await;
        let mut endpoints: Vec<_> = guard
            .values()
            .filter(|e| &e.tenant_id == tenant_id)
            .cloned()
            .collect();
        endpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        endpoints
    }

    async fn record_dispatched(&self, id: &EndpointId) {
        let mut guard = self.endpoints.write().await;
        if let Some(endpoint) = guard.get_mut(id) {
            endpoint.statistics.total_deliveries += 1;
        }
    }

    async fn record_outcome(&self, id: &EndpointId, summary: DeliverySummary) {
        let mut guard = self.endpoints.write().await;
        if let Some(endpoint) = guard.get_mut(id) {
            if summary.success {
                endpoint.statistics.successful_deliveries += 1;
            } else {
                endpoint.statistics.failed_deliveries += 1;
            }
            endpoint.last_delivery = Some(summary);
        }
    }
}

/// In-memory event store. Keeps insertion order for recency queries.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: RwLock<EventStoreInner>,
}

#[derive(Default)]
struct EventStoreInner {
    events: HashMap<EventId, WebhookEvent>,
    order: Vec<EventId>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: WebhookEvent) {
        let mut guard = self.inner.write().await;
        guard.order.push(event.id.clone());
        guard.events.insert(event.id.clone(), event);
    }

    async fn get(&self, id: &EventId) -> Option<WebhookEvent> {
        self.inner.read().await.events.get(id).cloned()
    }

    async fn append_delivery(&self, id: &EventId, delivery_id: DeliveryId) {
        let mut guard = self.inner.write().await;
        if let Some(event) = guard.events.get_mut(id) {
            event.deliveries.push(delivery_id);
        }
    }

    async fn list_recent(&self, tenant_id: &TenantId, limit: usize) -> Vec<WebhookEvent> {
        let guard = self.inner.read().await;
        guard
            .order
            .iter()
            .rev()
            .filter_map(|id| guard.events.get(id))
            .filter(|e| &e.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

/// In-memory delivery store. Keeps insertion order for recency queries.
#[derive(Default)]
pub struct InMemoryDeliveryStore {
    inner: RwLock<DeliveryStoreInner>,
}

#[derive(Default)]
struct DeliveryStoreInner {
    deliveries: HashMap<DeliveryId, WebhookDelivery>,
    order: Vec<DeliveryId>,
}

impl InMemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryDeliveryStore {
    async fn insert(&self, delivery: WebhookDelivery) {
        let mut guard = self.inner.write().await;
        guard.order.push(delivery.id.clone());
        guard.deliveries.insert(delivery.id.clone(), delivery);
    }

    async fn get(&self, id: &DeliveryId) -> Option<WebhookDelivery> {
        self.inner.read().await.deliveries.get(id).cloned()
    }

    async fn put(&self, delivery: WebhookDelivery) {
        let mut guard = self.inner.write().await;
        guard.deliveries.insert(delivery.id.clone(), delivery);
    }

    async fn list_recent_for_endpoint(
        &self,
        endpoint_id: &EndpointId,
        limit: usize,
    ) -> Vec<WebhookDelivery> {
        let guard = self.inner.read().await;
        guard
            .order
            .iter()
            .rev()
            .filter_map(|id| guard.deliveries.get(id))
            .filter(|d| &d.endpoint_id == endpoint_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliveryStatus, EndpointStatus, EventType, RetryPolicy};

    fn sample_endpoint(id: &str, tenant: &str) -> WebhookEndpoint {
        WebhookEndpoint {
            id: EndpointId(id.to_string()),
            tenant_id: TenantId(tenant.to_string()),
            name: "orders hook".to_string(),
            url: "https://example.com/hook".to_string(),
            description: None,
            events: vec![EventType::RowCreated],
            status: EndpointStatus::Active,
            secret: "whsec_test".to_string(),
            headers: HashMap::new(),
            retry_policy: RetryPolicy::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_delivery: None,
            statistics: Default::default(),
        }
    }

    fn sample_delivery(id: &str, endpoint: &str) -> WebhookDelivery {
        WebhookDelivery {
            id: DeliveryId(id.to_string()),
            endpoint_id: EndpointId(endpoint.to_string()),
            event_id: EventId("evt_1".to_string()),
            event_type: EventType::RowCreated,
            status: DeliveryStatus::Pending,
            attempt: 1,
            url: "https://example.com/hook".to_string(),
            headers: HashMap::new(),
            payload: Vec::new(),
            response: None,
            error: None,
            created_at: Utc::now(),
            delivered_at: None,
            next_retry_at: None,
        }
    }

    #[tokio::test]
    async fn update_merges_and_refreshes_updated_at() {
        let store = InMemoryEndpointStore::new();
        let endpoint = sample_endpoint("ep_1", "t1");
        let before = endpoint.updated_at;
        store.insert(endpoint).await;

        let updated = store
            .apply_update(
                &EndpointId("ep_1".into()),
                EndpointUpdate::new()
                    .name("renamed")
                    .status(EndpointStatus::Disabled),
            )
            .await
            .expect("exists");

        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.status, EndpointStatus::Disabled);
        assert_eq!(updated.url, "https://example.com/hook");
        assert!(updated.updated_at >= before);
    }

    #[tokio::test]
    async fn update_unknown_id_returns_none() {
        let store = InMemoryEndpointStore::new();
        let result = store
            .apply_update(&EndpointId("missing".into()), EndpointUpdate::new())
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn list_is_tenant_scoped() {
        let store = InMemoryEndpointStore::new();
        store.insert(sample_endpoint("ep_1", "t1")).await;
        store.insert(sample_endpoint("ep_2", "t2")).await;
        store.insert(sample_endpoint("ep_3", "t1")).await;

        let listed = store.list(&TenantId("t1".into())).await;
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|e| e.tenant_id == TenantId("t1".into())));
    }

    #[tokio::test]
    async fn outcome_updates_counters_and_summary() {
        let store = InMemoryEndpointStore::new();
        store.insert(sample_endpoint("ep_1", "t1")).await;
        let id = EndpointId("ep_1".into());

        store.record_dispatched(&id).await;
        store.record_dispatched(&id).await;
        store
            .record_outcome(
                &id,
                DeliverySummary {
                    delivery_id: DeliveryId("del_1".into()),
                    event_type: EventType::RowCreated,
                    success: true,
                    at: Utc::now(),
                },
            )
            .await;
        store
            .record_outcome(
                &id,
                DeliverySummary {
                    delivery_id: DeliveryId("del_2".into()),
                    event_type: EventType::RowCreated,
                    success: false,
                    at: Utc::now(),
                },
            )
            .await;

        let endpoint = store.get(&id).await.expect("exists");
        assert_eq!(endpoint.statistics.total_deliveries, 2);
        assert_eq!(endpoint.statistics.successful_deliveries, 1);
        assert_eq!(endpoint.statistics.failed_deliveries, 1);
        let summary = endpoint.last_delivery.expect("summary");
        assert_eq!(summary.delivery_id, DeliveryId("del_2".into()));
        assert!(!summary.success);
    }

    #[tokio::test]
    async fn delivery_history_is_most_recent_first_and_bounded() {
        let store = InMemoryDeliveryStore::new();
        for i in 0..5 {
            store
                .insert(sample_delivery(&format!("del_{}", i), "ep_1"))
                .await;
        }
        store.insert(sample_delivery("del_other", "ep_2")).await;

        let recent = store
            .list_recent_for_endpoint(&EndpointId("ep_1".into()), 3)
            .await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, DeliveryId("del_4".into()));
        assert_eq!(recent[2].id, DeliveryId("del_2".into()));
    }
}
