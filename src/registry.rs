use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::error::EngineError;
use crate::signing::generate_secret;
use crate::store::EndpointStore;
use crate::types::{
    CreateEndpointOptions, EndpointId, EndpointStatus, EndpointUpdate, EventType, TenantId,
    WebhookEndpoint,
};

/// Tenant-scoped registry of webhook endpoint configurations.
///
/// The registry owns endpoint lifecycle only; it never performs
/// network calls. Duplicate names or URLs are not rejected, that is
/// left to callers.
#[derive(Clone)]
pub struct EndpointRegistry {
    store: Arc<dyn EndpointStore>,
}

impl EndpointRegistry {
    pub fn new(store: Arc<dyn EndpointStore>) -> Self {
        Self { store }
    }

    /// Create an endpoint with a freshly generated signing secret.
    ///
    /// The returned record carries the full secret; this is the only
    /// time callers should surface it in full.
    pub async fn create_endpoint(
        &self,
        tenant_id: TenantId,
        name: impl Into<String>,
        url: impl Into<String>,
        events: Vec<EventType>,
        options: CreateEndpointOptions,
    ) -> Result<WebhookEndpoint, EngineError> {
        if events.is_empty() {
            return Err(EngineError::NoSubscribedEvents);
        }

        let url = url.into();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EngineError::InvalidUrl { url });
        }

        let now = Utc::now();
        let endpoint = WebhookEndpoint {
            id: EndpointId::generate(),
            tenant_id,
            name: name.into(),
            url,
            description: options.description,
            events,
            status: EndpointStatus::Active,
            secret: generate_secret(),
            headers: options.headers,
            retry_policy: options.retry_policy.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            last_delivery: None,
            statistics: Default::default(),
        };

        debug!(endpoint = %endpoint.id.0, tenant = %endpoint.tenant_id.0, "endpoint created");
        self.store.insert(endpoint.clone()).await;
        Ok(endpoint)
    }

    /// Merge the provided fields into the stored record. Returns
    /// `Ok(None)` for an unknown id and an error for an update that
    /// would empty the subscription set. The secret is never
    /// updatable.
    pub async fn update_endpoint(
        &self,
        id: &EndpointId,
        update: EndpointUpdate,
    ) -> Result<Option<WebhookEndpoint>, EngineError> {
        if let Some(events) = &update.events {
            if events.is_empty() {
                return Err(EngineError::NoSubscribedEvents);
            }
        }
        Ok(self.store.apply_update(id, update).await)
    }

    /// Remove the endpoint from future dispatch. In-flight deliveries
    /// are unaffected. Returns whether the endpoint existed.
    pub async fn delete_endpoint(&self, id: &EndpointId) -> bool {
        let existed = self.store.remove(id).await;
        if existed {
            debug!(endpoint = %id.0, "endpoint deleted");
        }
        existed
    }

    pub async fn get_endpoint(&self, id: &EndpointId) -> Option<WebhookEndpoint> {
        self.store.get(id).await
    }

    pub async fn list_endpoints(&self, tenant_id: &TenantId) -> Vec<WebhookEndpoint> {
        self.store.list(tenant_id).await
    }
}
