use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::registry::EndpointRegistry;
use crate::sender::{HttpSender, ReqwestSender, SenderResponse};
use crate::signing::sign_payload;
use crate::store::{
    DeliveryStore, EndpointStore, EventStore, InMemoryDeliveryStore, InMemoryEndpointStore,
    InMemoryEventStore,
};
use crate::types::{
    DeliveryId, DeliveryResponse, DeliveryStatus, DeliverySummary, EndpointId, EndpointStatus,
    EventContext, EventId, EventMetadata, EventType, TenantId, WebhookDelivery, WebhookEndpoint,
    WebhookEvent, WebhookPayload,
};

/// Reserved delivery headers. Endpoint-configured custom headers can
/// never shadow these.
pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";
pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_ID: &str = "X-Webhook-Id";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed identifying `User-Agent` sent with every delivery.
    pub user_agent: String,

    /// Hard timeout for a single delivery attempt.
    pub request_timeout: Duration,

    /// How long `test_endpoint` waits before reporting the outcome.
    pub test_wait: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("webhook-engine/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(30),
            test_wait: Duration::from_secs(2),
        }
    }
}

/// Outcome report for a synthetic test delivery.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub delivered: bool,
    pub response: Option<DeliveryResponse>,
    pub error: Option<String>,
    pub delivery: WebhookDelivery,
}

/// Outbound webhook delivery engine.
///
/// Fans events out to subscribed endpoints, signs payloads, drives
/// each delivery through its retry state machine, and keeps
/// per-endpoint statistics and per-tenant history.
///
/// All dependencies (stores, HTTP transport) are injected, so tests
/// can substitute deterministic fakes. Cloning is cheap; clones share
/// the same state.
#[derive(Clone)]
pub struct WebhookEngine {
    registry: EndpointRegistry,
    endpoints: Arc<dyn EndpointStore>,
    events: Arc<dyn EventStore>,
    deliveries: Arc<dyn DeliveryStore>,
    sender: Arc<dyn HttpSender>,
    config: EngineConfig,
}

impl WebhookEngine {
    /// Engine with in-memory stores and a real HTTP client.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_parts(
            config,
            Arc::new(InMemoryEndpointStore::new()),
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryDeliveryStore::new()),
            Arc::new(ReqwestSender::new()),
        )
    }

    /// Engine with explicitly injected stores and transport.
    pub fn with_parts(
        config: EngineConfig,
        endpoints: Arc<dyn EndpointStore>,
        events: Arc<dyn EventStore>,
        deliveries: Arc<dyn DeliveryStore>,
        sender: Arc<dyn HttpSender>,
    ) -> Self {
        Self {
            registry: EndpointRegistry::new(endpoints.clone()),
            endpoints,
            events,
            deliveries,
            sender,
            config,
        }
    }

    /// Endpoint management surface.
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Create an event and fan it out to every active endpoint of the
    /// tenant subscribed to `event_type`.
    ///
    /// Exactly one delivery is created per matching endpoint, for the
    /// endpoint set evaluated now; endpoints added later are not
    /// retroactively notified. Delivery outcomes never surface here:
    /// the returned event lists the deliveries created, and their
    /// sends proceed in the background.
    pub async fn trigger_event(
        &self,
        tenant_id: TenantId,
        event_type: EventType,
        data: serde_json::Value,
        context: EventContext,
    ) -> WebhookEvent {
        let mut event = WebhookEvent {
            id: EventId::generate(),
            tenant_id: tenant_id.clone(),
            event_type,
            data,
            metadata: EventMetadata {
                timestamp: Utc::now(),
                tenant_id,
                user_id: context.user_id,
                request_id: context.request_id,
            },
            deliveries: Vec::new(),
        };
        self.events.insert(event.clone()).await;

        let matching: Vec<WebhookEndpoint> = self
            .endpoints
            .list(&event.tenant_id)
            .await
            .into_iter()
            .filter(|e| e.status == EndpointStatus::Active && e.subscribes_to(event_type))
            .collect();

        debug!(
            event = %event.id.0,
            event_type = event_type.as_str(),
            endpoints = matching.len(),
            "fanning out event"
        );

        for endpoint in matching {
            let delivery = self.create_delivery(&event, &endpoint).await;
            event.deliveries.push(delivery.id.clone());
            self.spawn_delivery(delivery.id);
        }

        event
    }

    /// Deliveries for an endpoint, most-recent-first.
    pub async fn get_delivery_history(
        &self,
        endpoint_id: &EndpointId,
        limit: usize,
    ) -> Vec<WebhookDelivery> {
        self.deliveries
            .list_recent_for_endpoint(endpoint_id, limit)
            .await
    }

    /// Events for a tenant, most-recent-first.
    pub async fn get_event_history(&self, tenant_id: &TenantId, limit: usize) -> Vec<WebhookEvent> {
        self.events.list_recent(tenant_id, limit).await
    }

    /// Look up a single delivery record.
    pub async fn get_delivery(&self, id: &DeliveryId) -> Option<WebhookDelivery> {
        self.deliveries.get(id).await
    }

    /// Look up a single event record.
    pub async fn get_event(&self, id: &EventId) -> Option<WebhookEvent> {
        self.events.get(id).await
    }

    /// Send a synthetic `webhook.test` event to one endpoint,
    /// regardless of its subscriptions, wait briefly, and report
    /// whether the delivery succeeded.
    pub async fn test_endpoint(&self, endpoint_id: &EndpointId) -> Result<TestReport, EngineError> {
        let endpoint = self
            .endpoints
            .get(endpoint_id)
            .await
            .ok_or_else(|| EngineError::EndpointNotFound {
                endpoint_id: endpoint_id.clone(),
            })?;

        let event = WebhookEvent {
            id: EventId::generate(),
            tenant_id: endpoint.tenant_id.clone(),
            event_type: EventType::WebhookTest,
            data: serde_json::json!({
                "message": "test delivery",
                "endpoint_id": endpoint.id.0,
            }),
            metadata: EventMetadata {
                timestamp: Utc::now(),
                tenant_id: endpoint.tenant_id.clone(),
                user_id: None,
                request_id: None,
            },
            deliveries: Vec::new(),
        };
        self.events.insert(event.clone()).await;

        let delivery = self.create_delivery(&event, &endpoint).await;
        let delivery_id = delivery.id.clone();
        self.spawn_delivery(delivery_id.clone());

        sleep(self.config.test_wait).await;

        let delivery = self
            .deliveries
            .get(&delivery_id)
            .await
            .unwrap_or(delivery);

        Ok(TestReport {
            delivered: delivery.status == DeliveryStatus::Delivered,
            response: delivery.response.clone(),
            error: delivery.error.clone(),
            delivery,
        })
    }

    /// Build, sign, and persist a pending delivery for one
    /// (event, endpoint) pair, and count it on the endpoint.
    async fn create_delivery(
        &self,
        event: &WebhookEvent,
        endpoint: &WebhookEndpoint,
    ) -> WebhookDelivery {
        let mut payload = WebhookPayload {
            id: event.id.clone(),
            event_type: event.event_type,
            data: event.data.clone(),
            metadata: event.metadata.clone(),
            signature: None,
        };
        sign_payload(&mut payload, &endpoint.secret);
        let signature = payload.signature.clone().unwrap_or_default();
        let body = serde_json::to_vec(&payload).unwrap_or_default();

        // Custom headers first so the reserved set always wins.
        let mut headers: HashMap<String, String> = endpoint.headers.clone();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("User-Agent".to_string(), self.config.user_agent.clone());
        headers.insert(HEADER_SIGNATURE.to_string(), signature);
        headers.insert(
            HEADER_EVENT.to_string(),
            event.event_type.as_str().to_string(),
        );
        headers.insert(HEADER_ID.to_string(), event.id.0.clone());

        let delivery = WebhookDelivery {
            id: DeliveryId::generate(),
            endpoint_id: endpoint.id.clone(),
            event_id: event.id.clone(),
            event_type: event.event_type,
            status: DeliveryStatus::Pending,
            attempt: 1,
            url: endpoint.url.clone(),
            headers,
            payload: body,
            response: None,
            error: None,
            created_at: Utc::now(),
            delivered_at: None,
            next_retry_at: None,
        };

        self.deliveries.insert(delivery.clone()).await;
        self.events
            .append_delivery(&event.id, delivery.id.clone())
            .await;
        self.endpoints.record_dispatched(&endpoint.id).await;

        delivery
    }

    fn spawn_delivery(&self, delivery_id: DeliveryId) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_delivery(delivery_id).await;
        });
    }

    /// Drive one delivery through its state machine until a terminal
    /// state: PENDING → DELIVERED, or PENDING → RETRYING → PENDING →
    /// … → FAILED once retries are exhausted.
    async fn run_delivery(&self, delivery_id: DeliveryId) {
        loop {
            let Some(mut delivery) = self.deliveries.get(&delivery_id).await else {
                return;
            };
            if delivery.status.is_terminal() {
                return;
            }

            let result = self
                .sender
                .send(
                    &delivery.url,
                    &delivery.headers,
                    &delivery.payload,
                    self.config.request_timeout,
                )
                .await;

            let failure = match result {
                Ok(response) if (200..300).contains(&response.status) => {
                    self.complete_delivered(delivery, response).await;
                    return;
                }
                Ok(response) => {
                    let error = format!("endpoint returned HTTP {}", response.status);
                    delivery.response = Some(to_delivery_response(response));
                    error
                }
                Err(err) => {
                    delivery.response = None;
                    err.to_string()
                }
            };
            delivery.error = Some(failure.clone());

            // An endpoint deleted mid-flight ends the delivery without
            // touching statistics.
            let Some(endpoint) = self.endpoints.get(&delivery.endpoint_id).await else {
                delivery.status = DeliveryStatus::Failed;
                self.deliveries.put(delivery).await;
                return;
            };

            let policy = &endpoint.retry_policy;
            if delivery.attempt <= policy.max_retries {
                let delay = policy.delay_for_attempt(delivery.attempt);
                debug!(
                    delivery = %delivery.id.0,
                    attempt = delivery.attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "delivery failed, retry scheduled"
                );
                delivery.status = DeliveryStatus::Retrying;
                delivery.attempt += 1;
                delivery.next_retry_at =
                    Some(Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64));
                self.deliveries.put(delivery.clone()).await;

                sleep(delay).await;

                delivery.status = DeliveryStatus::Pending;
                delivery.next_retry_at = None;
                self.deliveries.put(delivery).await;
            } else {
                warn!(
                    delivery = %delivery.id.0,
                    endpoint = %delivery.endpoint_id.0,
                    attempts = delivery.attempt,
                    error = %failure,
                    "delivery failed permanently"
                );
                delivery.status = DeliveryStatus::Failed;
                self.deliveries.put(delivery.clone()).await;
                self.endpoints
                    .record_outcome(
                        &delivery.endpoint_id,
                        DeliverySummary {
                            delivery_id: delivery.id.clone(),
                            event_type: delivery.event_type,
                            success: false,
                            at: Utc::now(),
                        },
                    )
                    .await;
                return;
            }
        }
    }

    async fn complete_delivered(&self, mut delivery: WebhookDelivery, response: SenderResponse) {
        debug!(
            delivery = %delivery.id.0,
            endpoint = %delivery.endpoint_id.0,
            attempt = delivery.attempt,
            status = response.status,
            "delivery succeeded"
        );
        delivery.status = DeliveryStatus::Delivered;
        delivery.response = Some(to_delivery_response(response));
        delivery.error = None;
        delivery.delivered_at = Some(Utc::now());
        delivery.next_retry_at = None;
        self.deliveries.put(delivery.clone()).await;
        self.endpoints
            .record_outcome(
                &delivery.endpoint_id,
                DeliverySummary {
                    delivery_id: delivery.id.clone(),
                    event_type: delivery.event_type,
                    success: true,
                    at: Utc::now(),
                },
            )
            .await;
    }
}

fn to_delivery_response(response: SenderResponse) -> DeliveryResponse {
    DeliveryResponse {
        status_code: response.status,
        headers: response.headers,
        body: response.body,
        duration_ms: response.duration.as_millis() as u64,
    }
}
