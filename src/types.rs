use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Unique identifier for a webhook endpoint.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of endpoint ids with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn generate() -> Self {
        Self(format!("ep_{}", Uuid::new_v4().simple()))
    }
}

/// Unique identifier for an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate() -> Self {
        Self(format!("evt_{}", Uuid::new_v4().simple()))
    }
}

/// Unique identifier for a single delivery of an event to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn generate() -> Self {
        Self(format!("del_{}", Uuid::new_v4().simple()))
    }
}

/// The closed set of event types the platform emits.
///
/// `WebhookTest` is reserved for synthetic deliveries produced by
/// endpoint test calls and is delivered regardless of subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "row.created")]
    RowCreated,
    #[serde(rename = "row.updated")]
    RowUpdated,
    #[serde(rename = "row.deleted")]
    RowDeleted,
    #[serde(rename = "table.created")]
    TableCreated,
    #[serde(rename = "table.deleted")]
    TableDeleted,
    #[serde(rename = "dashboard.created")]
    DashboardCreated,
    #[serde(rename = "subscription.created")]
    SubscriptionCreated,
    #[serde(rename = "subscription.cancelled")]
    SubscriptionCancelled,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "invoice.payment_failed")]
    InvoicePaymentFailed,
    #[serde(rename = "webhook.test")]
    WebhookTest,
}

impl EventType {
    /// The dotted wire name, as sent in the `X-Webhook-Event` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RowCreated => "row.created",
            EventType::RowUpdated => "row.updated",
            EventType::RowDeleted => "row.deleted",
            EventType::TableCreated => "table.created",
            EventType::TableDeleted => "table.deleted",
            EventType::DashboardCreated => "dashboard.created",
            EventType::SubscriptionCreated => "subscription.created",
            EventType::SubscriptionCancelled => "subscription.cancelled",
            EventType::InvoicePaid => "invoice.paid",
            EventType::InvoicePaymentFailed => "invoice.payment_failed",
            EventType::WebhookTest => "webhook.test",
        }
    }
}

/// Retry behavior for a single endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the initial attempt.
    pub max_retries: u32,

    /// Base delay before the first retry, in milliseconds.
    pub retry_delay_ms: u64,

    /// Factor by which the delay grows with each successive retry.
    /// Values below 1.0 are treated as 1.0.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows failed attempt `attempt`
    /// (attempts count from 1): `retry_delay × multiplier^(attempt-1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1) as i32);
        let ms = (self.retry_delay_ms as f64 * factor).round() as u64;
        std::time::Duration::from_millis(ms)
    }
}

/// Lifecycle status of an endpoint. Only `Active` endpoints receive
/// fan-out from triggered events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointStatus {
    Active,
    Inactive,
    Failed,
    Disabled,
}

/// Running delivery counters for an endpoint.
///
/// `total_deliveries` counts deliveries created at fan-out time; the
/// success/failure counters move only on terminal outcomes, so
/// `successful + failed <= total` with equality at quiescence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointStatistics {
    pub total_deliveries: u64,
    pub successful_deliveries: u64,
    pub failed_deliveries: u64,
}

/// Summary of the most recent terminal delivery outcome for an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub delivery_id: DeliveryId,
    pub event_type: EventType,
    pub success: bool,
    pub at: DateTime<Utc>,
}

/// A tenant-registered HTTP destination for event notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: EndpointId,
    pub tenant_id: TenantId,
    pub name: String,
    pub url: String,
    pub description: Option<String>,

    /// Subscribed event types. Non-empty by construction.
    pub events: Vec<EventType>,

    pub status: EndpointStatus,

    /// Signing secret, generated once at creation and immutable.
    /// Listings should expose only `secret_preview()`.
    pub secret: String,

    /// Custom headers merged into each delivery. Reserved delivery
    /// headers always win over entries here.
    pub headers: HashMap<String, String>,

    pub retry_policy: RetryPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_delivery: Option<DeliverySummary>,
    pub statistics: EndpointStatistics,
}

impl WebhookEndpoint {
    /// Truncated secret for display in listings. The full value is
    /// shown only once, at creation time.
    pub fn secret_preview(&self) -> String {
        crate::signing::secret_preview(&self.secret)
    }

    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}

/// Partial update applied to a stored endpoint. Absent fields are
/// left untouched. The secret is deliberately not updatable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub events: Option<Vec<EventType>>,
    pub status: Option<EndpointStatus>,
    pub headers: Option<HashMap<String, String>>,
    pub retry_policy: Option<RetryPolicy>,
}

impl EndpointUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn events(mut self, events: Vec<EventType>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn status(mut self, status: EndpointStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }
}

/// Optional fields accepted at endpoint creation.
#[derive(Debug, Clone, Default)]
pub struct CreateEndpointOptions {
    pub description: Option<String>,
    pub headers: HashMap<String, String>,
    pub retry_policy: Option<RetryPolicy>,
}

/// Metadata attached to every event and included in the wire payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub timestamp: DateTime<Utc>,
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Caller-supplied context for `trigger_event`.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub user_id: Option<String>,
    pub request_id: Option<String>,
}

/// A typed occurrence within the platform, created once per trigger.
///
/// Immutable after creation except for the delivery list, which grows
/// as fan-out proceeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: EventId,
    pub tenant_id: TenantId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub metadata: EventMetadata,
    pub deliveries: Vec<DeliveryId>,
}

/// Delivery lifecycle status.
///
/// `Delivered` and `Failed` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

/// Response metadata from the most recent delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub duration_ms: u64,
}

/// One attempted (and possibly retried) transmission of an event to
/// one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub endpoint_id: EndpointId,
    pub event_id: EventId,
    pub event_type: EventType,
    pub status: DeliveryStatus,

    /// Attempt counter, starting at 1. Never exceeds
    /// `retry_policy.max_retries + 1`.
    pub attempt: u32,

    /// Target URL and headers snapshot taken at creation time.
    pub url: String,
    pub headers: HashMap<String, String>,

    /// The exact signed body sent on every attempt.
    pub payload: Vec<u8>,

    pub response: Option<DeliveryResponse>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Wire artifact POSTed to the endpoint. Not persisted independently.
///
/// `signature` is the hex HMAC-SHA256 of this structure serialized
/// without the signature field, keyed by the endpoint secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub metadata: EventMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn backoff_grows_by_multiplier() {
        let policy = RetryPolicy {
            max_retries: 3,
            retry_delay_ms: 100,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn backoff_multiplier_below_one_is_clamped() {
        let policy = RetryPolicy {
            max_retries: 2,
            retry_delay_ms: 50,
            backoff_multiplier: 0.5,
        };
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(50));
    }

    #[test]
    fn event_type_round_trips_through_wire_name() {
        for ty in [
            EventType::RowCreated,
            EventType::SubscriptionCancelled,
            EventType::WebhookTest,
        ] {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
            let back: EventType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, ty);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::Retrying.is_terminal());
    }

    #[test]
    fn payload_signature_field_is_omitted_when_unset() {
        let payload = WebhookPayload {
            id: EventId("evt_1".into()),
            event_type: EventType::RowCreated,
            data: serde_json::json!({"row": 1}),
            metadata: EventMetadata {
                timestamp: Utc::now(),
                tenant_id: TenantId("t1".into()),
                user_id: None,
                request_id: None,
            },
            signature: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("signature"));
    }
}
