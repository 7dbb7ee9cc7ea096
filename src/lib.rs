//! Outbound webhook delivery engine.
//!
//! Fans event notifications out to tenant-registered HTTP endpoints
//! with **at-least-once** semantics: payloads are HMAC-SHA256 signed
//! with a per-endpoint secret, failed sends retry with exponential
//! backoff, and every delivery's state is tracked and queryable.
//!
//! ## Guarantees
//! - Exactly one delivery per (event, matching endpoint) pair
//! - Bounded attempts: never more than `max_retries + 1`
//! - Terminal delivery states are immutable
//! - Per-endpoint statistics updated once per terminal outcome
//!
//! ## Non-Guarantees
//! - Durability across restarts (stores are in-memory behind traits)
//! - Ordering between deliveries, even to the same endpoint
//! - Cancellation of in-flight sends on endpoint deletion
//!
//! Delivery failures are data, not errors: callers of
//! [`WebhookEngine::trigger_event`] never see them, they query the
//! delivery history instead.

mod engine;
mod error;
mod registry;
mod sender;
mod signing;
mod store;
mod types;

pub use engine::{
    EngineConfig, TestReport, WebhookEngine, HEADER_EVENT, HEADER_ID, HEADER_SIGNATURE,
};
pub use error::EngineError;
pub use registry::EndpointRegistry;
pub use sender::{HttpSender, ReqwestSender, SenderError, SenderResponse};
pub use signing::{
    compute_signature, generate_secret, secret_preview, sign_payload, verify_payload,
    verify_signature,
};
pub use store::{
    DeliveryStore, EndpointStore, EventStore, InMemoryDeliveryStore, InMemoryEndpointStore,
    InMemoryEventStore,
};
pub use types::{
    CreateEndpointOptions, DeliveryId, DeliveryResponse, DeliveryStatus, DeliverySummary,
    EndpointId, EndpointStatistics, EndpointStatus, EndpointUpdate, EventContext, EventId,
    EventMetadata, EventType, RetryPolicy, TenantId, WebhookDelivery, WebhookEndpoint,
    WebhookEvent, WebhookPayload,
};
