use std::time::Duration;

use webhook_engine::{
    CreateEndpointOptions, EngineConfig, EventContext, EventType, TenantId, WebhookEngine,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("webhook_engine=debug")),
        )
        .init();

    let engine = WebhookEngine::new(EngineConfig::default());

    let endpoint = engine
        .registry()
        .create_endpoint(
            TenantId("tenant_a".to_string()),
            "orders",
            "https://example.com/webhook",
            vec![EventType::RowCreated, EventType::RowDeleted],
            CreateEndpointOptions::default(),
        )
        .await
        .expect("endpoint");

    // The full secret is available only here, at creation time.
    println!("endpoint {} secret {}", endpoint.id.0, endpoint.secret);

    let event = engine
        .trigger_event(
            TenantId("tenant_a".to_string()),
            EventType::RowCreated,
            serde_json::json!({"table": "orders", "row_id": 123}),
            EventContext::default(),
        )
        .await;
    println!("event {} fanned out to {} deliveries", event.id.0, event.deliveries.len());

    tokio::time::sleep(Duration::from_secs(2)).await;

    for delivery in engine.get_delivery_history(&endpoint.id, 10).await {
        println!(
            "delivery {} status {:?} attempts {}",
            delivery.id.0, delivery.status, delivery.attempt
        );
    }
}
