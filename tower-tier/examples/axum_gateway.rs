use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use axum::Json;
use axum::Router;
use axum::routing::get;
use serde_json::Value;
use serde_json::json;
use tier_limit::BucketStore;
use tier_limit::EngineSlot;
use tier_limit::RedisStore;
use tier_limit::TierLimitConfig;
use tower::BoxError;
use tower_tier::AdmissionGateway;
use tower_tier::AdmissionLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());

    // 1. Policies: built in, or from a JSON file. Bad policies stop startup here.
    let mut overrides = None;
    if let Ok(path) = std::env::var("POLICY_FILE") {
        let json = std::fs::read_to_string(path)?;
        let (catalog, resolver) = TierLimitConfig::from_json(&json)?.build()?;
        overrides = Some((Arc::new(catalog), Arc::new(resolver)));
    }

    // 2. Engine: requests degrade until the script is registered.
    let store: Arc<dyn BucketStore> = Arc::new(RedisStore::connect(&redis_url).await?);
    let (slot, _init) = EngineSlot::initialize_in_background(store, Duration::from_secs(1));

    let mut gateway = AdmissionGateway::new(slot).with_timeout(Duration::from_millis(200));
    if let Some((catalog, resolver)) = overrides {
        gateway = gateway.with_catalog(catalog).with_resolver(resolver);
    }

    // 3. Build the Router
    let app = Router::new()
        .route("/", get(home))
        .route("/api/status", get(status))
        .route("/api/data", get(data))
        .route("/api/health", get(health))
        .layer(AdmissionLayer::new(gateway));

    // 4. Serve
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn home() -> Json<Value> {
    Json(json!({
        "message": "Welcome to the rate limiter API",
        "endpoints": {
            "status": "GET /api/status",
            "data": "GET /api/data",
            "health": "GET /api/health",
        }
    }))
}

async fn status() -> Json<Value> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    Json(json!({
        "status": "ok",
        "timestamp": timestamp,
        "message": "Server is running",
    }))
}

async fn data() -> Json<Value> {
    Json(json!({
        "data": [
            { "id": 1, "name": "Item 1", "value": 100 },
            { "id": 2, "name": "Item 2", "value": 200 },
            { "id": 3, "name": "Item 3", "value": 300 },
        ]
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "health": "healthy" }))
}
