use std::env;

use axum::{routing::get, routing::post, Router};
use clap::Parser;
use log::info;
use mongodb::{options::ClientOptions, Client, Database};
use simple_logger::SimpleLogger;

use review_rating::cache::CacheCoordinator;
use review_rating::event::http_event_service::{list_topic_subscriptions, on_topic_event};
use review_rating::event::publisher::EventPublisher;
use review_rating::external::{ProductCatalogClient, PurchaseVerifier};
use review_rating::http_api::build_api_router;
use review_rating::state::ServiceState;

/// Establishes database connection and returns the client.
async fn db_connection() -> Client {
    let uri = match env::var_os("MONGODB_URI") {
        Some(uri) => uri.into_string().unwrap(),
        None => panic!("$MONGODB_URI is not set."),
    };

    // Parse a connection string into an options struct.
    let mut client_options = ClientOptions::parse(uri).await.unwrap();

    // Manually set an option.
    client_options.app_name = Some("Review".to_string());

    // Get a handle to the deployment.
    Client::with_options(client_options).unwrap()
}

/// Returns Router that establishes connection to Dapr.
///
/// Adds endpoints to define pub/sub interaction with Dapr.
fn build_dapr_router(state: ServiceState) -> Router {
    Router::new()
        .route("/dapr/subscribe", get(list_topic_subscriptions))
        .route("/on-topic-event", post(on_topic_event))
        .with_state(state)
}

/// Builds the shared service state from the environment.
async fn build_state(db_client: &Database) -> ServiceState {
    let cache = match env::var("REDIS_URI") {
        Ok(uri) => CacheCoordinator::connect(&uri).await,
        Err(_) => CacheCoordinator::disabled(),
    };
    let dapr_http_port = env::var("DAPR_HTTP_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3500);
    let publisher = EventPublisher::new(dapr_http_port);
    let product_catalog = ProductCatalogClient::new(
        env::var("PRODUCT_SERVICE_URL").unwrap_or_else(|_| "http://localhost:8081".to_string()),
    );
    let purchase_verifier = PurchaseVerifier::new(
        env::var("ORDER_SERVICE_URL").unwrap_or_else(|_| "http://localhost:8082".to_string()),
    );
    ServiceState::new(db_client, cache, publisher, product_catalog, purchase_verifier)
}

/// Command line arguments of the review service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port the HTTP server binds to.
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

/// Activates logger and starts the review service.
#[tokio::main]
async fn main() -> std::io::Result<()> {
    SimpleLogger::new().init().unwrap();

    let args = Args::parse();
    start_service(args.port).await
}

/// Starts review service on the configured port.
async fn start_service(port: u16) -> std::io::Result<()> {
    let client = db_connection().await;
    let db_client: Database = client.database("review-database");

    let state = build_state(&db_client).await;
    let api_router = build_api_router(state.clone());
    let dapr_router = build_dapr_router(state);
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(api_router)
        .merge(dapr_router);

    info!("Review service listening on 0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app).await
}
