use axum::{routing::get, Router};
use dotenvy::dotenv;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use wxpay_gateway::{
    routes::{self, AppState},
    weixin::{v2api, PayConfig, V2Client},
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = PayConfig::from_env().expect("invalid WXPAY_* config");
    let api_base = std::env::var("WXPAY_API_BASE").unwrap_or(v2api::API_BASE.to_string());
    let oauth_base = std::env::var("WXPAY_OAUTH_BASE").unwrap_or(v2api::OAUTH_BASE.to_string());
    let state = AppState {
        config: Arc::new(config),
        api: Arc::new(V2Client::with_base_urls(&api_base, &oauth_base)),
    };

    let app = Router::new()
        .merge(routes::get_routes(state))
        .route("/", get(root))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        );

    let addr = std::env::var("LISTEN_ADDR").unwrap_or("0.0.0.0:8002".to_string());
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn root() -> &'static str {
    "wxpay gateway ok"
}
