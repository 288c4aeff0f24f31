mod config;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() {
    // A missing .env file is normal outside development.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::AppConfig::from_env().expect("invalid configuration");
    config.warn_if_incomplete();
    let port = config.port;

    let state = state::AppState::new(config).expect("failed to build upstream http client");

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "portal listening");
    axum::serve(listener, app).await.expect("server failed");
}
