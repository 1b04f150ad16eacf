mod app;
mod auth;
mod config;
mod error;
mod extract;
mod mail;
mod rate_limit;
mod state;
mod tokens;
mod users;
mod validation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "userapi=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = state::AppState::init().await?;
    tracing::info!(env = %state.config.app_env, "configuration loaded");

    // sweepers run for the life of the process
    let _sweepers = state.spawn_sweepers();

    app::serve(app::build_app(state)).await
}
