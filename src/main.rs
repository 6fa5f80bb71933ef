mod app;
mod auth;
mod calendar;
mod clock;
mod config;
mod deposits;
mod error;
mod ledger;
mod meals;
mod settings;
mod state;
mod store;
mod users;
mod validation;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "mealmate=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;
    app_state.spawn_change_log();
    tracing::info!(
        utc_offset_minutes = app_state.config.meals.utc_offset_minutes,
        "meal calendar configured"
    );

    let app = app::build_app(app_state);
    app::serve(app).await
}
