use std::sync::Arc;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use log::{error, info};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use leadserver::api_router::configure_api_routes;
use leadserver::config::AppConfig;
use leadserver::shared::state::AppState;
use leadserver::shared::utils::create_conn;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = AppConfig::from_env();
    let pool = create_conn(&config)?;

    {
        let mut conn = pool.get()?;
        match conn.run_pending_migrations(MIGRATIONS) {
            Ok(applied) if !applied.is_empty() => info!("Applied {} migrations", applied.len()),
            Ok(_) => {}
            Err(e) => error!("Migration run failed: {e}"),
        }
    }

    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(pool, config));
    let app = configure_api_routes()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("leadserver listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
