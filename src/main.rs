use std::{net::SocketAddr, sync::Arc};

use axum::{ServiceExt, extract::Request};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ebook_store_api::{
    app::build_app,
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    payments::{PaymentGateway, StripeClient},
    seed::seed_catalog,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ebook_store_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;

    // Keep serving /health while the database is down.
    if let Err(err) = run_migrations(&orm).await {
        tracing::error!(error = ?err, "database migration failed");
    } else if config.seed_on_startup {
        if let Err(err) = seed_catalog(&orm).await {
            tracing::error!(error = ?err, "catalog seed failed");
        }
    }

    let payments: Option<Arc<dyn PaymentGateway>> = match StripeClient::from_config(&config.stripe)? {
        Some(client) => Some(Arc::new(client) as Arc<dyn PaymentGateway>),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set; payment intents are disabled");
            None
        }
    };
    if config.payments_mock_enabled {
        tracing::warn!("mock payment confirmation is enabled");
    }

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));
    let app = build_app(AppState::new(orm, config, payments));

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
