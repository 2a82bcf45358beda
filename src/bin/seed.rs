use std::env;

use ebook_store_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    seed::{ensure_admin, seed_catalog},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

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
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    for (product, created) in seed_catalog(&orm).await? {
        println!(
            "- {} | {} | {:.2} € | {}",
            product.id,
            product.title,
            product.price_cents as f64 / 100.0,
            if created { "created" } else { "updated" }
        );
    }

    let admin_email = env::var("SEED_ADMIN_EMAIL").ok().filter(|v| !v.trim().is_empty());
    let admin_password = env::var("SEED_ADMIN_PASSWORD").ok().filter(|v| !v.is_empty());
    if let (Some(email), Some(password)) = (admin_email, admin_password) {
        let admin_id = ensure_admin(&orm, &email, &password).await?;
        println!("Admin account ready: {admin_id}");
    }

    println!("Seed completed");
    Ok(())
}
