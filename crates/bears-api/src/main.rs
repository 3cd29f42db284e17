use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use bears_api::db::BearsDb;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bears=debug,bears_api=debug,tower_http=debug".into()),
        )
        .init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()?;
    let db_path: PathBuf = std::env::var("BEARS_DB_PATH")
        .unwrap_or_else(|_| "bears.db".into())
        .into();

    let db = Arc::new(BearsDb::open(&db_path)?);
    let app = bears_api::router(db);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Magic happens on port {}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
