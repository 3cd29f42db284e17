use std::net::SocketAddr;

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_echo=debug,tower_http=debug".into()),
        )
        .init();

    let port: u16 = std::env::var("STREAM_ECHO_PORT")
        .unwrap_or_else(|_| "1337".into())
        .parse()?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Stream echo listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, stream_echo::router()).await?;

    Ok(())
}
