#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mercora_observability::init();

    let pool = mercora_infra::db::connect_from_env().await?;
    let app = mercora_api::app::build_app(pool);

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
