use trainhub::{build_router, config, db, sheets, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trainhub=info,tower_http=info".into()),
        )
        .init();

    let config = config::Config::from_env()?;

    let store = sheets::connect(&config).await?;
    db::ensure_worksheets(store.as_ref()).await?;
    tracing::info!("Spreadsheet backend ready ({})", store.backend_tag());

    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(AppState::new(store, config));

    tracing::info!("trainhub listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
