use std::sync::Arc;

use mediafetch::backend::{AppState, create_router};
use mediafetch::config;
use mediafetch::engine::MediaEngine;
use mediafetch::jobs::JobRegistry;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    mediafetch::init_tracing();

    let config = config::config();
    config.prepare_dirs()?;

    let engine: Arc<dyn MediaEngine> = Arc::new(config.engine.engine());
    let jobs = JobRegistry::new(engine, &config.video_dir, config.job_policy());

    if config.search.api_key.is_none() {
        tracing::warn!("API_KEY is not set, image search will fail until it is provided");
    }
    let images = config.search.fetcher()?;

    let state = AppState {
        jobs: Arc::new(jobs),
        images: Arc::new(images),
        image_dir: config.image_dir.clone(),
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.host).await?;
    tracing::info!("Listening on: http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
