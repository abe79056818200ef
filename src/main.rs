use std::sync::Arc;

use anyhow::Context;
use caption_server::{
    imagegen::ImageGenerator, router, AppState, CaptionService, CaptionModel, Config,
    ModelLoader,
};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    // after dotenv so RUST_LOG in .env is honoured
    init_tracing();
    match dotenv {
        Ok(path) => info!(".env read successfully from {}", path.display()),
        Err(e) => warn!("Could not load .env file: {e}"),
    }

    let config = Config::parse();

    let model = match ModelLoader::from_config(&config).load().await {
        Ok(model) => model,
        Err(e) => {
            error!("refusing to serve without a model: {}", e);
            return Err(e).context("failed to load captioning model");
        }
    };
    info!(signature = model.signature(), "captioning model loaded");

    let captioner = CaptionService::new(Arc::new(model), config.request_timeout())
        .serialized(config.serialize_inference);

    let generator = config
        .openai_api_key
        .as_ref()
        .map(|key| ImageGenerator::new(key, &config.openai_base_url));
    if generator.is_none() {
        warn!("OPENAI_API_KEY is not set, /generate-image is disabled");
    }

    let app = router(
        AppState {
            captioner,
            generator,
        },
        &config.http(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!("Server running on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caption_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(true))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
