use anyhow::Result;
use clap::Parser;
use mirror_note::{AppState, Config, Database, HttpAssessmentProcessor, HttpIdentityProvider};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "mirror-note", about = "Voice assessment platform API")]
struct Args {
    /// Configuration file, without extension
    #[arg(long, default_value = "config/mirror-note")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Mirror Note v0.1.0");
    info!("Loaded config: {}", cfg.service.name);

    let db = Database::open(&cfg.database.path)?;
    let identity = Arc::new(HttpIdentityProvider::new(cfg.auth.identity_endpoint.clone())?);
    let processor = Arc::new(HttpAssessmentProcessor::new(
        cfg.assessment.processor_endpoint.clone(),
    )?);
    let state = AppState::new(
        db,
        identity,
        processor,
        chrono::Duration::days(cfg.auth.session_ttl_days),
    );

    let app = mirror_note::create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
