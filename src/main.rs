mod classifier;
mod config;
mod error;
mod handlers;
mod models;
mod staging;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::classifier::ProcessClassifier;
use crate::config::GatewayConfig;
use crate::handlers::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env()?;
    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!("could not create upload directory {}", config.upload_dir.display())
    })?;

    let state = web::Data::new(AppState {
        classifier: Arc::new(ProcessClassifier::from_config(&config)),
        upload_dir: config.upload_dir.clone(),
        retain_uploads: config.retain_uploads,
        public_base_url: config.public_base_url.clone(),
    });

    tracing::info!(
        bind = %config.bind,
        port = config.port,
        upload_dir = %config.upload_dir.display(),
        classifier = %config.classifier_program,
        retain_uploads = config.retain_uploads,
        "server running on http://{}:{}",
        config.bind,
        config.port
    );

    let allowed_origin = config.allowed_origin.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&allowed_origin)
            .allow_any_method()
            .allow_any_header();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(handlers::routes(state.clone()))
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
