use actix_web::{middleware, web, App, HttpServer};
use log::{error, info, warn};
use std::path::Path;

use file_drop::api;
use file_drop::app_state::AppState;
use file_drop::config::AppConfig;

fn init_logging(config_file: &str) {
    if Path::new(config_file).exists() {
        match log4rs::init_file(config_file, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Failed to load {}: {}, falling back to env_logger", config_file, e),
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::load().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    init_logging(&config.logging.config_file);

    let state = AppState::from_config(config).map_err(std::io::Error::other)?;
    match state.service.reconcile() {
        Ok(removed) if removed > 0 => warn!("Startup reconcile removed {} leftover blobs", removed),
        Ok(_) => {}
        Err(e) => error!("Startup reconcile failed: {}", e),
    }
    let worker = state.start_expiry_worker();

    let server = state.config.server.clone();
    info!("Starting server on {}:{}", server.host, server.port);

    let payload_limit = server.max_payload_size as usize;
    let data = web::Data::new(state.clone());
    let result = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(web::PayloadConfig::default().limit(payload_limit))
            .app_data(data.clone())
            .configure(api::configure)
    })
    .workers(server.workers)
    .bind((server.host.as_str(), server.port))?
    .run()
    .await;

    info!("Server stopped, shutting down background tasks");
    state.shutdown.cancel();
    if let Some(worker) = worker {
        if let Err(e) = worker.await {
            error!("Expiry worker ended abnormally: {}", e);
        }
    }
    result
}
