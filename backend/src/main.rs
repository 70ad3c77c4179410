mod classify;
mod config;
mod detection;
mod error;
mod models;
mod prediction;
mod routes;
mod storage;
mod taxonomy;

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use config::AppConfig;
use models::Models;
use routes::configure_routes;
use std::env;
use storage::upload_store::UploadStore;
use taxonomy::Catalog;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let catalog = Catalog::new();
    for taxonomy in [&catalog.detector, &catalog.tabular, &catalog.weekly] {
        if taxonomy.is_empty() {
            log::warn!("The {} pest table is empty", taxonomy.kind());
        } else {
            log::info!("The {} pest table has {} entries", taxonomy.kind(), taxonomy.len());
        }
    }

    let models = web::Data::new(Models::load(&config, &catalog));
    for (name, status) in models.status() {
        match &status.reason {
            None => log::info!("Model {} loaded", name),
            Some(reason) => log::warn!("Model {} unavailable: {}", name, reason),
        }
    }

    let catalog = web::Data::new(catalog);

    let uploads = UploadStore::new(&config.uploads);
    uploads.ensure_dir()?;
    log::info!("Uploads are stored in {}", uploads.dir().display());
    let uploads = web::Data::new(uploads);

    std::fs::create_dir_all(&config.runs_dir)?;
    let runs_dir = config.runs_dir.clone();
    let cors_config = config.cors.clone();

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        let cors_config = cors_config.clone();
        App::new()
            .wrap(
                Cors::default()
                    .allowed_origin_fn(move |origin, _req| {
                        origin
                            .to_str()
                            .is_ok_and(|origin| cors_config.is_allowed(origin))
                    })
                    .supports_credentials()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        header::AUTHORIZATION,
                        header::ACCEPT,
                        header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(models.clone())
            .app_data(catalog.clone())
            .app_data(uploads.clone())
            .configure(|cfg| configure_routes(cfg, runs_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
