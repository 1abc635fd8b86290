use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

use nutri_backend::config::Config;
use nutri_backend::context::AppContext;
use nutri_backend::controllers;
use nutri_backend::db::SqliteStorage;
use nutri_backend::playground::Playground;
use nutri_backend::workflow::build_nutri_workflow;
use nutri_backend::AppState;

fn startup_error(what: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", what, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let host = config.host.clone();
    let port = config.port;

    log::info!(
        "Initializing session storage at {} (table {})",
        config.database_url,
        config.session_table
    );
    let storage = SqliteStorage::open(&config.database_url, &config.session_table)
        .map_err(|e| startup_error("Failed to initialize session storage", e))?;

    log::info!("Creating agents (model {})", config.model);
    let context = AppContext::new(config.clone())
        .map_err(|e| startup_error("Failed to create agents", e))?;

    let workflow = build_nutri_workflow(&context, Some(Arc::new(storage)))
        .map_err(|e| startup_error("Failed to build workflow", e))?;
    log::info!(
        "Workflow '{}' ready with {} stages",
        workflow.name(),
        workflow.stages().len()
    );

    let playground = Arc::new(Playground::new(vec![Arc::new(workflow)]));

    log::info!("Starting Nutri-AI playground on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                config: config.clone(),
                playground: Arc::clone(&playground),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::playground::config)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
