use actix_web::{web, HttpResponse, Responder};

use crate::AppState;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health_check)));
    cfg.service(web::resource("/api/version").route(web::get().to(get_version)));
    cfg.service(web::resource("/api/health/config").route(web::get().to(get_config_status)));
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": VERSION
    }))
}

async fn get_version() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "version": VERSION
    }))
}

/// Which external services are configured; never echoes secrets
async fn get_config_status(state: web::Data<AppState>) -> impl Responder {
    let config = &state.config;
    HttpResponse::Ok().json(serde_json::json!({
        "anthropic_configured": config.api_key_configured(),
        "search_configured": config.google_api_key.is_some() && config.google_cse_id.is_some(),
        "model": config.model,
        "data_dir": config.data_dir.display().to_string(),
        "session_table": config.session_table,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::playground::Playground;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_health_and_config_status() {
        let state = web::Data::new(AppState {
            config: Config {
                anthropic_api_key: "sk-secret".to_string(),
                ..Default::default()
            },
            playground: Arc::new(Playground::new(vec![])),
        });
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], VERSION);

        let req = test::TestRequest::get().uri("/api/health/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["anthropic_configured"], true);
        assert_eq!(body["search_configured"], false);
        assert!(!body.to_string().contains("sk-secret"));
    }
}
