use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::db::{SqliteStorage, StorageError, WorkflowSession};
use crate::workflow::{RunStatus, StageDescriptor, Workflow, WorkflowError};
use crate::AppState;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RunWorkflowRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
struct WorkflowSummary {
    workflow_id: String,
    name: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    session_id: String,
    session_name: Option<String>,
    user_id: Option<String>,
    run_count: usize,
    /// Input of the first run, for list views
    title: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<&WorkflowSession> for SessionSummary {
    fn from(session: &WorkflowSession) -> Self {
        SessionSummary {
            session_id: session.session_id.clone(),
            session_name: session.session_name.clone(),
            user_id: session.user_id.clone(),
            run_count: session.runs.len(),
            title: session
                .runs
                .first()
                .map(|r| crate::util::truncate(&r.input, 100)),
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
        }
    }
}

fn summary(workflow: &Workflow) -> WorkflowSummary {
    WorkflowSummary {
        workflow_id: workflow.workflow_id().to_string(),
        name: workflow.name().to_string(),
        description: workflow.description().to_string(),
    }
}

fn not_found(message: String) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": message }))
}

fn find_workflow(state: &AppState, workflow_id: &str) -> Result<Arc<Workflow>, HttpResponse> {
    state
        .playground
        .workflow(workflow_id)
        .ok_or_else(|| not_found(format!("Workflow '{}' not found", workflow_id)))
}

fn find_storage(workflow: &Workflow) -> Result<&Arc<SqliteStorage>, HttpResponse> {
    workflow
        .storage()
        .ok_or_else(|| not_found(format!("Workflow '{}' has no session storage", workflow.workflow_id())))
}

/// Session lookup that also checks the session belongs to this workflow
fn find_session(storage: &SqliteStorage, workflow_id: &str, session_id: &str) -> Result<WorkflowSession, HttpResponse> {
    match storage.get_session(session_id) {
        Ok(Some(session)) if session.workflow_id == workflow_id => Ok(session),
        Ok(_) => Err(not_found(format!("Session '{}' not found", session_id))),
        Err(e) => {
            log::error!("Failed to load session {}: {}", session_id, e);
            Err(HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            })))
        }
    }
}

async fn status(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "playground": "available",
        "app_id": state.playground.app_id,
        "name": state.playground.name,
        "description": state.playground.description,
    }))
}

async fn list_workflows(state: web::Data<AppState>) -> impl Responder {
    let workflows: Vec<WorkflowSummary> = state
        .playground
        .workflows()
        .iter()
        .map(|w| summary(w))
        .collect();
    HttpResponse::Ok().json(workflows)
}

async fn get_workflow(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let workflow = match find_workflow(&state, &path) {
        Ok(w) => w,
        Err(resp) => return resp,
    };

    let stages: Vec<StageDescriptor> = workflow.stage_descriptors();
    let agents: Vec<_> = workflow.agents().iter().map(|a| a.descriptor()).collect();
    HttpResponse::Ok().json(serde_json::json!({
        "workflow_id": workflow.workflow_id(),
        "name": workflow.name(),
        "description": workflow.description(),
        "stages": stages,
        "agents": agents,
        "storage": workflow.storage().map(|s| serde_json::json!({
            "table_name": s.table_name(),
            "mode": s.mode(),
        })),
    }))
}

async fn run_workflow(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<RunWorkflowRequest>,
) -> impl Responder {
    let workflow = match find_workflow(&state, &path) {
        Ok(w) => w,
        Err(resp) => return resp,
    };

    let message = body.message.trim();
    if message.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Message cannot be empty"
        }));
    }

    match workflow
        .run(message, body.session_id.as_deref(), body.user_id.as_deref())
        .await
    {
        Ok(run) => HttpResponse::Ok().json(run),
        Err(e @ WorkflowError::Storage(StorageError::WorkflowMismatch { .. })) => {
            log::warn!("Workflow {} rejected run: {}", workflow.workflow_id(), e);
            HttpResponse::Conflict().json(serde_json::json!({
                "error": e.to_string(),
            }))
        }
        Err(e) => {
            log::error!("Workflow {} failed: {}", workflow.workflow_id(), e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": e.to_string(),
                "status": RunStatus::Failed,
            }))
        }
    }
}

async fn list_sessions(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let workflow = match find_workflow(&state, &path) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let storage = match find_storage(&workflow) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match storage.list_sessions(workflow.workflow_id()) {
        Ok(sessions) => {
            let summaries: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from).collect();
            HttpResponse::Ok().json(summaries)
        }
        Err(e) => {
            log::error!("Failed to list sessions: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

async fn get_session(state: web::Data<AppState>, path: web::Path<(String, String)>) -> impl Responder {
    let (workflow_id, session_id) = path.into_inner();
    let workflow = match find_workflow(&state, &workflow_id) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let storage = match find_storage(&workflow) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match find_session(storage, &workflow_id, &session_id) {
        Ok(session) => HttpResponse::Ok().json(session),
        Err(resp) => resp,
    }
}

async fn rename_session(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<RenameSessionRequest>,
) -> impl Responder {
    let (workflow_id, session_id) = path.into_inner();
    let name = body.name.trim();
    if name.is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Name cannot be empty"
        }));
    }

    let workflow = match find_workflow(&state, &workflow_id) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let storage = match find_storage(&workflow) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if let Err(resp) = find_session(storage, &workflow_id, &session_id) {
        return resp;
    }

    match storage.rename_session(&session_id, name) {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "session_id": session_id,
            "session_name": name,
        })),
        Err(e) => {
            log::error!("Failed to rename session {}: {}", session_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

async fn delete_session(state: web::Data<AppState>, path: web::Path<(String, String)>) -> impl Responder {
    let (workflow_id, session_id) = path.into_inner();
    let workflow = match find_workflow(&state, &workflow_id) {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    let storage = match find_storage(&workflow) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    if let Err(resp) = find_session(storage, &workflow_id, &session_id) {
        return resp;
    }

    match storage.delete_session(&session_id) {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "session_id": session_id,
        })),
        Err(e) => {
            log::error!("Failed to delete session {}: {}", session_id, e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("Database error: {}", e)
            }))
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/playground")
            .route("/status", web::get().to(status))
            .route("/workflows", web::get().to(list_workflows))
            .route("/workflows/{id}", web::get().to(get_workflow))
            .route("/workflows/{id}/runs", web::post().to(run_workflow))
            .route("/workflows/{id}/sessions", web::get().to(list_sessions))
            .route("/workflows/{id}/sessions/{session_id}", web::get().to(get_session))
            .route("/workflows/{id}/sessions/{session_id}", web::delete().to(delete_session))
            .route(
                "/workflows/{id}/sessions/{session_id}/rename",
                web::post().to(rename_session),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::Agent;
    use crate::ai::{AiClient, AiResponse, MockAiClient};
    use crate::config::Config;
    use crate::playground::Playground;
    use crate::workflow::{Parallel, Step};
    use actix_web::{test, App};

    fn agent(name: &str, replies: usize) -> Arc<Agent> {
        let mock = MockAiClient::new((0..replies).map(|_| Ok(AiResponse::text(format!("{} says hi", name)))).collect());
        Arc::new(Agent::new(name, "role", AiClient::Mock(Arc::new(mock)), vec![], "help"))
    }

    fn state(replies: usize) -> web::Data<AppState> {
        let storage = Arc::new(SqliteStorage::open(":memory:", "nutri-ai_sessions").unwrap());
        let workflow = Workflow::builder("Nutri-AI")
            .description("test")
            .parallel(Parallel::new(
                "Gather",
                vec![
                    Step::new("CSV File Analysis Phase", agent("CsvTool Agent", replies)),
                    Step::new("Web Search Phase", agent("Web Agent", replies)),
                ],
            ))
            .step(Step::new("Response Generation Phase", agent("Reasoning Agent", replies)))
            .storage(storage)
            .build()
            .unwrap();
        web::Data::new(AppState {
            config: Config::default(),
            playground: Arc::new(Playground::new(vec![Arc::new(workflow)])),
        })
    }

    #[actix_web::test]
    async fn test_status_and_listing() {
        let app = test::init_service(App::new().app_data(state(0)).configure(config)).await;

        let req = test::TestRequest::get().uri("/v1/playground/status").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["playground"], "available");
        assert_eq!(body["app_id"], "nutri-ai");

        let req = test::TestRequest::get().uri("/v1/playground/workflows").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body[0]["workflow_id"], "nutri-ai");

        let req = test::TestRequest::get().uri("/v1/playground/workflows/nutri-ai").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["stages"][0]["type"], "parallel");
        assert_eq!(body["agents"].as_array().unwrap().len(), 3);
        assert_eq!(body["storage"]["mode"], "workflow_v2");
    }

    #[actix_web::test]
    async fn test_unknown_workflow_and_session_are_404() {
        let app = test::init_service(App::new().app_data(state(0)).configure(config)).await;

        let req = test::TestRequest::get().uri("/v1/playground/workflows/nope").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::get()
            .uri("/v1/playground/workflows/nutri-ai/sessions/missing")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::delete()
            .uri("/v1/playground/workflows/nutri-ai/sessions/missing")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_empty_message_is_400() {
        let app = test::init_service(App::new().app_data(state(0)).configure(config)).await;
        let req = test::TestRequest::post()
            .uri("/v1/playground/workflows/nutri-ai/runs")
            .set_json(serde_json::json!({"message": "   "}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_run_then_manage_session() {
        let app = test::init_service(App::new().app_data(state(1)).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/v1/playground/workflows/nutri-ai/runs")
            .set_json(serde_json::json!({"message": "chicken", "session_id": "s1"}))
            .to_request();
        let run: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(run["status"], "completed");
        assert_eq!(run["content"], "Reasoning Agent says hi");
        assert_eq!(run["step_results"].as_array().unwrap().len(), 3);

        let req = test::TestRequest::get()
            .uri("/v1/playground/workflows/nutri-ai/sessions")
            .to_request();
        let sessions: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(sessions[0]["session_id"], "s1");
        assert_eq!(sessions[0]["run_count"], 1);
        assert_eq!(sessions[0]["title"], "chicken");

        let req = test::TestRequest::post()
            .uri("/v1/playground/workflows/nutri-ai/sessions/s1/rename")
            .set_json(serde_json::json!({"name": "Chicken"}))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::get()
            .uri("/v1/playground/workflows/nutri-ai/sessions/s1")
            .to_request();
        let session: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(session["session_name"], "Chicken");
        assert_eq!(session["runs"][0]["input"], "chicken");

        let req = test::TestRequest::delete()
            .uri("/v1/playground/workflows/nutri-ai/sessions/s1")
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());
    }

    #[actix_web::test]
    async fn test_failed_run_is_500_with_error() {
        // no scripted replies: every model call fails
        let app = test::init_service(App::new().app_data(state(0)).configure(config)).await;
        let req = test::TestRequest::post()
            .uri("/v1/playground/workflows/nutri-ai/runs")
            .set_json(serde_json::json!({"message": "chicken"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("Gather"));
    }

    #[actix_web::test]
    async fn test_run_on_foreign_session_is_409() {
        let state = state(1);
        let storage = state.playground.workflow("nutri-ai").unwrap().storage().unwrap().clone();
        let mut foreign = crate::workflow::WorkflowRun::new("s9", "other-flow", "tofu");
        foreign.complete("x".to_string());
        storage.append_run("Other Flow", None, &foreign).unwrap();

        let app = test::init_service(App::new().app_data(state).configure(config)).await;
        let req = test::TestRequest::post()
            .uri("/v1/playground/workflows/nutri-ai/runs")
            .set_json(serde_json::json!({"message": "chicken", "session_id": "s9"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 409);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("other-flow"));
    }
}
