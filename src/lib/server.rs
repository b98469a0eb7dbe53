use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{
    config::Config,
    error::{QuestionError, Result},
    ident::UuidGenerator,
    model::{EventData, Question},
    store::{QuestionManager, QuestionStore},
};

#[derive(Clone)]
struct AppState {
    manager: Arc<dyn QuestionManager>,
    list_page_size: usize,
    page_limit: usize,
}

pub async fn run(config: Config) -> Result<()> {
    config.ensure_data_dir()?;
    let store = QuestionStore::open(config.questions_path(), Box::new(UuidGenerator))?;
    let state = AppState {
        manager: Arc::new(store),
        list_page_size: config.list_page_size,
        page_limit: config.page_limit,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/questions", get(list_questions).post(create_question))
        .route(
            "/questions/{key}",
            get(get_question)
                .put(update_question)
                .delete(delete_question),
        )
        .route("/questions/{key}/history", get(question_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting answerdb server on {addr}");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| QuestionError::Storage(err.to_string()))?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
}

#[derive(Serialize)]
struct QuestionResponse {
    key: String,
    value: String,
}

impl From<Question> for QuestionResponse {
    fn from(question: Question) -> Self {
        Self {
            key: question.key,
            value: question.value,
        }
    }
}

#[derive(Deserialize)]
struct CreateQuestionRequest {
    key: String,
    value: String,
}

async fn create_question(
    State(state): State<AppState>,
    Json(request): Json<CreateQuestionRequest>,
) -> Result<(StatusCode, Json<QuestionResponse>)> {
    let manager = Arc::clone(&state.manager);
    let question = tokio::task::spawn_blocking(move || {
        manager.new_question(&request.key, &request.value)
    })
    .await
    .map_err(|err| QuestionError::Storage(format!("failed to create question: {err}")))??;

    Ok((StatusCode::CREATED, Json(question.into())))
}

#[derive(Deserialize, Default)]
struct ListQuery {
    #[serde(default)]
    skip: Option<usize>,
    #[serde(default)]
    take: Option<usize>,
}

async fn list_questions(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<QuestionResponse>>> {
    let skip = params.skip.unwrap_or(0);
    let mut take = params.take.unwrap_or(state.list_page_size);
    if take == 0 {
        return Ok(Json(Vec::new()));
    }
    if take > state.page_limit {
        take = state.page_limit;
    }

    let manager = Arc::clone(&state.manager);
    let questions = tokio::task::spawn_blocking(move || manager.list())
        .await
        .map_err(|err| QuestionError::Storage(format!("failed to list questions: {err}")))??;

    let page = questions
        .into_iter()
        .skip(skip)
        .take(take)
        .map(QuestionResponse::from)
        .collect();
    Ok(Json(page))
}

async fn get_question(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<QuestionResponse>> {
    let manager = Arc::clone(&state.manager);
    let question = tokio::task::spawn_blocking(move || manager.get(&key))
        .await
        .map_err(|err| QuestionError::Storage(format!("failed to load question: {err}")))??;

    Ok(Json(question.into()))
}

#[derive(Deserialize)]
struct UpdateQuestionRequest {
    value: String,
}

async fn update_question(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<UpdateQuestionRequest>,
) -> Result<Json<QuestionResponse>> {
    let manager = Arc::clone(&state.manager);
    let question = tokio::task::spawn_blocking(move || manager.update(&key, &request.value))
        .await
        .map_err(|err| QuestionError::Storage(format!("failed to update question: {err}")))??;

    Ok(Json(question.into()))
}

async fn delete_question(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode> {
    let manager = Arc::clone(&state.manager);
    tokio::task::spawn_blocking(move || manager.delete(&key))
        .await
        .map_err(|err| QuestionError::Storage(format!("failed to delete question: {err}")))??;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct HistoryEntry {
    event: &'static str,
    data: EventData,
}

async fn question_history(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>> {
    let manager = Arc::clone(&state.manager);
    let history = tokio::task::spawn_blocking(move || manager.history(&key))
        .await
        .map_err(|err| QuestionError::Storage(format!("failed to load history: {err}")))??;

    // The log is stored oldest first; the API renders newest first.
    let entries = history
        .iter()
        .rev()
        .map(|event| HistoryEntry {
            event: event.short_name(),
            data: event.data(),
        })
        .collect();
    Ok(Json(entries))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
