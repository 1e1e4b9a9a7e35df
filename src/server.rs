use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::Result;
use askama::Template;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures::stream::Stream;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::chat::{chunk_answer, ChatService};
use crate::config::AppConfig;
use crate::db::Database;
use crate::models::{ChatRequest, PatentBindingView, SessionRequest, SessionResponse};

#[derive(Clone)]
struct AppState {
    db: Database,
    chat: ChatService,
}

pub async fn run_server(config: AppConfig, db: Database, chat_service: ChatService) -> Result<()> {
    tokio::fs::create_dir_all(&config.data_dir).await?;

    let state = AppState {
        db,
        chat: chat_service,
    };

    let app = Router::new()
        .route("/", get(index_page))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/session", post(create_session))
        .route("/api/session/:session_id/patent", get(get_patent_binding))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let session_id = state.db.create_session().await.map_err(ApiError::from)?;

    let template = IndexTemplate { session_id };
    let body = template.render().map_err(ApiError::from)?;

    Ok(Html(body))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<crate::models::ChatAnswer>, ApiError> {
    let answer = state.chat.answer(request).await?;
    Ok(Json(answer))
}

/// Delivers the completed answer as fixed-size SSE fragments for incremental
/// display, followed by a terminal `done` event.
async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let answer = state.chat.answer(request).await?;
    let chunks = chunk_answer(&answer.answer, state.chat.stream_chunk_chars());

    let events = chunks
        .into_iter()
        .map(|chunk| Ok::<_, Infallible>(Event::default().event("delta").data(chunk)))
        .chain(std::iter::once(Ok(Event::default().event("done").data(""))));

    Ok(Sse::new(futures::stream::iter(events)).keep_alive(KeepAlive::default()))
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    if request.reset.unwrap_or(false) {
        if let Some(session_id) = request.session_id {
            state.db.ensure_session(&session_id).await?;
            state.db.delete_session_messages(&session_id).await?;
            return Ok(Json(SessionResponse { session_id }));
        }
    }

    let session_id = state.db.create_session().await?;
    Ok(Json(SessionResponse { session_id }))
}

async fn get_patent_binding(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<PatentBindingView>, ApiError> {
    match state.chat.binding_view(&session_id).await {
        Some(view) => Ok(Json(view)),
        None => Err(ApiError::not_found(format!(
            "no patent record bound for session: {}",
            session_id
        ))),
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    session_id: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl From<askama::Error> for ApiError {
    fn from(value: askama::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
