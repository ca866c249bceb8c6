//! HTTP API server for integration with other systems.
//!
//! Handlers only translate between JSON and the engine handle.

use crate::chunking::stitch;
use crate::cli::Output;
use crate::config::Settings;
use crate::error::SvarError;
use crate::orchestrator::{AnswerStatus, Orchestrator, QueryRequest, SourceSummary};
use crate::rag::Citation;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
}

/// Build the API router around one engine handle.
pub fn router(orchestrator: Orchestrator) -> Router {
    let state = Arc::new(AppState { orchestrator });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/system-info", get(system_info))
        .route("/videos", get(list_videos))
        .route("/videos/{source_id}", get(get_video))
        .route("/query", post(query))
        .route("/search", post(search))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP API server.
pub async fn run_serve(host: &str, port: u16, settings: Settings) -> anyhow::Result<()> {
    let app = router(Orchestrator::new(settings)?);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Svar API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("System info", "GET  /system-info");
    Output::kv("List videos", "GET  /videos");
    Output::kv("Get video", "GET  /videos/:source_id");
    Output::kv("Query (RAG)", "POST /query");
    Output::kv("Search", "POST /search");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct QueryBody {
    #[serde(alias = "query_text")]
    query: String,
    #[serde(default)]
    n_results: Option<usize>,
    #[serde(default)]
    n_course_recs: Option<usize>,
}

#[derive(Serialize)]
struct QueryResponse {
    query: String,
    answer: Option<String>,
    #[serde(flatten)]
    status: AnswerStatus,
    citations: Vec<Citation>,
    courses: Vec<CourseInfo>,
}

#[derive(Serialize)]
struct CourseInfo {
    name: Option<String>,
    url: Option<String>,
    relevance: f32,
}

#[derive(Deserialize)]
struct SearchBody {
    #[serde(alias = "query_text")]
    query: String,
    #[serde(default = "default_limit", alias = "n_results")]
    limit: usize,
}

fn default_limit() -> usize {
    5
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Serialize)]
struct SearchResult {
    source_id: String,
    title: String,
    url: Option<String>,
    sequence_index: u32,
    start_offset: usize,
    end_offset: usize,
    content: String,
    relevance: f32,
}

#[derive(Serialize)]
struct VideoListResponse {
    videos: Vec<SourceSummary>,
    total: usize,
}

#[derive(Serialize)]
struct VideoDetailResponse {
    source_id: String,
    title: Option<String>,
    url: Option<String>,
    chunk_count: usize,
    text: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Map an engine error to an HTTP response.
fn error_response(e: SvarError) -> Response {
    let status = match &e {
        SvarError::MalformedInput(_) => StatusCode::BAD_REQUEST,
        SvarError::IndexNotReady => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", e);
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

// === Handlers ===

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "svar",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn system_info(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e),
    }
}

async fn query(State(state): State<Arc<AppState>>, Json(body): Json<QueryBody>) -> Response {
    let defaults = &state.orchestrator.settings().retrieval;
    let request = QueryRequest::new(
        body.query,
        body.n_results.unwrap_or(defaults.n_results),
        body.n_course_recs.unwrap_or(defaults.n_course_recs),
    );

    match state.orchestrator.ask(&request).await {
        Ok(result) => Json(QueryResponse {
            query: request.query_text,
            answer: result.answer_text,
            status: result.status,
            citations: result.citations,
            courses: result
                .course_recommendations
                .into_iter()
                .map(|hit| CourseInfo {
                    relevance: hit.relevance(),
                    name: hit.item.name,
                    url: hit.item.url,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn search(State(state): State<Arc<AppState>>, Json(body): Json<SearchBody>) -> Response {
    match state.orchestrator.search(&body.query, body.limit).await {
        Ok(hits) => Json(SearchResponse {
            results: hits
                .into_iter()
                .map(|hit| {
                    let relevance = hit.relevance();
                    let chunk = hit.item;
                    SearchResult {
                        title: chunk.display_label(),
                        source_id: chunk.source_id,
                        url: chunk.url,
                        sequence_index: chunk.sequence_index,
                        start_offset: chunk.start_offset,
                        end_offset: chunk.end_offset,
                        content: chunk.text,
                        relevance,
                    }
                })
                .collect(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_videos(State(state): State<Arc<AppState>>) -> Response {
    match state.orchestrator.list_sources().await {
        Ok(videos) => Json(VideoListResponse {
            total: videos.len(),
            videos,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_video(State(state): State<Arc<AppState>>, Path(source_id): Path<String>) -> Response {
    match state.orchestrator.passages(&source_id).await {
        Ok(passages) if passages.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Video not found: {}", source_id),
            }),
        )
            .into_response(),
        Ok(passages) => Json(VideoDetailResponse {
            title: passages[0].title.clone(),
            url: passages[0].url.clone(),
            chunk_count: passages.len(),
            text: stitch(&passages),
            source_id,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::TranscriptSource;
    use crate::test_util::{test_engine, StubLanguageModel};
    use serde_json::Value;

    fn state(llm: StubLanguageModel) -> Arc<AppState> {
        let (orchestrator, _embedder) = test_engine(Arc::new(llm));
        Arc::new(AppState { orchestrator })
    }

    async fn ingest(state: &AppState) {
        state
            .orchestrator
            .ingest_source(&TranscriptSource {
                id: "gd".to_string(),
                title: Some("Gradient Descent".to_string()),
                url: None,
                text: "Gradient descent follows the negative gradient of the loss.".to_string(),
            })
            .await
            .unwrap();
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_query_on_empty_index_is_503() {
        let state = state(StubLanguageModel::replying("unused"));
        let response = query(
            State(state),
            Json(QueryBody {
                query: "what is gradient descent".to_string(),
                n_results: None,
                n_course_recs: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_empty_query_is_400() {
        let state = state(StubLanguageModel::replying("unused"));
        ingest(&state).await;
        let response = search(
            State(state),
            Json(SearchBody {
                query: " ".to_string(),
                limit: 5,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_returns_answer_and_citations() {
        let state = state(StubLanguageModel::replying("It follows the gradient [1]."));
        ingest(&state).await;

        let response = query(
            State(state),
            Json(QueryBody {
                query: "gradient descent".to_string(),
                n_results: Some(2),
                n_course_recs: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["answer"], "It follows the gradient [1].");
        assert_eq!(body["citations"][0]["source_id"], "gd");
        assert_eq!(body["courses"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_degraded_query_is_still_ok() {
        let state = state(StubLanguageModel::failing());
        ingest(&state).await;

        let response = query(
            State(state),
            Json(QueryBody {
                query: "gradient descent".to_string(),
                n_results: None,
                n_course_recs: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "degraded");
        assert!(body["answer"].is_null());
        assert!(body["reason"].is_string());
    }

    #[tokio::test]
    async fn test_videos_and_video_detail() {
        let state = state(StubLanguageModel::replying("ok"));
        ingest(&state).await;

        let body = json_body(list_videos(State(state.clone())).await).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["videos"][0]["source_id"], "gd");

        let response = get_video(State(state.clone()), Path("gd".to_string())).await;
        let body = json_body(response).await;
        assert_eq!(
            body["text"],
            "Gradient descent follows the negative gradient of the loss."
        );

        let response = get_video(State(state), Path("missing".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search_accepts_n_results() {
        let body: SearchBody =
            serde_json::from_value(serde_json::json!({ "query_text": "loss", "n_results": 9 }))
                .unwrap();
        assert_eq!(body.query, "loss");
        assert_eq!(body.limit, 9);

        let body: SearchBody = serde_json::from_value(serde_json::json!({ "query": "loss" })).unwrap();
        assert_eq!(body.limit, 5);
    }

    #[tokio::test]
    async fn test_system_info() {
        let state = state(StubLanguageModel::replying("ok"));
        let body = json_body(system_info(State(state)).await).await;
        assert_eq!(body["state"], "uninitialized");
        assert_eq!(body["transcript_chunks"], 0);
    }
}
