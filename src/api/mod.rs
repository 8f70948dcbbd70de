use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::AnalysisError;
use crate::models::{
    AnalysisReport, ApiResponse, MatchInfo, MatchSource, Selection, TeamRoster, REQUIRED_COLUMNS,
};
use crate::services::{
    catalog, parse_document, render::EXPORT_FILENAME, rosters, validate, AnalysisPipeline,
};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<AnalysisPipeline>,
}

pub async fn serve(port: u16) -> anyhow::Result<()> {
    let app = create_router(AnalysisPipeline::new());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("PitchView API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router(pipeline: AnalysisPipeline) -> Router {
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/matches", get(list_matches_handler))
        .route("/matches/{id}/teams", get(match_teams_handler))
        .route("/analysis", post(analysis_handler))
        .route("/render", post(render_handler))
        .route("/upload/validate", post(validate_upload_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn status_for(err: &AnalysisError) -> StatusCode {
    match err {
        AnalysisError::DataUnavailable(_) => StatusCode::BAD_GATEWAY,
        AnalysisError::NoEventsForPlayer { .. } => StatusCode::NOT_FOUND,
        AnalysisError::MalformedInput(_)
        | AnalysisError::MissingColumns(_)
        | AnalysisError::InsufficientData { .. }
        | AnalysisError::UnknownOutcome { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn error_response(err: AnalysisError) -> ApiError {
    tracing::error!("Selection cycle failed ({}): {}", err.kind(), err);
    (status_for(&err), Json(ApiResponse::error(err.to_string(), err.kind())))
}

// Health check endpoint
async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("PitchView API is running"))
}

// GET /matches - Known matches for the selector
async fn list_matches_handler() -> Json<ApiResponse<Vec<MatchInfo>>> {
    Json(ApiResponse::success(catalog()))
}

// GET /matches/{id}/teams - Teams of a match and their players
async fn match_teams_handler(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<TeamRoster>>>, ApiError> {
    let source = MatchSource::MatchId { id: match_id };
    match state.pipeline.rosters(&source).await {
        Ok(rosters) => Ok(Json(ApiResponse::success(rosters))),
        Err(e) => Err(error_response(e)),
    }
}

// POST /analysis - Derived primitives and metrics for a selection
async fn analysis_handler(
    State(state): State<AppState>,
    Json(selection): Json<Selection>,
) -> Result<Json<ApiResponse<AnalysisReport>>, ApiError> {
    match state.pipeline.report(&selection).await {
        Ok(report) => Ok(Json(ApiResponse::success(report))),
        Err(e) => Err(error_response(e)),
    }
}

// POST /render - PNG export of a selection
async fn render_handler(
    State(state): State<AppState>,
    Json(selection): Json<Selection>,
) -> Response {
    match state.pipeline.render(&selection).await {
        Ok((report, png)) => {
            tracing::info!("Exported {} for {}", EXPORT_FILENAME, report.player);
            (
                [
                    (header::CONTENT_TYPE, "image/png".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", EXPORT_FILENAME),
                    ),
                ],
                png,
            )
                .into_response()
        }
        Err(e) => match e.downcast::<AnalysisError>() {
            Ok(err) => error_response(err).into_response(),
            Err(other) => {
                tracing::error!("Failed to render figure: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::<()>::error(other.to_string(), "render_failed")),
                )
                    .into_response()
            }
        },
    }
}

// POST /upload/validate - Check an uploaded event file before selecting from it
#[derive(Serialize)]
struct UploadSummary {
    rows: usize,
    columns: BTreeSet<String>,
    teams: Vec<TeamRoster>,
}

async fn validate_upload_handler(
    Json(document): Json<serde_json::Value>,
) -> Result<Json<ApiResponse<UploadSummary>>, ApiError> {
    let table = parse_document(document).map_err(error_response)?;
    validate(&table, &REQUIRED_COLUMNS).map_err(error_response)?;

    Ok(Json(ApiResponse::success(UploadSummary {
        rows: table.len(),
        teams: rosters(&table),
        columns: table.columns().clone(),
    })))
}
