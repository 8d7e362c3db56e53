use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::db::models::{OddsSnapshot, RepredictionAttempt, ValidatedOutcome};
use crate::db::Database;
use crate::engine::evaluation::{compare, evaluate, CalibrationComparison, EvaluationReport};
use crate::engine::line_movement::{
    consensus_snapshot, decide_reprediction, significance, LineMovement,
    MonitorSettings, RepredictionDecision, RepredictionHistory, Significance,
};
use crate::engine::normalize::normalize_event;
use crate::engine::refit::{refit, RefitDecision};
use crate::engine::sport::Sport;
use crate::engine::types::BookmakerOdds;
use crate::engine::{
    analyze_event, AnalysisError, CalibrationHandle, EngineSettings, EventAnalysis, EventInput,
    ModelPrediction, RecalibrationParams,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub calibration: CalibrationHandle,
    pub settings: EngineSettings,
    pub monitor: MonitorSettings,
    pub calibration_min_samples: usize,
}

type ApiError = (StatusCode, String);

fn internal(e: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Build the Axum router for the JSON API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze_handler))
        .route("/api/analyze/batch", post(batch_handler))
        .route(
            "/api/events/:id/prediction",
            get(get_prediction_handler).put(put_prediction_handler),
        )
        .route("/api/events/:id/snapshots", post(snapshot_handler).get(list_snapshots_handler))
        .route("/api/events/:id/movement", get(movement_handler))
        .route("/api/events/:id/repredictions", post(reprediction_handler))
        .route("/api/outcomes", post(outcome_handler))
        .route("/api/evaluation", get(evaluation_handler))
        .route("/api/recalibration", get(recalibration_handler))
        .route("/api/recalibration/refit", post(refit_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

// ── Analysis ──────────────────────────────────────────────────────────────────

/// Analyse one event against the active calibration. Blocking: touches the database.
fn analyze_one(state: &AppState, input: &EventInput) -> Result<EventAnalysis, AnalysisError> {
    let stored = if input.prediction.is_none() {
        match state.db.get_prediction(&input.event_id) {
            Ok(p) => p.map(|s| s.prediction),
            Err(e) => {
                warn!("{}: could not load stored prediction: {}", input.event_id, e);
                None
            }
        }
    } else {
        None
    };
    let params = state.calibration.current();
    analyze_event(input, stored.as_ref(), &params, &state.settings)
}

fn analysis_status(e: &AnalysisError) -> StatusCode {
    match e {
        AnalysisError::MissingPrediction { .. } => StatusCode::NOT_FOUND,
        AnalysisError::InvalidPrediction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// POST /api/analyze
async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<EventInput>,
) -> Result<impl IntoResponse, ApiError> {
    analyze_one(&state, &input)
        .map(Json)
        .map_err(|e| (analysis_status(&e), e.to_string()))
}

#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<EventAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/analyze/batch
///
/// Events are independent; each runs on the blocking pool and a failure is
/// reported in its own slot.
async fn batch_handler(
    State(state): State<Arc<AppState>>,
    Json(inputs): Json<Vec<EventInput>>,
) -> Json<Vec<BatchItem>> {
    let tasks = inputs.into_iter().map(|input| {
        let state = state.clone();
        tokio::task::spawn_blocking(move || {
            let result = analyze_one(&state, &input);
            (input.event_id, result)
        })
    });
    let items = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok((event_id, Ok(analysis))) => BatchItem {
                event_id,
                analysis: Some(analysis),
                error: None,
            },
            Ok((event_id, Err(e))) => {
                warn!("Batch analysis failed: {}", e);
                BatchItem {
                    event_id,
                    analysis: None,
                    error: Some(e.to_string()),
                }
            }
            Err(e) => BatchItem {
                event_id: String::new(),
                analysis: None,
                error: Some(format!("analysis task failed: {}", e)),
            },
        })
        .collect::<Vec<_>>();
    info!(
        "Batch analysed {} event(s), {} failed",
        items.len(),
        items.iter().filter(|i| i.error.is_some()).count()
    );
    Json(items)
}

// ── Predictions ───────────────────────────────────────────────────────────────

/// GET /api/events/:id/prediction
async fn get_prediction_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.db.get_prediction(&event_id).map_err(internal)? {
        Some(p) => Ok(Json(p)),
        None => Err((StatusCode::NOT_FOUND, format!("no prediction for {}", event_id))),
    }
}

/// PUT /api/events/:id/prediction
async fn put_prediction_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(prediction): Json<ModelPrediction>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .upsert_prediction(&event_id, &prediction)
        .map(Json)
        .map_err(internal)
}

// ── Line movement ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRequest {
    pub sport: String,
    pub away_team: String,
    pub home_team: String,
    pub commence_time: DateTime<Utc>,
    #[serde(default)]
    pub captured_at: Option<DateTime<Utc>>,
    pub bookmakers: Vec<BookmakerOdds>,
}

fn record_snapshot(state: &AppState, event_id: &str, req: &SnapshotRequest) -> anyhow::Result<OddsSnapshot> {
    let normalized = normalize_event(&req.away_team, &req.home_team, &req.bookmakers, state.settings.normalize);
    let snapshot = consensus_snapshot(
        event_id,
        &req.sport,
        req.captured_at.unwrap_or_else(Utc::now),
        req.commence_time,
        &normalized.quotes,
    );
    let stored = state.db.record_snapshot(&snapshot, &state.monitor)?;
    info!(
        "{}: snapshot stored (opening={}, closing={})",
        event_id, stored.is_opening, stored.is_closing
    );
    Ok(stored)
}

/// POST /api/events/:id/snapshots
async fn snapshot_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(req): Json<SnapshotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    record_snapshot(&state, &event_id, &req)
        .map(|s| (StatusCode::CREATED, Json(s)))
        .map_err(internal)
}

/// GET /api/events/:id/snapshots
async fn list_snapshots_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.db.list_snapshots(&event_id).map(Json).map_err(internal)
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementReport {
    pub movement: LineMovement,
    pub significance: Significance,
    pub history: RepredictionHistory,
    pub decision: RepredictionDecision,
}

/// Movement since the opening line, its significance and the event start.
fn assess_movement(
    state: &AppState,
    event_id: &str,
) -> anyhow::Result<Option<(LineMovement, Significance, DateTime<Utc>)>> {
    let snapshots = state.db.list_snapshots(event_id)?;
    let Some(movement) = LineMovement::from_snapshots(&snapshots) else {
        return Ok(None);
    };
    // Sport and start time come from the latest capture.
    let Some(latest) = snapshots.iter().max_by_key(|s| s.captured_at) else {
        return Ok(None);
    };
    let threshold = Sport::from_key(&latest.sport).profile().movement;
    let significance = significance(&movement, &threshold);
    Ok(Some((movement, significance, latest.commence_time)))
}

fn movement_report(state: &AppState, event_id: &str, now: DateTime<Utc>) -> anyhow::Result<Option<MovementReport>> {
    let Some((movement, significance, commence_time)) = assess_movement(state, event_id)? else {
        return Ok(None);
    };
    let history = state.db.reprediction_history(event_id)?;
    let decision = decide_reprediction(&significance, &history, commence_time, now, &state.monitor);
    Ok(Some(MovementReport {
        movement,
        significance,
        history,
        decision,
    }))
}

/// GET /api/events/:id/movement
async fn movement_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match movement_report(&state, &event_id, Utc::now()).map_err(internal)? {
        Some(report) => Ok(Json(report)),
        None => Err((StatusCode::NOT_FOUND, format!("no snapshots for {}", event_id))),
    }
}

/// Gate a new prediction on line movement and history, then record the attempt.
///
/// The history check and the write share one transaction; the new prediction
/// replaces the standing one only when it differs materially.
fn repredict(
    state: &AppState,
    event_id: &str,
    prediction: &ModelPrediction,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<RepredictionAttempt>> {
    let Some((_, significance, commence_time)) = assess_movement(state, event_id)? else {
        return Ok(None);
    };
    let attempt = state.db.apply_reprediction(event_id, prediction, now, |history| {
        decide_reprediction(&significance, history, commence_time, now, &state.monitor)
    })?;
    match (attempt.decision.should_repredict(), attempt.superseded) {
        (false, _) => info!("{}: re-prediction refused ({:?})", event_id, attempt.decision),
        (true, true) => info!("{}: re-prediction supersedes the standing prediction", event_id),
        (true, false) => info!("{}: re-prediction too close to the standing one, kept", event_id),
    }
    Ok(Some(attempt))
}

/// POST /api/events/:id/repredictions
async fn reprediction_handler(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(prediction): Json<ModelPrediction>,
) -> Result<Response, ApiError> {
    match repredict(&state, &event_id, &prediction, Utc::now()).map_err(internal)? {
        None => Err((StatusCode::NOT_FOUND, format!("no snapshots for {}", event_id))),
        Some(resp) if resp.decision.should_repredict() => Ok(Json(resp).into_response()),
        Some(resp) => Ok((StatusCode::CONFLICT, Json(resp)).into_response()),
    }
}

// ── Outcomes, evaluation and recalibration ───────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeRequest {
    pub event_id: String,
    pub sport: String,
    pub home_score: i32,
    pub away_score: i32,
    #[serde(default)]
    pub market_spread: Option<f64>,
    #[serde(default)]
    pub market_total: Option<f64>,
    /// Defaults to the standing prediction for the event.
    #[serde(default)]
    pub prediction: Option<ModelPrediction>,
}

fn record_outcome(state: &AppState, req: &OutcomeRequest) -> Result<ValidatedOutcome, ApiError> {
    let prediction = match &req.prediction {
        Some(p) => p.clone(),
        None => state
            .db
            .get_prediction(&req.event_id)
            .map_err(internal)?
            .map(|s| s.prediction)
            .ok_or_else(|| {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("no prediction recorded for {}", req.event_id),
                )
            })?,
    };
    let mut outcome = ValidatedOutcome {
        id: None,
        event_id: req.event_id.clone(),
        sport: req.sport.clone(),
        predicted_home_win_prob: prediction.home_win_probability,
        predicted_spread: prediction.predicted_spread,
        predicted_total: prediction.predicted_total,
        home_score: req.home_score,
        away_score: req.away_score,
        market_spread: req.market_spread,
        market_total: req.market_total,
        validated_at: Utc::now(),
    };
    outcome.id = Some(state.db.insert_outcome(&outcome).map_err(internal)?);
    Ok(outcome)
}

/// POST /api/outcomes
async fn outcome_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OutcomeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    record_outcome(&state, &req).map(|o| (StatusCode::CREATED, Json(o)))
}

#[derive(Debug, Deserialize)]
pub struct EvaluationQuery {
    pub sport: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResponse {
    pub raw: EvaluationReport,
    pub recalibrated: EvaluationReport,
    pub comparison: CalibrationComparison,
}

/// GET /api/evaluation?sport=basketball_nba
async fn evaluation_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<EvaluationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let outcomes = state.db.list_outcomes(q.sport.as_deref()).map_err(internal)?;
    let raw = evaluate(&outcomes, &RecalibrationParams::passthrough());
    let recalibrated = evaluate(&outcomes, &state.calibration.current());
    let comparison = compare(&raw, &recalibrated);
    Ok(Json(EvaluationResponse {
        raw,
        recalibrated,
        comparison,
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct RecalibrationResponse {
    pub active: RecalibrationParams,
    pub history: Vec<RecalibrationParams>,
}

/// GET /api/recalibration
async fn recalibration_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let history = state.db.list_recalibrations(50).map_err(internal)?;
    Ok(Json(RecalibrationResponse {
        active: (*state.calibration.current()).clone(),
        history,
    }))
}

fn run_refit(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<RefitDecision> {
    let outcomes = state.db.list_outcomes(None)?;
    let active = state.calibration.current();
    let decision = refit(&outcomes, &active, state.calibration_min_samples, now);
    if let RefitDecision::Adopted { params, .. } = &decision {
        // Persist before swapping the served curve.
        state.db.insert_recalibration(params)?;
        state.calibration.replace(params.clone());
    }
    Ok(decision)
}

/// POST /api/recalibration/refit
async fn refit_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    run_refit(&state, Utc::now()).map(Json).map_err(internal)
}
