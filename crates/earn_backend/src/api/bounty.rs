use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use earn_contract::{SubmissionLinks, H256};
use log::warn;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedReceiver;

use super::{respond, ApiError, WorkflowResponse};
use crate::{
    coordinator::{
        CancelOutcome, CreateOutcome, EventSink, LifecycleEvent, StatusView, SubmitOutcome,
        WinnerSelection, WinnersOutcome, WorkflowError,
    },
    models::{Opportunity, OpportunityDraft},
    submissions::SubmissionView,
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/retry-save", post(retry_save))
        .route("/:id/reconcile", post(reconcile))
        .route("/:id/submit", post(submit))
        .route("/:id/winners", post(winners))
        .route("/:id/cancel", post(cancel))
        .route("/:id/status", get(status))
}

type WorkflowResult<T> = Result<Json<WorkflowResponse<T>>, ApiError>;

/// Escrow the stake on-chain and save the listing
pub async fn create(
    State(state): State<AppState>,
    Json(draft): Json<OpportunityDraft>,
) -> Result<(StatusCode, Json<WorkflowResponse<CreateOutcome>>), ApiError> {
    let (events, mut rx) = EventSink::channel();
    let res = state
        .coordinator
        .create_and_link(state.call_context(), draft, &events)
        .await;
    created(res, &mut rx)
}

/// 201 once linked, 202 when the caller still has to reconcile or retry the save
fn created(
    res: Result<CreateOutcome, WorkflowError>,
    rx: &mut UnboundedReceiver<LifecycleEvent>,
) -> Result<(StatusCode, Json<WorkflowResponse<CreateOutcome>>), ApiError> {
    let body = respond(res, rx)?;
    if body.outcome.is_warning() {
        warn!("creation needs follow-up: {:?}", body.outcome);
        Ok((StatusCode::ACCEPTED, body))
    } else {
        Ok((StatusCode::CREATED, body))
    }
}

#[derive(Debug, Deserialize)]
pub struct RetrySaveRequest {
    draft: OpportunityDraft,
    #[serde(default)]
    bounty_id: Option<u64>,
    tx_hash: H256,
}

/// Save the listing of a bounty that was escrowed but never recorded
pub async fn retry_save(
    State(state): State<AppState>,
    Json(req): Json<RetrySaveRequest>,
) -> WorkflowResult<Opportunity> {
    let (events, mut rx) = EventSink::channel();
    let res = state
        .coordinator
        .retry_save(
            state.call_context(),
            req.draft,
            req.bounty_id,
            req.tx_hash,
            &events,
        )
        .await;
    respond(res, &mut rx)
}

pub async fn reconcile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WorkflowResult<Opportunity> {
    let (events, mut rx) = EventSink::channel();
    let res = state.coordinator.reconcile_link(&id, &events).await;
    respond(res, &mut rx)
}

pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(links): Json<SubmissionLinks>,
) -> WorkflowResult<SubmitOutcome> {
    let (events, mut rx) = EventSink::channel();
    let res = state
        .coordinator
        .submit_work(state.call_context(), &id, links, &events)
        .await;
    respond(res, &mut rx)
}

#[derive(Debug, Deserialize)]
pub struct WinnersRequest {
    winners: Vec<WinnerSelection>,
}

pub async fn winners(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<WinnersRequest>,
) -> WorkflowResult<WinnersOutcome> {
    let (events, mut rx) = EventSink::channel();
    let res = state
        .coordinator
        .select_winners(state.call_context(), &id, req.winners, &events)
        .await;
    respond(res, &mut rx)
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    reason: Option<String>,
}

/// Refund or cancel, whichever the bounty's state calls for
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> WorkflowResult<CancelOutcome> {
    let (events, mut rx) = EventSink::channel();
    let res = state
        .coordinator
        .cancel(state.call_context(), &id, req.reason, &events)
        .await;
    respond(res, &mut rx)
}

/// Status re-derived from the chain
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusView>, ApiError> {
    let view = state.coordinator.refresh_status(&id).await?;
    Ok(Json(view))
}

pub async fn submissions(
    State(state): State<AppState>,
    Path(bounty_id): Path<u64>,
) -> Result<Json<Vec<SubmissionView>>, ApiError> {
    let views = state.submissions.fetch(bounty_id).await?;
    Ok(Json(views))
}
