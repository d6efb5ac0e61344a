pub mod bounty;
pub mod category;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use earn_contract::{LedgerError, H256};
use log::{error, warn};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    coordinator::{LifecycleEvent, Stage, ValidationError, WorkflowError},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/opportunity", bounty::router())
        .route("/bounty/:id/submissions", get(bounty::submissions))
        .merge(category::router())
}

async fn health() -> &'static str {
    "health!"
}

/// Body of every workflow route
#[derive(Debug, Serialize)]
pub struct WorkflowResponse<T> {
    pub outcome: T,
    pub events: Vec<LifecycleEvent>,
}

/// Pair a finished workflow's result with the events it emitted. Failures
/// keep their events too, so the caller sees how far the workflow got.
pub fn respond<T: Serialize>(
    res: Result<T, WorkflowError>,
    rx: &mut UnboundedReceiver<LifecycleEvent>,
) -> Result<Json<WorkflowResponse<T>>, ApiError> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    match res {
        Ok(outcome) => Ok(Json(WorkflowResponse { outcome, events })),
        Err(e) => {
            let mut err = ApiError::from(e);
            err.events = events;
            Err(err)
        },
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    stage: Option<Stage>,
    tx_hash: Option<H256>,
    events: Vec<LifecycleEvent>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            stage: Some(Stage::Validation),
            tx_hash: None,
            events: vec![],
        }
    }
}

fn ledger_status(e: &LedgerError) -> StatusCode {
    match e {
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        let status = match &e {
            WorkflowError::Validation(ValidationError::OpportunityNotFound(_)) => {
                StatusCode::NOT_FOUND
            },
            WorkflowError::Validation(ValidationError::NotCreator) => StatusCode::FORBIDDEN,
            WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::NetworkSwitchRefused { .. } | WorkflowError::Rejected { .. } => {
                StatusCode::CONFLICT
            },
            WorkflowError::OutcomeUnknown { .. } => StatusCode::GATEWAY_TIMEOUT,
            WorkflowError::Ledger(e) => ledger_status(e),
            WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("workflow failed: {e}");
        } else {
            warn!("workflow refused: {e}");
        }
        ApiError {
            status,
            message: e.to_string(),
            stage: Some(e.stage()),
            tx_hash: e.tx_hash(),
            events: vec![],
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        let status = ledger_status(&e);
        if status.is_server_error() {
            error!("ledger read failed: {e}");
        }
        ApiError {
            status,
            message: e.to_string(),
            stage: Some(Stage::Lookup),
            tx_hash: None,
            events: vec![],
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.message,
            "stage": self.stage,
            "tx_hash": self.tx_hash,
            "events": self.events,
        });
        (self.status, Json(body)).into_response()
    }
}
