use earn_contract::H256;
use log::debug;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::WorkflowError;

/// Workflow step a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Lookup,
    NetworkSwitch,
    Submission,
    Confirmation,
    Reconciliation,
}

/// Progress notification rendered by the UI as a toast or progress state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    SwitchingNetwork { chain_id: u64 },
    Submitted { tx_hash: H256 },
    WaitingForConfirmation { tx_hash: H256 },
    Confirmed { tx_hash: H256, block: Option<u64> },
    Reconciled { opportunity_id: String },
    Warning { message: String },
    Failed { stage: Stage, message: String },
}

/// Where a workflow reports its progress. Dropped receivers are ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<LifecycleEvent>>,
}

impl EventSink {
    pub fn channel() -> (EventSink, UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink { tx: Some(tx) }, rx)
    }

    pub fn none() -> EventSink {
        EventSink::default()
    }

    pub fn emit(&self, event: LifecycleEvent) {
        debug!("lifecycle event {event:?}");
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(LifecycleEvent::Warning {
            message: message.into(),
        });
    }

    /// Report a failed workflow and hand the result back untouched
    pub(crate) fn finish<T>(&self, result: Result<T, WorkflowError>) -> Result<T, WorkflowError> {
        if let Err(e) = &result {
            self.emit(LifecycleEvent::Failed {
                stage: e.stage(),
                message: e.to_string(),
            });
        }
        result
    }
}
