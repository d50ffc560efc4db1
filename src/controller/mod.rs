//! Submission controllers.
//!
//! `PrimaryController` owns the main form and the confirmation area;
//! `ConfirmationController` owns one confirmation block. Every submission
//! is spawned onto the runtime and handed back as a [`Submission`]; the
//! submitting call never waits for the network.
//!
//! Neither controller guards against resubmission: a form may be submitted
//! again while an earlier request of the same form is outstanding, and each
//! request settles on its own.

pub mod confirm;
pub mod primary;

pub use confirm::ConfirmationController;
pub use primary::PrimaryController;

use crate::config::Settings;
use crate::dom::lock;
use crate::form::SubmissionRequest;
use crate::transport::{PageLifetime, Transport, TransportFailure};
use crate::wire::ProtocolError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;

/// A submission that ended without a usable response. Recovered locally:
/// the only trace left in the document is a fixed literal text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Failed before any response was delivered.
    Transport,
    /// Aborted before completion (page teardown).
    Cancelled,
    /// Response delivered with a status outside 200..300.
    Server { status: u16 },
}

impl Failure {
    fn outcome(&self) -> Outcome {
        match self {
            Failure::Cancelled => Outcome::Abort,
            Failure::Transport | Failure::Server { .. } => Outcome::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled<T> {
    Success(T),
    Failed(Failure),
}

impl<T> Settled<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Settled::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Settled::Success(value) => Some(value),
            Settled::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<Failure> {
        match self {
            Settled::Success(_) => None,
            Settled::Failed(failure) => Some(*failure),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    /// 2xx response whose body could not be decoded. Not recovered: the
    /// document is left as it was.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Submission task failed: {0}")]
    Task(#[from] JoinError),
}

/// Handle to one in-flight submission. Dropping it does not cancel the
/// request.
#[derive(Debug)]
pub struct Submission<T> {
    id: Uuid,
    handle: JoinHandle<Result<Settled<T>, ProtocolError>>,
}

impl<T> Submission<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_settled(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn settled(self) -> Result<Settled<T>, SubmitError> {
        Ok(self.handle.await??)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Submitting,
    Settled(Outcome),
}

/// Tracks in-flight requests and the most recent outcome. Never refuses a
/// submission.
#[derive(Debug, Default)]
pub(crate) struct StateTracker {
    in_flight: AtomicUsize,
    last: Mutex<Option<Outcome>>,
}

impl StateTracker {
    fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight {
            tracker: Arc::clone(self),
            outcome: None,
        }
    }

    fn state(&self) -> ControllerState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return ControllerState::Submitting;
        }
        match *lock(&self.last) {
            Some(outcome) => ControllerState::Settled(outcome),
            None => ControllerState::Idle,
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// One outstanding submission. Leaves the in-flight count when dropped,
/// including when the submission task panics; a submission dropped without
/// an outcome settles as `Error`.
#[derive(Debug)]
pub(crate) struct InFlight {
    tracker: Arc<StateTracker>,
    outcome: Option<Outcome>,
}

impl InFlight {
    fn finish(mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        *lock(&self.tracker.last) = Some(self.outcome.unwrap_or(Outcome::Error));
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What every controller on a page shares.
#[derive(Clone)]
pub struct Context {
    pub transport: Arc<dyn Transport>,
    pub settings: Arc<Settings>,
    pub lifetime: PageLifetime,
}

impl Context {
    pub fn new(transport: Arc<dyn Transport>, settings: Settings) -> Self {
        Self {
            transport,
            settings: Arc::new(settings),
            lifetime: PageLifetime::new(),
        }
    }

    pub fn with_lifetime(mut self, lifetime: PageLifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Literal the document receives for `failure`.
    fn failure_text(&self, failure: Failure) -> &str {
        match failure {
            Failure::Cancelled => &self.settings.abort_text,
            Failure::Transport | Failure::Server { .. } => &self.settings.failure_text,
        }
    }
}

enum Exchange {
    Delivered(String),
    Failed(Failure),
}

/// Sends `request` and classifies the result. Page teardown wins over a
/// request still in flight.
async fn exchange(ctx: &Context, request: &SubmissionRequest) -> Exchange {
    let result = tokio::select! {
        result = ctx.transport.send(request) => result,
        _ = ctx.lifetime.torn_down() => Err(TransportFailure::Aborted),
    };

    match result {
        Ok(response) if response.is_success() => {
            debug!(status = response.status, transport = ctx.transport.name(), "response delivered");
            Exchange::Delivered(response.body)
        }
        Ok(response) => {
            warn!("server rejected submission");
            Exchange::Failed(Failure::Server {
                status: response.status,
            })
        }
        Err(TransportFailure::Aborted) => {
            warn!("submission aborted");
            Exchange::Failed(Failure::Cancelled)
        }
        Err(TransportFailure::Network(_)) => {
            warn!("submission failed before any response");
            Exchange::Failed(Failure::Transport)
        }
    }
}

#[cfg(test)]
mod tests;
