//! Confirmation submission: one block, its first form, additive feedback.

use super::{
    exchange, Context, ControllerState, Exchange, Failure, InFlight, Outcome, Settled,
    StateTracker, Submission,
};
use crate::dom::{BlockHandle, FormLocation, SubmitEvent};
use crate::form::{self, RequestError, SubmissionRequest};
use crate::wire::{self, ProtocolError};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Bound to the first form of one block at construction; never rebound.
/// That form may sit inside a nested block. Only ever appends to its own
/// block.
#[derive(Clone)]
pub struct ConfirmationController {
    block: BlockHandle,
    form: FormLocation,
    ctx: Context,
    state: Arc<StateTracker>,
}

impl ConfirmationController {
    /// `None` for a block without a form.
    pub fn bind(block: BlockHandle, ctx: Context) -> Option<Self> {
        let form = block.first_form()?;
        Some(Self {
            block,
            form,
            ctx,
            state: Arc::new(StateTracker::default()),
        })
    }

    pub fn block(&self) -> &BlockHandle {
        &self.block
    }

    pub fn state(&self) -> ControllerState {
        self.state.state()
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight()
    }

    pub fn set_field(&self, name: &str, value: &str) -> bool {
        self.form
            .with_form_mut(|f| form::set_field(f, name, value))
            .unwrap_or(false)
    }

    pub fn set_checked(&self, name: &str, value: &str, checked: bool) -> bool {
        self.form
            .with_form_mut(|f| form::set_checked(f, name, value, checked))
            .unwrap_or(false)
    }

    /// The bound form's own fields; no marker field.
    pub fn capture(&self) -> Result<SubmissionRequest, RequestError> {
        self.form
            .with_form(|f| SubmissionRequest::capture(f, None, &self.ctx.settings.base_url, &[]))
            .unwrap_or(Err(RequestError::MissingForm))
    }

    pub fn on_submit(&self, event: &mut SubmitEvent) -> Submission<String> {
        event.prevent_default();
        let id = Uuid::new_v4();
        let request = self.capture();
        let in_flight = self.state.begin();
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run(id, request, in_flight).await });
        Submission { id, handle }
    }

    #[instrument(name = "confirmation_submission", skip_all, fields(submission = %id))]
    async fn run(
        self,
        id: Uuid,
        request: Result<SubmissionRequest, RequestError>,
        in_flight: InFlight,
    ) -> Result<Settled<String>, ProtocolError> {
        let request = match request {
            Ok(request) => request,
            Err(_) => {
                warn!("could not build confirmation request");
                return Ok(self.fail(Failure::Transport, in_flight));
            }
        };

        let body = match exchange(&self.ctx, &request).await {
            Exchange::Delivered(body) => body,
            Exchange::Failed(failure) => return Ok(self.fail(failure, in_flight)),
        };

        let envelope = match wire::decode_confirmation(&body) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(%err, "undecodable confirmation response; block left as is");
                in_flight.finish(Outcome::Error);
                return Err(err);
            }
        };

        if self.block.append_text(&envelope.message) {
            info!(message = %envelope.message, "confirmation answered");
        } else {
            debug!("block was replaced while in flight; answer is not visible");
        }
        in_flight.finish(Outcome::Success);
        Ok(Settled::Success(envelope.message))
    }

    fn fail(&self, failure: Failure, in_flight: InFlight) -> Settled<String> {
        self.block.append_text(self.ctx.failure_text(failure));
        in_flight.finish(failure.outcome());
        Settled::Failed(failure)
    }
}
