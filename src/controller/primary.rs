//! Primary submission: the main form and the confirmation area it fills.

use super::{
    exchange, ConfirmationController, Context, ControllerState, Exchange, Failure, InFlight,
    Outcome, Settled, StateTracker, Submission,
};
use crate::dom::{lock, ConfirmationArea, SubmitEvent};
use crate::form::{FilePart, Form, RequestError, SubmissionRequest};
use crate::wire::{self, ProtocolError};
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PrimaryController {
    form: Arc<Mutex<Form>>,
    area: ConfirmationArea,
    ctx: Context,
    bound: Arc<Mutex<Vec<ConfirmationController>>>,
    state: Arc<StateTracker>,
}

impl PrimaryController {
    pub fn new(form: Form, area: ConfirmationArea, ctx: Context) -> Self {
        Self {
            form: Arc::new(Mutex::new(form)),
            area,
            ctx,
            bound: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(StateTracker::default()),
        }
    }

    pub fn area(&self) -> &ConfirmationArea {
        &self.area
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn state(&self) -> ControllerState {
        self.state.state()
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight()
    }

    /// Controllers bound by the most recent successful submission.
    pub fn confirmations(&self) -> Vec<ConfirmationController> {
        lock(&self.bound).clone()
    }

    pub fn set_field(&self, name: &str, value: &str) -> bool {
        lock(&self.form).set_field(name, value)
    }

    pub fn set_checked(&self, name: &str, value: &str, checked: bool) -> bool {
        lock(&self.form).set_checked(name, value, checked)
    }

    pub fn attach_file(&self, name: &str, file: FilePart) {
        lock(&self.form).attach_file(name, file);
    }

    pub fn clear_files(&self, name: &str) {
        lock(&self.form).clear_files(name);
    }

    /// The request a submission right now would send, marker field included.
    pub fn capture(&self) -> Result<SubmissionRequest, RequestError> {
        let settings = &self.ctx.settings;
        let form = lock(&self.form);
        SubmissionRequest::capture(
            &form.element,
            Some(&form.files),
            &settings.base_url,
            &[(settings.ajax_field.as_str(), settings.ajax_value.as_str())],
        )
    }

    /// Handles the main form's submit event. Always prevents navigation and
    /// returns as soon as the request is spawned.
    pub fn on_submit(&self, event: &mut SubmitEvent) -> Submission<Vec<ConfirmationController>> {
        event.prevent_default();
        let id = Uuid::new_v4();
        let request = self.capture();
        let in_flight = self.state.begin();
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run(id, request, in_flight).await });
        Submission { id, handle }
    }

    #[instrument(name = "primary_submission", skip_all, fields(submission = %id))]
    async fn run(
        self,
        id: Uuid,
        request: Result<SubmissionRequest, RequestError>,
        in_flight: InFlight,
    ) -> Result<Settled<Vec<ConfirmationController>>, ProtocolError> {
        let request = match request {
            Ok(request) => request,
            Err(_) => {
                warn!("could not build primary request");
                return Ok(self.fail(Failure::Transport, in_flight));
            }
        };

        let body = match exchange(&self.ctx, &request).await {
            Exchange::Delivered(body) => body,
            Exchange::Failed(failure) => return Ok(self.fail(failure, in_flight)),
        };

        let envelope = match wire::decode_primary(&body) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(%err, "undecodable primary response; confirmation area left as is");
                in_flight.finish(Outcome::Error);
                return Err(err);
            }
        };

        let controllers = {
            let mut bound = lock(&self.bound);
            let blocks = self
                .area
                .replace_html(&envelope.markup(), &self.ctx.settings.confirm_marker);
            let block_count = blocks.len();
            let controllers: Vec<ConfirmationController> = blocks
                .into_iter()
                .filter_map(|block| ConfirmationController::bind(block, self.ctx.clone()))
                .collect();
            info!(
                fragments = envelope.htmls.len(),
                blocks = block_count,
                bound = controllers.len(),
                "confirmation area replaced"
            );
            *bound = controllers.clone();
            controllers
        };

        in_flight.finish(Outcome::Success);
        Ok(Settled::Success(controllers))
    }

    fn fail(&self, failure: Failure, in_flight: InFlight) -> Settled<Vec<ConfirmationController>> {
        {
            let mut bound = lock(&self.bound);
            self.area.replace_text(self.ctx.failure_text(failure));
            bound.clear();
        }
        in_flight.finish(failure.outcome());
        Settled::Failed(failure)
    }
}
