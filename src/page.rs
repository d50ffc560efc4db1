//! The result-reporting page: finds the main form and the confirmation area
//! in the served markup and wires the primary controller to them.

use crate::config::Settings;
use crate::controller::{ConfirmationController, Context, PrimaryController};
use crate::dom::{parse_document, ConfirmationArea, Element};
use crate::form::Form;
use crate::transport::{HttpTransport, PageLifetime, Transport};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("No element with id {0:?}")]
    MissingElement(String),
    #[error("Element {0:?} is not a form")]
    NotAForm(String),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct ResultPage {
    primary: PrimaryController,
    ctx: Context,
}

impl ResultPage {
    pub fn load(
        html: &str,
        settings: Settings,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, PageError> {
        let mut document = Element::new("#document");
        document.children = parse_document(html);

        let form = document
            .find_by_id(&settings.primary_form_id)
            .ok_or_else(|| PageError::MissingElement(settings.primary_form_id.clone()))?;
        if !form.is("form") {
            return Err(PageError::NotAForm(settings.primary_form_id.clone()));
        }
        let area = document
            .find_by_id(&settings.area_id)
            .ok_or_else(|| PageError::MissingElement(settings.area_id.clone()))?;

        let form = Form::new(form.clone());
        let area = ConfirmationArea::with_children(area.children.clone());
        info!(
            form = %settings.primary_form_id,
            area = %settings.area_id,
            transport = transport.name(),
            "result page loaded"
        );

        let ctx = Context::new(transport, settings);
        Ok(Self {
            primary: PrimaryController::new(form, area, ctx.clone()),
            ctx,
        })
    }

    /// Loads the page over a real HTTP client built from `settings`.
    pub fn connect(html: &str, settings: Settings) -> Result<Self, PageError> {
        let transport = HttpTransport::new(&settings)?;
        Self::load(html, settings, Arc::new(transport))
    }

    pub fn primary(&self) -> &PrimaryController {
        &self.primary
    }

    pub fn area(&self) -> &ConfirmationArea {
        self.primary.area()
    }

    pub fn confirmations(&self) -> Vec<ConfirmationController> {
        self.primary.confirmations()
    }

    pub fn settings(&self) -> &Settings {
        &self.ctx.settings
    }

    pub fn lifetime(&self) -> &PageLifetime {
        &self.ctx.lifetime
    }

    /// Unloads the page; anything still in flight settles as cancelled.
    pub fn teardown(&self) {
        self.ctx.lifetime.teardown();
    }
}
