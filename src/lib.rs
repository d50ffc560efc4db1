//! # Result confirmation
//!
//! Client side of the result-reporting page. Submitting the main form
//! uploads results; the server answers with rendered confirmation boxes,
//! each carrying its own small form that is confirmed independently.
//!
//! ```text
//! main form → PrimaryController → server → htmls → ConfirmationArea
//!                                                   └─ one ConfirmationController per box
//! box form  → ConfirmationController → server → message → appended to the box
//! ```

pub mod config;
pub mod controller;
pub mod dom;
pub mod form;
pub mod page;
pub mod transport;
pub mod wire;

pub use config::{ConfigError, Settings, SettingsBuilder};
pub use controller::{
    ConfirmationController, Context, ControllerState, Failure, Outcome, PrimaryController,
    Settled, SubmitError, Submission,
};
pub use dom::{BlockHandle, ConfirmationArea, FormLocation, SubmitEvent};
pub use form::{FilePart, Form, SubmissionRequest};
pub use page::{PageError, ResultPage};
pub use transport::{HttpTransport, PageLifetime, RawResponse, Transport, TransportFailure};
pub use wire::{ConfirmationEnvelope, PrimaryEnvelope, ProtocolError};
