//! `reqwest`-backed transport.

use super::{RawResponse, Transport, TransportFailure};
use crate::config::Settings;
use crate::form::{FieldValue, Method, SubmissionRequest};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, instrument};

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// No timeout is configured: a request stays outstanding until the
    /// server answers, the connection fails, or the page is torn down.
    pub fn new(settings: &Settings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn network(err: reqwest::Error) -> TransportFailure {
    TransportFailure::Network(err.to_string())
}

fn multipart_body(request: &SubmissionRequest) -> Result<Form, TransportFailure> {
    let mut form = Form::new();
    for field in request.fields() {
        form = match &field.value {
            FieldValue::Text(value) => form.text(field.name.clone(), value.clone()),
            FieldValue::File(file) => {
                let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.filename.clone());
                if let Some(content_type) = &file.content_type {
                    part = part.mime_str(content_type).map_err(network)?;
                }
                form.part(field.name.clone(), part)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip_all, fields(method = request.method().as_str(), url = %request.action()))]
    async fn send(&self, request: &SubmissionRequest) -> Result<RawResponse, TransportFailure> {
        let builder = match request.method() {
            Method::Get => self.client.get(request.target_url()),
            Method::Post if request.is_multipart() => self
                .client
                .post(request.action().clone())
                .multipart(multipart_body(request)?),
            Method::Post => self
                .client
                .post(request.action().clone())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(request.encode_urlencoded()),
        };

        let response = builder.send().await.map_err(network)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network)?;
        debug!(status, bytes = body.len(), "response delivered");

        Ok(RawResponse { status, body })
    }
}
