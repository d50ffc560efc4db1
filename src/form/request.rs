//! Immutable request snapshots and their wire encodings.

use super::{snapshot_fields, FileList};
use crate::dom::Element;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid form action {action:?}: {source}")]
    InvalidAction {
        action: String,
        source: url::ParseError,
    },
    #[error("Bound form is no longer in its block")]
    MissingForm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Form `method` attribute; anything but `post` submits as GET.
    pub fn from_attr(attr: Option<&str>) -> Self {
        match attr.map(str::trim) {
            Some(m) if m.eq_ignore_ascii_case("post") => Method::Post,
            _ => Method::Get,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl FilePart {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    File(FilePart),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Text(value.into()),
        }
    }

    pub fn text_value(&self) -> Option<&str> {
        match &self.value {
            FieldValue::Text(v) => Some(v),
            FieldValue::File(_) => None,
        }
    }
}

/// A form's method, target and fields as they were at submit time.
///
/// There are no mutators; clones share the same field storage.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    method: Method,
    action: Url,
    fields: Arc<[Field]>,
}

impl SubmissionRequest {
    /// Snapshots `form`, resolving its action against `base` and appending
    /// `extra` text fields after the form's own.
    pub fn capture(
        form: &Element,
        files: Option<&FileList>,
        base: &Url,
        extra: &[(&str, &str)],
    ) -> Result<Self, RequestError> {
        let method = Method::from_attr(form.attr("method"));
        let action = match form.attr("action").map(str::trim) {
            None | Some("") => base.clone(),
            Some(action) => base.join(action).map_err(|source| RequestError::InvalidAction {
                action: action.to_string(),
                source,
            })?,
        };

        let mut fields = snapshot_fields(form, files);
        fields.extend(extra.iter().map(|(name, value)| Field::text(*name, *value)));

        Ok(Self {
            method,
            action,
            fields: fields.into(),
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn action(&self) -> &Url {
        &self.action
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .and_then(Field::text_value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn is_multipart(&self) -> bool {
        self.fields
            .iter()
            .any(|f| matches!(f.value, FieldValue::File(_)))
    }

    /// `application/x-www-form-urlencoded` body. File fields contribute
    /// their filename.
    pub fn encode_urlencoded(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for field in self.fields.iter() {
            let value = match &field.value {
                FieldValue::Text(v) => v.as_str(),
                FieldValue::File(part) => part.filename.as_str(),
            };
            serializer.append_pair(&field.name, value);
        }
        serializer.finish()
    }

    /// Where the request goes: GET submissions carry their fields as the
    /// query string, replacing any query the action had.
    pub fn target_url(&self) -> Url {
        match self.method {
            Method::Post => self.action.clone(),
            Method::Get => {
                let mut url = self.action.clone();
                let query = self.encode_urlencoded();
                url.set_query(if query.is_empty() { None } else { Some(&query) });
                url
            }
        }
    }
}
