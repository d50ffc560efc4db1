//! **Page configuration**: element ids, marker class, literal texts and the
//! base URL form actions resolve against.
//! Defaults reproduce the result-reporting page as served.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid base URL {value:?}: {source}")]
    BaseUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ------------------------------------------------------------------
// 1. Settings struct
// ------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Page URL; relative form actions resolve against it
    pub base_url: Url,
    /// id of the main form
    pub primary_form_id: String,
    /// id of the element whose content the primary controller replaces
    pub area_id: String,
    /// Class marking a confirmation block
    pub confirm_marker: String,
    /// Marker field added to primary submissions only
    pub ajax_field: String,
    pub ajax_value: String,
    /// Literal shown on transport failure or non-2xx status
    pub failure_text: String,
    /// Literal shown when a request is aborted
    pub abort_text: String,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            primary_form_id: "smart_form".to_string(),
            area_id: "confirmation_space".to_string(),
            confirm_marker: "confirm_box".to_string(),
            ajax_field: "is_ajax".to_string(),
            ajax_value: "1".to_string(),
            failure_text: "Error!".to_string(),
            abort_text: "Aborted!".to_string(),
            user_agent: concat!("result-confirm/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

const DEFAULT_BASE_URL: &str = "http://localhost/";

fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("DEFAULT_BASE_URL is a valid absolute URL")
}

// ------------------------------------------------------------------
// 2. Builder
// ------------------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct SettingsBuilder {
    inner: Settings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: Url) -> Self {
        self.inner.base_url = url;
        self
    }

    pub fn primary_form_id(mut self, id: impl Into<String>) -> Self {
        self.inner.primary_form_id = id.into();
        self
    }

    pub fn area_id(mut self, id: impl Into<String>) -> Self {
        self.inner.area_id = id.into();
        self
    }

    pub fn confirm_marker(mut self, class: impl Into<String>) -> Self {
        self.inner.confirm_marker = class.into();
        self
    }

    pub fn ajax_marker(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.ajax_field = field.into();
        self.inner.ajax_value = value.into();
        self
    }

    pub fn failure_text(mut self, text: impl Into<String>) -> Self {
        self.inner.failure_text = text.into();
        self
    }

    pub fn abort_text(mut self, text: impl Into<String>) -> Self {
        self.inner.abort_text = text.into();
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.inner.user_agent = agent.into();
        self
    }

    pub fn build(self) -> Result<Settings, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

// ------------------------------------------------------------------
// 3. Validation
// ------------------------------------------------------------------
impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                field: "base_url",
                reason: format!("{} cannot resolve relative actions", self.base_url),
            });
        }
        let non_empty = [
            ("primary_form_id", &self.primary_form_id),
            ("area_id", &self.area_id),
            ("ajax_field", &self.ajax_field),
        ];
        for (field, value) in non_empty {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if self.confirm_marker.trim().is_empty()
            || self.confirm_marker.contains(char::is_whitespace)
        {
            return Err(ConfigError::Invalid {
                field: "confirm_marker",
                reason: "must be a single class token".to_string(),
            });
        }
        Ok(())
    }
}

// ------------------------------------------------------------------
// 4. Loading: TOML file, environment
// ------------------------------------------------------------------
impl Settings {
    /// Missing keys keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(src)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Reads `.env` if present, then applies variables over the defaults.
    /// ENV vars: RESULT_CONFIRM_BASE_URL, RESULT_CONFIRM_FORM_ID,
    /// RESULT_CONFIRM_AREA_ID, RESULT_CONFIRM_MARKER,
    /// RESULT_CONFIRM_FAILURE_TEXT, RESULT_CONFIRM_ABORT_TEXT,
    /// RESULT_CONFIRM_USER_AGENT
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        if let Some(value) = var("RESULT_CONFIRM_BASE_URL") {
            settings.base_url = Url::parse(&value).map_err(|source| ConfigError::BaseUrl {
                value: value.clone(),
                source,
            })?;
        }
        let overrides: [(&str, &mut String); 6] = [
            ("RESULT_CONFIRM_FORM_ID", &mut settings.primary_form_id),
            ("RESULT_CONFIRM_AREA_ID", &mut settings.area_id),
            ("RESULT_CONFIRM_MARKER", &mut settings.confirm_marker),
            ("RESULT_CONFIRM_FAILURE_TEXT", &mut settings.failure_text),
            ("RESULT_CONFIRM_ABORT_TEXT", &mut settings.abort_text),
            ("RESULT_CONFIRM_USER_AGENT", &mut settings.user_agent),
        ];
        for (key, slot) in overrides {
            if let Some(value) = var(key) {
                *slot = value;
            }
        }
        settings.validate()?;
        Ok(settings)
    }
}
