//! Human-in-the-loop types
//!
//! A human node pauses a run by producing a [`HumanInteraction`] — the
//! prompt and options a person should see. The run is resumed later with a
//! [`HumanResponse`], optionally checked by the node's
//! [`ResponseValidator`]. The node itself performs no I/O and never
//! blocks; persistence and resumption are the runner's job.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Predicate applied to a [`HumanResponse`] before a resume is accepted
pub type ResponseValidator = Arc<dyn Fn(&HumanResponse) -> bool + Send + Sync>;

/// One option a human can select
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanOption {
    /// Stable option id (matched against `HumanResponse::selected_option`)
    pub id: String,

    /// Display label
    pub label: String,

    /// Longer description, when the label alone is not enough
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl HumanOption {
    /// Create an option whose label equals its id
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            description: None,
        }
    }

    /// Set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What a paused run is waiting on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanInteraction {
    /// Human node that paused the run
    pub node_id: String,

    /// Prompt shown to the person
    pub prompt: String,

    /// Options the person can choose from; may be empty for free-text input
    pub options: Vec<HumanOption>,

    /// When the run paused
    pub paused_at: DateTime<Utc>,

    /// When the interaction expires; resuming after this fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl HumanInteraction {
    /// Whether the interaction's deadline has passed
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < Utc::now(),
            None => false,
        }
    }
}

/// A human's answer to a pending interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanResponse {
    /// Node the response is addressed to
    pub node_id: String,

    /// Selected option id, when the interaction offered options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<String>,

    /// Free-text answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Arbitrary caller-supplied metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,

    /// When the response was produced
    pub timestamp: DateTime<Utc>,
}

impl HumanResponse {
    /// Create an empty response addressed to `node_id`
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            selected_option: None,
            text: None,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Set the selected option
    pub fn with_selected_option(mut self, option: impl Into<String>) -> Self {
        self.selected_option = Some(option.into());
        self
    }

    /// Set the free-text answer
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// A response carrying neither a selection nor text
    ///
    /// Empty responses are rejected on resume unless the node's validator
    /// explicitly accepts them.
    pub fn is_empty(&self) -> bool {
        self.selected_option.is_none() && self.text.is_none()
    }
}

/// Configuration of a human node
#[derive(Clone)]
pub struct HumanNodeConfig {
    /// Prompt shown when the run pauses
    pub prompt: String,

    /// Options offered to the person
    pub options: Vec<HumanOption>,

    /// How long a response may take; `None` waits indefinitely
    pub timeout: Option<Duration>,

    /// Validator applied to responses on resume
    pub validator: Option<ResponseValidator>,
}

impl HumanNodeConfig {
    /// Create a config with the given prompt and no options
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            options: Vec::new(),
            timeout: None,
            validator: None,
        }
    }

    /// Offer a set of options
    pub fn with_options(mut self, options: Vec<HumanOption>) -> Self {
        self.options = options;
        self
    }

    /// Set the response deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the response validator
    pub fn with_validator(
        mut self,
        validator: impl Fn(&HumanResponse) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Build the interaction this node would pause with, stamped now
    pub fn interaction(&self, node_id: &str) -> HumanInteraction {
        let paused_at = Utc::now();
        let expires_at = self
            .timeout
            .and_then(|t| ChronoDuration::from_std(t).ok())
            .map(|d| paused_at + d);
        HumanInteraction {
            node_id: node_id.to_string(),
            prompt: self.prompt.clone(),
            options: self.options.clone(),
            paused_at,
            expires_at,
        }
    }
}

impl std::fmt::Debug for HumanNodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanNodeConfig")
            .field("prompt", &self.prompt)
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .field("validator", &self.validator.as_ref().map(|_| "<function>"))
            .finish()
    }
}
