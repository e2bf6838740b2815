use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderError {
    #[error("component load failed: {0}")]
    Load(String),

    #[error("{0} could not be found in the host tree")]
    MissingHostNode(String),

    #[error("{0} is not mounted")]
    NotMounted(String),

    #[error("component {0} failed to render: {1}")]
    Component(String, String),

    #[error("value could not be deserialized: {0}")]
    JsonDecode(String),

    #[error("{0}")]
    Internal(String),
}

impl RenderError {
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load(message.into())
    }

    pub fn missing_host_node(node: impl Into<String>) -> Self {
        Self::MissingHostNode(node.into())
    }

    pub fn not_mounted(what: impl Into<String>) -> Self {
        Self::NotMounted(what.into())
    }

    pub fn component(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component(name.into(), message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(e: serde_json::Error) -> Self {
        Self::JsonDecode(e.to_string())
    }
}

impl From<String> for RenderError {
    fn from(e: String) -> Self {
        Self::Internal(e)
    }
}

impl From<&str> for RenderError {
    fn from(e: &str) -> Self {
        Self::Internal(e.to_string())
    }
}
