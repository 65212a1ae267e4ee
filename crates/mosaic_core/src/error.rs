//! Core error types for MOSAIC.

use crate::i18n::Translator;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Broad classification of a [`CoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Scenario, renderer or binding declarations are wrong
    Configuration,
    /// The protocol document does not match the scenario
    Protocol,
    /// A component handler or codec failed
    Handler,
    /// A handler reported a business error through global state
    Business,
    /// Engine bookkeeping failed
    Internal,
}

/// Business error reported by a component through the reserved global state key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessError {
    /// Human readable message
    pub message: String,
    /// Optional machine readable code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl BusinessError {
    /// Create a business error with a message only
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attach a code
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Interpret a global state value as a business error.
    ///
    /// Strings become the message; objects are read as `{ message, code }`.
    /// `null` means no error.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self::new(s.clone())),
            Value::Object(map) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| value.to_string(), str::to_string);
                let code = map.get("code").map(|c| match c {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
                Some(Self { message, code })
            }
            other => Some(Self::new(other.to_string())),
        }
    }

    /// Convert into the value stored under the reserved key
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::String(self.message.clone()))
    }
}

impl std::fmt::Display for BusinessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Scenario is not registered
    #[error("Unknown scenario: {scenario}")]
    UnknownScenario { scenario: String },

    /// No renderer bound to a component type
    #[error("No renderer for component type {type_name} in scenario {scenario}")]
    RendererNotFound { scenario: String, type_name: String },

    /// Malformed state binding expression
    #[error("Invalid state binding `{expression}`: {reason}")]
    InvalidBinding { expression: String, reason: String },

    /// Scenario default protocol failed validation
    #[error("Invalid protocol for scenario {scenario}: {reason}")]
    InvalidProtocol { scenario: String, reason: String },

    /// Parallel declarations produced an unusable graph
    #[error("Invalid dependency graph: {reason}")]
    InvalidGraph { reason: String },

    /// Component missing from both live and default protocol
    #[error("Component {component} not found in scenario {scenario}")]
    ComponentNotFound { scenario: String, component: String },

    /// Debug filter names a component outside the plan
    #[error("Component {component} is not part of the render plan")]
    NotInPlan { component: String },

    /// Binding source has not rendered earlier in this pass
    #[error("Component {component} depends on {dependency}, which has not rendered in this pass")]
    UndeclaredDependency { component: String, dependency: String },

    /// Binding source does not expose the requested state key
    #[error("State {key} not found on component {component}")]
    StateNotFound { component: String, key: String },

    /// Event operation has no handler on the component
    #[error("Operation {operation} is not registered on component {component}")]
    OperationNotRegistered { component: String, operation: String },

    /// Handler returned a failure
    #[error("Component {component} failed: {message}")]
    HandlerFailed { component: String, message: String },

    /// Handler panicked
    #[error("Component {component} panicked: {message}")]
    HandlerPanicked { component: String, message: String },

    /// Component decode/encode step failed
    #[error("Codec error on component {component}: {reason}")]
    Codec { component: String, reason: String },

    /// Business error taken from global state
    #[error("Business error: {0}")]
    Business(BusinessError),

    /// Invalid encoding of a protocol document
    #[error("Invalid encoding: {reason}")]
    InvalidEncoding { reason: String },

    /// Internal error (for unexpected errors)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// Create a handler failure from anything displayable
    pub fn handler(component: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::HandlerFailed {
            component: component.into(),
            message: message.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Error category
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownScenario { .. }
            | Self::RendererNotFound { .. }
            | Self::InvalidBinding { .. }
            | Self::InvalidProtocol { .. }
            | Self::InvalidGraph { .. } => ErrorCategory::Configuration,
            Self::ComponentNotFound { .. }
            | Self::NotInPlan { .. }
            | Self::UndeclaredDependency { .. }
            | Self::StateNotFound { .. }
            | Self::InvalidEncoding { .. } => ErrorCategory::Protocol,
            Self::OperationNotRegistered { .. }
            | Self::HandlerFailed { .. }
            | Self::HandlerPanicked { .. }
            | Self::Codec { .. } => ErrorCategory::Handler,
            Self::Business(_) => ErrorCategory::Business,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Whether this error points at a packaging defect rather than a runtime fault
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::OperationNotRegistered { .. }
                | Self::RendererNotFound { .. }
                | Self::UnknownScenario { .. }
                | Self::Internal { .. }
        )
    }

    /// Translation key for this error
    #[must_use]
    pub const fn message_key(&self) -> &'static str {
        match self {
            Self::UnknownScenario { .. } => "error.unknown_scenario",
            Self::RendererNotFound { .. } => "error.renderer_not_found",
            Self::InvalidBinding { .. } => "error.invalid_binding",
            Self::InvalidProtocol { .. } => "error.invalid_protocol",
            Self::InvalidGraph { .. } => "error.invalid_graph",
            Self::ComponentNotFound { .. } => "error.component_not_found",
            Self::NotInPlan { .. } => "error.not_in_plan",
            Self::UndeclaredDependency { .. } => "error.undeclared_dependency",
            Self::StateNotFound { .. } => "error.state_not_found",
            Self::OperationNotRegistered { .. } => "error.operation_not_registered",
            Self::HandlerFailed { .. } => "error.handler_failed",
            Self::HandlerPanicked { .. } => "error.handler_panicked",
            Self::Codec { .. } => "error.codec",
            Self::Business(_) => "error.business",
            Self::InvalidEncoding { .. } => "error.invalid_encoding",
            Self::Internal { .. } => "error.internal",
        }
    }

    /// Named values that can be substituted into a translated template
    #[must_use]
    pub fn arguments(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::UnknownScenario { scenario } => vec![("scenario", scenario.clone())],
            Self::RendererNotFound { scenario, type_name } => vec![
                ("scenario", scenario.clone()),
                ("type", type_name.clone()),
            ],
            Self::InvalidBinding { expression, reason } => vec![
                ("expression", expression.clone()),
                ("reason", reason.clone()),
            ],
            Self::InvalidProtocol { scenario, reason } => vec![
                ("scenario", scenario.clone()),
                ("reason", reason.clone()),
            ],
            Self::InvalidGraph { reason } => vec![("reason", reason.clone())],
            Self::ComponentNotFound { scenario, component } => vec![
                ("scenario", scenario.clone()),
                ("component", component.clone()),
            ],
            Self::NotInPlan { component } => vec![("component", component.clone())],
            Self::UndeclaredDependency { component, dependency } => vec![
                ("component", component.clone()),
                ("dependency", dependency.clone()),
            ],
            Self::StateNotFound { component, key } => {
                vec![("component", component.clone()), ("key", key.clone())]
            }
            Self::OperationNotRegistered { component, operation } => vec![
                ("component", component.clone()),
                ("operation", operation.clone()),
            ],
            Self::HandlerFailed { component, message }
            | Self::HandlerPanicked { component, message } => vec![
                ("component", component.clone()),
                ("message", message.clone()),
            ],
            Self::Codec { component, reason } => vec![
                ("component", component.clone()),
                ("reason", reason.clone()),
            ],
            Self::Business(err) => vec![("message", err.message.clone())],
            Self::InvalidEncoding { reason } => vec![("reason", reason.clone())],
            Self::Internal { message } => vec![("message", message.clone())],
        }
    }

    /// Human readable description in the requested locale.
    ///
    /// Falls back to the English `Display` text when the translator has no
    /// template for [`CoreError::message_key`]. Placeholders use `{name}`.
    #[must_use]
    pub fn describe(&self, translator: &dyn Translator, locale: &str) -> String {
        let Some(template) = translator.text(locale, self.message_key()) else {
            return self.to_string();
        };
        self.arguments()
            .into_iter()
            .fold(template, |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), &value)
            })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}

impl From<BusinessError> for CoreError {
    fn from(err: BusinessError) -> Self {
        Self::Business(err)
    }
}
