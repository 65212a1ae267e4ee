//! Protocol validator for scenario registration.

use crate::binding::StateBinding;
use indexmap::IndexSet;
use mosaic_core::{CoreError, CoreResult, Protocol, DEFAULT_RENDERING_KEY};
use serde::Serialize;

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Tolerated at runtime, logged
    Warning,
    /// Rejects the protocol
    Error,
}

/// Validation issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Severity
    pub severity: Severity,
    /// Where the issue was found, e.g. `rendering.filter[0]`
    pub location: String,
    /// What is wrong
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", level, self.location, self.message)
    }
}

/// Result of validating one protocol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// All issues in discovery order
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Check if no error-level issue was found
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Error-level issues
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    /// Warning-level issues
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    fn push(&mut self, severity: Severity, location: String, message: String) {
        self.issues.push(ValidationIssue {
            severity,
            location,
            message,
        });
    }
}

/// Validator for scenario protocols
pub struct ProtocolValidator {
    /// Treat duplicate binding targets and overlapping parallel groups as errors
    pub strict: bool,
}

impl ProtocolValidator {
    /// Create a new validator
    #[must_use]
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Set strict mode
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Validate a protocol, collecting every issue
    #[must_use]
    pub fn validate(&self, protocol: &Protocol) -> ValidationReport {
        let mut report = ValidationReport::default();
        let conflict = if self.strict {
            Severity::Error
        } else {
            Severity::Warning
        };

        for (key, component) in &protocol.components {
            if component.type_name.is_empty() {
                report.push(
                    Severity::Error,
                    format!("components.{key}"),
                    "component has no type".to_string(),
                );
            }
        }

        for (key, items) in &protocol.rendering {
            if key != DEFAULT_RENDERING_KEY && !protocol.components.contains_key(key) {
                report.push(
                    Severity::Warning,
                    format!("rendering.{key}"),
                    format!("rendering declared for unknown component '{key}'"),
                );
            }

            for (idx, item) in items.iter().enumerate() {
                let location = format!("rendering.{key}[{idx}]");
                if !protocol.components.contains_key(&item.name) {
                    report.push(
                        Severity::Error,
                        location.clone(),
                        format!("unknown component '{}'", item.name),
                    );
                }

                let mut targets = IndexSet::new();
                for decl in &item.bindings {
                    match StateBinding::from_decl(decl) {
                        Ok(binding) => {
                            if let Some(source) = binding.dependency() {
                                if !protocol.components.contains_key(source) {
                                    report.push(
                                        Severity::Error,
                                        location.clone(),
                                        format!("binding source '{source}' is not a component"),
                                    );
                                }
                            }
                        }
                        Err(err) => {
                            report.push(Severity::Error, location.clone(), err.to_string());
                        }
                    }
                    if !targets.insert(decl.name.as_str()) {
                        report.push(
                            conflict,
                            location.clone(),
                            format!("state '{}' bound more than once", decl.name),
                        );
                    }
                }
            }
        }

        let mut attached = IndexSet::new();
        for (parent, children) in &protocol.hierarchy.parallel {
            let location = format!("hierarchy.parallel.{parent}");
            if !protocol.components.contains_key(parent) {
                report.push(
                    Severity::Warning,
                    location.clone(),
                    format!("unknown parent '{parent}'"),
                );
            }
            for child in children {
                if !protocol.components.contains_key(child) {
                    report.push(
                        Severity::Warning,
                        location.clone(),
                        format!("unknown child '{child}'"),
                    );
                }
                if child == parent {
                    report.push(
                        Severity::Error,
                        location.clone(),
                        format!("'{child}' cannot run in parallel after itself"),
                    );
                } else if !attached.insert(child.as_str()) {
                    report.push(
                        conflict,
                        location.clone(),
                        format!("'{child}' already belongs to another parallel group"),
                    );
                }
            }
        }

        report
    }

    /// Validate and fail on the first error-level issue
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidProtocol`] describing the first error
    pub fn check(&self, protocol: &Protocol) -> CoreResult<ValidationReport> {
        let report = self.validate(protocol);
        for warning in report.warnings() {
            tracing::warn!(scenario = %protocol.scenario, "{}", warning);
        }
        if let Some(first) = report.errors().next() {
            return Err(CoreError::InvalidProtocol {
                scenario: protocol.scenario.clone(),
                reason: first.to_string(),
            });
        }
        Ok(report)
    }
}

impl Default for ProtocolValidator {
    fn default() -> Self {
        Self::new()
    }
}
