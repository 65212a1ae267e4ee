//! Scenario documents.
//!
//! A scenario document is a JSON file holding a scenario's default protocol
//! plus the few presentation switches the CLI applies to its pass-through
//! component types.

use color_eyre::eyre::{Result, WrapErr};
use indexmap::IndexSet;
use mosaic_component::{PassThrough, Registry, ScenarioDefinition};
use mosaic_core::{CoreResult, Protocol};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Scenario document as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDocument {
    /// Scenario key, defaults to the protocol's own scenario
    #[serde(default)]
    pub key: Option<String>,
    /// Default protocol
    pub protocol: Protocol,
    /// Component types whose `extra` data is flattened into the parent
    #[serde(default)]
    pub flatten: Vec<String>,
}

impl ScenarioDocument {
    /// Read a document from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading scenario document {}", path.display()))?;
        let mut document: Self = serde_json::from_str(&text)
            .wrap_err_with(|| format!("parsing scenario document {}", path.display()))?;
        if let Some(key) = document.key.clone() {
            document.protocol.scenario = key;
        }
        document.protocol.sync_names();
        tracing::debug!(
            scenario = %document.protocol.scenario,
            components = document.protocol.components.len(),
            path = %path.display(),
            "loaded scenario document"
        );
        Ok(document)
    }

    /// Scenario key
    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.protocol.scenario
    }

    /// Distinct component types in declaration order
    #[must_use]
    pub fn type_names(&self) -> IndexSet<String> {
        self.protocol
            .components
            .values()
            .map(|c| c.type_name.clone())
            .collect()
    }

    /// Build a registry binding every component type to a pass-through type
    ///
    /// # Errors
    ///
    /// Returns error if the protocol fails validation
    pub fn into_registry(self) -> CoreResult<Registry> {
        let mut definition = ScenarioDefinition::new(self.protocol.clone());
        for type_name in self.type_names() {
            let flatten = self.flatten.contains(&type_name);
            definition = definition.with_type(PassThrough::new(type_name).flattening(flatten));
        }
        let mut registry = Registry::new();
        registry.register_scenario(definition)?;
        Ok(registry)
    }
}
