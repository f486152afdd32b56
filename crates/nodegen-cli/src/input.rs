//! Loading spec documents from disk

use anyhow::{Context, Result};
use nodegen_core::markers::{MethodDescriptor, SpecBuilder};
use nodegen_core::{Diagnostics, InterfaceSpec, SpecId, SpecKind};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// An interface as seen by an extraction front end: raw getter-shaped methods
/// whose markers still need decoding
#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceDescriptor {
    pub id: SpecId,
    pub kind: SpecKind,
    #[serde(default)]
    pub parents: Vec<SpecId>,
    #[serde(default)]
    pub methods: Vec<MethodDescriptor>,
}

/// Top-level input document.
///
/// `specs` hold already-decoded interface specs, `interfaces` hold raw
/// method listings that are decoded on load. Both may be given.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputDocument {
    #[serde(default)]
    pub specs: Vec<InterfaceSpec>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl InputDocument {
    /// Parse a document, picking the format from the file extension
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(content)
                .with_context(|| format!("Failed to parse TOML input {}", path.display())),
            _ => parse_json(content)
                .with_context(|| format!("Failed to parse JSON input {}", path.display())),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read input {}", path.display()))?;
        Self::parse(&content, path)
    }

    /// Decode every raw interface and collect the resulting specs
    pub fn into_specs(self) -> Result<LoadedInput> {
        let mut specs = self.specs;
        let mut diagnostics = Diagnostics::new();

        for interface in self.interfaces {
            let id = interface.id.clone();
            let extraction = interface
                .parents
                .into_iter()
                .fold(SpecBuilder::new(interface.id, interface.kind), |b, p| b.parent(p))
                .methods(interface.methods)
                .build()
                .with_context(|| format!("Failed to decode interface {}", id))?;
            debug!(
                "decoded {} with {} properties",
                id,
                extraction.spec.properties().len()
            );
            diagnostics.extend(extraction.diagnostics);
            specs.push(extraction.spec);
        }

        Ok(LoadedInput { specs, diagnostics })
    }
}

/// A bare array of specs is accepted as well as the full document
fn parse_json(content: &str) -> serde_json::Result<InputDocument> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    if value.is_array() {
        Ok(InputDocument {
            specs: serde_json::from_value(value)?,
            interfaces: Vec::new(),
        })
    } else {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub specs: Vec<InterfaceSpec>,
    /// Findings from decoding raw interfaces
    pub diagnostics: Diagnostics,
}

pub fn load_input(path: &Path) -> Result<LoadedInput> {
    let loaded = InputDocument::from_file(path)?.into_specs()?;
    info!("Loaded {} specs from {}", loaded.specs.len(), path.display());
    Ok(loaded)
}
