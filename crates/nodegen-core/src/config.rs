//! Synthesis configuration, loaded from `nodegen.toml`

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NodegenError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodegenConfig {
    /// Appended to a spec's simple name to form the implementation name
    pub impl_suffix: String,
    /// Base that plans without a resolved parent extend
    pub root_base: String,
    /// First parameter of every forwarding constructor
    pub extent: ExtentConfig,
    /// The two parameters of the convenience constructor
    pub extent_parts: ExtentPartsConfig,
    /// Planning tasks allowed to run at once in concurrent mode
    pub workers: usize,
    /// Report implicit overrides as errors
    pub strict_overrides: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtentConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtentPartsConfig {
    pub start: String,
    pub end: String,
    #[serde(rename = "type")]
    pub ty: String,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for NodegenConfig {
    fn default() -> Self {
        Self {
            impl_suffix: "Impl".to_string(),
            root_base: "AbstractTree".to_string(),
            extent: ExtentConfig::default(),
            extent_parts: ExtentPartsConfig::default(),
            workers: default_workers(),
            strict_overrides: false,
        }
    }
}

impl Default for ExtentConfig {
    fn default() -> Self {
        Self {
            name: "range".to_string(),
            ty: "SourceRange".to_string(),
        }
    }
}

impl Default for ExtentPartsConfig {
    fn default() -> Self {
        Self {
            start: "start".to_string(),
            end: "end".to_string(),
            ty: "SourcePosition".to_string(),
        }
    }
}

impl NodegenConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, NodegenError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| NodegenError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, NodegenError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NodegenError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<(), NodegenError> {
        let names = [
            ("impl_suffix", &self.impl_suffix),
            ("root_base", &self.root_base),
            ("extent.name", &self.extent.name),
            ("extent.type", &self.extent.ty),
            ("extent_parts.start", &self.extent_parts.start),
            ("extent_parts.end", &self.extent_parts.end),
            ("extent_parts.type", &self.extent_parts.ty),
        ];
        if let Some((key, _)) = names.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(NodegenError::Config(format!("'{}' must not be empty", key)));
        }
        if self.extent_parts.start == self.extent_parts.end {
            return Err(NodegenError::Config(format!(
                "extent_parts.start and extent_parts.end are both '{}'",
                self.extent_parts.start
            )));
        }
        if self.workers == 0 {
            return Err(NodegenError::Config("'workers' must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl FromStr for NodegenConfig {
    type Err = NodegenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = NodegenConfig::default();
        assert_eq!(config.impl_suffix, "Impl");
        assert_eq!(config.root_base, "AbstractTree");
        assert_eq!(config.extent.name, "range");
        assert_eq!(config.extent_parts.ty, "SourcePosition");
        assert!(config.workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: NodegenConfig = r#"
            impl_suffix = "Node"
            strict_overrides = true

            [extent]
            name = "span"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.impl_suffix, "Node");
        assert!(config.strict_overrides);
        assert_eq!(config.extent.name, "span");
        assert_eq!(config.extent.ty, "SourceRange");
        assert_eq!(config.root_base, "AbstractTree");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(NodegenConfig::from_toml_str("workers = 0").is_err());
        assert!(NodegenConfig::from_toml_str("impl_suffix = \"\"").is_err());
        assert!(NodegenConfig::from_toml_str("[extent_parts]\nend = \"start\"").is_err());
        assert!(NodegenConfig::from_toml_str("workers = \"many\"").is_err());
    }

    #[test]
    fn test_load_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "root_base = \"BaseNode\"\nworkers = 3")?;

        let config = NodegenConfig::load(file.path())?;
        assert_eq!(config.root_base, "BaseNode");
        assert_eq!(config.workers, 3);
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let result = NodegenConfig::load("/nonexistent/nodegen.toml");
        assert!(matches!(result, Err(NodegenError::Config(_))));
    }
}
