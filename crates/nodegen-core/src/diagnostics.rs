//! Non-fatal findings collected while resolving and planning specs
//!
//! Nothing in the engine aborts a run. Warnings and per-spec failures are
//! recorded here, attributed to a spec and optionally one of its properties,
//! and reported together at the end.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::model::{PropertyId, SpecId};

/// Where a diagnostic applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Site {
    pub spec: SpecId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property: Option<PropertyId>,
}

impl Site {
    pub fn spec(spec: impl Into<SpecId>) -> Self {
        Self {
            spec: spec.into(),
            property: None,
        }
    }

    pub fn property(spec: impl Into<SpecId>, property: impl Into<PropertyId>) -> Self {
        Self {
            spec: spec.into(),
            property: Some(property.into()),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.property {
            Some(property) => write!(f, "{}::{}", self.spec, property),
            None => write!(f, "{}", self.spec),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Malformed declaration or spec
    Validation,
    /// Ordering could not be satisfied
    Cycle,
    /// A parent identity could not be resolved
    MissingAncestor,
    /// A parent identity was replaced by a host-synthesized placeholder
    Placeholder,
    /// A member was redeclared without an override marker
    OverrideAmbiguity,
    /// A field name was reused without an override relationship
    FieldCollision,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Validation => write!(f, "VALIDATION"),
            Category::Cycle => write!(f, "CYCLE"),
            Category::MissingAncestor => write!(f, "MISSING_ANCESTOR"),
            Category::Placeholder => write!(f, "PLACEHOLDER"),
            Category::OverrideAmbiguity => write!(f, "OVERRIDE_AMBIGUITY"),
            Category::FieldCollision => write!(f, "FIELD_COLLISION"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub site: Site,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        category: Category,
        site: Site,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            site,
            message: message.into(),
        }
    }

    pub fn warning(category: Category, site: Site, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, site, message)
    }

    pub fn error(category: Category, site: Site, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, site, message)
    }

    pub fn note(category: Category, site: Site, message: impl Into<String>) -> Self {
        Self::new(Severity::Note, category, site, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Forward this diagnostic to `tracing` at the matching level
    pub fn emit(&self) {
        match self.severity {
            Severity::Error => tracing::error!(site = %self.site, category = %self.category, "{}", self.message),
            Severity::Warning => tracing::warn!(site = %self.site, category = %self.category, "{}", self.message),
            Severity::Note => tracing::debug!(site = %self.site, category = %self.category, "{}", self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] at {}: {}",
            self.severity, self.category, self.site, self.message
        )
    }
}

/// Ordered collection of diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Push a newly found diagnostic and log it
    pub fn record(&mut self, diagnostic: Diagnostic) {
        diagnostic.emit();
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Take over diagnostics that were collected without being logged
    pub fn record_all(&mut self, other: Diagnostics) {
        for diagnostic in other {
            self.record(diagnostic);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.category == category)
    }

    pub fn for_spec<'a>(&'a self, spec: &'a SpecId) -> impl Iterator<Item = &'a Diagnostic> {
        self.entries.iter().filter(move |d| &d.site.spec == spec)
    }

    /// Grouped report, at most ten entries shown per category
    pub fn format_summary(&self) -> String {
        if self.entries.is_empty() {
            return "No diagnostics".to_string();
        }

        let mut by_category: BTreeMap<Category, Vec<&Diagnostic>> = BTreeMap::new();
        for entry in &self.entries {
            by_category.entry(entry.category).or_default().push(entry);
        }

        let mut lines = Vec::new();
        lines.push(format!("Found {} diagnostic(s):", self.entries.len()));
        lines.push(String::new());

        for (category, entries) in by_category {
            lines.push(format!("## {} ({}):", category, entries.len()));
            for entry in entries.iter().take(10) {
                lines.push(format!("  - {}", entry));
            }
            if entries.len() > 10 {
                lines.push(format!("  ... and {} more", entries.len() - 10));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_summary())
    }
}
