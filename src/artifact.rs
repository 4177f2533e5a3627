//! The structured candidate produced by one generation attempt.
//!
//! An artifact is an ordered list of named items. Each item carries a primary
//! quantity (e.g. load) and an optional secondary quantity (e.g. repetitions).
//! Values are stored exactly as generated; no unit conversion or rounding
//! happens here.

use serde::{Deserialize, Serialize};

/// One named entry of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactItem {
    pub name: String,
    pub primary: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<f64>,
}

impl ArtifactItem {
    pub fn new(name: impl Into<String>, primary: f64, secondary: Option<f64>) -> Self {
        Self {
            name: name.into(),
            primary,
            secondary,
        }
    }

    /// Compact `name primary x secondary` rendering used in prompts and logs.
    pub fn describe(&self) -> String {
        match self.secondary {
            Some(secondary) => format!(
                "{} {} x {}",
                self.name,
                format_quantity(self.primary),
                format_quantity(secondary)
            ),
            None => format!("{} {}", self.name, format_quantity(self.primary)),
        }
    }
}

/// Ordered list of items; replaced wholesale on every (re)generation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Artifact {
    pub items: Vec<ArtifactItem>,
}

impl Artifact {
    pub fn new(items: Vec<ArtifactItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Single-line summary, e.g. `Squat 100 x 5, Plank 60`.
    pub fn summary(&self) -> String {
        self.items
            .iter()
            .map(ArtifactItem::describe)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Render whole numbers without a trailing `.0`.
pub(crate) fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
