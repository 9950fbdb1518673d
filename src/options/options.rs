use bson::Document;
use serde::Deserialize;
use crate::error::Result;

/// Controls how aggressively filter conditions are rewritten.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptimizationMode {
    /// Full DNF conversion and conjunction optimization. Falls back to an unoptimized
    /// condition when the DNF would be too large.
    Auto,
    /// DNF conversion only; conjunctions keep their members (IN lists are still sorted).
    None,
    /// Like `None`, but NOT nodes are left where the user wrote them.
    NoNegationPush,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerOptions {
    optimization_mode: Option<OptimizationMode>,

    /// Maximum number of AND clauses the DNF distribution may produce.
    max_dnf_conditions: Option<usize>,
}

impl OptimizerOptions {

    /// Reads the options from a BSON document such as
    /// `{ "optimizationMode": "noNegationPush", "maxDnfConditions": 1024 }`.
    pub fn from_document(doc: &Document) -> Result<Self> {
        Ok(bson::from_document(doc.clone())?)
    }

    pub fn with_optimization_mode(mut self, mode: OptimizationMode) -> Self {
        self.optimization_mode = Some(mode);
        self
    }

    pub fn with_max_dnf_conditions(mut self, max: usize) -> Self {
        self.max_dnf_conditions = Some(max);
        self
    }

    pub fn optimization_mode(&self) -> OptimizationMode {
        self.optimization_mode.unwrap_or(OptimizationMode::Auto)
    }

    pub fn max_dnf_conditions(&self) -> usize {
        self.max_dnf_conditions.unwrap_or(65_536)
    }
}
