//! Per-metric scanning results, populated by the (external) scanning pipeline before the Reply
//! Writer runs.

use std::collections::BTreeMap;

/// The metric every dialect gives special treatment: ordered first in Rspamc replies, and the
/// only metric Spamc replies report on.
pub const DEFAULT_METRIC: &str = "default";

/// A single named contribution to a metric's score.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Symbol {
    pub name: String,
    /// Auxiliary option strings, in the order the pipeline produced them.
    pub options: Vec<String>,
}

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    pub fn with_options(name: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }
}

/// The scored result of one metric (a named scoring dimension) for a task.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricResult {
    pub metric_name: String,
    pub required_score: f64,
    pub reject_score: f64,
    pub score: f64,
    /// Keyed by symbol name; iteration order is unspecified, matching the original hash-table
    /// based implementation (§9, Open Question).
    pub symbols: BTreeMap<String, Symbol>,
}

impl MetricResult {
    pub fn new(metric_name: impl Into<String>, required_score: f64, reject_score: f64) -> Self {
        Self {
            metric_name: metric_name.into(),
            required_score,
            reject_score,
            score: 0.0,
            symbols: BTreeMap::new(),
        }
    }

    /// `True` iff `score >= required_score`.
    pub fn is_spam(&self) -> bool {
        self.score >= self.required_score
    }

    pub fn add_symbol(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.name.clone(), symbol);
    }

    pub fn is_default(&self) -> bool {
        self.metric_name == DEFAULT_METRIC
    }
}
