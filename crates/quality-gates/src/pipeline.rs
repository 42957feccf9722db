//! Quality Gate Pipeline
//!
//! Runs the validators in a fixed order. The first failing gate stops the run
//! and every later gate is reported as skipped.

use tracing::debug;

use crate::models::{GateResult, QualityConfig, QualityVerdict};
use crate::validators::{
    check_artifacts, check_echo, check_empty, check_length, check_repetition, GateInput,
    Validator,
};

/// Gate identifiers in execution order
pub const GATE_ORDER: &[&str] = &["empty", "length", "artifacts", "echo", "repetition"];

/// Fixed-order pipeline over the built-in validators
#[derive(Debug, Clone)]
pub struct QualityGatePipeline {
    config: QualityConfig,
    gates: Vec<(&'static str, Validator)>,
}

impl QualityGatePipeline {
    pub fn new(config: QualityConfig) -> Self {
        let gates: Vec<(&'static str, Validator)> = vec![
            ("empty", check_empty),
            ("length", check_length),
            ("artifacts", check_artifacts),
            ("echo", check_echo),
            ("repetition", check_repetition),
        ];
        Self { config, gates }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Check one reply against the command it answers
    pub fn evaluate(&self, command: &str, reply: &str) -> QualityVerdict {
        let input = GateInput::new(command, reply);
        let mut results = Vec::with_capacity(self.gates.len());
        let mut failed = false;

        for (gate_id, validator) in &self.gates {
            if failed {
                results.push(GateResult::skipped(gate_id));
                continue;
            }
            match validator(&input, &self.config) {
                Some(failure) => {
                    debug!(gate = gate_id, %failure, "quality gate rejected reply");
                    results.push(GateResult::failed(gate_id, failure));
                    failed = true;
                }
                None => results.push(GateResult::passed(gate_id)),
            }
        }

        QualityVerdict { results }
    }
}

impl Default for QualityGatePipeline {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}
