//! Analysis results

use serde::{Deserialize, Serialize};

use crate::features::dispose::application::AnalysisStats;
use crate::features::dispose::domain::Verdict;
use crate::features::flow_graph::domain::ProcedureId;

/// Why a procedure was not analyzed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Matched `excluded_symbol_names`
    Excluded,
    /// Contains no operation that could create a disposable instance
    NoDisposableCreation,
}

/// Result of [`analyze_procedure`](super::analyze_procedure)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureAnalysis {
    /// Qualified method path
    pub procedure: String,
    pub verdicts: Vec<Verdict>,
    pub stats: AnalysisStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl ProcedureAnalysis {
    pub fn skipped(procedure: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            procedure: procedure.into(),
            verdicts: Vec::new(),
            stats: AnalysisStats::default(),
            skipped: Some(reason),
        }
    }
}

/// Per-procedure outcome of a program run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Completed {
        verdicts: Vec<Verdict>,
        stats: AnalysisStats,
    },
    Skipped {
        reason: SkipReason,
    },
    /// Cancelled before completion; no verdicts
    Cancelled,
    /// Malformed CFG or non-convergence; isolated to this procedure
    Failed {
        error: String,
    },
}

/// Outcome of one procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureReport {
    pub id: ProcedureId,
    pub procedure: String,
    pub outcome: AnalysisOutcome,
}

impl ProcedureReport {
    pub fn verdicts(&self) -> &[Verdict] {
        match &self.outcome {
            AnalysisOutcome::Completed { verdicts, .. } => verdicts,
            _ => &[],
        }
    }
}

/// Outcome of [`analyze_program`](super::analyze_program), in procedure order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramReport {
    pub procedures: Vec<ProcedureReport>,
}

impl ProgramReport {
    /// Every verdict with its procedure name
    pub fn verdicts(&self) -> impl Iterator<Item = (&str, &Verdict)> {
        self.procedures
            .iter()
            .flat_map(|r| r.verdicts().iter().map(move |v| (r.procedure.as_str(), v)))
    }

    pub fn verdict_count(&self) -> usize {
        self.procedures.iter().map(|r| r.verdicts().len()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcedureReport> {
        self.procedures
            .iter()
            .filter(|r| matches!(r.outcome, AnalysisOutcome::Failed { .. }))
    }

    pub fn is_cancelled(&self) -> bool {
        self.procedures
            .iter()
            .any(|r| r.outcome == AnalysisOutcome::Cancelled)
    }
}
