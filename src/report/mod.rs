//! Output for classification and bulk results.
//!
//! - [`terminal`]: colored fixed-width rows and summary tables; respects `--verbose` / `--quiet`.
//! - [`audit`]: `;`-separated per-run log and the cumulative skip file.
//!
//! Both renderers implement [`ReportSink`], so the license logic never knows
//! where its rows end up.

use anyhow::Result;

use crate::license::advisor::{SkuAssessment, SkuOutcome};
use crate::license::bulk::SkuSourceRow;
use crate::models::ServiceClassification;

pub mod audit;
pub mod terminal;

/// Receives every row the tools produce.
pub trait ReportSink {
    fn emit_service(&mut self, user: &str, row: &ServiceClassification) -> Result<()>;

    fn emit_assessment(&mut self, _user: &str, _assessment: &SkuAssessment) -> Result<()> {
        Ok(())
    }

    fn emit_outcome(&mut self, _user: &str, _outcome: &SkuOutcome) -> Result<()> {
        Ok(())
    }

    fn emit_source(&mut self, _row: &SkuSourceRow) -> Result<()> {
        Ok(())
    }

    /// Free-form line: warnings, recovered failures, run metadata.
    fn note(&mut self, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
pub struct NullSink;

impl ReportSink for NullSink {
    fn emit_service(&mut self, _user: &str, _row: &ServiceClassification) -> Result<()> {
        Ok(())
    }
}

/// Forwards every row to each inner sink in turn.
pub struct Fanout<'a> {
    sinks: Vec<&'a mut dyn ReportSink>,
}

impl<'a> Fanout<'a> {
    pub fn new(sinks: Vec<&'a mut dyn ReportSink>) -> Self {
        Self { sinks }
    }
}

impl ReportSink for Fanout<'_> {
    fn emit_service(&mut self, user: &str, row: &ServiceClassification) -> Result<()> {
        self.sinks.iter_mut().try_for_each(|s| s.emit_service(user, row))
    }

    fn emit_assessment(&mut self, user: &str, assessment: &SkuAssessment) -> Result<()> {
        self.sinks
            .iter_mut()
            .try_for_each(|s| s.emit_assessment(user, assessment))
    }

    fn emit_outcome(&mut self, user: &str, outcome: &SkuOutcome) -> Result<()> {
        self.sinks.iter_mut().try_for_each(|s| s.emit_outcome(user, outcome))
    }

    fn emit_source(&mut self, row: &SkuSourceRow) -> Result<()> {
        self.sinks.iter_mut().try_for_each(|s| s.emit_source(row))
    }

    fn note(&mut self, message: &str) -> Result<()> {
        self.sinks.iter_mut().try_for_each(|s| s.note(message))
    }
}
