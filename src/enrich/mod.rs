//! Best-effort transcript enrichment: word alignment and speaker labels.
//!
//! Both stages report an explicit [`Enrichment`] outcome. Any engine failure
//! becomes `Omitted`; only the caller's own arguments are checked up front.

pub mod align;
pub mod diarize;

pub use align::{Aligner, CharRateAligner};
pub use diarize::{DiarizationInterval, Diarizer, SpeakerBounds, assign_speakers};

use crate::error::Result;

/// Outcome of an optional stage that ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment<T> {
    /// The stage produced its data.
    Applied(T),
    /// The stage failed or was skipped; the transcript stays as it was.
    Omitted { reason: String },
}

impl<T> Enrichment<T> {
    pub fn omitted(reason: impl Into<String>) -> Self {
        Enrichment::Omitted {
            reason: reason.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Enrichment::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Enrichment::Applied(value) => Some(value),
            Enrichment::Omitted { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Enrichment::Applied(_) => None,
            Enrichment::Omitted { reason } => Some(reason),
        }
    }
}

/// Turn an engine result into an outcome. No engine error is fatal.
pub(crate) fn recover<T>(stage: &'static str, result: Result<T>) -> Enrichment<T> {
    match result {
        Ok(value) => Enrichment::Applied(value),
        Err(e) => {
            tracing::warn!(stage, kind = %e.kind(), error = %e, "enrichment omitted");
            Enrichment::omitted(e.to_string())
        }
    }
}
