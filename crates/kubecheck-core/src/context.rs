//! Per-probe state handed to every component.

use std::time::Duration;

use tracing::Span;

use crate::deadline::Deadline;

/// The only state shared between components of one probe run.
///
/// Holds the run's deadline (read-only to every consumer) and the tracing
/// span components log under. Components take it by reference rather than
/// consulting process-wide state.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub deadline: Deadline,
    pub span: Span,
}

impl ProbeContext {
    pub fn new(deadline: Deadline, span: Span) -> Self {
        Self { deadline, span }
    }

    /// Context with a fresh deadline and a disabled span.
    pub fn with_budget(budget: Duration) -> Self {
        Self::new(Deadline::new(budget), Span::none())
    }

    /// Same deadline, logging under a child span.
    pub fn child(&self, span: Span) -> Self {
        Self {
            deadline: self.deadline,
            span,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.remaining()
    }

    pub fn expired(&self) -> bool {
        self.deadline.expired()
    }
}
