use std::error::Error;
use std::fmt;

use crate::action::Diagnostic;

/// Boxed error used for secondary failures of heterogeneous origin.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Error from a failed compensating action.
#[derive(Debug, thiserror::Error)]
#[error("compensation failed for '{action}': {description}")]
pub struct CompensationError<E> {
    /// Label of the action whose compensation failed.
    pub action: String,
    /// Description of what the compensation was trying to do.
    pub description: String,
    /// The underlying error.
    #[source]
    pub error: E,
}

/// Error raised by a failure handler while it was reporting another error.
#[derive(Debug, thiserror::Error)]
#[error("failed to run failure handler")]
pub struct HandlerFailure {
    #[source]
    pub source: BoxError,
}

/// The error that started a failure path, plus everything that went wrong
/// while recovering from it.
///
/// The primary error is never replaced. Secondary errors are kept in the
/// order they occurred.
#[derive(Debug)]
pub struct FailureRecord<E> {
    primary: E,
    suppressed: Vec<BoxError>,
    diagnostics: Vec<Diagnostic>,
}

impl<E> FailureRecord<E> {
    #[must_use]
    pub fn new(primary: E) -> Self {
        Self {
            primary,
            suppressed: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// The error that triggered the failure path.
    pub fn primary(&self) -> &E {
        &self.primary
    }

    #[must_use]
    pub fn into_primary(self) -> E {
        self.primary
    }

    /// Secondary errors, in the order they were observed.
    #[must_use]
    pub fn suppressed(&self) -> &[BoxError] {
        &self.suppressed
    }

    /// Non-fatal findings recorded while compensating.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Attach a secondary error without touching the primary one.
    pub fn suppress(&mut self, error: impl Into<BoxError>) {
        self.suppressed.push(error.into());
    }

    pub(crate) fn extend_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    #[must_use]
    pub fn into_parts(self) -> (E, Vec<BoxError>, Vec<Diagnostic>) {
        (self.primary, self.suppressed, self.diagnostics)
    }
}

impl<E: fmt::Display> fmt::Display for FailureRecord<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.primary)?;
        match self.suppressed.len() {
            0 => Ok(()),
            1 => write!(f, " (1 suppressed error)"),
            n => write!(f, " ({n} suppressed errors)"),
        }
    }
}

impl<E> Error for FailureRecord<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.primary.source()
    }
}
