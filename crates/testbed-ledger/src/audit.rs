use std::time::Instant;

use crate::action::ActionKind;

/// Outcome of one compensating action during a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ActionStatus {
    /// The action is running (or the drain was interrupted while it ran).
    Running,
    /// The action completed successfully.
    Compensated,
    /// The action returned an error.
    CompensationFailed,
    /// The action was not run because the environment keeps resources.
    Skipped,
}

/// Record of a single compensating action in a drain.
#[derive(Debug)]
pub struct ActionRecord {
    /// Label of the action.
    pub label: String,
    /// Description of the compensation.
    pub description: String,
    pub kind: ActionKind,
    /// Current status.
    pub status: ActionStatus,
    /// When the drain reached this action.
    pub started_at: Instant,
    /// When the action finished or was skipped.
    pub completed_at: Option<Instant>,
    /// Non-fatal findings reported by the action.
    pub diagnostics: Vec<String>,
}

/// Audit log of one drain, in execution order (last registered first).
#[derive(Debug, Default)]
pub struct DrainAuditLog {
    records: Vec<ActionRecord>,
}

impl DrainAuditLog {
    /// Create a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&mut self, label: &str, description: &str, kind: ActionKind) {
        self.records.push(ActionRecord {
            label: label.to_string(),
            description: description.to_string(),
            kind,
            status: ActionStatus::Running,
            started_at: Instant::now(),
            completed_at: None,
            diagnostics: Vec::new(),
        });
    }

    pub(crate) fn record_outcome(&mut self, status: ActionStatus, diagnostics: Vec<String>) {
        if let Some(record) = self.records.last_mut() {
            record.status = status;
            record.completed_at = Some(Instant::now());
            record.diagnostics = diagnostics;
        }
    }

    /// Get all records in the audit log.
    #[must_use]
    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    /// Labels in the order the drain visited them.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.label.as_str()).collect()
    }

    /// One line per action, suitable for terminal output.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                ActionStatus::Running => "…",
                ActionStatus::Compensated => "↩",
                ActionStatus::CompensationFailed => "⚠",
                ActionStatus::Skipped => "⏭",
            };
            lines.push(format!("{status} {}", record.label));
            for diagnostic in &record.diagnostics {
                lines.push(format!("    note: {diagnostic}"));
            }
        }
        lines.join("\n")
    }
}
