use std::fmt::Write as _;

use testbed_core::ResourcePlan;
use testbed_ledger::FailureRecord;
use testbed_provision::SessionError;

/// Provisioning order of a plan and the order its teardown would run in.
pub(crate) fn plan_order(plan: &ResourcePlan) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "plan '{}': {} resource(s)",
        plan.display_name(),
        plan.resources.len()
    );

    output.push_str("\nprovision:\n");
    for (index, resource) in plan.resources.iter().enumerate() {
        let identity = resource
            .key()
            .map_or_else(|e| e.to_string(), |key| key.to_string());
        let wait = if resource.await_ready {
            format!("wait for {}", resource.condition())
        } else {
            "no wait".to_string()
        };
        let _ = writeln!(output, "  {}. {identity} ({wait})", index + 1);
    }

    output.push_str("\nteardown:\n");
    for (index, resource) in plan.resources.iter().rev().enumerate() {
        if let Ok(key) = resource.key() {
            let _ = writeln!(output, "  {}. {key}", index + 1);
        }
    }
    output
}

/// Indent every line of `text` by two spaces.
pub(crate) fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Suppressed errors with their causes, then diagnostics, one per line.
pub(crate) fn failure_details(record: &FailureRecord<SessionError>) -> Vec<String> {
    let mut lines = Vec::new();
    for suppressed in record.suppressed() {
        lines.push(format!("suppressed: {suppressed}"));
        let mut source = suppressed.source();
        while let Some(cause) = source {
            lines.push(format!("  caused by: {cause}"));
            source = cause.source();
        }
    }
    for diagnostic in record.diagnostics() {
        lines.push(format!("note: {diagnostic}"));
    }
    lines
}
