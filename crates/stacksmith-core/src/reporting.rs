//! Stack report rendering.
//!
//! The report is the operator-facing summary written at the end of a
//! run: partition table, applied fixes, and audit findings.

use std::path::Path;

use crate::domain::error::Result;
use crate::domain::plan::StackPlan;
use crate::domain::quality::StackAudit;
use crate::plan_doc::PlanDocument;

/// Render the markdown stack summary.
pub fn render_report(doc: &PlanDocument, audit: Option<&StackAudit>) -> String {
    let mut out = String::new();
    out.push_str("# Stack Summary\n\n");
    out.push_str(&format!("- session: `{}`\n", doc.session.session_id));
    out.push_str(&format!("- stage: `{:?}`\n", doc.session.stage));
    out.push_str(&format!("- backup ref: `{}`\n", doc.session.backup_ref));

    if let Some(summary) = &doc.summary {
        out.push_str(&format!(
            "- changed files: {} ({} import edges)\n",
            summary.file_count, summary.edge_count
        ));
        for (tag, count) in &summary.tag_counts {
            out.push_str(&format!("  - {tag}: {count}\n"));
        }
    }
    out.push('\n');

    match &doc.session.plan {
        Some(plan) => render_plan(&mut out, plan),
        None => out.push_str("No plan was produced.\n"),
    }

    if let Some(audit) = audit {
        render_audit(&mut out, audit);
    }

    out
}

fn render_plan(out: &mut String, plan: &StackPlan) {
    out.push_str(&format!(
        "## Partitions ({}, base `{}`)\n\n",
        plan.partitions.len(),
        plan.base_ref
    ));
    out.push_str("| # | branch | status | files | lines |\n");
    out.push_str("|---|--------|--------|-------|-------|\n");
    for (idx, p) in plan.partitions.iter().enumerate() {
        out.push_str(&format!(
            "| {} | `{}` | {:?} | {} | {} |\n",
            idx + 1,
            p.name,
            p.status,
            p.files.len(),
            p.lines_changed
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ));
    }
    out.push('\n');

    let fixes: Vec<_> = plan
        .partitions
        .iter()
        .flat_map(|p| p.fixes.iter().map(move |f| (p.name.as_str(), f)))
        .collect();
    if !fixes.is_empty() {
        out.push_str("## Applied Fixes\n\n");
        for (partition, fix) in fixes {
            let location = fix.found_in.as_deref().unwrap_or("not found");
            out.push_str(&format!(
                "- `{partition}`: {:?} `{}` from {location}{}\n",
                fix.failure_class,
                fix.artifact,
                if fix.propagated { " (propagated)" } else { "" },
            ));
        }
        out.push('\n');
    }
}

fn render_audit(out: &mut String, audit: &StackAudit) {
    out.push_str(&format!("## Quality Audit (score {}/100)\n\n", audit.score));
    for finding in &audit.findings {
        if finding.flags.is_empty() {
            out.push_str(&format!("- `{}`: clean\n", finding.partition));
        } else {
            out.push_str(&format!(
                "- `{}`: {:?}\n",
                finding.partition, finding.flags
            ));
            for note in &finding.notes {
                out.push_str(&format!("  - {note}\n"));
            }
        }
    }
}

/// Write the report to disk.
pub fn write_report(path: &Path, doc: &PlanDocument, audit: Option<&StackAudit>) -> Result<()> {
    std::fs::write(path, render_report(doc, audit))?;
    Ok(())
}
