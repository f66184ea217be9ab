//! Validation engine: runs every check, scores the result and decides
//! whether the scene may complete.
//!
//! Scoring starts at 100 and subtracts a penalty per issue, clamped at 0.
//! A scene passes when the score reaches the passing threshold and no
//! error-severity issue remains.

use anyhow::Result;
use log::info;

use crate::{
    config::ValidationSection,
    model::{EntityStatus, Issue, IssueCategory, Severity, ValidationOutcome},
    record::{SceneRecord, StageUpdate},
    stages::StageContext,
};

pub mod checks;
pub mod report;

pub fn penalty(issue: &Issue) -> u32 {
    match issue.severity {
        Severity::Error => 10,
        Severity::Info => 1,
        Severity::Warning => match issue.category {
            IssueCategory::Clipping | IssueCategory::Floating => 3,
            IssueCategory::Overexposure => 4,
            IssueCategory::Lighting
            | IssueCategory::Material
            | IssueCategory::PromptAlignment
            | IssueCategory::MissingAsset => 5,
        },
    }
}

pub fn score_issues(issues: &[Issue]) -> u32 {
    let total = issues.iter().fold(0u32, |acc, i| acc.saturating_add(penalty(i)));
    100u32.saturating_sub(total)
}

pub fn passes(score: u32, issues: &[Issue], passing_score: u32) -> bool {
    score >= passing_score && !issues.iter().any(|i| i.severity == Severity::Error)
}

/// All checks over the current record, in a fixed order.
pub fn run_checks(record: &SceneRecord, limits: &ValidationSection) -> Vec<Issue> {
    let entities = &record.entities;
    let lighting = record.lighting.as_ref();
    let mut issues = checks::collisions(entities, limits);
    issues.extend(checks::resting(entities, limits));
    issues.extend(checks::materials(entities));
    issues.extend(checks::exposure(entities, lighting, limits));
    issues.extend(checks::lights(lighting, limits));
    issues.extend(checks::alignment(record.plan.as_ref(), entities));
    issues.extend(checks::placeholders(entities));
    issues
}

pub fn validate(ctx: &StageContext<'_>, record: &SceneRecord) -> Result<StageUpdate> {
    let limits = &ctx.settings.validation;
    info!("[validator] validating {} entities", record.entities.len());

    let issues = run_checks(record, limits);
    let score = score_issues(&issues);
    let passed = passes(score, &issues, limits.passing_score);

    let count = |s: Severity| issues.iter().filter(|i| i.severity == s).count();
    let summary = format!(
        "score {score}/100, {}, {} issues ({} errors, {} warnings, {} info)",
        if passed { "passed" } else { "failed" },
        issues.len(),
        count(Severity::Error),
        count(Severity::Warning),
        count(Severity::Info)
    );
    info!("[validator] {summary}");

    let mut update = StageUpdate {
        summary,
        ..StageUpdate::default()
    };
    let report = if passed {
        let validated: Vec<_> = record
            .entities
            .iter()
            .cloned()
            .map(|mut e| {
                e.status = EntityStatus::Validated;
                e
            })
            .collect();
        let mut final_view = record.clone();
        final_view.entities = validated.clone();
        update.entities = Some(validated);
        Some(report::render(&final_view, &issues, score, true, None))
    } else {
        None
    };

    update.validation = Some(ValidationOutcome {
        passed,
        score,
        report,
    });
    update.issues = Some(issues);
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity, category: IssueCategory) -> Issue {
        Issue::new(severity, category, "x")
    }

    #[test]
    fn penalties_by_severity_and_category() {
        assert_eq!(penalty(&issue(Severity::Error, IssueCategory::Clipping)), 10);
        assert_eq!(penalty(&issue(Severity::Warning, IssueCategory::Floating)), 3);
        assert_eq!(penalty(&issue(Severity::Warning, IssueCategory::Overexposure)), 4);
        assert_eq!(penalty(&issue(Severity::Warning, IssueCategory::MissingAsset)), 5);
        assert_eq!(penalty(&issue(Severity::Info, IssueCategory::Material)), 1);
    }

    #[test]
    fn score_clamps_at_zero() {
        let issues = vec![issue(Severity::Error, IssueCategory::Clipping); 12];
        assert_eq!(score_issues(&issues), 0);
        assert_eq!(score_issues(&[]), 100);
    }

    #[test]
    fn any_error_blocks_pass() {
        let issues = vec![issue(Severity::Error, IssueCategory::Lighting)];
        assert_eq!(score_issues(&issues), 90);
        assert!(!passes(90, &issues, 60));
        let warnings = vec![issue(Severity::Warning, IssueCategory::Material); 8];
        assert_eq!(score_issues(&warnings), 60);
        assert!(passes(60, &warnings, 60));
        assert!(!passes(55, &warnings, 60));
    }
}
