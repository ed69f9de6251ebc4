use serde::Serialize;

use crate::executor::{CaseResult, CaseStatus};

#[derive(Debug, Clone, Serialize)]
pub struct GroupTally {
    pub group_name: String,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub groups: Vec<GroupTally>,
}

pub fn summarize(results: &[CaseResult]) -> RunSummary {
    let mut summary = RunSummary {
        total: results.len(),
        ..Default::default()
    };
    for result in results {
        let idx = match summary
            .groups
            .iter()
            .position(|g| g.group_name == result.group_name)
        {
            Some(idx) => idx,
            None => {
                summary.groups.push(GroupTally {
                    group_name: result.group_name.clone(),
                    passed: 0,
                    failed: 0,
                    skipped: 0,
                });
                summary.groups.len() - 1
            }
        };
        let tally = &mut summary.groups[idx];
        match result.status {
            CaseStatus::Pass => {
                summary.passed += 1;
                tally.passed += 1;
            }
            CaseStatus::Fail => {
                summary.failed += 1;
                tally.failed += 1;
            }
            CaseStatus::Skipped => {
                summary.skipped += 1;
                tally.skipped += 1;
            }
        }
    }
    summary
}

/// Terminal report: one line per case, indented diagnostics for failures,
/// then per-group and overall tallies.
pub fn print_report(results: &[CaseResult], summary: &RunSummary) {
    for result in results {
        let label = match result.status {
            CaseStatus::Pass => "PASS",
            CaseStatus::Fail => "FAIL",
            CaseStatus::Skipped => "SKIP",
        };
        println!("{}  {}", label, result.case_name);
        if result.status == CaseStatus::Pass {
            continue;
        }
        if let Some(message) = &result.final_fail_message {
            println!("      {}", message);
        }
        for outcome in &result.request_outcomes {
            for message in outcome.failure_messages() {
                println!("      {}: {}", outcome.request_name, message);
            }
        }
    }

    println!();
    for tally in &summary.groups {
        println!(
            "Group {}: {} passed, {} failed, {} skipped",
            tally.group_name, tally.passed, tally.failed, tally.skipped
        );
    }
    println!(
        "Total: {} cases — {} passed, {} failed, {} skipped",
        summary.total, summary.passed, summary.failed, summary.skipped
    );
}

/// Non-zero on any failure; skipped cases also gate unless excluded.
pub fn exit_code(summary: &RunSummary, ignore_skipped: bool) -> i32 {
    if summary.failed > 0 {
        return 1;
    }
    if summary.skipped > 0 && !ignore_skipped {
        return 1;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(group: &str, name: &str, status: CaseStatus) -> CaseResult {
        CaseResult {
            case_name: name.to_string(),
            group_name: group.to_string(),
            status,
            request_outcomes: Vec::new(),
            final_fail_message: None,
        }
    }

    #[test]
    fn summarize_tallies_per_group_and_overall() {
        let results = vec![
            result("Locks", "a", CaseStatus::Pass),
            result("Locks", "b", CaseStatus::Fail),
            result("GetFile", "c", CaseStatus::Skipped),
        ];
        let summary = summarize(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.groups.len(), 2);
        assert_eq!(summary.groups[0].group_name, "Locks");
        assert_eq!(summary.groups[0].failed, 1);
    }

    #[test]
    fn exit_code_gates_on_fail_and_skip() {
        let mut summary = RunSummary {
            total: 2,
            passed: 2,
            ..Default::default()
        };
        assert_eq!(exit_code(&summary, false), 0);

        summary.skipped = 1;
        assert_eq!(exit_code(&summary, false), 1);
        assert_eq!(exit_code(&summary, true), 0);

        summary.failed = 1;
        assert_eq!(exit_code(&summary, true), 1);
    }
}
