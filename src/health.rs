//! Health score derived from the active error list.

use crate::types::{DebtLevel, ErrorInfo, Health, Severity};

const ERROR_PENALTY: u32 = 10;
const WARNING_PENALTY: u32 = 3;

const HIGH_DEBT_ERRORS: usize = 10;
const HIGH_DEBT_WARNINGS: usize = 50;
const MEDIUM_DEBT_ERRORS: usize = 5;
const MEDIUM_DEBT_WARNINGS: usize = 20;

impl DebtLevel {
    pub fn from_counts(errors: usize, warnings: usize) -> Self {
        if errors > HIGH_DEBT_ERRORS || warnings > HIGH_DEBT_WARNINGS {
            DebtLevel::High
        } else if errors > MEDIUM_DEBT_ERRORS || warnings > MEDIUM_DEBT_WARNINGS {
            DebtLevel::Medium
        } else {
            DebtLevel::Low
        }
    }
}

/// Scores a set of counts: 100 minus fixed penalties, floored at zero.
pub fn score(errors: usize, warnings: usize) -> u8 {
    let penalty = (errors as u64)
        .saturating_mul(ERROR_PENALTY as u64)
        .saturating_add((warnings as u64).saturating_mul(WARNING_PENALTY as u64));
    100u64.saturating_sub(penalty) as u8
}

/// Counts by severity, so a lint at error level costs as much as a compile error.
pub fn assess(errors: &[ErrorInfo]) -> Health {
    let error_count = errors.iter().filter(|e| e.severity == Severity::Error).count();
    let warning_count = errors.iter().filter(|e| e.severity == Severity::Warning).count();

    Health {
        score: score(error_count, warning_count),
        error_count,
        warning_count,
        debt: DebtLevel::from_counts(error_count, warning_count),
    }
}
