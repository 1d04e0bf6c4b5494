//! Replacement-tree compensation calculation.
//!
//! Number of trees to plant for an approved intervention:
//! `max(1, ceil((DAP_cm / 10) * coefficient))`. A permit that owes
//! compensation always owes at least one tree, however small the trunk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Human-readable formula stored with every calculation.
pub const FORMULA: &str = "ceil((DAP/10)*coeficiente)";

/// Inputs and result of one calculation, kept so the number on the permit
/// stays verifiable even if the diameter or coefficient fields are later
/// edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationAudit {
    pub dbh_cm: f64,
    pub coefficient: f64,
    pub formula: String,
    pub result: u32,
    pub computed_at: DateTime<Utc>,
}

/// Pure formula. Callers must pass positive inputs; see [`compute`] for the
/// missing-input-tolerant entry point.
pub fn trees_to_plant(dbh_cm: f64, coefficient: f64) -> u32 {
    let raw = (dbh_cm / 10.0) * coefficient;
    (raw.ceil() as u32).max(1)
}

/// Calculate compensation if both inputs are present and positive.
///
/// Returns `None` when an input is missing or non-positive: the calculation
/// is skipped, not failed, and the decision falls to a human reviewer.
pub fn compute(dbh_cm: Option<f64>, coefficient: Option<f64>) -> Option<CompensationAudit> {
    let dbh_cm = dbh_cm.filter(|d| *d > 0.0)?;
    let coefficient = coefficient.filter(|c| *c > 0.0)?;

    let result = trees_to_plant(dbh_cm, coefficient);
    Some(CompensationAudit {
        dbh_cm,
        coefficient,
        formula: FORMULA.to_string(),
        result,
        computed_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roble_scenario() {
        // Roble has coefficient 2.0: ceil(45/10 * 2.0) = 9
        assert_eq!(trees_to_plant(45.0, 2.0), 9);
    }

    #[test]
    fn test_floor_of_one_for_tiny_trunks() {
        // ceil(0.3 * 0.5) = ceil(0.15) = 1
        assert_eq!(trees_to_plant(3.0, 0.5), 1);
        assert_eq!(trees_to_plant(0.1, 0.1), 1);
    }

    #[test]
    fn test_matches_ceiling_for_valid_inputs() {
        for (dbh, coef) in [(45.0f64, 1.5), (60.0, 1.0), (12.5, 0.8), (100.0, 2.0)] {
            let expected = ((dbh / 10.0) * coef).ceil() as u32;
            let got = trees_to_plant(dbh, coef);
            assert_eq!(got, expected.max(1));
            assert!(got >= 1);
        }
    }

    #[test]
    fn test_idempotent() {
        assert_eq!(trees_to_plant(45.0, 2.0), trees_to_plant(45.0, 2.0));
    }

    #[test]
    fn test_compute_skips_missing_inputs() {
        assert!(compute(None, Some(1.0)).is_none());
        assert!(compute(Some(45.0), None).is_none());
        assert!(compute(None, None).is_none());
    }

    #[test]
    fn test_compute_skips_non_positive_inputs() {
        assert!(compute(Some(0.0), Some(1.0)).is_none());
        assert!(compute(Some(-5.0), Some(1.0)).is_none());
        assert!(compute(Some(45.0), Some(0.0)).is_none());
    }

    #[test]
    fn test_compute_records_audit() {
        let audit = compute(Some(45.0), Some(2.0)).unwrap();
        assert_eq!(audit.result, 9);
        assert_eq!(audit.dbh_cm, 45.0);
        assert_eq!(audit.coefficient, 2.0);
        assert_eq!(audit.formula, FORMULA);
    }
}
