// ⚠️ Risk Calculator
//
// risk = max(0, (10 - score) × criticality)
//
// Inputs are deliberately not clamped to 0..=10; a score of 12 simply yields 0
// and a negative criticality yields 0 through the floor.

/// Top of the rating scale
pub const SCALE_MAX: i64 = 10;

pub fn calculate_risk(score: i64, criticality: i64) -> i64 {
    let raw = SCALE_MAX.saturating_sub(score).saturating_mul(criticality);
    raw.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(calculate_risk(7, 8), 24);
        assert_eq!(calculate_risk(10, 5), 0);
        assert_eq!(calculate_risk(8, 5), 10);
        assert_eq!(calculate_risk(0, 0), 0);
    }

    #[test]
    fn test_out_of_range_inputs_are_not_clamped() {
        // (10 - 0) × 12
        assert_eq!(calculate_risk(0, 12), 120);
        // (10 - (-2)) × 3
        assert_eq!(calculate_risk(-2, 3), 36);
        // Negative products floor at zero
        assert_eq!(calculate_risk(12, 4), 0);
        assert_eq!(calculate_risk(3, -4), 0);
    }

    #[test]
    fn test_matches_formula_over_grid() {
        for score in -5..=15 {
            for criticality in -5..=15 {
                let expected = ((10 - score) * criticality).max(0);
                assert_eq!(calculate_risk(score, criticality), expected);
            }
        }
    }

    #[test]
    fn test_extreme_values_do_not_overflow() {
        assert_eq!(calculate_risk(i64::MIN, i64::MAX), i64::MAX);
        assert_eq!(calculate_risk(i64::MAX, i64::MAX), 0);
    }
}
