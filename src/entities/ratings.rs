// 📊 Rating Factors - the nine integer scores shared by applications and integrations

use serde::{Deserialize, Serialize};

/// Column names in storage order
pub const RATING_NAMES: [&str; 9] = [
    "score",
    "need",
    "criticality",
    "installed",
    "disaster_recovery",
    "safety",
    "security",
    "monetary",
    "customer_service",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingFactors {
    pub score: i64,
    pub need: i64,
    pub criticality: i64,
    pub installed: i64,
    pub disaster_recovery: i64,
    pub safety: i64,
    pub security: i64,
    pub monetary: i64,
    pub customer_service: i64,
}

impl RatingFactors {
    pub fn to_array(&self) -> [i64; 9] {
        [
            self.score,
            self.need,
            self.criticality,
            self.installed,
            self.disaster_recovery,
            self.safety,
            self.security,
            self.monetary,
            self.customer_service,
        ]
    }

    pub fn from_array(values: [i64; 9]) -> Self {
        RatingFactors {
            score: values[0],
            need: values[1],
            criticality: values[2],
            installed: values[3],
            disaster_recovery: values[4],
            safety: values[5],
            security: values[6],
            monetary: values[7],
            customer_service: values[8],
        }
    }

    /// Overwrite only the factors present in `partial`
    pub fn merge(&mut self, partial: &PartialRatings) {
        let mut values = self.to_array();
        for (slot, value) in values.iter_mut().zip(partial.values.iter()) {
            if let Some(v) = value {
                *slot = *v;
            }
        }
        *self = RatingFactors::from_array(values);
    }

    pub fn risk(&self) -> i64 {
        crate::risk::calculate_risk(self.score, self.criticality)
    }
}

/// Ratings as decoded from one row: None means the cell was empty or missing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialRatings {
    pub values: [Option<i64>; 9],
}

impl PartialRatings {
    /// Missing factors default to 0
    pub fn resolved(&self) -> RatingFactors {
        RatingFactors::from_array(self.values.map(|v| v.unwrap_or(0)))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overwrites_present_values_only() {
        let mut ratings = RatingFactors {
            score: 8,
            criticality: 5,
            security: 3,
            ..Default::default()
        };
        let mut partial = PartialRatings::default();
        partial.values[0] = Some(2); // score
        partial.values[6] = Some(0); // security, explicit zero still counts

        ratings.merge(&partial);

        assert_eq!(ratings.score, 2);
        assert_eq!(ratings.criticality, 5);
        assert_eq!(ratings.security, 0);
        assert_eq!(ratings.risk(), 40);
    }

    #[test]
    fn test_resolved_defaults_to_zero() {
        let mut partial = PartialRatings::default();
        assert!(partial.is_empty());
        partial.values[2] = Some(9);

        let ratings = partial.resolved();
        assert_eq!(ratings.criticality, 9);
        assert_eq!(ratings.score, 0);
        assert_eq!(ratings.risk(), 90);
    }
}
