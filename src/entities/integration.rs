// 🔌 Integration Entity - a sub-system owned by exactly one application
//
// Integrations are append-only during import: every row with an integration
// name produces a fresh record, categorized with that row's categories only.

use super::ratings::{PartialRatings, RatingFactors};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: i64,
    pub application_id: i64,
    pub name: String,
    pub vendor: String,
    pub ratings: RatingFactors,
    pub notes: String,
    pub risk_score: i64,
    pub last_modified: String,
}

/// Integration fields as decoded from one row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationInput {
    pub name: String,
    pub vendor: String,
    pub notes: String,
    pub ratings: PartialRatings,

    /// Risk supplied by the file, overrides the computed one
    pub risk: Option<i64>,

    /// Last-modified supplied by the file, kept verbatim
    pub last_modified: Option<String>,
}

impl IntegrationInput {
    /// Materialize the record for `application_id`
    pub fn to_integration(&self, application_id: i64, now: DateTime<Utc>) -> Integration {
        let ratings = self.ratings.resolved();
        Integration {
            id: 0,
            application_id,
            name: self.name.clone(),
            vendor: self.vendor.clone(),
            risk_score: self.risk.unwrap_or_else(|| ratings.risk()),
            ratings,
            notes: self.notes.clone(),
            last_modified: self
                .last_modified
                .clone()
                .unwrap_or_else(|| now.to_rfc3339()),
        }
    }
}
