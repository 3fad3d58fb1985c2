// 🗂️ Application Entity - one tracked business system (a.k.a. division)
//
// Identity inside an import run is the normalized name. The first row that
// names an application creates it, later rows update it in place.

use super::ratings::{PartialRatings, RatingFactors};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// STORED APPLICATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
    pub vendor: String,
    pub ratings: RatingFactors,
    pub notes: String,
    pub risk_score: i64,
    pub last_modified: String,
}

impl Application {
    /// Build the record for a first sighting (id assigned by the store)
    pub fn from_input(input: &ApplicationInput, now: DateTime<Utc>) -> Self {
        let ratings = input.ratings.resolved();
        Application {
            id: 0,
            name: input.name.clone(),
            vendor: input.vendor.clone(),
            risk_score: ratings.risk(),
            ratings,
            notes: input.notes.clone(),
            last_modified: now.to_rfc3339(),
        }
    }

    /// Fold a later row into this record
    ///
    /// - Text fields change only when the row carries a value
    /// - Ratings change only for cells present in the row, and never on
    ///   continuation rows (name carried forward from an earlier row)
    /// - Risk is recomputed from the merged ratings and last_modified is bumped
    pub fn apply_update(&mut self, input: &ApplicationInput, now: DateTime<Utc>) {
        if !input.vendor.is_empty() {
            self.vendor = input.vendor.clone();
        }
        if !input.notes.is_empty() {
            self.notes = input.notes.clone();
        }
        if !input.carried_forward {
            self.ratings.merge(&input.ratings);
        }
        self.risk_score = self.ratings.risk();
        self.last_modified = now.to_rfc3339();
    }
}

// ============================================================================
// DECODED INPUT
// ============================================================================

/// Application fields as decoded from one row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationInput {
    pub name: String,
    pub vendor: String,
    pub notes: String,
    pub ratings: PartialRatings,

    /// Name came from an earlier row, not from this one
    pub carried_forward: bool,
}
