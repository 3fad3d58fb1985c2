// Entity Models - records of the application portfolio store
//
// Each entity has:
// - Store identity (INTEGER id) used by link tables
// - Import identity: the normalized name key (case/whitespace-insensitive)
// - Values that later rows of the same import may overwrite

pub mod application;
pub mod integration;
pub mod ratings;
pub mod reference;

pub use application::{Application, ApplicationInput};
pub use integration::{Integration, IntegrationInput};
pub use ratings::{PartialRatings, RatingFactors, RATING_NAMES};
pub use reference::ReferenceKind;

/// Trim and collapse internal whitespace, keeping case
///
/// "  Customer   Service " → "Customer Service"
pub fn clean_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Identity key for names: cleaned and lower-cased
///
/// "Finance", " FINANCE " and "finance" all share the key "finance".
pub fn name_key(raw: &str) -> String {
    clean_name(raw).to_lowercase()
}

/// The literal token "none" (any case) stands for an empty cell
pub fn is_none_token(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("none")
}
