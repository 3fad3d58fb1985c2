// 🧭 Header Normalizer - Map inconsistent CSV headers onto canonical fields
//
// "Division Name", "division_name" and "DIVISION-NAME" all normalize to
// "divisionname". Each canonical field owns an ordered alias list; the first
// alias found in the file wins. Resolution happens once per file.

use crate::error::ImportError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// CANONICAL FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    ApplicationName,
    Vendor,
    BusinessUnits,
    Category,
    CategoryType,
    Notes,
    Score,
    Need,
    Criticality,
    Installed,
    DisasterRecovery,
    Safety,
    Security,
    Monetary,
    CustomerService,
    IntegrationName,
    IntegrationVendor,
    IntegrationNotes,
    IntegrationRisk,
    IntegrationLastModified,
    IntegrationScore,
    IntegrationNeed,
    IntegrationCriticality,
    IntegrationInstalled,
    IntegrationDisasterRecovery,
    IntegrationSafety,
    IntegrationSecurity,
    IntegrationMonetary,
    IntegrationCustomerService,
}

/// Nine rating factors, application side (same order as `RatingFactors`)
pub const APPLICATION_RATINGS: [Field; 9] = [
    Field::Score,
    Field::Need,
    Field::Criticality,
    Field::Installed,
    Field::DisasterRecovery,
    Field::Safety,
    Field::Security,
    Field::Monetary,
    Field::CustomerService,
];

/// Nine rating factors, integration side
pub const INTEGRATION_RATINGS: [Field; 9] = [
    Field::IntegrationScore,
    Field::IntegrationNeed,
    Field::IntegrationCriticality,
    Field::IntegrationInstalled,
    Field::IntegrationDisasterRecovery,
    Field::IntegrationSafety,
    Field::IntegrationSecurity,
    Field::IntegrationMonetary,
    Field::IntegrationCustomerService,
];

impl Field {
    pub const ALL: [Field; 29] = [
        Field::ApplicationName,
        Field::Vendor,
        Field::BusinessUnits,
        Field::Category,
        Field::CategoryType,
        Field::Notes,
        Field::Score,
        Field::Need,
        Field::Criticality,
        Field::Installed,
        Field::DisasterRecovery,
        Field::Safety,
        Field::Security,
        Field::Monetary,
        Field::CustomerService,
        Field::IntegrationName,
        Field::IntegrationVendor,
        Field::IntegrationNotes,
        Field::IntegrationRisk,
        Field::IntegrationLastModified,
        Field::IntegrationScore,
        Field::IntegrationNeed,
        Field::IntegrationCriticality,
        Field::IntegrationInstalled,
        Field::IntegrationDisasterRecovery,
        Field::IntegrationSafety,
        Field::IntegrationSecurity,
        Field::IntegrationMonetary,
        Field::IntegrationCustomerService,
    ];

    /// Canonical snake_case name used in diagnostics
    pub fn canonical(&self) -> &'static str {
        self.aliases()[0]
    }

    /// Accepted header spellings, most specific first
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::ApplicationName => &[
                "division_name",
                "application_name",
                "app_name",
                "division",
                "application",
                "app",
                "name",
            ],
            Field::Vendor => &["vendor", "vendor_name", "supplier", "manufacturer"],
            Field::BusinessUnits => &[
                "business_units",
                "business_unit",
                "business_unit(s)",
                "bu",
                "departments",
                "department",
            ],
            Field::Category => &["category", "categories", "application_category"],
            Field::CategoryType => &["category_type", "category_types", "sub_category", "subcategory"],
            Field::Notes => &["notes", "note", "comments", "comment", "description"],
            Field::Score => &["score", "application_score", "app_score", "rating"],
            Field::Need => &["need", "business_need"],
            Field::Criticality => &["criticality", "critical", "crit"],
            Field::Installed => &["installed", "install", "installation"],
            Field::DisasterRecovery => &["disaster_recovery", "dr", "disaster"],
            Field::Safety => &["safety"],
            Field::Security => &["security", "sec"],
            Field::Monetary => &["monetary", "financial", "money"],
            Field::CustomerService => &["customer_service", "cust_service", "customer"],
            Field::IntegrationName => &[
                "integration_name",
                "integration",
                "sub_system",
                "subsystem",
            ],
            Field::IntegrationVendor => &["integration_vendor", "integration_vendor_name"],
            Field::IntegrationNotes => &["integration_notes", "integration_comments"],
            Field::IntegrationRisk => &["integration_risk", "integration_risk_score"],
            Field::IntegrationLastModified => &[
                "integration_last_modified",
                "integration_modified",
                "integration_last_updated",
                "integration_updated",
            ],
            Field::IntegrationScore => &["integration_score"],
            Field::IntegrationNeed => &["integration_need"],
            Field::IntegrationCriticality => &["integration_criticality", "integration_critical"],
            Field::IntegrationInstalled => &["integration_installed"],
            Field::IntegrationDisasterRecovery => &["integration_disaster_recovery", "integration_dr"],
            Field::IntegrationSafety => &["integration_safety"],
            Field::IntegrationSecurity => &["integration_security"],
            Field::IntegrationMonetary => &["integration_monetary"],
            Field::IntegrationCustomerService => &["integration_customer_service"],
        }
    }
}

/// Lower-case and drop everything that isn't alphanumeric
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

// ============================================================================
// HEADER MAP
// ============================================================================

/// Literal headers of one file plus lookup by raw and normalized spelling
#[derive(Debug, Clone)]
pub struct HeaderMap {
    headers: Vec<String>,
    by_raw: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers: Vec<String> = headers
            .into_iter()
            .enumerate()
            .map(|(i, h)| {
                let h = h.as_ref();
                // BOM can survive on the first cell when the reader didn't strip it
                let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
                h.trim().to_string()
            })
            .collect();

        let mut by_raw = HashMap::new();
        let mut by_key = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            // First occurrence wins for duplicated headers
            by_raw.entry(header.clone()).or_insert(index);
            let key = normalize_header(header);
            if !key.is_empty() {
                by_key.entry(key).or_insert(index);
            }
        }

        HeaderMap {
            headers,
            by_raw,
            by_key,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Column index of the first alias present (exact, then normalized)
    pub fn find(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            self.by_raw
                .get(*alias)
                .or_else(|| self.by_key.get(&normalize_header(alias)))
                .copied()
        })
    }

    /// Resolve every canonical field to a column once
    pub fn resolve(&self) -> Result<ColumnMap, ImportError> {
        let mut columns = HashMap::new();
        for field in Field::ALL {
            if let Some(index) = self.find(field.aliases()) {
                columns.insert(field, index);
            }
        }

        if !columns.contains_key(&Field::ApplicationName) {
            return Err(ImportError::MissingNameColumn {
                aliases: Field::ApplicationName
                    .aliases()
                    .iter()
                    .map(|a| a.to_string())
                    .collect(),
                found: self.headers.clone(),
            });
        }

        Ok(ColumnMap { columns })
    }

    /// (raw header, canonical field) pairs, None for unrecognized columns
    pub fn describe(&self, columns: &ColumnMap) -> Vec<HeaderMapping> {
        self.headers
            .iter()
            .enumerate()
            .map(|(index, header)| HeaderMapping {
                header: header.clone(),
                field: columns.field_at(index).map(|f| f.canonical().to_string()),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderMapping {
    pub header: String,
    pub field: Option<String>,
}

// ============================================================================
// COLUMN MAP (field → column, fixed for the whole file)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ColumnMap {
    columns: HashMap<Field, usize>,
}

impl ColumnMap {
    pub fn index(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Cell text for a field, "" when the column is missing or the row is short
    pub fn get<'r>(&self, record: &'r csv::StringRecord, field: Field) -> &'r str {
        self.index(field)
            .and_then(|i| record.get(i))
            .unwrap_or("")
    }

    fn field_at(&self, index: usize) -> Option<Field> {
        // Several fields may share a column only by alias overlap; report the first
        Field::ALL
            .iter()
            .copied()
            .find(|f| self.columns.get(f) == Some(&index))
    }
}
