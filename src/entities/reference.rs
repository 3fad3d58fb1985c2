// 🏷️ Reference Entities - Business Units and Categories
//
// Shared lookup rows, unique by normalized name, created lazily on first
// reference. Applications and integrations only ever link to them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    BusinessUnit,
    Category,
}

impl ReferenceKind {
    pub fn table(&self) -> &'static str {
        match self {
            ReferenceKind::BusinessUnit => "business_units",
            ReferenceKind::Category => "categories",
        }
    }

    /// Link table joining applications to this kind
    pub fn application_link_table(&self) -> &'static str {
        match self {
            ReferenceKind::BusinessUnit => "application_business_units",
            ReferenceKind::Category => "application_categories",
        }
    }

    /// Foreign key column in the link tables
    pub fn link_column(&self) -> &'static str {
        match self {
            ReferenceKind::BusinessUnit => "business_unit_id",
            ReferenceKind::Category => "category_id",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReferenceKind::BusinessUnit => "business unit",
            ReferenceKind::Category => "category",
        }
    }
}
