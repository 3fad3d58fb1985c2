// 🔗 Entity Resolver - find-or-create for applications, business units, categories
//
// One ImportContext lives for one import run and is passed explicitly to every
// resolver call. It owns:
// - the name → id cache (only ever holds committed rows)
// - carry-forward state for the row decoder
// - the running union of categories per application
//
// Writes happen inside a write group. Ids learned during a group go into a
// GroupCache overlay first and are folded into the context only after the
// group commits, so a rolled back group never leaves stale ids behind.

use crate::db;
use crate::decoder::CarryForward;
use crate::entities::{clean_name, name_key, Application, ApplicationInput, ReferenceKind};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};

// ============================================================================
// NAME CACHE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct NameCache {
    applications: HashMap<String, Application>,
    references: HashMap<(ReferenceKind, String), i64>,
}

impl NameCache {
    pub fn application(&self, key: &str) -> Option<&Application> {
        self.applications.get(key)
    }

    pub fn reference(&self, kind: ReferenceKind, key: &str) -> Option<i64> {
        self.references.get(&(kind, key.to_string())).copied()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty() && self.references.is_empty()
    }

    /// Fold a committed group's findings in
    pub fn absorb(&mut self, pending: NameCache) {
        self.applications.extend(pending.applications);
        self.references.extend(pending.references);
    }
}

/// Read-through view used inside one write group
pub struct GroupCache<'a> {
    committed: &'a NameCache,
    pending: NameCache,
}

impl<'a> GroupCache<'a> {
    pub fn new(committed: &'a NameCache) -> Self {
        GroupCache {
            committed,
            pending: NameCache::default(),
        }
    }

    fn application(&self, key: &str) -> Option<&Application> {
        self.pending
            .application(key)
            .or_else(|| self.committed.application(key))
    }

    fn reference(&self, kind: ReferenceKind, key: &str) -> Option<i64> {
        self.pending
            .reference(kind, key)
            .or_else(|| self.committed.reference(kind, key))
    }

    pub fn into_pending(self) -> NameCache {
        self.pending
    }
}

// ============================================================================
// CATEGORY ACCUMULATION
// ============================================================================

/// Union of category names, first spelling wins, insertion ordered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorySet {
    names: Vec<String>,
    keys: HashSet<String>,
}

impl CategorySet {
    pub fn insert(&mut self, name: &str) -> bool {
        let cleaned = clean_name(name);
        if cleaned.is_empty() || !self.keys.insert(name_key(&cleaned)) {
            return false;
        }
        self.names.push(cleaned);
        true
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedCategories {
    /// Display name of the application, as first seen
    pub application: String,
    pub categories: CategorySet,
}

// ============================================================================
// IMPORT CONTEXT
// ============================================================================

#[derive(Debug, Default)]
pub struct ImportContext {
    pub cache: NameCache,
    pub carry: CarryForward,

    /// Application key → union of every category seen for it in this run
    accumulated: HashMap<String, AccumulatedCategories>,

    /// Application keys in first-seen order (drives the reconciliation pass)
    order: Vec<String>,

    created: HashSet<String>,
    updated: HashSet<String>,
}

impl ImportContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row's categories to the application's running union
    pub fn accumulate_categories(&mut self, application: &str, categories: &[String]) {
        if categories.is_empty() {
            return;
        }
        let key = name_key(application);
        let entry = self.accumulated.entry(key.clone()).or_insert_with(|| {
            self.order.push(key);
            AccumulatedCategories {
                application: clean_name(application),
                categories: CategorySet::default(),
            }
        });
        for category in categories {
            entry.categories.insert(category);
        }
    }

    pub fn accumulated_for(&self, application: &str) -> Option<&AccumulatedCategories> {
        self.accumulated.get(&name_key(application))
    }

    /// Accumulated sets in the order applications first gained categories
    pub fn accumulated(&self) -> impl Iterator<Item = &AccumulatedCategories> {
        self.order.iter().filter_map(|key| self.accumulated.get(key))
    }

    /// Record a committed outcome; counts distinct application names
    pub fn record_application(&mut self, key: &str, resolution: Resolution) {
        match resolution {
            Resolution::Created => {
                self.created.insert(key.to_string());
            }
            Resolution::Existing => {
                if !self.created.contains(key) {
                    self.updated.insert(key.to_string());
                }
            }
        }
    }

    pub fn applications_created(&self) -> usize {
        self.created.len()
    }

    pub fn applications_updated(&self) -> usize {
        self.updated.len()
    }
}

// ============================================================================
// RESOLVERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Created,
    Existing,
}

/// Find-or-create an application and fold the row's values into it
pub fn resolve_application(
    conn: &Connection,
    cache: &mut GroupCache,
    input: &ApplicationInput,
    now: DateTime<Utc>,
) -> Result<(Application, Resolution)> {
    let key = name_key(&input.name);

    let existing = match cache.application(&key) {
        Some(app) => Some(app.clone()),
        None => db::find_application(conn, &key)?,
    };

    let (app, resolution) = match existing {
        Some(mut app) => {
            app.apply_update(input, now);
            db::update_application(conn, &app)?;
            (app, Resolution::Existing)
        }
        None => {
            let mut app = Application::from_input(input, now);
            app.id = db::insert_application(conn, &app, &key)?;
            log::debug!("Created application '{}' (id {})", app.name, app.id);
            (app, Resolution::Created)
        }
    };

    cache.pending.applications.insert(key, app.clone());
    Ok((app, resolution))
}

/// Look up an application id without modifying it
pub fn lookup_application_id(conn: &Connection, cache: &GroupCache, name: &str) -> Result<Option<i64>> {
    let key = name_key(name);
    if let Some(app) = cache.application(&key) {
        return Ok(Some(app.id));
    }
    Ok(db::find_application(conn, &key)?.map(|app| app.id))
}

/// Find-or-create a business unit or category by normalized name
pub fn resolve_reference(
    conn: &Connection,
    cache: &mut GroupCache,
    kind: ReferenceKind,
    name: &str,
) -> Result<(i64, Resolution)> {
    let display = clean_name(name);
    let key = name_key(&display);

    if let Some(id) = cache.reference(kind, &key) {
        return Ok((id, Resolution::Existing));
    }

    let (id, resolution) = match db::find_reference(conn, kind, &key)? {
        Some(id) => (id, Resolution::Existing),
        None => {
            let id = db::insert_reference(conn, kind, &display, &key)?;
            log::debug!("Created {} '{}' (id {})", kind.label(), display, id);
            (id, Resolution::Created)
        }
    };

    cache.pending.references.insert((kind, key), id);
    Ok((id, resolution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PartialRatings;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    fn input(name: &str) -> ApplicationInput {
        let mut ratings = PartialRatings::default();
        ratings.values[0] = Some(8);
        ratings.values[2] = Some(5);
        ApplicationInput {
            name: name.to_string(),
            vendor: "VendorA".to_string(),
            ratings,
            ..Default::default()
        }
    }

    #[test]
    fn test_category_union_accumulates_across_rows() {
        let mut ctx = ImportContext::new();
        ctx.accumulate_categories("Alpha", &["Finance".to_string(), "Ops".to_string()]);
        ctx.accumulate_categories(" ALPHA ", &["ops".to_string(), "Security".to_string()]);
        ctx.accumulate_categories("Beta", &[]);

        let alpha = ctx.accumulated_for("alpha").unwrap();
        assert_eq!(alpha.application, "Alpha");
        assert_eq!(alpha.categories.names(), &["Finance", "Ops", "Security"]);
        assert!(ctx.accumulated_for("Beta").is_none());
        assert_eq!(ctx.accumulated().count(), 1);
    }

    #[test]
    fn test_resolve_application_create_then_update() {
        let conn = setup();
        let mut ctx = ImportContext::new();

        let mut group = GroupCache::new(&ctx.cache);
        let (created, resolution) = resolve_application(&conn, &mut group, &input("Alpha"), Utc::now()).unwrap();
        assert_eq!(resolution, Resolution::Created);
        assert_eq!(created.risk_score, 10);
        let pending = group.into_pending();
        ctx.cache.absorb(pending);

        // Same name, different case and spacing
        let mut group = GroupCache::new(&ctx.cache);
        let (updated, resolution) = resolve_application(&conn, &mut group, &input("  alpha "), Utc::now()).unwrap();
        assert_eq!(resolution, Resolution::Existing);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Alpha");
        assert_eq!(db::count_rows(&conn, "applications").unwrap(), 1);
    }

    #[test]
    fn test_resolve_reference_is_case_insensitive_and_cached() {
        let conn = setup();
        let ctx = ImportContext::new();
        let mut group = GroupCache::new(&ctx.cache);

        let (first, r1) = resolve_reference(&conn, &mut group, ReferenceKind::Category, "Finance").unwrap();
        let (second, r2) = resolve_reference(&conn, &mut group, ReferenceKind::Category, " FINANCE ").unwrap();
        let (bu, _) = resolve_reference(&conn, &mut group, ReferenceKind::BusinessUnit, "Finance").unwrap();

        assert_eq!(r1, Resolution::Created);
        assert_eq!(r2, Resolution::Existing);
        assert_eq!(first, second);
        assert_eq!(db::count_rows(&conn, "categories").unwrap(), 1);
        assert_eq!(db::count_rows(&conn, "business_units").unwrap(), 1);
        assert_eq!(group.reference(ReferenceKind::BusinessUnit, "finance"), Some(bu));
    }

    #[test]
    fn test_discarded_group_leaves_cache_clean() {
        let conn = setup();
        let ctx = ImportContext::new();

        {
            let tx = conn.unchecked_transaction().unwrap();
            let mut group = GroupCache::new(&ctx.cache);
            resolve_reference(&tx, &mut group, ReferenceKind::Category, "Finance").unwrap();
            // Dropped without commit, pending ids are dropped with the group
        }

        assert!(ctx.cache.is_empty());
        assert_eq!(db::count_rows(&conn, "categories").unwrap(), 0);
    }

    #[test]
    fn test_record_application_counts_distinct_names() {
        let mut ctx = ImportContext::new();
        ctx.record_application("alpha", Resolution::Created);
        ctx.record_application("alpha", Resolution::Existing);
        ctx.record_application("beta", Resolution::Existing);
        ctx.record_application("beta", Resolution::Existing);

        assert_eq!(ctx.applications_created(), 1);
        assert_eq!(ctx.applications_updated(), 1);
    }
}
