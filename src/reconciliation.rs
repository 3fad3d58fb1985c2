// ⚖️ Reconciliation Pass - make every application's category links exact
//
// Runs once, strictly after the last row. For each application that gathered
// categories during the run, the full accumulated union replaces whatever
// per-row linking managed to write:
//
//   links(app) := union(categories on every row naming app)
//
// Each application is its own write group; one failure is logged as a
// warning and the pass moves on.

use crate::config::RetryPolicy;
use crate::entities::ReferenceKind;
use crate::resolver::{lookup_application_id, resolve_reference, GroupCache, ImportContext, Resolution};
use crate::{db, retry};
use anyhow::anyhow;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Applications whose link set was replaced
    pub applications_reconciled: usize,

    /// Category links written by the pass
    pub links_written: usize,

    /// Categories first created during the pass
    pub categories_created: usize,

    pub warnings: Vec<String>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "Reconciled {} applications, {} category links, {} warnings",
            self.applications_reconciled,
            self.links_written,
            self.warnings.len()
        )
    }
}

pub fn reconcile_categories(
    conn: &Connection,
    ctx: &mut ImportContext,
    policy: &RetryPolicy,
) -> ReconciliationReport {
    let mut report = ReconciliationReport::default();

    // Snapshot so the context can absorb cache updates while we iterate
    let work: Vec<(String, Vec<String>)> = ctx
        .accumulated()
        .map(|acc| (acc.application.clone(), acc.categories.names().to_vec()))
        .collect();

    for (application, categories) in work {
        let label = format!("reconcile '{}'", application);
        let result = retry::in_transaction(conn, policy, &label, |tx| {
            let mut group = GroupCache::new(&ctx.cache);

            let app_id = lookup_application_id(tx, &group, &application)?
                .ok_or_else(|| anyhow!("application '{}' is not in the store", application))?;

            let mut category_ids = Vec::with_capacity(categories.len());
            let mut created = 0;
            for name in &categories {
                let (id, resolution) = resolve_reference(tx, &mut group, ReferenceKind::Category, name)?;
                if resolution == Resolution::Created {
                    created += 1;
                }
                category_ids.push(id);
            }

            let written = db::replace_application_categories(tx, app_id, &category_ids)?;
            Ok((written, created, group.into_pending()))
        });

        match result {
            Ok((written, created, pending)) => {
                ctx.cache.absorb(pending);
                report.applications_reconciled += 1;
                report.links_written += written;
                report.categories_created += created;
            }
            Err(err) => {
                let warning = format!("{}: {:#}", label, err);
                log::warn!("{}", warning);
                report.warnings.push(warning);
            }
        }
    }

    log::info!("{}", report.summary());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ApplicationInput, PartialRatings};
    use crate::resolver::resolve_application;
    use chrono::Utc;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    fn create_app(conn: &Connection, ctx: &mut ImportContext, name: &str) -> i64 {
        let mut group = GroupCache::new(&ctx.cache);
        let input = ApplicationInput {
            name: name.to_string(),
            ratings: PartialRatings::default(),
            ..Default::default()
        };
        let (app, _) = resolve_application(conn, &mut group, &input, Utc::now()).unwrap();
        ctx.cache.absorb(group.into_pending());
        app.id
    }

    #[test]
    fn test_replaces_partial_links_with_full_union() {
        let conn = setup();
        let mut ctx = ImportContext::new();
        let app_id = create_app(&conn, &mut ctx, "Alpha");

        // Stale link from an earlier import, plus a partial per-row link
        let stale = db::insert_reference(&conn, ReferenceKind::Category, "Legacy", "legacy").unwrap();
        db::link_application(&conn, ReferenceKind::Category, app_id, stale).unwrap();

        ctx.accumulate_categories("Alpha", &["Finance".to_string(), "Ops".to_string()]);
        ctx.accumulate_categories("Alpha", &["Security".to_string()]);

        let report = reconcile_categories(&conn, &mut ctx, &RetryPolicy::immediate(1));

        assert_eq!(report.applications_reconciled, 1);
        assert_eq!(report.links_written, 3);
        assert_eq!(report.categories_created, 3);
        assert!(report.warnings.is_empty());
        assert_eq!(
            db::application_reference_names(&conn, ReferenceKind::Category, app_id).unwrap(),
            vec!["Finance", "Ops", "Security"]
        );
    }

    #[test]
    fn test_missing_application_is_a_warning_not_an_abort() {
        let conn = setup();
        let mut ctx = ImportContext::new();
        let beta_id = create_app(&conn, &mut ctx, "Beta");

        ctx.accumulate_categories("Ghost", &["Finance".to_string()]);
        ctx.accumulate_categories("Beta", &["Ops".to_string()]);

        let report = reconcile_categories(&conn, &mut ctx, &RetryPolicy::immediate(1));

        assert_eq!(report.applications_reconciled, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("Ghost"));
        assert_eq!(
            db::application_reference_names(&conn, ReferenceKind::Category, beta_id).unwrap(),
            vec!["Ops"]
        );
        // The failed group rolled back, so "Finance" was never created
        assert!(db::find_reference(&conn, ReferenceKind::Category, "finance").unwrap().is_none());
    }

    #[test]
    fn test_running_twice_is_stable() {
        let conn = setup();
        let mut ctx = ImportContext::new();
        let app_id = create_app(&conn, &mut ctx, "Alpha");
        ctx.accumulate_categories("Alpha", &["Finance".to_string(), "Ops".to_string()]);

        reconcile_categories(&conn, &mut ctx, &RetryPolicy::immediate(1));
        let second = reconcile_categories(&conn, &mut ctx, &RetryPolicy::immediate(1));

        assert_eq!(second.categories_created, 0);
        assert_eq!(db::count_rows(&conn, "application_categories").unwrap(), 2);
        assert_eq!(
            db::application_reference_names(&conn, ReferenceKind::Category, app_id).unwrap().len(),
            2
        );
    }
}
