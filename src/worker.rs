// 🧵 Background Worker - run an import off the UI thread
//
// The worker owns its own store connection for the whole run and talks back
// over a channel: a stream of Progress messages, then exactly one Finished.
// Cancellation is not supported; dropping the handle detaches the thread.

use crate::config::ImportConfig;
use crate::db;
use crate::error::ImportError;
use crate::importer::{run_import, ImportSummary};
use std::cell::Cell;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

#[derive(Debug)]
pub enum ImportMessage {
    Progress { processed: usize, total: usize },
    Finished(Result<ImportSummary, ImportError>),
}

pub struct ImportHandle {
    receiver: Receiver<ImportMessage>,
    thread: Option<JoinHandle<()>>,

    /// Set once a Finished message has been handed out
    finished: Cell<bool>,
}

impl ImportHandle {
    /// Next message if one is ready; never blocks
    ///
    /// A worker that dies without reporting yields one Finished error, so
    /// pollers always see the run end.
    pub fn poll(&self) -> Option<ImportMessage> {
        if self.finished.get() {
            return None;
        }
        let message = match self.receiver.try_recv() {
            Ok(message) => message,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => ImportMessage::Finished(Err(worker_lost())),
        };
        if matches!(message, ImportMessage::Finished(_)) {
            self.finished.set(true);
        }
        Some(message)
    }

    /// Next message, blocking; None once the worker is gone
    pub fn recv(&self) -> Option<ImportMessage> {
        self.receiver.recv().ok()
    }

    /// Block until the run ends, dropping any progress still queued
    pub fn wait(mut self) -> Result<ImportSummary, ImportError> {
        let mut outcome = None;
        while let Ok(message) = self.receiver.recv() {
            if let ImportMessage::Finished(result) = message {
                outcome = Some(result);
                break;
            }
        }
        self.join();
        outcome.unwrap_or_else(|| Err(worker_lost()))
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Import worker panicked");
            }
        }
    }
}

fn worker_lost() -> ImportError {
    ImportError::Bootstrap(anyhow::anyhow!("import worker exited without a result"))
}

/// Start importing `csv_path` into the store at `db_path` on a new thread
pub fn spawn_import(
    db_path: PathBuf,
    csv_path: PathBuf,
    config: ImportConfig,
) -> std::io::Result<ImportHandle> {
    let (sender, receiver) = mpsc::channel();

    let thread = thread::Builder::new()
        .name("csv-import".to_string())
        .spawn(move || {
            let result = db::open_connection(&db_path, &config)
                .map_err(ImportError::Bootstrap)
                .and_then(|conn| {
                    let progress_sender = sender.clone();
                    let mut progress = move |processed: usize, total: usize| {
                        // The receiver may already be gone; progress is advisory
                        let _ = progress_sender.send(ImportMessage::Progress { processed, total });
                    };
                    run_import(&conn, &csv_path, &config, &mut progress)
                });

            if let Err(e) = &result {
                log::error!("Import of {} failed: {}", csv_path.display(), e);
            }
            let _ = sender.send(ImportMessage::Finished(result));
        })?;

    Ok(ImportHandle {
        receiver,
        thread: Some(thread),
        finished: Cell::new(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn write_csv(dir: &std::path::Path, rows: usize) -> PathBuf {
        let mut csv = String::from("Name,Category,Score,Criticality\n");
        for i in 0..rows {
            csv.push_str(&format!("App {},Group {},5,{}\n", i % 7, i % 3, i % 4));
        }
        let path = dir.join("apps.csv");
        std::fs::write(&path, csv).unwrap();
        path
    }

    #[test]
    fn test_worker_streams_progress_then_summary() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path(), 30);
        let db_path = dir.path().join("store.db");
        let config = ImportConfig::default().with_progress_interval(10);

        let handle = spawn_import(db_path.clone(), csv_path, config).unwrap();

        let deadline = Instant::now() + Duration::from_secs(30);
        let mut progress = Vec::new();
        let summary = loop {
            match handle.poll() {
                Some(ImportMessage::Progress { processed, total }) => progress.push((processed, total)),
                Some(ImportMessage::Finished(result)) => break result.unwrap(),
                None => {
                    assert!(Instant::now() < deadline, "worker did not finish in time");
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        };

        assert_eq!(progress, vec![(10, 30), (20, 30), (30, 30)]);
        assert_eq!(summary.rows_imported, 30);
        assert_eq!(summary.applications_created, 7);

        // The store is readable from another connection afterwards
        let reader = rusqlite::Connection::open(&db_path).unwrap();
        assert_eq!(db::count_rows(&reader, "applications").unwrap(), 7);
        assert_eq!(db::count_rows(&reader, "categories").unwrap(), 3);
    }

    #[test]
    fn test_poll_reports_worker_that_died_silently() {
        let (sender, receiver) = mpsc::channel();
        sender
            .send(ImportMessage::Progress { processed: 1, total: 2 })
            .unwrap();
        drop(sender);

        let handle = ImportHandle {
            receiver,
            thread: None,
            finished: Cell::new(false),
        };

        assert!(matches!(handle.poll(), Some(ImportMessage::Progress { processed: 1, total: 2 })));
        match handle.poll() {
            Some(ImportMessage::Finished(Err(err))) => {
                assert!(err.to_string().contains("without a result"));
                assert!(!err.is_structural());
            }
            other => panic!("expected a Finished error, got {:?}", other),
        }
        // The end is reported once
        assert!(handle.poll().is_none());
    }

    #[test]
    fn test_poll_stops_after_finished() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path(), 3);
        let handle = spawn_import(dir.path().join("store.db"), csv_path, ImportConfig::default()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(30);
        loop {
            match handle.poll() {
                Some(ImportMessage::Finished(result)) => {
                    assert!(result.is_ok());
                    break;
                }
                Some(_) => {}
                None => {
                    assert!(Instant::now() < deadline, "worker did not finish in time");
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }

        // Sender is gone by now; no second Finished is synthesized
        std::thread::sleep(Duration::from_millis(20));
        assert!(handle.poll().is_none());
    }

    #[test]
    fn test_wait_returns_structural_error() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("bad.csv");
        std::fs::write(&csv_path, "Vendor,Score\nAcme,3\n").unwrap();

        let handle = spawn_import(dir.path().join("store.db"), csv_path, ImportConfig::default()).unwrap();
        let err = handle.wait().unwrap_err();

        assert!(matches!(err, ImportError::MissingNameColumn { .. }));
    }

    #[test]
    fn test_wait_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn_import(
            dir.path().join("store.db"),
            dir.path().join("nope.csv"),
            ImportConfig::default(),
        )
        .unwrap();

        assert!(matches!(handle.wait().unwrap_err(), ImportError::Io { .. }));
    }
}
