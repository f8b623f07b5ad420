use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const WORKER_THREAD_NAME: &str = "filament-registry";
// Another process (a backup, the sqlite3 shell) may briefly hold the file lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type RegistryJob = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum RegistryCommand {
    Run(RegistryJob),
    Close,
}

struct Worker {
    commands: mpsc::Sender<RegistryCommand>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        // Jobs already queued run before Close is seen.
        if self.commands.send(RegistryCommand::Close).is_err() {
            warn!("Registry thread already gone at shutdown");
        }
        if let Err(panic) = handle.join() {
            error!("Registry thread panicked: {panic:?}");
        }
    }
}

/// Handle to the spool registry.
///
/// A single worker thread owns the SQLite connection and runs submitted jobs one
/// at a time, so every write (quick-pair or manual) is serialized through it.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    db_path: Arc<PathBuf>,
}

impl Database {
    /// Opens (creating if needed) the registry file and brings its schema up to date.
    /// Returns only once the worker is ready to take jobs.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create registry directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<RegistryCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let worker_path = db_path.clone();

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || match open_registry(&worker_path) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        serve(conn, command_rx);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn registry worker thread")?;

        ready_rx
            .recv()
            .context("registry worker exited before it was ready")??;

        info!("Spool registry opened at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                commands: command_tx,
                thread: Mutex::new(Some(thread)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Runs `job` on the registry thread and waits for its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.worker
            .commands
            .send(RegistryCommand::Run(Box::new(move |conn| {
                // The caller may have been cancelled; the job's effects still stand.
                let _ = reply_tx.send(job(conn));
            })))
            .map_err(|_| anyhow!("registry thread is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("registry thread dropped the job without replying"))?
    }
}

fn open_registry(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open registry {}", path.display()))?;

    conn.pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("Registry stays in rollback-journal mode: {err}");
    }

    run_migrations(&mut conn).context("failed to migrate registry schema")?;
    Ok(conn)
}

fn serve(mut conn: Connection, commands: mpsc::Receiver<RegistryCommand>) {
    while let Ok(command) = commands.recv() {
        match command {
            RegistryCommand::Run(job) => job(&mut conn),
            RegistryCommand::Close => break,
        }
    }

    if let Err((_, err)) = conn.close() {
        error!("Failed to close registry cleanly: {err}");
    }
    info!("Registry thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_and_migrates_fresh_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("nested").join("registry.sqlite3"))
            .expect("open database");

        let version: i32 = db
            .execute(|conn| {
                Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
            })
            .await
            .expect("read user_version");
        assert_eq!(version, super::super::migrations::CURRENT_SCHEMA_VERSION);
        assert!(db.path().ends_with("registry.sqlite3"));
    }

    #[tokio::test]
    async fn reopening_keeps_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registry.sqlite3");
        {
            let db = Database::new(path.clone()).expect("first open");
            db.execute(|conn| {
                conn.execute(
                    "INSERT INTO locations (id, label, capacity, created_at, updated_at)
                     VALUES ('fs://loc/dryer', 'Dryer', NULL, '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')",
                    [],
                )?;
                Ok(())
            })
            .await
            .expect("insert location");
        }

        let db = Database::new(path).expect("second open");
        let count: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))?))
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn task_errors_reach_the_caller() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(dir.path().join("registry.sqlite3")).expect("open database");

        let result: Result<()> = db
            .execute(|conn| {
                conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());
    }
}
