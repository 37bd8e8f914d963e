use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use redb::{Database, DatabaseError, ReadOnlyDatabase, ReadableDatabase};
use tracing::{debug, trace_span, warn};

use crate::error::{StoreError, StoreResult};
use crate::tx::Tx;

/// Default time to wait for another handle to release the file lock.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_millis(500);

/// Permission bits for newly created store files (owner read/write).
pub const DEFAULT_FILE_MODE: u32 = 0o600;

/// Delay between lock attempts while waiting for the open timeout.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Options for [`Store::open`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Open without write access. `update` calls fail with [`StoreError::ReadOnly`].
    pub read_only: bool,
    /// How long to wait for another handle to release the file.
    pub open_timeout: Duration,
    /// Unix permission bits applied when the file is created.
    pub file_mode: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            read_only: false,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            file_mode: DEFAULT_FILE_MODE,
        }
    }
}

impl StoreOptions {
    /// Default options with read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }
}

enum Engine {
    ReadWrite(Database),
    ReadOnly(ReadOnlyDatabase),
}

/// Handle to an open store file.
pub struct Store {
    engine: Engine,
    path: PathBuf,
    options: StoreOptions,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("read_only", &self.options.read_only)
            .finish()
    }
}

impl Store {
    /// Open the store at `path`, creating it unless `read_only` is set.
    ///
    /// If another handle holds the file, the open is retried until
    /// `open_timeout` elapses and then fails with [`StoreError::OpenTimeout`].
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let created = !options.read_only && !path.exists();

        if created {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }

        let started = Instant::now();
        let engine = loop {
            let attempt = if options.read_only {
                ReadOnlyDatabase::open(&path).map(Engine::ReadOnly)
            } else {
                Database::create(&path).map(Engine::ReadWrite)
            };
            match attempt {
                Ok(engine) => break engine,
                Err(DatabaseError::DatabaseAlreadyOpen) => {
                    if started.elapsed() >= options.open_timeout {
                        return Err(StoreError::OpenTimeout {
                            path,
                            timeout: options.open_timeout,
                        });
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        };

        if created {
            set_file_mode(&path, options.file_mode)?;
        }

        debug!(path = %path.display(), read_only = options.read_only, created, "store opened");
        Ok(Self {
            engine,
            path,
            options,
        })
    }

    /// Run `f` inside a read transaction.
    ///
    /// `name` labels the transaction in traces.
    pub fn view<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Tx<'_>) -> Result<T, E>,
    {
        let _span = trace_span!("view", name).entered();
        let txn = match &self.engine {
            Engine::ReadWrite(db) => db.begin_read(),
            Engine::ReadOnly(db) => db.begin_read(),
        }
        .map_err(StoreError::from)?;
        let tx = Tx::read(&txn);
        f(&tx)
    }

    /// Run `f` inside a write transaction.
    ///
    /// Commits if `f` returns `Ok`, aborts otherwise.
    pub fn update<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Tx<'_>) -> Result<T, E>,
    {
        let _span = trace_span!("update", name).entered();
        let db = match &self.engine {
            Engine::ReadWrite(db) => db,
            Engine::ReadOnly(_) => return Err(StoreError::ReadOnly.into()),
        };
        let txn = db.begin_write().map_err(StoreError::from)?;
        let result = {
            let tx = Tx::write(&txn);
            f(&tx)
        };
        match result {
            Ok(value) => {
                txn.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = txn.abort() {
                    warn!(name, error = %abort_err, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }

    /// Close the handle and release the file.
    pub fn close(self) -> StoreResult<()> {
        let Self { engine, path, .. } = self;
        drop(engine);
        debug!(path = %path.display(), "store closed");
        Ok(())
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_read_only(&self) -> bool {
        self.options.read_only
    }

    /// The options this handle was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }
}

#[cfg(unix)]
fn set_file_mode(path: &Path, mode: u32) -> StoreResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path, _mode: u32) -> StoreResult<()> {
    Ok(())
}
