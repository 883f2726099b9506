use crate::block::Block;
use crate::error::{LedgerError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Durable home of the full block sequence.
///
/// Stores are whole-document: `save` always rewrites every block. Callers
/// hold the guard returned by `lock` across a load/modify/save cycle.
pub trait Store {
    /// Read the full sequence; an absent store is an empty ledger.
    fn load(&self) -> Result<Vec<Block>>;

    /// Replace the persisted sequence with `blocks`.
    fn save(&mut self, blocks: &[Block]) -> Result<()>;

    /// Take the exclusive writer lock.
    fn lock(&self) -> Result<StoreLock>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// Exclusive writer lock; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: Option<PathBuf>,
}

impl StoreLock {
    /// A lock with nothing to release (single-owner stores).
    pub fn noop() -> Self {
        Self { path: None }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to release ledger lock");
            }
        }
    }
}

/// Ledger kept as a single JSON array file.
///
/// Saves go to a sibling temp file that is fsynced and renamed over the
/// ledger, so readers never observe a half-written file.
pub struct FileStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl FileStore {
    pub fn new(path: &Path, lock_timeout: Duration) -> Self {
        Self {
            path: path.to_path_buf(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    fn tmp_path(&self) -> PathBuf {
        sibling(&self.path, "tmp")
    }
}

impl Store for FileStore {
    fn load(&self) -> Result<Vec<Block>> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no ledger file, starting empty");
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path)?;
        let blocks: Vec<Block> =
            serde_json::from_slice(&data).map_err(|e| LedgerError::StorageCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(path = %self.path.display(), blocks = blocks.len(), "ledger loaded");
        Ok(blocks)
    }

    fn save(&mut self, blocks: &[Block]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_vec_pretty(blocks)?;
        let tmp = self.tmp_path();
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&data)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(
            path = %self.path.display(),
            blocks = blocks.len(),
            bytes = data.len(),
            "ledger saved"
        );
        Ok(())
    }

    fn lock(&self) -> Result<StoreLock> {
        let lock_path = self.lock_path();
        let started = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut f) => {
                    // Guard first, so a failed pid write still removes the file.
                    let guard = StoreLock {
                        path: Some(lock_path),
                    };
                    writeln!(f, "{}", std::process::id())?;
                    return Ok(guard);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if started.elapsed() >= self.lock_timeout {
                        return Err(LedgerError::Locked(lock_path));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// In-memory block store for testing.
#[derive(Default)]
pub struct MemoryStore {
    blocks: Vec<Block>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks, saves: 0 }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<Vec<Block>> {
        Ok(self.blocks.clone())
    }

    fn save(&mut self, blocks: &[Block]) -> Result<()> {
        self.blocks = blocks.to_vec();
        self.saves += 1;
        Ok(())
    }

    fn lock(&self) -> Result<StoreLock> {
        Ok(StoreLock::noop())
    }

    fn location(&self) -> String {
        "memory".into()
    }
}
