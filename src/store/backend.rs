//! Persistent side of the credential store.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::StoreError;
use crate::sync::Mutex;

/// Durable storage for username/password pairs.
pub trait Backend: Send {
    /// Every stored pair.
    fn load_users(&mut self) -> Result<Vec<(String, String)>, StoreError>;

    /// Persists one new pair.
    fn insert_user(&mut self, username: &str, password: &str) -> Result<(), StoreError>;
}

fn check_field(value: &str) -> Result<(), StoreError> {
    if value.is_empty() || value.contains(['\t', '\r', '\n']) {
        return Err(StoreError::InvalidField(value.to_string()));
    }
    Ok(())
}

/// Append-only `username\tpassword` file, one pair per line.
///
/// Several handles may point at the same file; each line is written with a
/// single `write_all` on an `O_APPEND` descriptor.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: File,
}

impl FileBackend {
    /// Opens the file for appending, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for FileBackend {
    fn load_users(&mut self) -> Result<Vec<(String, String)>, StoreError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut users = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match line.split_once('\t') {
                Some((user, pass)) => users.push((user.to_string(), pass.to_string())),
                None => tracing::warn!(
                    path = %self.path.display(),
                    line = lineno + 1,
                    "Skipping malformed credential line"
                ),
            }
        }
        Ok(users)
    }

    fn insert_user(&mut self, username: &str, password: &str) -> Result<(), StoreError> {
        check_field(username)?;
        check_field(password)?;
        let line = format!("{username}\t{password}\n");
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }
}

/// In-process backend. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    rows: Arc<Mutex<Vec<(String, String)>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I, U, P>(users: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        let backend = Self::new();
        backend
            .rows
            .lock()
            .extend(users.into_iter().map(|(u, p)| (u.into(), p.into())));
        backend
    }

    /// Makes every later `insert_user` fail, for exercising error paths.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<(String, String)> {
        self.rows.lock().clone()
    }
}

impl Backend for MemoryBackend {
    fn load_users(&mut self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self.rows())
    }

    fn insert_user(&mut self, username: &str, password: &str) -> Result<(), StoreError> {
        check_field(username)?;
        check_field(password)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        self.rows
            .lock()
            .push((username.to_string(), password.to_string()));
        Ok(())
    }
}
