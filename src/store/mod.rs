//! Credential store used by the login and registration actions.
//!
//! [`Credentials`] is the in-memory username → password map, loaded once at
//! startup from a [`Backend`]. Request handlers reach it through the
//! [`CredentialStore`] interface, implemented by a [`Session`] that binds the
//! map to one pooled backend handle.

pub mod backend;
pub mod pool;

use std::collections::HashMap;
use std::io;

use thiserror::Error;

use crate::config::StoreConfig;
use crate::sync::Mutex;

pub use backend::{Backend, FileBackend, MemoryBackend};
pub use pool::{Pooled, ResourcePool};

/// Pool of backend handles shared by the workers.
pub type BackendPool = ResourcePool<Box<dyn Backend>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("user {0:?} already exists")]
    Duplicate(String),

    #[error("invalid credential field {0:?}")]
    InvalidField(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// What the request router needs from a credential store.
pub trait CredentialStore {
    fn lookup(&self, username: &str) -> Option<String>;

    /// Adds a new user. Fails with [`StoreError::Duplicate`] if the name is
    /// taken.
    fn insert(&mut self, username: &str, password: &str) -> Result<(), StoreError>;
}

/// Process-wide username → password map.
#[derive(Debug, Default)]
pub struct Credentials {
    users: Mutex<HashMap<String, String>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from everything the backend holds.
    pub fn load(backend: &mut dyn Backend) -> Result<Self, StoreError> {
        let users: HashMap<_, _> = backend.load_users()?.into_iter().collect();
        tracing::info!(users = users.len(), "Loaded credentials");
        Ok(Self {
            users: Mutex::new(users),
        })
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, username: &str) -> Option<String> {
        self.users.lock().get(username).cloned()
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .lock()
            .get(username)
            .is_some_and(|stored| stored == password)
    }

    /// Checks for a duplicate, persists, then inserts, all under one lock.
    /// The map changes only if the backend write succeeded.
    pub fn register(
        &self,
        backend: &mut dyn Backend,
        username: &str,
        password: &str,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock();
        if users.contains_key(username) {
            return Err(StoreError::Duplicate(username.to_string()));
        }
        backend.insert_user(username, password)?;
        users.insert(username.to_string(), password.to_string());
        Ok(())
    }
}

/// A [`CredentialStore`] for the duration of one request.
pub struct Session<'a> {
    credentials: &'a Credentials,
    backend: &'a mut dyn Backend,
}

impl<'a> Session<'a> {
    pub fn new(credentials: &'a Credentials, backend: &'a mut dyn Backend) -> Self {
        Self {
            credentials,
            backend,
        }
    }
}

impl CredentialStore for Session<'_> {
    fn lookup(&self, username: &str) -> Option<String> {
        self.credentials.lookup(username)
    }

    fn insert(&mut self, username: &str, password: &str) -> Result<(), StoreError> {
        self.credentials.register(&mut *self.backend, username, password)
    }
}

/// Opens `pool_size` file backends on the configured path.
pub fn open_file_pool(config: &StoreConfig) -> Result<BackendPool, StoreError> {
    let mut handles: Vec<Box<dyn Backend>> = Vec::with_capacity(config.pool_size);
    for _ in 0..config.pool_size {
        handles.push(Box::new(FileBackend::open(&config.path)?));
    }
    Ok(ResourcePool::new(handles))
}
