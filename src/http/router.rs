//! Maps a parsed request onto a file under the document root.
//!
//! A path whose last segment starts with a digit selects a fixed page.
//! POSTs to `2…` and `3…` are the login and registration actions: they
//! consult the credential store and answer with a result page.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use crate::http::mapped::MappedFile;
use crate::http::parser::DEFAULT_LANDING_PAGE;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::store::{CredentialStore, StoreError};

pub const REGISTER_PAGE: &str = "/register.html";
pub const LOGIN_PAGE: &str = "/log.html";
pub const PICTURE_PAGE: &str = "/picture.html";
pub const VIDEO_PAGE: &str = "/video.html";
pub const FANS_PAGE: &str = "/fans.html";
pub const WELCOME_PAGE: &str = "/welcome.html";
pub const LOGIN_ERROR_PAGE: &str = "/logError.html";
pub const REGISTER_ERROR_PAGE: &str = "/registerError.html";

const WORLD_READABLE: u32 = 0o004;

/// Where files are served from.
#[derive(Debug, Clone)]
pub struct Site {
    pub doc_root: PathBuf,
    /// Substituted for a bare `/`.
    pub landing: String,
}

impl Site {
    pub fn new(doc_root: impl Into<PathBuf>) -> Self {
        Self {
            doc_root: doc_root.into(),
            landing: DEFAULT_LANDING_PAGE.to_string(),
        }
    }

    /// Resolves `req` and builds the response for it.
    pub fn respond(&self, req: &Request, store: &mut dyn CredentialStore) -> Response {
        let target = route(req, store);
        match self.open(&target) {
            Ok(file) => Response::file(file, req.keep_alive),
            Err(status) => Response::error(status, req.keep_alive),
        }
    }

    /// Stats and maps `target`, relative to the document root.
    pub fn open(&self, target: &str) -> Result<MappedFile, StatusCode> {
        let path = self.file_path(target).ok_or(StatusCode::BadRequest)?;
        let meta = fs::metadata(&path).map_err(|_| StatusCode::NotFound)?;
        if meta.permissions().mode() & WORLD_READABLE == 0 {
            return Err(StatusCode::Forbidden);
        }
        if meta.is_dir() {
            return Err(StatusCode::BadRequest);
        }
        MappedFile::open(&path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to map file");
            StatusCode::InternalError
        })
    }

    /// Joins the query-free `target` onto the document root. Rejects any
    /// `..` segment.
    pub fn file_path(&self, target: &str) -> Option<PathBuf> {
        let path = target.split('?').next().unwrap_or(target);
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }
        Some(self.doc_root.join(relative))
    }
}

/// Form actions carried by POST bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Login,
    Register,
}

/// Picks the document to serve for `req`, running a login or registration
/// action first if the path asks for one.
pub fn route(req: &Request, store: &mut dyn CredentialStore) -> String {
    let first = req.last_segment().chars().next();

    if req.method == Method::POST {
        let action = match first {
            Some('2') => Some(Action::Login),
            Some('3') => Some(Action::Register),
            _ => None,
        };
        if let Some(action) = action {
            return run_action(action, req, store).to_string();
        }
    }

    match first {
        Some('0') => REGISTER_PAGE.to_string(),
        Some('1') => LOGIN_PAGE.to_string(),
        Some('5') => PICTURE_PAGE.to_string(),
        Some('6') => VIDEO_PAGE.to_string(),
        Some('7') => FANS_PAGE.to_string(),
        _ => req.path.clone(),
    }
}

fn run_action(action: Action, req: &Request, store: &mut dyn CredentialStore) -> &'static str {
    let Some((user, pass)) = req.body_str().and_then(parse_credentials) else {
        tracing::debug!(?action, "Unparseable credential form");
        return match action {
            Action::Login => LOGIN_ERROR_PAGE,
            Action::Register => REGISTER_ERROR_PAGE,
        };
    };

    match action {
        Action::Login => {
            if store.lookup(user).is_some_and(|stored| stored == pass) {
                WELCOME_PAGE
            } else {
                LOGIN_ERROR_PAGE
            }
        }
        Action::Register => match store.insert(user, pass) {
            Ok(()) => {
                tracing::info!(user, "Registered user");
                LOGIN_PAGE
            }
            Err(StoreError::Duplicate(_)) => REGISTER_ERROR_PAGE,
            Err(e) => {
                tracing::warn!(user, error = %e, "Registration failed");
                REGISTER_ERROR_PAGE
            }
        },
    }
}

/// Extracts `(user, passwd)` from `user=<name>&passwd=<pass>`.
pub fn parse_credentials(body: &str) -> Option<(&str, &str)> {
    let rest = &body[body.find("user=")? + "user=".len()..];
    let (user, rest) = rest.split_once('&')?;
    let pass = rest.strip_prefix("passwd=")?;
    if user.is_empty() {
        return None;
    }
    Some((user, pass))
}
