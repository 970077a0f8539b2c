//! Stored browser cookies for Google Scholar lookups.
//!
//! Scholar serves a CAPTCHA to cookieless clients far more often, so lookups
//! send cookies exported from a real browser session. They live in a JSON file
//! (`~/.papertrack_scholar_cookies.json` by default) in the common
//! browser-extension export format.

use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const COOKIE_FILE: &str = ".papertrack_scholar_cookies.json";

fn default_cookie_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(COOKIE_FILE))
        .ok_or_else(|| TrackerError::Config("Cannot determine home directory".to_string()))
}

/// One exported browser cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    /// Unix seconds; session cookies have none
    #[serde(default, alias = "expires")]
    pub expiration_date: Option<f64>,
}

impl Cookie {
    pub fn is_expired(&self, now_secs: f64) -> bool {
        self.expiration_date.is_some_and(|exp| exp > 0.0 && exp < now_secs)
    }
}

/// Loads and stores the cookie file.
pub struct CookieManager {
    path: PathBuf,
}

impl CookieManager {
    pub fn new() -> Result<Self> {
        Ok(Self {
            path: default_cookie_path()?,
        })
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unexpired cookies from the file. A missing or unreadable file yields none.
    pub fn load(&self) -> Vec<Cookie> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Cookie file not found");
            return Vec::new();
        }

        let cookies = match read_cookie_file(&self.path) {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring unreadable cookie file");
                return Vec::new();
            }
        };

        let now = chrono::Utc::now().timestamp() as f64;
        let total = cookies.len();
        let live: Vec<Cookie> = cookies.into_iter().filter(|c| !c.is_expired(now)).collect();
        if live.len() < total {
            info!(expired = total - live.len(), "Dropped expired cookies");
        }
        live
    }

    /// `Cookie` header value for requests to hosts under `domain`.
    pub fn header_for(&self, domain: &str) -> String {
        cookie_header(&self.load(), domain)
    }

    pub fn save(&self, cookies: &[Cookie]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(cookies)?;
        std::fs::write(&self.path, content)?;
        info!(count = cookies.len(), path = %self.path.display(), "Saved cookies");
        Ok(())
    }

    /// Copy cookies for `domain` out of a browser export into the store.
    /// Returns how many were kept.
    pub fn import(&self, export: &Path, domain: &str) -> Result<usize> {
        if !export.exists() {
            return Err(TrackerError::MissingInputFile(export.to_path_buf()));
        }
        let relevant: Vec<Cookie> = read_cookie_file(export)?
            .into_iter()
            .filter(|c| c.domain.contains(domain))
            .collect();
        self.save(&relevant)?;
        Ok(relevant.len())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!(path = %self.path.display(), "Cleared cookies");
        }
        Ok(())
    }
}

impl Default for CookieManager {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_path(PathBuf::from(COOKIE_FILE)))
    }
}

fn read_cookie_file(path: &Path) -> Result<Vec<Cookie>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn cookie_header(cookies: &[Cookie], domain: &str) -> String {
    cookies
        .iter()
        .filter(|c| c.domain.contains(domain))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}
