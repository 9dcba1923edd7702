use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use dashdrop_db::Database;
use dashdrop_realtime::{ChangeFeed, SubscriptionManager};
use dashdrop_types::models::ParseError;

use crate::local::{FileSlot, LocalStore};
use crate::notify::Permission;
use crate::remote::RemoteStore;
use crate::store::Backend;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid {key} value {value:?}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Which record store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Remote,
    /// Offline single-slot fallback.
    Local,
}

impl Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Remote => "remote",
            Self::Local => "local",
        })
    }
}

impl FromStr for StoreKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(ParseError {
                kind: "store",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub store: StoreKind,
    pub db_path: PathBuf,
    pub slot_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Answer the headless notification surface gives when asked.
    pub notifications: Permission,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys take their defaults,
    /// set keys must parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            store: load(&lookup, "DASHDROP_STORE", "remote")?,
            db_path: load(&lookup, "DASHDROP_DB_PATH", "dashdrop.db")?,
            slot_path: load(&lookup, "DASHDROP_SLOT_PATH", "current_request.json")?,
            host: load(&lookup, "DASHDROP_HOST", "0.0.0.0")?,
            port: load(&lookup, "DASHDROP_PORT", "3000")?,
            notifications: load(&lookup, "DASHDROP_NOTIFICATIONS", "granted")?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Open the configured store. Realtime is only available on the remote
    /// store, so the manager is `None` offline.
    pub fn open_backend(&self) -> anyhow::Result<(Backend, Option<SubscriptionManager>)> {
        match self.store {
            StoreKind::Remote => {
                let db = Database::open(&self.db_path)?;
                let feed = ChangeFeed::new();
                let manager = SubscriptionManager::new(feed.clone());
                info!("Remote store at {}", self.db_path.display());
                Ok((Backend::Remote(RemoteStore::new(Arc::new(db), feed)), Some(manager)))
            }
            StoreKind::Local => {
                info!("Offline store at {}", self.slot_path.display());
                let slot = Arc::new(FileSlot::new(&self.slot_path));
                Ok((Backend::Local(LocalStore::new(slot)), None))
            }
        }
    }
}

fn load<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    value.parse().map_err(|e: T::Err| ConfigError {
        key,
        reason: e.to_string(),
        value,
    })
}
