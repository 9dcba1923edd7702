use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use dashdrop_types::models::{NewRequest, Notification, Request, RequestStatus};

use crate::error::{Result, StoreError};
use crate::lifecycle;
use crate::notify::NotificationEvent;
use crate::store::RequestStore;

/// Key the offline request snapshot lives under.
pub const CURRENT_REQUEST_KEY: &str = "currentPickupRequest";

/// Durable key-value storage holding JSON values.
pub trait KeyValueSlot: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;
}

/// Volatile slot, for tests and demos that need no persistence.
#[derive(Default)]
pub struct MemorySlot {
    values: Mutex<HashMap<String, Value>>,
}

impl KeyValueSlot for MemorySlot {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|e| anyhow!("slot lock poisoned: {}", e))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.values
            .lock()
            .map_err(|e| anyhow!("slot lock poisoned: {}", e))?
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// Slot persisted as one JSON object in a file, keys at the top level.
pub struct FileSlot {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> anyhow::Result<serde_json::Map<String, Value>> {
        if !self.path.exists() {
            return Ok(serde_json::Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", self.path.display()))
    }
}

impl KeyValueSlot for FileSlot {
    fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        let _guard = self.lock.lock().map_err(|e| anyhow!("slot lock poisoned: {}", e))?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let _guard = self.lock.lock().map_err(|e| anyhow!("slot lock poisoned: {}", e))?;
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value);
        let raw = serde_json::to_string_pretty(&all)?;
        std::fs::write(&self.path, raw).with_context(|| format!("writing {}", self.path.display()))
    }
}

/// Offline fallback: a single "current request" snapshot in a [`KeyValueSlot`].
///
/// There is only ever one request, so there is nothing to race against and no
/// conflict detection. Notifications are not stored.
#[derive(Clone)]
pub struct LocalStore {
    slot: Arc<dyn KeyValueSlot>,
}

impl LocalStore {
    pub fn new(slot: Arc<dyn KeyValueSlot>) -> Self {
        Self { slot }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySlot::default()))
    }

    fn load(&self) -> Result<Option<Request>> {
        match self.slot.get(CURRENT_REQUEST_KEY)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                let request: Request = serde_json::from_value(value)
                    .map_err(|e| anyhow!("corrupt {} slot: {}", CURRENT_REQUEST_KEY, e))?;
                Ok(Some(request))
            }
        }
    }

    fn save(&self, request: &Request) -> Result<()> {
        let value = serde_json::to_value(request).map_err(anyhow::Error::from)?;
        self.slot.set(CURRENT_REQUEST_KEY, value)?;
        Ok(())
    }

    /// The slot's request, if it is the one asked for.
    fn load_matching(&self, id: &str) -> Result<Request> {
        self.load()?
            .filter(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

impl RequestStore for LocalStore {
    async fn create(&self, new: NewRequest) -> Result<Request> {
        let id = format!("local-{}", Uuid::new_v4().simple());
        let request = Request::pending(id, new, Utc::now());
        self.save(&request)?;
        info!("Offline request {} stored", request.id);
        Ok(request)
    }

    async fn accept(&self, id: &str, runner_id: &str) -> Result<Request> {
        let mut request = self.load_matching(id)?;
        lifecycle::check_accept(request.status)?;

        let now = Utc::now();
        request.status = RequestStatus::Accepted;
        request.runner_id = Some(runner_id.to_string());
        request.accepted_at = Some(now);
        request.updated_at = now;
        self.save(&request)?;
        Ok(request)
    }

    async fn set_status(&self, id: &str, status: RequestStatus) -> Result<Request> {
        let mut request = self.load_matching(id)?;
        lifecycle::check_update(request.status, status)?;

        request.status = status;
        request.updated_at = Utc::now();
        self.save(&request)?;
        Ok(request)
    }

    async fn get(&self, id: &str) -> Result<Option<Request>> {
        Ok(self.load()?.filter(|r| r.id == id))
    }

    async fn open_requests(&self) -> Result<Vec<Request>> {
        Ok(self
            .load()?
            .filter(|r| r.status == RequestStatus::Pending)
            .into_iter()
            .collect())
    }

    async fn record_notification(&self, event: &NotificationEvent) -> Result<Option<Notification>> {
        debug!("Offline mode: not persisting {} notification", event.kind);
        Ok(None)
    }

    async fn notifications_for(&self, _user_id: &str, _limit: u32) -> Result<Vec<Notification>> {
        Ok(Vec::new())
    }

    async fn mark_notification_read(&self, _id: &str) -> Result<bool> {
        Ok(false)
    }
}
