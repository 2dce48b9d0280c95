//! Device identity management.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::db::{DeviceRepository, SharedDb};
use crate::error::{Error, Result};
use crate::models::DeviceRecord;

const DEVICE_ID_KEY: &str = "device_id";
const DEVICE_ID_SOURCE_KEY: &str = "device_id_source";

/// Capability interface for producing a stable installation identifier.
///
/// Implementations are tried in order; whichever produced the stored value
/// wins forever after — the persisted id is never regenerated.
pub trait IdGenerator: Send + Sync {
    /// Produce an identifier, or `None` when this source is unavailable
    fn generate(&self) -> Option<String>;

    /// Label recorded alongside the id for diagnostics
    fn source(&self) -> &'static str;
}

/// Hardware-derived identifier from the OS machine id
pub struct MachineIdGenerator;

impl IdGenerator for MachineIdGenerator {
    fn generate(&self) -> Option<String> {
        #[cfg(unix)]
        {
            for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
                if let Ok(text) = std::fs::read_to_string(path) {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Some(text.to_string());
                    }
                }
            }
            None
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    fn source(&self) -> &'static str {
        "machine-id"
    }
}

/// Random UUIDv7 fallback when no hardware identifier is available
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> Option<String> {
        Some(Uuid::now_v7().to_string())
    }

    fn source(&self) -> &'static str {
        "random-uuid"
    }
}

/// Loads or creates the stable per-installation device record
#[derive(Clone)]
pub struct DeviceIdentity {
    db: SharedDb,
    generators: Arc<Vec<Box<dyn IdGenerator>>>,
    record: Arc<Mutex<Option<DeviceRecord>>>,
}

impl DeviceIdentity {
    /// Identity with the default generator chain: machine id, then random
    #[must_use]
    pub fn new(db: SharedDb) -> Self {
        Self::with_generators(
            db,
            vec![Box::new(MachineIdGenerator), Box::new(RandomIdGenerator)],
        )
    }

    /// Identity with a custom generator chain
    #[must_use]
    pub fn with_generators(db: SharedDb, generators: Vec<Box<dyn IdGenerator>>) -> Self {
        Self {
            db,
            generators: Arc::new(generators),
            record: Arc::new(Mutex::new(None)),
        }
    }

    /// Idempotently load or create the device id and record
    pub fn initialize(&self) -> Result<DeviceRecord> {
        if let Some(record) = self.record.lock().clone() {
            return Ok(record);
        }

        let record = {
            let db = self.db.lock();
            let repo = DeviceRepository::new(db.connection());

            let id = match repo.get_config(DEVICE_ID_KEY)? {
                Some(id) => id,
                None => {
                    let (id, source) = self.generate_id()?;
                    repo.set_config(DEVICE_ID_KEY, &id)?;
                    repo.set_config(DEVICE_ID_SOURCE_KEY, source)?;
                    tracing::info!(source, "Generated new device id");
                    id
                }
            };

            match repo.get(&id)? {
                Some(record) => record,
                None => {
                    let record = DeviceRecord::new(id, default_device_name());
                    repo.insert(&record)?;
                    record
                }
            }
        };

        *self.record.lock() = Some(record.clone());
        Ok(record)
    }

    /// Stable device id; fails before `initialize()`
    pub fn id(&self) -> Result<String> {
        self.record
            .lock()
            .as_ref()
            .map(|record| record.id.clone())
            .ok_or(Error::NotInitialized("DeviceIdentity"))
    }

    /// Full device record; fails before `initialize()`
    pub fn info(&self) -> Result<DeviceRecord> {
        self.record
            .lock()
            .clone()
            .ok_or(Error::NotInitialized("DeviceIdentity"))
    }

    /// Rename this installation
    pub fn update_name(&self, name: &str) -> Result<DeviceRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(
                "device name cannot be empty".to_string(),
            ));
        }

        let id = self.id()?;
        {
            let db = self.db.lock();
            DeviceRepository::new(db.connection()).update_name(&id, name)?;
        }

        let mut record = self.record.lock();
        if let Some(record) = record.as_mut() {
            record.name = name.to_string();
        }
        record.clone().ok_or(Error::NotInitialized("DeviceIdentity"))
    }

    /// Stamp the completion time of a successful sync cycle
    pub fn update_last_sync_at(&self, timestamp: i64) -> Result<()> {
        let id = self.id()?;
        {
            let db = self.db.lock();
            DeviceRepository::new(db.connection()).update_last_sync_at(&id, timestamp)?;
        }

        if let Some(record) = self.record.lock().as_mut() {
            record.last_sync_at = Some(timestamp);
        }
        Ok(())
    }

    fn generate_id(&self) -> Result<(String, &'static str)> {
        for generator in self.generators.iter() {
            if let Some(id) = generator.generate() {
                return Ok((id, generator.source()));
            }
        }
        Err(Error::InvalidInput(
            "no id generator produced an identifier".to_string(),
        ))
    }
}

/// Display name for this installation, falling back to "unknown-device"
fn default_device_name() -> String {
    if let Some(name) =
        std::env::var("HOSTNAME").ok().or_else(|| std::env::var("COMPUTERNAME").ok())
    {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    #[cfg(unix)]
    if let Ok(name) = std::fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    "unknown-device".to_string()
}
