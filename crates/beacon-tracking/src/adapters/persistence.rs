//! Persistence adapters
//!
//! `JsonFilePersistence` keeps one JSON file per logical record:
//!
//! ```text
//! <dir>/user.json               {"version":1,"data":{...UserState}}
//! <dir>/target_parameters.json  {"version":1,"data":{"OM.vpv":"..."}}
//! <dir>/profile.json            {"version":1,"data":{...ProfileConfig}}
//! ```
//!
//! Writes go through a temp file and a rename so a crash never leaves a
//! half-written record behind.

use crate::domain::{ProfileConfig, TargetParameterHistory, UserState};
use crate::error::PersistenceError;
use crate::ports::outbound::PersistenceGateway;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Version written into every envelope
pub const FORMAT_VERSION: u32 = 1;

const USER_FILE: &str = "user.json";
const TARGET_PARAMETERS_FILE: &str = "target_parameters.json";
const PROFILE_FILE: &str = "profile.json";

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    data: T,
}

fn io_error(e: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        reason: e.to_string(),
    }
}

fn serialization_error(e: serde_json::Error) -> PersistenceError {
    PersistenceError::Serialization {
        reason: e.to_string(),
    }
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec_pretty(&Envelope {
        version: FORMAT_VERSION,
        data,
    })
    .map_err(serialization_error)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistenceError> {
    let envelope: Envelope<serde_json::Value> =
        serde_json::from_slice(bytes).map_err(serialization_error)?;
    if envelope.version != FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: envelope.version,
            expected: FORMAT_VERSION,
        });
    }
    serde_json::from_value(envelope.data).map_err(serialization_error)
}

/// File-backed gateway. All operations are serialized by one mutex.
pub struct JsonFilePersistence {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFilePersistence {
    /// Open (and create if needed) the storage directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(io_error)?;
        tracing::info!(dir = %dir.display(), "Opened tracker storage");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write<T: Serialize>(&self, name: &str, data: &T) -> Result<(), PersistenceError> {
        let bytes = encode(data)?;
        let path = self.dir.join(name);
        let temp_path = path.with_extension("json.tmp");

        let mut file = std::fs::File::create(&temp_path).map_err(io_error)?;
        file.write_all(&bytes).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        std::fs::rename(&temp_path, &path).map_err(io_error)
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, PersistenceError> {
        match std::fs::read(self.dir.join(name)) {
            Ok(bytes) => decode(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    fn remove(&self, name: &str) -> Result<(), PersistenceError> {
        match std::fs::remove_file(self.dir.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }
}

impl PersistenceGateway for JsonFilePersistence {
    fn save_user(&self, user: &UserState) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock();
        self.write(USER_FILE, user)
    }

    fn load_user(&self) -> Result<UserState, PersistenceError> {
        let _guard = self.lock.lock();
        Ok(self.read(USER_FILE)?.unwrap_or_default())
    }

    fn save_target_parameters(
        &self,
        history: &TargetParameterHistory,
    ) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock();
        self.write(TARGET_PARAMETERS_FILE, history)
    }

    fn load_target_parameters(&self) -> Result<TargetParameterHistory, PersistenceError> {
        let _guard = self.lock.lock();
        Ok(self.read(TARGET_PARAMETERS_FILE)?.unwrap_or_default())
    }

    fn clear_target_parameters(&self) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock();
        self.remove(TARGET_PARAMETERS_FILE)
    }

    fn save_profile(&self, profile: &ProfileConfig) -> Result<(), PersistenceError> {
        let _guard = self.lock.lock();
        self.write(PROFILE_FILE, profile)
    }

    fn load_profile(&self) -> Result<Option<ProfileConfig>, PersistenceError> {
        let _guard = self.lock.lock();
        self.read(PROFILE_FILE)
    }
}

#[derive(Default)]
struct MemoryRecords {
    user: Option<UserState>,
    target_parameters: TargetParameterHistory,
    profile: Option<ProfileConfig>,
}

/// In-memory gateway for tests and ephemeral trackers.
///
/// Writes can be made to fail to exercise error absorption.
#[derive(Default)]
pub struct InMemoryPersistence {
    records: Mutex<MemoryRecords>,
    fail_writes: AtomicBool,
    clears: AtomicUsize,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with an existing device record.
    pub fn with_user(user: UserState) -> Self {
        let store = Self::default();
        store.records.lock().user = Some(user);
        store
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of times target parameter history was cleared.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io {
                reason: "writes disabled".to_string(),
            });
        }
        Ok(())
    }
}

impl PersistenceGateway for InMemoryPersistence {
    fn save_user(&self, user: &UserState) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.records.lock().user = Some(user.clone());
        Ok(())
    }

    fn load_user(&self) -> Result<UserState, PersistenceError> {
        Ok(self.records.lock().user.clone().unwrap_or_default())
    }

    fn save_target_parameters(
        &self,
        history: &TargetParameterHistory,
    ) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.records.lock().target_parameters = history.clone();
        Ok(())
    }

    fn load_target_parameters(&self) -> Result<TargetParameterHistory, PersistenceError> {
        Ok(self.records.lock().target_parameters.clone())
    }

    fn clear_target_parameters(&self) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.records.lock().target_parameters.clear();
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn save_profile(&self, profile: &ProfileConfig) -> Result<(), PersistenceError> {
        self.check_writable()?;
        self.records.lock().profile = Some(profile.clone());
        Ok(())
    }

    fn load_profile(&self) -> Result<Option<ProfileConfig>, PersistenceError> {
        Ok(self.records.lock().profile.clone())
    }
}
