//! Local state: what was last applied for every managed resource.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::resources::Attributes;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Address>,
}

impl ResourceState {
    pub fn new(address: &Address, attributes: Attributes, dependencies: Vec<Address>) -> Self {
        Self {
            type_name: address.type_name.clone(),
            name: address.name.clone(),
            attributes,
            dependencies,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// Identifies one state history across writes.
    pub lineage: Uuid,
    pub serial: u64,
    #[serde(default)]
    pub resources: BTreeMap<Address, ResourceState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

impl StateFile {
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            lineage: Uuid::new_v4(),
            serial: 0,
            resources: BTreeMap::new(),
        }
    }

    pub fn get(&self, address: &Address) -> Option<&ResourceState> {
        self.resources.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.resources.contains_key(address)
    }

    pub fn insert(&mut self, address: Address, resource: ResourceState) {
        self.resources.insert(address, resource);
    }

    pub fn remove(&mut self, address: &Address) -> Option<ResourceState> {
        self.resources.remove(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.resources.keys()
    }
}

/// A state file on disk.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty state.
    pub fn load(&self) -> Result<StateFile> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no state file, starting empty");
                return Ok(StateFile::new());
            }
            Err(e) => return Err(self.error(e)),
        };
        let state: StateFile = serde_json::from_str(&text).map_err(|e| self.error(e))?;
        if state.version != STATE_VERSION {
            return Err(self.error(format!(
                "unsupported state version {} (expected {})",
                state.version, STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Bump the serial and write through a temporary file and a rename.
    pub fn persist(&self, state: &mut StateFile) -> Result<()> {
        state.serial += 1;
        let body = serde_json::to_vec_pretty(state)?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state".into());
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        let mut file = open_private(&tmp).map_err(|e| self.error(e))?;
        file.write_all(&body)
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_all())
            .map_err(|e| self.error(e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| self.error(e))?;

        debug!(path = %self.path.display(), serial = state.serial, "state written");
        Ok(())
    }

    fn error(&self, message: impl ToString) -> Error {
        Error::State {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateStore::new(dir.path().join("s.json")).load().unwrap();
        assert_eq!(state.serial, 0);
        assert!(state.resources.is_empty());
    }

    #[test]
    fn persist_bumps_serial_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("s.json"));
        let mut state = store.load().unwrap();
        let addr = Address::managed("pomeriumzero_policy", "p");
        state.insert(
            addr.clone(),
            ResourceState::new(
                &addr,
                json!({"id": "p-1"}).as_object().cloned().unwrap(),
                vec![Address::data("pomeriumzero_cluster", "main")],
            ),
        );
        store.persist(&mut state).unwrap();
        store.persist(&mut state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.serial, 2);
        assert_eq!(loaded.lineage, state.lineage);
        assert_eq!(loaded.get(&addr).unwrap().attributes["id"], json!("p-1"));

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["resources"]["pomeriumzero_policy.p"]["type"], "pomeriumzero_policy");
        assert!(!dir.path().join("s.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn state_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("s.json"));
        store.persist(&mut StateFile::new()).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn rejects_unknown_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        fs::write(
            &path,
            r#"{"version": 7, "lineage": "6f9619ff-8b86-d011-b42d-00c04fc964ff", "serial": 1}"#,
        )
        .unwrap();
        assert!(StateStore::new(path).load().is_err());
    }
}
