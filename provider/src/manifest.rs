//! The desired-state document.
//!
//! ```yaml
//! provider:
//!   api_token: ...
//! data:
//!   pomeriumzero_cluster:
//!     main: { name: prod }
//! resource:
//!   pomeriumzero_route:
//!     app:
//!       namespace_id: "${data.pomeriumzero_cluster.main.namespace_id}"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::address::{is_valid_name, Address};
use crate::error::{Error, Result};
use crate::resources::Attributes;

/// Objects of one kind: type name, then object name, then configuration.
pub type Blocks = BTreeMap<String, BTreeMap<String, Attributes>>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderBlock {
    pub api_token: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub provider: ProviderBlock,
    #[serde(default)]
    pub data: Blocks,
    #[serde(default)]
    pub resource: Blocks,
}

impl Manifest {
    /// YAML for `.yaml`/`.yml`, JSON otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| manifest_error(path, e))?;
        let manifest = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            _ => Self::from_json_str(&text),
        }
        .map_err(|message| Error::Manifest {
            path: path.to_path_buf(),
            message,
        })?;
        debug!(
            path = %path.display(),
            resources = manifest.resource.values().map(BTreeMap::len).sum::<usize>(),
            data_sources = manifest.data.values().map(BTreeMap::len).sum::<usize>(),
            "loaded manifest"
        );
        Ok(manifest)
    }

    pub fn from_yaml_str(text: &str) -> std::result::Result<Self, String> {
        let manifest: Self = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
        manifest.check_names()?;
        Ok(manifest)
    }

    pub fn from_json_str(text: &str) -> std::result::Result<Self, String> {
        let manifest: Self = serde_json::from_str(text).map_err(|e| e.to_string())?;
        manifest.check_names()?;
        Ok(manifest)
    }

    fn check_names(&self) -> std::result::Result<(), String> {
        for blocks in [&self.data, &self.resource] {
            for (type_name, objects) in blocks {
                if !is_valid_name(type_name) {
                    return Err(format!("invalid type name {:?}", type_name));
                }
                if let Some(name) = objects.keys().find(|n| !is_valid_name(n)) {
                    return Err(format!("invalid name {:?} for {}", name, type_name));
                }
            }
        }
        Ok(())
    }

    /// Every declared object, data sources first, each group sorted.
    pub fn objects(&self) -> Vec<(Address, &Attributes)> {
        let data = self.data.iter().flat_map(|(type_name, objects)| {
            objects
                .iter()
                .map(move |(name, config)| (Address::data(type_name, name), config))
        });
        let managed = self.resource.iter().flat_map(|(type_name, objects)| {
            objects
                .iter()
                .map(move |(name, config)| (Address::managed(type_name, name), config))
        });
        data.chain(managed).collect()
    }

    pub fn get(&self, address: &Address) -> Option<&Attributes> {
        let blocks = if address.is_data() {
            &self.data
        } else {
            &self.resource
        };
        blocks.get(&address.type_name)?.get(&address.name)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.get(address).is_some()
    }
}

fn manifest_error(path: &Path, e: std::io::Error) -> Error {
    Error::Manifest {
        path: PathBuf::from(path),
        message: e.to_string(),
    }
}
