//! Asset tree and asset properties

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between asset names in an asset path
pub const ASSET_PATH_SEPARATOR: char = '\\';

/// A node of the asset tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Asset {
    pub name: String,
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    pub description: String,
    pub status: String,
    #[serde(rename = "ParentUUID")]
    pub parent_uuid: Option<Uuid>,
    /// Path precomputed by the historian, if it sent one
    pub asset_path: Option<String>,
}

/// Binding of an asset to a measurement under a property name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AssetProperty {
    pub name: String,
    #[serde(rename = "UUID")]
    pub uuid: Uuid,
    #[serde(rename = "AssetUUID")]
    pub asset_uuid: Uuid,
    #[serde(rename = "MeasurementUUID")]
    pub measurement_uuid: Option<Uuid>,
}

/// Assets indexed by UUID with lazily computed paths
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    assets: BTreeMap<Uuid, Asset>,
}

impl AssetIndex {
    pub fn new(assets: impl IntoIterator<Item = Asset>) -> Self {
        Self {
            assets: assets.into_iter().map(|a| (a.uuid, a)).collect(),
        }
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&Asset> {
        self.assets.get(uuid)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Assets in UUID order
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    pub fn uuids(&self) -> Vec<Uuid> {
        self.assets.keys().copied().collect()
    }

    /// Root-to-node name chain joined by [`ASSET_PATH_SEPARATOR`]
    ///
    /// Walks parent links as far as they resolve inside the index. A cycle
    /// ends the walk at the first repeated node.
    pub fn path(&self, uuid: &Uuid) -> Option<String> {
        let asset = self.assets.get(uuid)?;
        if let Some(path) = asset.asset_path.as_ref().filter(|p| !p.is_empty()) {
            return Some(path.clone());
        }

        let mut names = vec![asset.name.as_str()];
        let mut seen = HashSet::from([asset.uuid]);
        let mut parent = asset.parent_uuid;
        while let Some(parent_uuid) = parent {
            if !seen.insert(parent_uuid) {
                break;
            }
            match self.assets.get(&parent_uuid) {
                Some(p) => {
                    names.push(p.name.as_str());
                    parent = p.parent_uuid;
                }
                None => break,
            }
        }

        names.reverse();
        Some(names.join(&ASSET_PATH_SEPARATOR.to_string()))
    }
}
