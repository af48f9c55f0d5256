use crate::client::ObsApi;
use crate::error::HubError;
use crate::lock;
use crate::requests;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxToggle {
    pub name: String,
    pub scene_item_id: i64,
    pub enabled: bool,
}

/// Keeps a passthrough "all sources" scene showing exactly the sources that
/// are live in preview or program.
#[derive(Clone)]
pub struct AuxiliarySourceSync {
    api: Arc<dyn ObsApi>,
    scene: Option<String>,
    items: Arc<Mutex<BTreeMap<String, i64>>>,
}

impl AuxiliarySourceSync {
    pub fn new(api: Arc<dyn ObsApi>, scene: Option<String>) -> Self {
        Self {
            api,
            scene,
            items: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn scene(&self) -> Option<&str> {
        self.scene.as_deref()
    }

    pub fn items(&self) -> BTreeMap<String, i64> {
        lock(&self.items).clone()
    }

    /// Replaces the item map with the aux scene's current items.
    pub async fn load(&self) -> Result<usize, HubError> {
        let Some(scene) = self.scene.as_deref() else {
            return Ok(0);
        };
        let items = requests::get_scene_item_list(self.api.as_ref(), scene).await?;
        let map: BTreeMap<String, i64> = items
            .into_iter()
            .map(|i| (i.source_name, i.scene_item_id))
            .collect();
        let count = map.len();
        *lock(&self.items) = map;
        debug!(scene, count, "aux scene items loaded");
        Ok(count)
    }

    pub fn clear(&self) {
        lock(&self.items).clear();
    }

    pub fn plan(items: &BTreeMap<String, i64>, active: &BTreeSet<String>) -> Vec<AuxToggle> {
        items
            .iter()
            .map(|(name, id)| AuxToggle {
                name: name.clone(),
                scene_item_id: *id,
                enabled: active.contains(name),
            })
            .collect()
    }

    /// One failing item does not stop the pass.
    pub async fn sync(&self, active: &BTreeSet<String>) -> usize {
        let Some(scene) = self.scene.as_deref() else {
            return 0;
        };
        let toggles = Self::plan(&lock(&self.items), active);

        let mut applied = 0;
        for t in toggles {
            let api = self.api.as_ref();
            match requests::set_scene_item_enabled(api, scene, t.scene_item_id, t.enabled).await {
                Ok(()) => applied += 1,
                Err(e) => warn!(scene, item = %t.name, "aux visibility update failed: {e}"),
            }
        }
        applied
    }
}
