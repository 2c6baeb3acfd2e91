use {
    crate::asset::{Asset, AssetData, AssetId, SellerId, TaskType},
    arc_swap::ArcSwap,
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    },
    thiserror::Error,
};

/// Concurrent asset store with copy-on-write snapshots.
///
/// Readers call [`Registry::snapshot`] and keep working against that version;
/// writers serialize on an internal lock and publish a fully built snapshot
/// atomically. There is no partially visible registration.
pub struct Registry {
    published: ArcSwap<Snapshot>,
    write: Mutex<WriteState>,
}

struct WriteState {
    next_id: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            published: ArcSwap::from_pointee(Snapshot::empty()),
            write: Mutex::new(WriteState { next_id: 1 }),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new asset and publishes a new snapshot version.
    ///
    /// Every call creates a new asset; re-uploading identical data yields a
    /// distinct id with the same content digest.
    pub fn register(
        &self,
        seller: SellerId,
        task_type: TaskType,
        data: AssetData,
    ) -> Arc<Asset> {
        let mut write = self.write.lock().unwrap();

        let current = self.published.load();
        let id = AssetId(write.next_id);
        write.next_id += 1;
        let version = current.version + 1;

        let asset = Arc::new(Asset {
            id,
            digest: data.digest(),
            seller,
            task_type: task_type.clone(),
            data,
            registered_at: chrono::Utc::now(),
            registration_version: version,
        });

        let mut assets = current.assets.clone();
        assets.insert(id, Arc::clone(&asset));
        let mut by_type = current.by_type.clone();
        by_type.entry(task_type).or_default().push(id);

        self.published.store(Arc::new(Snapshot {
            version,
            assets,
            by_type,
        }));

        tracing::info!(
            asset = %asset.id,
            seller = ?asset.seller,
            digest = ?asset.digest,
            version,
            "registered asset"
        );
        asset
    }

    /// The current consistent view. Holding the returned snapshot pins that
    /// registry version regardless of later registrations.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.published.load_full()
    }
}

/// One immutable registry version.
#[derive(Clone, Debug)]
pub struct Snapshot {
    version: u64,
    assets: HashMap<AssetId, Arc<Asset>>,
    by_type: HashMap<TaskType, Vec<AssetId>>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            assets: HashMap::new(),
            by_type: HashMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// All assets registered for the given task type, in registration order.
    pub fn list_assets(&self, task_type: &TaskType) -> Vec<Arc<Asset>> {
        self.by_type
            .get(task_type)
            .map(|ids| {
                ids.iter()
                    .map(|id| Arc::clone(&self.assets[id]))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn load(&self, id: AssetId) -> Result<Arc<Asset>, UnknownAsset> {
        self.assets.get(&id).cloned().ok_or(UnknownAsset(id))
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("asset {0} is not registered")]
pub struct UnknownAsset(pub AssetId);
