//! Bounded LRU cache of per-host memorization stores

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use zeroize::Zeroizing;

use crate::error::{Result, TrustError};
use crate::store::keystore::{KeystoreFile, KEYSTORE_EXTENSION};
use crate::store::memorizing::MemorizingStore;

/// Default number of hosts kept in memory
pub const DEFAULT_CACHE_SIZE: usize = 128;

#[derive(Debug)]
struct CacheEntry {
    store: Arc<MemorizingStore>,
    last_accessed: AtomicU64,
}

impl CacheEntry {
    fn touch(&self, tick: u64) {
        self.last_accessed.store(tick, Ordering::Relaxed);
    }

    fn last_access_tick(&self) -> u64 {
        self.last_accessed.load(Ordering::Relaxed)
    }
}

/// Cache entries plus every store that is still alive
///
/// `live` outlives eviction: a store evicted while a caller still holds it
/// is handed out again, so one host never has two stores.
#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    live: HashMap<String, Weak<MemorizingStore>>,
}

impl CacheState {
    /// Remove least recently used entries until at most `keep` remain
    fn make_room(&mut self, keep: usize) -> Vec<Arc<MemorizingStore>> {
        let mut evicted = Vec::new();

        while self.entries.len() > keep {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access_tick())
                .map(|(host, _)| host.clone());

            match oldest.and_then(|host| self.entries.remove(&host)) {
                Some(entry) => evicted.push(entry.store),
                None => break,
            }
        }

        evicted
    }

    fn live_stores(&self) -> Vec<Arc<MemorizingStore>> {
        self.live.values().filter_map(Weak::upgrade).collect()
    }
}

/// Host-keyed cache of [`MemorizingStore`]s
///
/// Stores are opened lazily from the working directory. Evicting a host only
/// drops its transient tier; its keystore file stays on disk and is loaded
/// again when the host comes back. Opening a store happens outside the map
/// lock, so a slow keystore read for one host never stalls another.
pub struct HostKeyedStoreCache {
    working_dir: PathBuf,
    password: Arc<Zeroizing<String>>,
    capacity: usize,
    state: Mutex<CacheState>,
    clock: AtomicU64,
}

impl std::fmt::Debug for HostKeyedStoreCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostKeyedStoreCache")
            .field("working_dir", &self.working_dir)
            .field("capacity", &self.capacity)
            .field("len", &self.len().ok())
            .finish_non_exhaustive()
    }
}

impl HostKeyedStoreCache {
    /// Create a cache holding at most `capacity` hosts
    pub fn new(
        working_dir: impl Into<PathBuf>,
        password: Arc<Zeroizing<String>>,
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(TrustError::Configuration(
                "store cache capacity must be positive".to_string(),
            ));
        }

        Ok(Self {
            working_dir: working_dir.into(),
            password,
            capacity,
            state: Mutex::new(CacheState::default()),
            clock: AtomicU64::new(0),
        })
    }

    /// Store for `host`, opening it from disk on a miss
    ///
    /// A store evicted earlier but still held by a caller is reused rather
    /// than opened a second time.
    pub fn get_or_create(&self, host: &str) -> Result<Arc<MemorizingStore>> {
        if let Some(store) = self.admit(host, None)? {
            return Ok(store);
        }

        let keystore = KeystoreFile::for_host(&self.working_dir, host, Arc::clone(&self.password));
        let opened = Arc::new(MemorizingStore::open(host, keystore)?);

        // Another thread may have opened the same host meanwhile
        self.admit(host, Some(opened))?
            .ok_or_else(|| TrustError::Internal(format!("store for {host} was not admitted")))
    }

    /// Put the store for `host` in the cache, preferring one already alive
    ///
    /// Returns `None` only when nothing is alive and `opened` is `None`.
    fn admit(
        &self,
        host: &str,
        opened: Option<Arc<MemorizingStore>>,
    ) -> Result<Option<Arc<MemorizingStore>>> {
        let (store, evicted) = {
            let mut state = self.lock()?;
            let tick = self.tick();

            if let Some(entry) = state.entries.get(host) {
                entry.touch(tick);
                return Ok(Some(Arc::clone(&entry.store)));
            }

            let alive = state.live.get(host).and_then(Weak::upgrade);
            let Some(store) = alive.or(opened) else {
                return Ok(None);
            };

            let evicted = state.make_room(self.capacity - 1);
            state.live.retain(|_, weak| weak.strong_count() > 0);
            state
                .live
                .insert(host.to_string(), Arc::downgrade(&store));
            state.entries.insert(
                host.to_string(),
                CacheEntry {
                    store: Arc::clone(&store),
                    last_accessed: AtomicU64::new(tick),
                },
            );
            (store, evicted)
        };

        for old in evicted {
            tracing::debug!("Evicted memorization store for {}", old.host());
            old.discard_transient();
        }

        Ok(Some(store))
    }

    /// Cached store for `host`, without opening one
    pub fn get(&self, host: &str) -> Result<Option<Arc<MemorizingStore>>> {
        let state = self.lock()?;
        Ok(state.entries.get(host).map(|entry| {
            entry.touch(self.tick());
            Arc::clone(&entry.store)
        }))
    }

    /// Drop `host` from the cache, discarding its transient tier
    ///
    /// Returns whether the host was cached. The keystore file is kept.
    pub fn evict(&self, host: &str) -> Result<bool> {
        let removed = self.lock()?.entries.remove(host);
        match removed {
            Some(entry) => {
                entry.store.discard_transient();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether `host` is currently cached
    pub fn contains(&self, host: &str) -> Result<bool> {
        Ok(self.lock()?.entries.contains_key(host))
    }

    /// Number of cached hosts
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    /// True when no host is cached
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Maximum number of cached hosts
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Directory holding the keystore files
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Clear every host
    ///
    /// Transient tiers are always dropped, including those of evicted stores
    /// still in use. With `clear_persistent`, every keystore file in the
    /// working directory is deleted too, including those of hosts not
    /// currently cached.
    pub fn clear_all(&self, clear_persistent: bool) -> Result<()> {
        let stores = self.lock()?.live_stores();

        for store in stores {
            store.clear(clear_persistent)?;
        }

        if clear_persistent {
            self.delete_keystore_files()?;
        }
        Ok(())
    }

    fn delete_keystore_files(&self) -> Result<()> {
        let dir = match fs::read_dir(&self.working_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(TrustError::storage(
                    &self.working_dir,
                    format!("cannot list working directory: {e}"),
                ))
            }
        };

        for entry in dir {
            let path = entry
                .map_err(|e| {
                    TrustError::storage(
                        &self.working_dir,
                        format!("cannot read working directory entry: {e}"),
                    )
                })?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(KEYSTORE_EXTENSION) {
                fs::remove_file(&path)
                    .map_err(|e| TrustError::storage(&path, format!("delete failed: {e}")))?;
            }
        }

        tracing::info!("Deleted all keystore files in {:?}", self.working_dir);
        Ok(())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|_| TrustError::poisoned("store cache"))
    }
}
