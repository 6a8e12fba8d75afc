pub mod collections;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info};

pub use collections::{Collection, Record, next_id};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed collection {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize collection: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("collection lock poisoned: {0:?}")]
    LockPoisoned(Collection),

    #[error("no ids left in collection {0:?}")]
    IdsExhausted(Collection),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// File-backed record store: one pretty-printed JSON array per collection.
///
/// Every read parses the whole file and every write replaces it. Writes go
/// through a temp file plus rename, so a concurrent reader sees either the
/// old or the new array. Read-modify-write cycles must use [`Store::update`],
/// which serializes them per collection.
pub struct Store {
    dir: PathBuf,
    users: Mutex<()>,
    posts: Mutex<()>,
}

impl Store {
    /// Open (or initialize) the store rooted at `dir`, seeding any missing
    /// collection file with an empty array.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let store = Self {
            dir,
            users: Mutex::new(()),
            posts: Mutex::new(()),
        };

        for collection in Collection::ALL {
            let path = store.path(collection);
            if !path.exists() {
                write_atomic(&path, b"[]")?;
                info!("Seeded empty collection {}", path.display());
            }
        }

        info!("Data directory: {}", store.dir.display());
        Ok(store)
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }

    /// Load the full collection in storage order.
    pub fn read<T: Record>(&self) -> Result<Vec<T>> {
        let path = self.path(T::COLLECTION);
        let bytes = fs::read(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse { path, source })
    }

    /// Replace the full collection.
    ///
    /// Does not take the collection lock; a caller that read the records
    /// first can still lose a concurrent update. Use [`Store::update`] for that.
    pub fn write<T: Record>(&self, records: &[T]) -> Result<()> {
        let path = self.path(T::COLLECTION);
        let bytes = serde_json::to_vec_pretty(records).map_err(StoreError::Serialize)?;
        write_atomic(&path, &bytes)?;
        debug!("Wrote {} records to {}", records.len(), path.display());
        Ok(())
    }

    /// Read the collection, let `f` mutate it, and write it back, all while
    /// holding the collection's lock. Nothing is written if `f` fails.
    pub fn update<T, R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        T: Record,
        E: From<StoreError>,
        F: FnOnce(&mut Vec<T>) -> std::result::Result<R, E>,
    {
        let _guard = self
            .lock(T::COLLECTION)
            .lock()
            .map_err(|_| StoreError::LockPoisoned(T::COLLECTION))?;

        let mut records = self.read::<T>()?;
        let out = f(&mut records)?;
        self.write(&records)?;
        Ok(out)
    }

    fn lock(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::Users => &self.users,
            Collection::Posts => &self.posts,
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|source| StoreError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    use chrono::Utc;
    use pinboard_types::models::{Post, Role, User};

    fn post(id: i64, content: &str) -> Post {
        Post {
            id,
            user_id: 1,
            content: content.into(),
            likes: 0,
            comments: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn open_seeds_empty_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("data")).unwrap();

        assert!(store.read::<User>().unwrap().is_empty());
        assert!(store.read::<Post>().unwrap().is_empty());
        assert_eq!(fs::read_to_string(store.path(Collection::Posts)).unwrap(), "[]");
    }

    #[test]
    fn open_keeps_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store.write(&[post(1, "kept")]).unwrap();
        }

        let store = Store::open(dir.path()).unwrap();
        let posts = store.read::<Post>().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].content, "kept");
    }

    #[test]
    fn write_preserves_order_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.write(&[post(3, "c"), post(1, "a"), post(2, "b")]).unwrap();

        let ids: Vec<i64> = store.read::<Post>().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert!(!dir.path().join("posts.json.tmp").exists());
    }

    #[test]
    fn users_are_stored_with_hash_and_role() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store
            .write(&[User {
                id: 5,
                username: "ada".into(),
                password: "$argon2id$stub".into(),
                role: Role::Admin,
                followers: Default::default(),
                following: Default::default(),
            }])
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path(Collection::Users)).unwrap()).unwrap();
        assert_eq!(raw[0]["role"], "admin");
        assert_eq!(raw[0]["followers"], serde_json::json!([]));
    }

    #[test]
    fn malformed_file_fails_with_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        fs::write(store.path(Collection::Posts), "{not json").unwrap();

        let err = store.read::<Post>().unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn failed_update_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store.write(&[post(1, "before")]).unwrap();

        let result: std::result::Result<(), StoreError> = store.update::<Post, _, _, _>(|posts| {
            posts[0].content = "after".into();
            Err(StoreError::LockPoisoned(Collection::Posts))
        });

        assert!(result.is_err());
        assert_eq!(store.read::<Post>().unwrap()[0].content, "before");
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        store.write(&[post(1, "counter")]).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        store
                            .update::<Post, _, StoreError, _>(|posts| {
                                posts[0].likes += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.read::<Post>().unwrap()[0].likes, 80);
    }
}
