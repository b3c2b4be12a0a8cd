//! Collections kept as one pretty-printed JSON array per file.
//!
//! The revision of a collection is the blake3 digest of its file bytes. A
//! missing file is an empty collection at [`Revision::absent`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use freightq_core::ports::{Collection, RecordStore, Revision, Snapshot, StoreError};

pub struct JsonFileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|error| StoreError::Io {
            collection: root.display().to_string(),
            message: error.to_string(),
        })?;
        Ok(Self { root, write_lock: Mutex::new(()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, collection: Collection) -> PathBuf {
        self.root.join(format!("{}.json", collection.name()))
    }

    fn read_bytes(&self, collection: Collection) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(collection)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(io_error(collection, error)),
        }
    }
}

fn revision_of(bytes: &[u8]) -> Revision {
    Revision(blake3::hash(bytes).to_hex().to_string())
}

fn io_error(collection: Collection, error: std::io::Error) -> StoreError {
    StoreError::Io { collection: collection.name().to_owned(), message: error.to_string() }
}

fn decode(collection: Collection, bytes: &[u8]) -> Result<Vec<Value>, StoreError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Array(records)) => Ok(records),
        Ok(other) => Err(StoreError::Decode {
            collection: collection.name().to_owned(),
            message: format!("expected a JSON array, found {}", json_kind(&other)),
        }),
        Err(error) => Err(StoreError::Decode {
            collection: collection.name().to_owned(),
            message: error.to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self, collection: Collection) -> Result<Snapshot, StoreError> {
        match self.read_bytes(collection)? {
            Some(bytes) => Ok(Snapshot {
                records: decode(collection, &bytes)?,
                revision: revision_of(&bytes),
            }),
            None => Ok(Snapshot { records: Vec::new(), revision: Revision::absent() }),
        }
    }

    fn save(
        &self,
        collection: Collection,
        records: &[Value],
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(expected) = expected {
            let current = match self.read_bytes(collection)? {
                Some(bytes) => revision_of(&bytes),
                None => Revision::absent(),
            };
            if &current != expected {
                return Err(StoreError::Conflict { collection: collection.name().to_owned() });
            }
        }

        let mut bytes = serde_json::to_vec_pretty(records).map_err(|error| StoreError::Decode {
            collection: collection.name().to_owned(),
            message: error.to_string(),
        })?;
        bytes.push(b'\n');

        let target = self.path_for(collection);
        let staging = self.root.join(format!(".{}.json.tmp", collection.name()));
        fs::write(&staging, &bytes).map_err(|error| io_error(collection, error))?;
        if let Err(error) = fs::rename(&staging, &target) {
            let _ = fs::remove_file(&staging);
            return Err(io_error(collection, error));
        }

        let revision = revision_of(&bytes);
        debug!(
            event_name = "store.saved",
            collection = collection.name(),
            records = records.len(),
            revision = %revision.0,
            "collection written"
        );
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use freightq_core::ports::{Collection, RecordStore, Revision, StoreError};

    use super::JsonFileStore;

    #[test]
    fn missing_collection_loads_empty_at_absent_revision() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("store");

        let snapshot = store.load(Collection::Offers).expect("load");
        assert!(snapshot.records.is_empty());
        assert_eq!(snapshot.revision, Revision::absent());
    }

    #[test]
    fn save_then_load_reports_same_revision() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("store");

        let revision = store
            .save(Collection::Carriers, &[json!({"name": "Alpha", "email": "a@x.test"})], None)
            .expect("save");
        let snapshot = store.load(Collection::Carriers).expect("load");

        assert_eq!(snapshot.revision, revision);
        assert_eq!(snapshot.records[0]["name"], "Alpha");
        assert!(dir.path().join("carriers.json").is_file());
        assert!(!dir.path().join(".carriers.json.tmp").exists());
    }

    #[test]
    fn stale_revision_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("store");
        let first = store.save(Collection::Offers, &[json!({"n": 1})], None).expect("first");
        store.save(Collection::Offers, &[json!({"n": 2})], Some(&first)).expect("second");

        let error = store
            .save(Collection::Offers, &[json!({"n": 3})], Some(&first))
            .expect_err("first revision is stale");
        assert!(matches!(error, StoreError::Conflict { .. }));
        assert_eq!(store.load(Collection::Offers).expect("load").records[0]["n"], 2);
    }

    #[test]
    fn absent_revision_guards_against_concurrent_creation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("store");
        store.save(Collection::Bids, &[json!({"id": "SHIP-1"})], None).expect("created elsewhere");

        let error = store
            .save(Collection::Bids, &[], Some(&Revision::absent()))
            .expect_err("file now exists");
        assert!(matches!(error, StoreError::Conflict { .. }));
    }

    #[test]
    fn non_array_file_is_a_decode_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("requests.json"), "{\"id\": 1}").expect("seed");
        fs::write(dir.path().join("contracts.json"), "  \n").expect("seed");
        let store = JsonFileStore::open(dir.path()).expect("store");

        let error = store.load(Collection::Bids).expect_err("object is not a collection");
        assert!(error.to_string().contains("expected a JSON array"));
        assert!(store.load(Collection::Contracts).expect("blank file").records.is_empty());
    }
}
