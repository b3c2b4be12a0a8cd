//! In-process collaborators for tests and dry runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::ports::{
    ArtifactError, ArtifactStore, Collection, InboundMessage, MailError, MailTransport,
    OutboundMail, RecordStore, Revision, Snapshot, StoreError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
pub struct InMemoryRecordStore {
    collections: Mutex<HashMap<Collection, (Vec<Value>, Revision)>>,
    next_revision: AtomicU64,
    fail_saves: AtomicBool,
}

impl InMemoryRecordStore {
    /// Makes every subsequent `save` fail with an i/o error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self, collection: Collection) -> Vec<Value> {
        lock(&self.collections)
            .get(&collection)
            .map(|(records, _)| records.clone())
            .unwrap_or_default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn load(&self, collection: Collection) -> Result<Snapshot, StoreError> {
        let collections = lock(&self.collections);
        Ok(match collections.get(&collection) {
            Some((records, revision)) => {
                Snapshot { records: records.clone(), revision: revision.clone() }
            }
            None => Snapshot { records: Vec::new(), revision: Revision::absent() },
        })
    }

    fn save(
        &self,
        collection: Collection,
        records: &[Value],
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                collection: collection.name().to_owned(),
                message: "writes disabled".to_owned(),
            });
        }

        let mut collections = lock(&self.collections);
        let current = collections
            .get(&collection)
            .map(|(_, revision)| revision.clone())
            .unwrap_or_else(Revision::absent);
        if let Some(expected) = expected {
            if expected != &current {
                return Err(StoreError::Conflict { collection: collection.name().to_owned() });
            }
        }

        let number = self.next_revision.fetch_add(1, Ordering::SeqCst) + 1;
        let revision = Revision(format!("mem-{number}"));
        collections.insert(collection, (records.to_vec(), revision.clone()));
        Ok(revision)
    }
}

struct StoredMessage {
    folder: String,
    message: InboundMessage,
    read: bool,
}

#[derive(Default)]
pub struct InMemoryMailTransport {
    inbox: Mutex<Vec<StoredMessage>>,
    sent: Mutex<Vec<OutboundMail>>,
    refused: Mutex<HashSet<String>>,
}

impl InMemoryMailTransport {
    pub fn deliver(&self, folder: &str, message: InboundMessage) {
        lock(&self.inbox).push(StoredMessage { folder: folder.to_owned(), message, read: false });
    }

    /// Makes `send` fail for this recipient.
    pub fn refuse(&self, address: &str) {
        lock(&self.refused).insert(address.to_owned());
    }

    pub fn sent(&self) -> Vec<OutboundMail> {
        lock(&self.sent).clone()
    }

    pub fn read_refs(&self) -> Vec<String> {
        lock(&self.inbox)
            .iter()
            .filter(|stored| stored.read)
            .map(|stored| stored.message.message_ref.clone())
            .collect()
    }
}

impl MailTransport for InMemoryMailTransport {
    fn fetch_unread(&self, folder: &str) -> Result<Vec<InboundMessage>, MailError> {
        Ok(lock(&self.inbox)
            .iter()
            .filter(|stored| stored.folder == folder && !stored.read)
            .map(|stored| stored.message.clone())
            .collect())
    }

    fn mark_read(&self, message_ref: &str) -> Result<(), MailError> {
        let mut inbox = lock(&self.inbox);
        let stored = inbox
            .iter_mut()
            .find(|stored| stored.message.message_ref == message_ref)
            .ok_or_else(|| MailError::MarkRead {
                message_ref: message_ref.to_owned(),
                message: "unknown message".to_owned(),
            })?;
        stored.read = true;
        Ok(())
    }

    fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        if lock(&self.refused).contains(&mail.to) {
            return Err(MailError::Send { to: mail.to.clone(), message: "recipient refused".to_owned() });
        }
        lock(&self.sent).push(mail.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryArtifactStore {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    fail_archives: AtomicBool,
}

impl InMemoryArtifactStore {
    const TRANSIENT_ROOT: &'static str = "/transient";
    const ARCHIVE_ROOT: &'static str = "/contracts";

    /// Makes every subsequent `archive` fail before anything is copied.
    pub fn fail_archives(&self, fail: bool) {
        self.fail_archives.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, path: &Path) -> bool {
        lock(&self.files).contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.files).is_empty()
    }

    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        lock(&self.files).get(path).cloned()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn write_transient(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        let path = Path::new(Self::TRANSIENT_ROOT).join(file_name);
        lock(&self.files).insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    fn archive(&self, transient: &Path) -> Result<PathBuf, ArtifactError> {
        if self.fail_archives.load(Ordering::SeqCst) {
            return Err(ArtifactError {
                path: Self::ARCHIVE_ROOT.to_owned(),
                message: "archive unavailable".to_owned(),
            });
        }
        let mut files = lock(&self.files);
        let bytes = files.get(transient).cloned().ok_or_else(|| ArtifactError {
            path: transient.display().to_string(),
            message: "no such transient file".to_owned(),
        })?;
        let file_name = transient.file_name().ok_or_else(|| ArtifactError {
            path: transient.display().to_string(),
            message: "path has no file name".to_owned(),
        })?;
        let archived = Path::new(Self::ARCHIVE_ROOT).join(file_name);
        files.insert(archived.clone(), bytes);
        Ok(archived)
    }

    fn discard(&self, path: &Path) {
        lock(&self.files).remove(path);
    }
}
