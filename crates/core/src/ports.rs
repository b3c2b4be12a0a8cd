//! Capabilities the desk consumes from the outside world.
//!
//! Every trait here is synchronous: each call blocks until the collaborator
//! answers, and the desk never retries on its behalf.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Transport-specific handle passed back to `mark_read`.
    pub message_ref: String,
    pub body: String,
    pub sender_name: String,
    pub sender_address: String,
    pub received_at: DateTime<Utc>,
    pub subject: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MailError {
    #[error("could not read folder `{folder}`: {message}")]
    Fetch { folder: String, message: String },
    #[error("could not mark `{message_ref}` as read: {message}")]
    MarkRead { message_ref: String, message: String },
    #[error("could not send mail to `{to}`: {message}")]
    Send { to: String, message: String },
}

pub trait MailTransport: Send + Sync {
    fn fetch_unread(&self, folder: &str) -> Result<Vec<InboundMessage>, MailError>;
    fn mark_read(&self, message_ref: &str) -> Result<(), MailError>;
    fn send(&self, mail: &OutboundMail) -> Result<(), MailError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Bids,
    Carriers,
    Offers,
    Contracts,
    CarrierProfiles,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Bids,
        Collection::Carriers,
        Collection::Offers,
        Collection::Contracts,
        Collection::CarrierProfiles,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Bids => "requests",
            Self::Carriers => "carriers",
            Self::Offers => "offers",
            Self::Contracts => "contracts",
            Self::CarrierProfiles => "carrier_profiles",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque token identifying one persisted version of a collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Revision(pub String);

impl Revision {
    pub fn absent() -> Self {
        Self("absent".to_owned())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub records: Vec<Value>,
    pub revision: Revision,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("i/o failure on `{collection}`: {message}")]
    Io { collection: String, message: String },
    #[error("could not decode `{collection}`: {message}")]
    Decode { collection: String, message: String },
    #[error("`{collection}` changed since it was loaded")]
    Conflict { collection: String },
}

/// Whole-collection load/overwrite persistence.
///
/// `save` with `expected: Some(rev)` fails with [`StoreError::Conflict`] when
/// the stored revision differs; `None` overwrites unconditionally.
pub trait RecordStore: Send + Sync {
    fn load(&self, collection: Collection) -> Result<Snapshot, StoreError>;
    fn save(
        &self,
        collection: Collection,
        records: &[Value],
        expected: Option<&Revision>,
    ) -> Result<Revision, StoreError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Loaded<T> {
    pub items: Vec<T>,
    pub revision: Revision,
}

pub fn load_records<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
) -> Result<Loaded<T>, StoreError> {
    let snapshot = store.load(collection)?;
    let items = snapshot
        .records
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|error| StoreError::Decode {
            collection: collection.name().to_owned(),
            message: error.to_string(),
        })?;
    Ok(Loaded { items, revision: snapshot.revision })
}

pub fn save_records<T: Serialize>(
    store: &dyn RecordStore,
    collection: Collection,
    items: &[T],
    expected: Option<&Revision>,
) -> Result<Revision, StoreError> {
    let records = items
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()
        .map_err(|error| StoreError::Decode {
            collection: collection.name().to_owned(),
            message: error.to_string(),
        })?;
    store.save(collection, &records, expected)
}

/// Load, extend and save back against the loaded revision.
pub fn append_records<T: Serialize + DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
    new_items: &[T],
) -> Result<Revision, StoreError> {
    let Loaded { items, revision } = load_records::<Value>(store, collection)?;
    let mut records = items;
    for item in new_items {
        records.push(serde_json::to_value(item).map_err(|error| StoreError::Decode {
            collection: collection.name().to_owned(),
            message: error.to_string(),
        })?);
    }
    store.save(collection, &records, Some(&revision))
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("template `{0}` was not found")]
    TemplateMissing(String),
    #[error("template `{template}` failed to render: {message}")]
    Failed { template: String, message: String },
}

/// Flat string-keyed context handed to the renderer.
pub type RenderContext = std::collections::BTreeMap<String, String>;

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template_ref: &str, context: &RenderContext) -> Result<Vec<u8>, RenderError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("artifact i/o failure at `{path}`: {message}")]
pub struct ArtifactError {
    pub path: String,
    pub message: String,
}

pub trait ArtifactStore: Send + Sync {
    fn write_transient(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError>;
    fn archive(&self, transient: &Path) -> Result<PathBuf, ArtifactError>;
    /// Best-effort removal of a file written by this store.
    fn discard(&self, path: &Path);
}
