//! Directory-backed mailbox.
//!
//! ```text
//! <root>/<folder>/new/*.eml   unread
//! <root>/<folder>/cur/*.eml   read
//! <root>/outbox/<id>.eml      sent, attachments copied to <root>/outbox/<id>/
//! ```
//!
//! A message reference is `<folder>/<file name>`.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use freightq_core::clock::Clock;
use freightq_core::ports::{InboundMessage, MailError, MailTransport, OutboundMail};

use crate::message::{compose_eml, parse_eml};

const UNREAD_DIR: &str = "new";
const READ_DIR: &str = "cur";
pub const OUTBOX_DIR: &str = "outbox";

pub struct SpoolMailTransport {
    root: PathBuf,
    from_address: String,
    clock: Arc<dyn Clock>,
}

impl SpoolMailTransport {
    pub fn new(root: impl Into<PathBuf>, from_address: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self { root: root.into(), from_address: from_address.into(), clock }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn outbox(&self) -> PathBuf {
        self.root.join(OUTBOX_DIR)
    }

    /// Drops a raw message into `folder` as unread. Returns its reference.
    pub fn deliver(&self, folder: &str, raw: &[u8]) -> Result<String, MailError> {
        let fetch_error = |message: String| MailError::Fetch { folder: folder.to_owned(), message };
        let unread = self.folder_dir(folder).map_err(fetch_error)?.join(UNREAD_DIR);
        fs::create_dir_all(&unread).map_err(|error| fetch_error(error.to_string()))?;
        let file_name = format!("{}-{}.eml", self.clock.now().format("%Y%m%d%H%M%S"), Uuid::new_v4());
        fs::write(unread.join(&file_name), raw).map_err(|error| fetch_error(error.to_string()))?;
        Ok(format!("{folder}/{file_name}"))
    }

    /// Folder names are single relative path segments.
    fn folder_dir(&self, folder: &str) -> Result<PathBuf, String> {
        let mut components = Path::new(folder).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if folder != OUTBOX_DIR => Ok(self.root.join(name)),
            _ => Err(format!("`{folder}` is not a mailbox folder")),
        }
    }

    fn split_ref(&self, message_ref: &str) -> Result<(PathBuf, String), MailError> {
        let invalid = |message: &str| MailError::MarkRead {
            message_ref: message_ref.to_owned(),
            message: message.to_owned(),
        };
        let (folder, file_name) = message_ref.rsplit_once('/').ok_or_else(|| invalid("malformed reference"))?;
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return Err(invalid("malformed reference"));
        }
        let dir = self.folder_dir(folder).map_err(|message| invalid(&message))?;
        Ok((dir, file_name.to_owned()))
    }
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path).and_then(|metadata| metadata.modified()).ok().map(DateTime::<Utc>::from)
}

impl MailTransport for SpoolMailTransport {
    fn fetch_unread(&self, folder: &str) -> Result<Vec<InboundMessage>, MailError> {
        let fetch_error = |message: String| MailError::Fetch { folder: folder.to_owned(), message };
        let folder_dir = self.folder_dir(folder).map_err(fetch_error)?;
        if !folder_dir.is_dir() {
            return Err(fetch_error(format!("folder `{}` does not exist", folder_dir.display())));
        }

        let unread = folder_dir.join(UNREAD_DIR);
        let entries = match fs::read_dir(&unread) {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(fetch_error(error.to_string())),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|extension| extension == "eml"))
            .collect();
        paths.sort();

        let mut messages = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let message_ref = format!("{folder}/{file_name}");
            let raw = match fs::read(&path) {
                Ok(raw) => raw,
                Err(error) => {
                    warn!(event_name = "mail.read_failed", message_ref = %message_ref, error = %error, "spooled message unreadable");
                    continue;
                }
            };
            let fallback = modified_at(&path).unwrap_or_else(|| self.clock.now());
            match parse_eml(&message_ref, &raw, fallback) {
                Ok(message) => messages.push(message),
                Err(error) => warn!(
                    event_name = "mail.parse_failed",
                    message_ref = %message_ref,
                    error = %error,
                    "spooled message skipped"
                ),
            }
        }

        info!(event_name = "mail.fetched", folder = %folder, count = messages.len(), "unread messages fetched");
        Ok(messages)
    }

    fn mark_read(&self, message_ref: &str) -> Result<(), MailError> {
        let (folder_dir, file_name) = self.split_ref(message_ref)?;
        let mark_error = |error: std::io::Error| MailError::MarkRead {
            message_ref: message_ref.to_owned(),
            message: error.to_string(),
        };
        let read_dir = folder_dir.join(READ_DIR);
        fs::create_dir_all(&read_dir).map_err(mark_error)?;
        fs::rename(folder_dir.join(UNREAD_DIR).join(&file_name), read_dir.join(&file_name))
            .map_err(mark_error)
    }

    fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        let send_error = |message: String| MailError::Send { to: mail.to.clone(), message };
        let now = self.clock.now();
        let id = format!("{}-{}", now.format("%Y%m%d%H%M%S"), Uuid::new_v4());
        let outbox = self.outbox();
        fs::create_dir_all(&outbox).map_err(|error| send_error(error.to_string()))?;

        let mut attachment_names = Vec::with_capacity(mail.attachments.len());
        if !mail.attachments.is_empty() {
            let attachment_dir = outbox.join(&id);
            fs::create_dir_all(&attachment_dir).map_err(|error| send_error(error.to_string()))?;
            for attachment in &mail.attachments {
                let name = attachment
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or_else(|| send_error(format!("attachment `{}` has no file name", attachment.display())))?;
                if let Err(error) = fs::copy(attachment, attachment_dir.join(&name)) {
                    let _ = fs::remove_dir_all(&attachment_dir);
                    return Err(send_error(format!("attachment `{}`: {error}", attachment.display())));
                }
                attachment_names.push(name);
            }
        }

        let eml = compose_eml(mail, &self.from_address, &format!("{id}@freightq"), now, &attachment_names);
        fs::write(outbox.join(format!("{id}.eml")), eml).map_err(|error| send_error(error.to_string()))?;

        info!(
            event_name = "mail.sent",
            to = %mail.to,
            subject = %mail.subject,
            attachments = attachment_names.len(),
            "message spooled to outbox"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use freightq_core::clock::FixedClock;
    use freightq_core::ports::{MailError, MailTransport};

    use super::SpoolMailTransport;

    fn transport(root: &std::path::Path) -> SpoolMailTransport {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()));
        SpoolMailTransport::new(root, "desk@freightq.test", clock)
    }

    #[test]
    fn folder_names_cannot_escape_the_spool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spool = transport(dir.path());

        for folder in ["../etc", "a/b", "outbox", ""] {
            assert!(matches!(spool.fetch_unread(folder), Err(MailError::Fetch { .. })), "{folder}");
        }
        assert!(matches!(spool.mark_read("Inbox/../x.eml"), Err(MailError::MarkRead { .. })));
    }

    #[test]
    fn missing_folder_is_a_fetch_error_but_empty_folder_is_not() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spool = transport(dir.path());

        assert!(spool.fetch_unread("Inbox").is_err());
        fs::create_dir_all(dir.path().join("Inbox")).expect("folder");
        assert!(spool.fetch_unread("Inbox").expect("empty").is_empty());
    }

    #[test]
    fn unparsable_messages_are_skipped_and_stay_unread() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spool = transport(dir.path());
        spool
            .deliver("Inbox", b"From: a@b.test\r\nContent-Type: text/html\r\n\r\n<p>x</p>")
            .expect("delivered");

        assert!(spool.fetch_unread("Inbox").expect("fetched").is_empty());
        assert_eq!(fs::read_dir(dir.path().join("Inbox/new")).expect("dir").count(), 1);
    }
}
