//! Attachment manager: the composition buffer's pending attachments.

use std::sync::Arc;

use uuid::Uuid;

use parley_core::types::Attachment;

use crate::classify::{classify, resolve_mime_type};
use crate::error::AttachmentError;
use crate::store::LocatorStore;

/// A platform file-selection result.
#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    /// MIME type reported by the platform, if any.
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileInput {
    pub fn new(name: impl Into<String>, mime_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.map(str::to_string),
            bytes,
        }
    }
}

/// Holds the attachments of a draft that has not been sent yet.
///
/// Order of ingestion is preserved and duplicates are allowed. Every pending
/// attachment's locator is owned by this manager until `take_pending` moves
/// it out.
#[derive(Debug)]
pub struct AttachmentManager {
    store: Arc<LocatorStore>,
    pending: Vec<Attachment>,
}

impl AttachmentManager {
    pub fn new(store: Arc<LocatorStore>) -> Self {
        Self {
            store,
            pending: Vec::new(),
        }
    }

    pub fn store(&self) -> &Arc<LocatorStore> {
        &self.store
    }

    /// Classify each file, allocate its locator, and append it to the buffer.
    ///
    /// Returns the newly created attachments in input order. On a store
    /// failure the files ingested so far in this call are rolled back.
    pub fn ingest(&mut self, files: Vec<FileInput>) -> Result<Vec<Attachment>, AttachmentError> {
        let mut added = Vec::with_capacity(files.len());
        for file in files {
            let kind = classify(file.mime_type.as_deref(), &file.name);
            let mime_type = resolve_mime_type(file.mime_type.as_deref(), &file.name);
            let size = file.bytes.len() as u64;
            let locator = match self.store.allocate(file.bytes) {
                Ok(locator) => locator,
                Err(e) => {
                    self.store.release_all(&added);
                    return Err(e);
                }
            };
            let attachment = Attachment {
                id: Uuid::new_v4(),
                kind,
                name: file.name,
                mime_type,
                locator,
                size_bytes: Some(size),
            };
            tracing::info!(
                attachment_id = %attachment.id,
                kind = %attachment.kind,
                size_bytes = size,
                "Attachment ingested"
            );
            added.push(attachment);
        }
        self.pending.extend(added.iter().cloned());
        Ok(added)
    }

    /// Release and drop a pending attachment. Unknown ids are a no-op.
    pub fn remove(&mut self, attachment_id: Uuid) -> bool {
        let Some(pos) = self.pending.iter().position(|a| a.id == attachment_id) else {
            return false;
        };
        let attachment = self.pending.remove(pos);
        self.store.release(&attachment.locator);
        tracing::debug!(attachment_id = %attachment_id, "Attachment removed from draft");
        true
    }

    pub fn pending(&self) -> &[Attachment] {
        &self.pending
    }

    pub fn get(&self, attachment_id: Uuid) -> Option<&Attachment> {
        self.pending.iter().find(|a| a.id == attachment_id)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Move every pending attachment out of the buffer.
    ///
    /// The caller becomes the owner of the returned locators.
    pub fn take_pending(&mut self) -> Vec<Attachment> {
        std::mem::take(&mut self.pending)
    }

    /// Release every pending attachment.
    pub fn clear(&mut self) {
        let released = self.store.release_all(&self.pending);
        self.pending.clear();
        if released > 0 {
            tracing::debug!(released, "Draft attachments discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::types::AttachmentKind;

    fn manager() -> AttachmentManager {
        AttachmentManager::new(Arc::new(LocatorStore::new()))
    }

    fn png(name: &str) -> FileInput {
        FileInput::new(name, Some("image/png"), vec![0x89, b'P', b'N', b'G'])
    }

    #[test]
    fn test_ingest_classifies_and_preserves_order() {
        let mut m = manager();
        let added = m
            .ingest(vec![
                png("a.png"),
                FileInput::new("notes.md", None, b"# hi".to_vec()),
                FileInput::new("bundle.zip", Some("application/zip"), vec![1, 2]),
            ])
            .unwrap();

        assert_eq!(added.len(), 3);
        assert_eq!(added[0].kind, AttachmentKind::Image);
        assert_eq!(added[1].kind, AttachmentKind::Text);
        assert_eq!(added[2].kind, AttachmentKind::Data);
        assert_eq!(added[0].size_bytes, Some(4));
        assert_eq!(added[2].mime_type, "application/zip");

        let names: Vec<_> = m.pending().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "notes.md", "bundle.zip"]);
        assert_eq!(m.store().live_count(), 3);
    }

    #[test]
    fn test_ingest_allows_duplicates() {
        let mut m = manager();
        m.ingest(vec![png("same.png")]).unwrap();
        m.ingest(vec![png("same.png")]).unwrap();
        assert_eq!(m.len(), 2);
        assert_ne!(m.pending()[0].id, m.pending()[1].id);
        assert_ne!(m.pending()[0].locator, m.pending()[1].locator);
    }

    #[test]
    fn test_ingest_then_remove_restores_buffer() {
        let mut m = manager();
        m.ingest(vec![png("keep.png")]).unwrap();
        let before: Vec<_> = m.pending().to_vec();
        let live_before = m.store().live_count();

        let added = m.ingest(vec![png("drop.png")]).unwrap();
        let locator = added[0].locator;
        assert!(m.remove(added[0].id));

        assert_eq!(m.pending(), before.as_slice());
        assert_eq!(m.store().live_count(), live_before);
        assert!(!m.store().contains(&locator));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut m = manager();
        m.ingest(vec![png("a.png")]).unwrap();
        assert!(!m.remove(Uuid::new_v4()));
        assert_eq!(m.len(), 1);
        assert_eq!(m.store().live_count(), 1);
    }

    #[test]
    fn test_take_pending_transfers_ownership() {
        let mut m = manager();
        m.ingest(vec![png("a.png"), png("b.png")]).unwrap();
        let taken = m.take_pending();
        assert_eq!(taken.len(), 2);
        assert!(m.is_empty());
        // Bytes stay live for the new owner.
        assert_eq!(m.store().live_count(), 2);
        assert!(m.store().read(&taken[0].locator).is_ok());
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut m = manager();
        m.ingest(vec![png("a.png"), png("b.png")]).unwrap();
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.store().live_count(), 0);
    }

    #[test]
    fn test_get_pending_by_id() {
        let mut m = manager();
        let added = m.ingest(vec![png("a.png")]).unwrap();
        assert_eq!(m.get(added[0].id).map(|a| a.name.as_str()), Some("a.png"));
        assert!(m.get(Uuid::new_v4()).is_none());
    }
}
