use crate::error::Error;
use crate::firestore::value::Value;
use crate::firestore::{Document, DocumentPath, DocumentStore, Precondition};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory [`DocumentStore`] for tests.
#[derive(Default)]
pub(crate) struct MemoryStore {
    documents: Mutex<BTreeMap<DocumentPath, Document>>,
    revision: AtomicUsize,
    writes: AtomicUsize,
    pub(crate) fail_writes: bool,
    /// Simulates another writer touching the document right after every read.
    pub(crate) concurrent_writer: bool,
}

impl MemoryStore {
    pub(crate) fn insert(&self, path: &DocumentPath, fields: BTreeMap<String, Value>) {
        let update_time = self.next_update_time();
        self.documents.lock().unwrap().insert(
            path.clone(),
            Document {
                name: path.to_string(),
                fields,
                create_time: Some(update_time.clone()),
                update_time: Some(update_time),
            },
        );
    }

    pub(crate) fn document(&self, path: &DocumentPath) -> Option<Document> {
        self.documents.lock().unwrap().get(path).cloned()
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn next_update_time(&self) -> String {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst);
        format!("2024-05-01T10:00:00.{revision:06}Z")
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, Error> {
        let document = self.document(path);
        if self.concurrent_writer && document.is_some() {
            let update_time = self.next_update_time();
            if let Some(it) = self.documents.lock().unwrap().get_mut(path) {
                it.update_time = Some(update_time);
            }
        }
        Ok(document)
    }

    async fn update(
        &self,
        path: &DocumentPath,
        field: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<Document, Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(Error::Status {
                status: 503,
                code: "UNAVAILABLE".to_string(),
                message: "The service is currently unavailable.".to_string(),
            });
        }
        let update_time = self.next_update_time();
        let mut documents = self.documents.lock().unwrap();
        let document = documents.get_mut(path).ok_or_else(|| Error::Status {
            status: 404,
            code: "NOT_FOUND".to_string(),
            message: format!("No document to update: {path}"),
        })?;
        if let Precondition::UpdateTime(expected) = precondition {
            if document.update_time.as_ref() != Some(&expected) {
                return Err(Error::Conflict(path.to_string()));
            }
        }
        document.fields.insert(field.to_string(), value);
        document.update_time = Some(update_time);
        Ok(document.clone())
    }
}
