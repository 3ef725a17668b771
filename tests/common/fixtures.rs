//! Test cipher, stores and peer helpers.

use docmesh::store::{Cipher, EncryptedRecord, EncryptionKey, MemoryStore, StoreError, StoreResult};
use docmesh::Document;
use std::sync::Arc;

/// Key used by [`seeded_store`].
pub const TEST_KEY: &str = "test-secret";

/// Cipher whose records are `"<key>:<wire json>"`.
///
/// Decryption fails unless the record was sealed with the same key, which is
/// enough to exercise key mismatch and corrupt-record paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedCipher;

impl Cipher for TaggedCipher {
    fn decrypt(&self, record: &EncryptedRecord, key: &EncryptionKey) -> StoreResult<Document> {
        let (tag, body) = record
            .as_str()
            .split_once(':')
            .ok_or_else(|| StoreError("record has no key tag".to_string()))?;
        if tag != key.expose() {
            return Err(StoreError("key mismatch".to_string()));
        }
        let json: serde_json::Value = serde_json::from_str(body).map_err(|e| StoreError(e.to_string()))?;
        Document::from_wire(json).map_err(|e| StoreError(e.to_string()))
    }
}

/// Seal a wire document for [`TaggedCipher`].
pub fn seal(key: &str, doc: &serde_json::Value) -> EncryptedRecord {
    EncryptedRecord::new(format!("{}:{}", key, doc))
}

/// Store with one collection holding `docs` (ids `doc-0`, `doc-1`, ...) sealed with [`TEST_KEY`].
pub fn seeded_store(collection: &str, docs: &[serde_json::Value]) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.create_collection(collection);
    for (i, doc) in docs.iter().enumerate() {
        store.insert_record(collection, &format!("doc-{}", i), seal(TEST_KEY, doc));
    }
    Arc::new(store)
}

pub fn test_key() -> EncryptionKey {
    EncryptionKey::new(TEST_KEY)
}

/// Peer endpoints `http://peer-0:8765` .. `http://peer-{n-1}:8765`.
pub fn peer_urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("http://peer-{}:8765", i)).collect()
}
