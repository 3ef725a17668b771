//! Fuzz target for graph store wire decoding.
//!
//! Sparse `_array` objects carry arbitrary index keys; decoding must never
//! panic or allocate without bound on hostile input.

#![no_main]

use docmesh::Document;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    // Should never panic
    if let Ok(doc) = Document::from_wire(json) {
        // Encoding a decoded document always yields an object
        assert!(doc.to_json().is_object());
    }
});
