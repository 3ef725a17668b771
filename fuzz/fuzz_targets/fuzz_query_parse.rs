//! Fuzz target for query, sort and projection parsing.
//!
//! Parsing must never panic, and a query that parses must be safe to
//! evaluate against any document.

#![no_main]

use docmesh::query::{matches, Projection, Query, SortSpec};
use docmesh::Document;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, &str)| {
    let (query_text, doc_text) = data;

    let Ok(json) = serde_json::from_str::<serde_json::Value>(query_text) else {
        return;
    };

    // Should never panic
    let _ = SortSpec::from_json(&json);
    let _ = Projection::from_json(&json);

    let Ok(query) = Query::from_json(&json) else {
        return;
    };

    let doc = serde_json::from_str::<serde_json::Value>(doc_text)
        .ok()
        .and_then(|v| Document::from_json(&v).ok())
        .unwrap_or_default();
    let _ = matches(&doc, &query);
});
