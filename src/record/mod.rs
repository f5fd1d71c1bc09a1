//! Client-side file records and their precomputed challenge pools.
//!
//! - [`types`]: the typed record and its persisted JSON shape.
//! - [`metadata`]: pluggable persistence for the record map.
//! - [`store`]: the record store handing out precomputed entries at most once.

pub mod metadata;
pub mod store;
pub mod types;

pub use metadata::{JsonFileMetadataStore, MemoryMetadataStore, MetadataStore};
pub use store::RecordStore;
pub use types::{parse_document, render_document, FileRecord, PrecomputedEntry, RecordMap};
