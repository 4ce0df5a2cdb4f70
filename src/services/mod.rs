//! Service layer: the storage and media collaborators plus the feed query
//! machinery built on top of them.

pub mod document_store;
pub mod feed;
pub mod media_library;
pub mod pipeline;
