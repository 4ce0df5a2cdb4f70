use crate::services::document_store::DocumentStore;
use crate::services::media_library::MediaLibrary;

/// Shared application state carried by the router: the storage collaborator
/// and the media collaborator.
#[derive(Clone)]
pub struct AppState {
    pub store: DocumentStore,
    pub media: MediaLibrary,
}

impl AppState {
    pub fn new(store: DocumentStore, media: MediaLibrary) -> Self {
        Self { store, media }
    }
}
