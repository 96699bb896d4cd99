//! Client half of the gallery.
//!
//! - `CredentialStore` - Endpoint and secret, written through to a `KeyValueStore`
//! - `TransportClient` - Authenticated listing calls and self-authenticating image URLs
//! - `FolderCache` - The three most recently written folders
//! - `RenderScheduler` - Viewport-driven, fire-once image loading
//! - `ImageLoader` - Concurrent downloads reported over a channel
//! - `GallerySession` - Current folder and page with stale-response protection

pub mod credentials;
pub mod folder_cache;
pub mod image_loader;
pub mod render;
pub mod session;
pub mod settings_store;
pub mod transport;

pub use credentials::{CredentialStore, Credentials};
pub use folder_cache::{CacheEntry, FolderCache, FOLDER_CACHE_CAPACITY};
pub use image_loader::{DecodedImage, ImageLoader, LoadOutcome};
pub use render::{
    GridLayout, LoadRequest, Rect, RenderScheduler, RenderSlot, ScrollViewport, SlotState,
    ViewportProbe,
};
pub use session::{ErrorBanner, FolderView, GallerySession, LoadTicket, SelectedImage};
pub use settings_store::{KeyValueStore, MemorySettingsStore, SqliteSettingsStore};
pub use transport::TransportClient;
