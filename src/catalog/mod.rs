//! Server-side gallery catalog.
//!
//! - `FolderScanner` - Enumerates folders and pages through their images

pub mod folder_scanner;

pub use folder_scanner::{FolderScanner, ImageFile, ScanConfig};
