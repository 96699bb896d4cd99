//! File-system backed gallery catalog.
//!
//! Folders are the immediate subdirectories of a configured root. The images
//! of a folder are the files directly inside it whose extension is one of
//! [`ImageKind`]'s formats. Enumeration runs on the blocking pool so the
//! async runtime never stalls on a slow disk.

use std::cmp::Ordering;
use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::task;
use tracing::{debug, trace, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::CatalogError;
use crate::models::{FolderPage, ImageKind, PageRequest, Pagination};

/// Configuration for the folder scanner.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Whether symlinked folders and images are followed.
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
        }
    }
}

/// An opened image, ready to be streamed.
#[derive(Debug)]
pub struct ImageFile {
    pub file: tokio::fs::File,
    /// Size in bytes at open time.
    pub len: u64,
    pub content_type: &'static str,
}

/// Read-only view over a directory of image folders.
#[derive(Debug, Clone)]
pub struct FolderScanner {
    root: PathBuf,
    config: ScanConfig,
}

impl FolderScanner {
    /// Creates a scanner over `root` with default configuration.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, ScanConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: ScanConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all folders under the root, in gallery order.
    pub async fn list_folders(&self) -> Result<Vec<String>, CatalogError> {
        let root = self.root.clone();
        let config = self.config.clone();
        task::spawn_blocking(move || Self::discover_folders(&root, &config)).await?
    }

    /// One page of a folder's image names plus pagination metadata.
    ///
    /// A page past the end is not an error: it yields no names.
    pub async fn list_images(
        &self,
        folder: &str,
        request: PageRequest,
    ) -> Result<FolderPage, CatalogError> {
        let dir = self.resolve_folder(folder)?;
        let config = self.config.clone();
        let names = task::spawn_blocking(move || Self::discover_images(&dir, &config)).await??;

        let pagination = Pagination::new(request, names.len());
        let images = names[request.window(names.len())].to_vec();
        debug!(
            folder,
            page = request.page(),
            page_size = request.page_size(),
            total = pagination.total_images,
            returned = images.len(),
            "Listed folder page"
        );

        Ok(FolderPage {
            folder_name: folder.to_string(),
            images,
            pagination,
        })
    }

    /// Opens one image of a folder for streaming.
    ///
    /// Only files the listing would show can be fetched; anything else is
    /// reported as not found.
    pub async fn open_image(&self, folder: &str, image: &str) -> Result<ImageFile, CatalogError> {
        let not_found = || CatalogError::ImageNotFound {
            folder: folder.to_string(),
            image: image.to_string(),
        };

        let dir = self.resolve_folder(folder)?;
        if !is_plain_component(image) {
            return Err(not_found());
        }
        let kind = ImageKind::from_path(Path::new(image)).ok_or_else(not_found)?;
        let path = dir.join(image);

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(source) => return Err(CatalogError::Read { path, source }),
        };
        let meta = match file.metadata().await {
            Ok(meta) => meta,
            Err(source) => return Err(CatalogError::Read { path, source }),
        };
        if !meta.is_file() {
            return Err(not_found());
        }
        trace!(folder, image, len = meta.len(), "Opened image");

        Ok(ImageFile {
            file,
            len: meta.len(),
            content_type: kind.mime_type(),
        })
    }

    /// Maps a folder name to its directory, rejecting anything that is not a
    /// direct child of the root.
    fn resolve_folder(&self, folder: &str) -> Result<PathBuf, CatalogError> {
        if !is_plain_component(folder) {
            return Err(CatalogError::FolderNotFound(folder.to_string()));
        }
        let dir = self.root.join(folder);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(CatalogError::FolderNotFound(folder.to_string()))
        }
    }

    fn discover_folders(root: &Path, config: &ScanConfig) -> Result<Vec<String>, CatalogError> {
        let mut names: Vec<String> = Self::children(root, config)?
            .into_iter()
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| entry_name(&entry))
            .collect();
        names.sort_by(|a, b| gallery_order(a, b));
        debug!(root = ?root, count = names.len(), "Discovered folders");
        Ok(names)
    }

    fn discover_images(dir: &Path, config: &ScanConfig) -> Result<Vec<String>, CatalogError> {
        let mut names: Vec<String> = Self::children(dir, config)?
            .into_iter()
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| ImageKind::from_path(entry.path()).is_some())
            .filter_map(|entry| entry_name(&entry))
            .collect();
        names.sort_by(|a, b| gallery_order(a, b));
        Ok(names)
    }

    /// Immediate children of `dir`. Failing to open `dir` itself is an error;
    /// unreadable children are skipped.
    fn children(dir: &Path, config: &ScanConfig) -> Result<Vec<DirEntry>, CatalogError> {
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(config.follow_symlinks);

        let mut entries = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e) if e.depth() == 0 => {
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
                    return Err(CatalogError::Enumerate {
                        path: dir.to_path_buf(),
                        source,
                    });
                }
                Err(e) => warn!("Skipping unreadable entry in {:?}: {}", dir, e),
            }
        }
        Ok(entries)
    }
}

/// Case-folded comparison with a byte-wise tie-break, so the order is total.
pub fn gallery_order(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn entry_name(entry: &DirEntry) -> Option<String> {
    match entry.file_name().to_str() {
        Some(name) => Some(name.to_string()),
        None => {
            warn!("Skipping non UTF-8 name {:?}", entry.path());
            None
        }
    }
}

/// True if `name` is exactly one normal path component (no separators,
/// no `.` or `..`, not empty).
fn is_plain_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}
