use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Page size used when a request does not name one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// A requested window over a folder's sorted image names.
///
/// Only constructible through [`PageRequest::new`], so both fields are
/// always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    /// Build a request, raising zero values to 1.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    /// 1-based page number.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Parse raw query values. Anything that is not a positive integer falls
    /// back to page 1 and `default_size`.
    pub fn from_query(page: Option<&str>, page_size: Option<&str>, default_size: u32) -> Self {
        let parse = |raw: Option<&str>| {
            raw.and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0)
        };
        Self::new(
            parse(page).unwrap_or(1),
            parse(page_size).unwrap_or(default_size),
        )
    }

    /// Index range of this page within `total` items, clipped to bounds.
    /// Pages past the end yield an empty range.
    pub fn window(&self, total: usize) -> Range<usize> {
        let size = self.page_size as usize;
        let start = (self.page as usize).saturating_sub(1).saturating_mul(size).min(total);
        let end = start.saturating_add(size).min(total);
        start..end
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Pagination metadata returned alongside every image listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_images: usize,
    pub total_pages: usize,
}

impl Pagination {
    /// An empty folder reports zero pages.
    pub fn new(request: PageRequest, total_images: usize) -> Self {
        Self {
            page: request.page,
            page_size: request.page_size,
            total_images,
            total_pages: total_images.div_ceil(request.page_size as usize),
        }
    }

    pub fn has_next(&self) -> bool {
        (self.page as usize) < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Number of images up to and including the current page.
    pub fn showing(&self) -> usize {
        (self.page as usize)
            .saturating_mul(self.page_size as usize)
            .min(self.total_images)
    }
}

/// `GET /api/folders` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderList {
    pub folders: Vec<String>,
}

/// `GET /api/folders/{folderName}` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderPage {
    pub folder_name: String,
    pub images: Vec<String>,
    pub pagination: Pagination,
}
