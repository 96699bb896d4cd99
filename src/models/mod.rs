pub mod image_kind;
pub mod page;

pub use image_kind::ImageKind;
pub use page::{FolderList, FolderPage, PageRequest, Pagination};
