//! Image store: the catalog of mountable images and the persisted selection

pub mod catalog;
pub mod mount_state;

pub use catalog::{has_image_extension, ImageCatalog, HIDDEN_PREFIX, IMAGE_EXTENSIONS};
pub use mount_state::MountStateStore;
