/// Build command handler
pub mod build;

/// Version command handler
pub mod version;
