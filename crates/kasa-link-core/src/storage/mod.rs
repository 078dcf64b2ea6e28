//! On-disk state owned by the hosting process.

pub mod cache;

pub use cache::StartupCache;

/// Default data directory for kasa-link.
///
/// Uses the `directories` crate to find the platform-specific data directory.
pub fn default_data_dir() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "kasa-link", "kasa-link")
        .map(|dirs| dirs.data_dir().to_path_buf())
}
