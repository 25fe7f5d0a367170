use std::io;
use std::path::{Path, PathBuf};

/// Domain interface for the filesystem-like backend sessions live on.
///
/// Implementations must be safe to share across request threads.
pub trait SessionStorage: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Recursively removes `path`. A missing path is not an error.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Lists the direct children of `path`.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    fn exists(&self, path: &Path) -> bool;
}
