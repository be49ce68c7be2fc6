use anyhow::Result;
use rand::{Rng, thread_rng};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Temporary directory for browser user data, deleted on drop.
#[derive(Debug)]
pub(crate) struct CustomTempDir {
    path: PathBuf,
}

impl CustomTempDir {
    /// Creates a new temporary directory with timestamp and random suffix.
    pub(crate) fn new(base: PathBuf, prefix: &str) -> Result<Self> {
        std::fs::create_dir_all(&base)?;
        let name = format!(
            "{}_{}_{}",
            prefix,
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            thread_rng()
                .sample_iter(&rand::distributions::Alphanumeric)
                .take(6)
                .map(char::from)
                .collect::<String>()
        );
        let path = base.join(name);
        std::fs::create_dir(&path)?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CustomTempDir {
    /// Attempts to delete the temporary directory, retrying while the browser releases its files.
    fn drop(&mut self) {
        for _ in 0..3 {
            if std::fs::remove_dir_all(&self.path).is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            log::warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}
