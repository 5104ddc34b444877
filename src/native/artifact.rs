use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::fs;
use uuid::Uuid;

use crate::constants::SOURCE_FILE_EXTENSION;

/// Submitted source written to a uniquely named file in the work dir.
///
/// The file is removed when the value is dropped, so every exit path of an
/// execution (including panics and cancelled futures) releases it.
#[derive(Debug)]
pub struct SourceArtifact {
    path: PathBuf,
}

impl SourceArtifact {
    pub async fn create(dir: &Path, source: &str) -> io::Result<Self> {
        fs::create_dir_all(dir).await?;

        let path = dir.join(format!("{}.{}", Uuid::new_v4(), SOURCE_FILE_EXTENSION));
        // From here on the guard owns the path even if the write fails half way
        let artifact = Self { path };
        fs::write(&artifact.path, source).await?;

        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SourceArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::trace!("Removed source artifact {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove source artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
