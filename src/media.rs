//! On-disk storage for uploaded clinic logos.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::form::LogoUpload;

/// Sub-directory of the media root that holds logos.
pub const LOGO_DIR: &str = "logos";

const MAX_FILENAME_LEN: usize = 100;

/// Directory-backed store for logo files.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// Creates a store rooted at `root`. Nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the media root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the logo under `logos/` and returns its path relative to the root.
    pub fn save_logo(&self, upload: &LogoUpload) -> Result<String> {
        let directory = self.root.join(LOGO_DIR);
        fs::create_dir_all(&directory).map_err(|source| Error::DirectoryCreate {
            path: directory.clone(),
            source,
        })?;

        let name = format!(
            "{}_{}",
            Uuid::new_v4().simple(),
            sanitize_filename(&upload.filename)
        );
        let path = directory.join(&name);
        fs::write(&path, &upload.bytes).map_err(|source| Error::Media {
            path: path.clone(),
            source,
        })?;

        debug!("Stored logo ({} bytes) at {}", upload.bytes.len(), path.display());
        Ok(format!("{LOGO_DIR}/{name}"))
    }

    /// Reads a stored file.
    pub fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        fs::read(&path).map_err(|source| Error::Media { path, source })
    }

    /// Deletes a stored file. Missing files are ignored.
    pub fn delete(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed media file {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("Media file {} already gone", path.display());
                Ok(())
            }
            Err(source) => Err(Error::Media { path, source }),
        }
    }

    /// Resolves a relative media path, rejecting anything that leaves the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let candidate = Path::new(relative);
        let escapes = candidate
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if relative.is_empty() || escapes {
            return Err(Error::InvalidMediaPath(relative.to_string()));
        }
        Ok(self.root.join(candidate))
    }
}

/// Strips path separators, `..` sequences and unusual characters from an upload name.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|&c| c != '/' && c != '\\' && c != '\0')
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.replace("..", "");
    let sanitized: String = sanitized.chars().take(MAX_FILENAME_LEN).collect();

    if sanitized.is_empty() {
        "logo".into()
    } else {
        sanitized
    }
}

/// Sniffs the image type from magic bytes.
pub fn detect_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && bytes[..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
        return Some("image/webp");
    }
    None
}
