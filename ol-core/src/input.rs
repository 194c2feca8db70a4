//! Input assembly: file classification and prompt construction.
//!
//! CLI file arguments are split into image paths (attached to the request as
//! base64 payloads) and text paths (injected into the prompt as delimited
//! sections). Binary non-image files are skipped with a warning; unsupported
//! image formats fail fast before any network call.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Raster formats Ollama accepts.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

/// Image formats we recognize but Ollama rejects.
const UNSUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["webp", "tiff", "svg"];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error(
        ".{ext} image format is not supported by Ollama: {path}. \
         Please convert the image to a supported format (bmp, gif, jpeg, jpg, png)."
    )]
    UnsupportedImage { path: PathBuf, ext: String },

    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, InputError>;

/// File arguments split by how they enter the request.
#[derive(Debug, Default)]
pub struct ClassifiedFiles {
    pub images: Vec<PathBuf>,
    pub texts: Vec<PathBuf>,
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_user(path: &Path) -> PathBuf {
    let Some(s) = path.to_str() else {
        return path.to_path_buf();
    };
    if s == "~" || s.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if s.len() > 2 {
                expanded.push(&s[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

/// Whether the path names an image, by extension.
///
/// A recognized-but-unsupported format is an error so the user is told to
/// convert before any network call is made.
pub fn is_image_file(path: &Path) -> Result<bool> {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_lowercase(),
        None => return Ok(false),
    };
    if UNSUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(InputError::UnsupportedImage {
            path: path.to_path_buf(),
            ext,
        });
    }
    Ok(SUPPORTED_IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Sniff the first KiB for invalid UTF-8. A truncated trailing sequence still
/// counts as text. Unreadable files are reported as non-binary and fail later
/// with a proper error.
fn is_binary_file(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut chunk = [0u8; 1024];
    let Ok(n) = file.read(&mut chunk) else {
        return false;
    };
    match std::str::from_utf8(&chunk[..n]) {
        Ok(_) => false,
        Err(e) => e.error_len().is_some(),
    }
}

/// Split file arguments into images and injectable text files, in input order.
///
/// Missing files and unsupported image formats are fatal; binary non-image
/// files are warned and skipped.
pub fn classify_files(paths: &[PathBuf]) -> Result<ClassifiedFiles> {
    let mut classified = ClassifiedFiles::default();
    for path in paths {
        let path = expand_user(path);
        if !path.exists() {
            return Err(InputError::NotFound(path));
        }
        if is_image_file(&path)? {
            debug!(path = %path.display(), "added image file");
            classified.images.push(path);
        } else if is_binary_file(&path) {
            warn!(path = %path.display(), "skipping binary file");
        } else {
            debug!(path = %path.display(), "added text file");
            classified.texts.push(path);
        }
    }
    Ok(classified)
}

/// Append each text file to the base prompt as a delimited section.
pub fn assemble_prompt(base: &str, text_files: &[PathBuf]) -> Result<String> {
    let mut prompt = base.to_string();
    for path in text_files {
        let contents = fs::read_to_string(path).map_err(|source| InputError::Read {
            path: path.clone(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        prompt.push_str(&format!("\n\nContent of {name}:\n{contents}"));
    }
    Ok(prompt)
}

/// Read an image file and base64-encode its bytes for the wire.
pub fn encode_image(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BASE64.encode(bytes))
}
