//! Page text extraction via pdfium.
//!
//! pdfium uses thread-local state and blocks, so the work runs inside
//! `tokio::task::spawn_blocking`. The result is one string per page in page
//! order; pages without a text layer come back as `""` and are skipped by
//! the translation stage.

use crate::error::ExtractError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Read the text layer of every page of `pdf_path`.
pub async fn extract_page_texts(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<Vec<String>, ExtractError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_blocking(&path, password.as_deref()))
        .await
        .map_err(|e| ExtractError::Internal(format!("Text extraction task panicked: {}", e)))?
}

fn extract_blocking(pdf_path: &Path, password: Option<&str>) -> Result<Vec<String>, ExtractError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.to_lowercase().contains("password") {
            if password.is_some() {
                ExtractError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                ExtractError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            ExtractError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail,
            }
        }
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut texts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| ExtractError::TextExtractionFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?
            .all();
        debug!("Page {}: {} chars of text", idx + 1, text.len());
        texts.push(text);
    }

    Ok(texts)
}

fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    let configured = library_path(std::env::var(PDFIUM_LIB_PATH_ENV).ok());
    let bindings = match configured {
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// The library file to bind, given the value of [`PDFIUM_LIB_PATH_ENV`].
/// A directory is completed with the platform's library file name.
fn library_path(var: Option<String>) -> Option<PathBuf> {
    let raw = var.filter(|v| !v.trim().is_empty())?;
    let path = PathBuf::from(raw.trim());
    if path.is_dir() {
        Some(PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&path)))
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_blank_env_uses_system_library() {
        assert_eq!(library_path(None), None);
        assert_eq!(library_path(Some("  ".into())), None);
    }

    #[test]
    fn file_path_is_used_verbatim() {
        assert_eq!(
            library_path(Some("/opt/pdfium/lib/libpdfium.so".into())),
            Some(PathBuf::from("/opt/pdfium/lib/libpdfium.so"))
        );
    }

    #[test]
    fn directory_is_completed_with_library_name() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = library_path(Some(dir.path().to_string_lossy().to_string())).unwrap();
        assert!(resolved.starts_with(dir.path()));
        assert_ne!(resolved, dir.path());
    }
}
