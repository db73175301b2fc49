//! Attachment extraction.

use std::path::{Path, PathBuf};

use mailhook_mime::{Part, decode_header};

use crate::error::{Error, Result};

/// Saves attachment parts whose filename has an accepted extension.
#[derive(Debug, Clone)]
pub struct AttachmentExtractor {
    download_dir: PathBuf,
    extensions: Vec<String>,
}

impl AttachmentExtractor {
    /// Creates an extractor writing into `download_dir`.
    ///
    /// `extensions` must already be normalized (lowercase, leading dot), see
    /// [`crate::config::normalize_extensions`].
    #[must_use]
    pub fn new(download_dir: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            download_dir: download_dir.into(),
            extensions,
        }
    }

    /// Directory attachments are written to.
    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Returns true if the filename ends with an accepted extension,
    /// ignoring case.
    #[must_use]
    pub fn accepts(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }

    /// Writes the part's decoded payload if its filename is accepted.
    ///
    /// Returns the written path, or `None` when the part has no filename or
    /// its extension is not accepted. An existing file with the same name is
    /// overwritten.
    ///
    /// # Errors
    ///
    /// - [`Error::Decode`] if the filename uses an unknown charset.
    /// - [`Error::AttachmentWrite`] if the file cannot be written.
    pub async fn save(&self, part: &Part) -> Result<Option<PathBuf>> {
        let Some(raw_name) = part.filename() else {
            return Ok(None);
        };

        let filename = decode_header(Some(&raw_name)).map_err(Error::Decode)?;
        let Some(name) = file_name_component(&filename) else {
            return Ok(None);
        };

        if !self.accepts(name) {
            tracing::debug!(filename = name, "attachment skipped");
            return Ok(None);
        }

        let path = self.download_dir.join(name);
        let payload = part.decode_body();
        tokio::fs::write(&path, &payload)
            .await
            .map_err(|source| Error::AttachmentWrite {
                path: path.clone(),
                source,
            })?;

        tracing::info!(path = %path.display(), bytes = payload.len(), "attachment saved");
        Ok(Some(path))
    }
}

/// Last component of a filename that may carry `/` or `\` separators.
fn file_name_component(filename: &str) -> Option<&str> {
    filename
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use mailhook_mime::Headers;
    use proptest::prelude::*;

    use super::*;
    use crate::config::normalize_extensions;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mailhook-attachment-{name}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn extractor(dir: &Path) -> AttachmentExtractor {
        AttachmentExtractor::new(dir, normalize_extensions([".pdf", ".zip"]))
    }

    fn part(disposition: &str, encoding: Option<&str>, body: &[u8]) -> Part {
        let mut headers = Headers::new();
        headers.add("Content-Type", "application/octet-stream");
        headers.add("Content-Disposition", disposition);
        if let Some(encoding) = encoding {
            headers.add("Content-Transfer-Encoding", encoding);
        }
        Part::new(headers, body.to_vec())
    }

    #[tokio::test]
    async fn test_saves_decoded_payload() {
        let dir = scratch_dir("decoded");
        let part = part(
            "attachment; filename=\"Report.PDF\"",
            Some("base64"),
            b"JVBERi0xLjQK",
        );

        let path = extractor(&dir).save(&part).await.unwrap().unwrap();
        assert_eq!(path, dir.join("Report.PDF"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4\n");
    }

    #[tokio::test]
    async fn test_decodes_encoded_filename() {
        let dir = scratch_dir("encoded");
        let part = part(
            "attachment; filename=\"=?utf-8?B?0KHRh9C10YIucGRm?=\"",
            None,
            b"data",
        );

        let path = extractor(&dir).save(&part).await.unwrap().unwrap();
        assert_eq!(path.file_name().unwrap(), "Счет.pdf");
    }

    #[tokio::test]
    async fn test_skips_unaccepted_and_unnamed() {
        let dir = scratch_dir("skipped");
        let extractor = extractor(&dir);

        let image = part("attachment; filename=photo.jpg", None, b"jpg");
        assert!(extractor.save(&image).await.unwrap().is_none());

        let unnamed = part("inline", None, b"text");
        assert!(extractor.save(&unnamed).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_strips_directories_from_filename() {
        let dir = scratch_dir("traversal");
        let part = part("attachment; filename=\"../../etc/evil.zip\"", None, b"zip");

        let path = extractor(&dir).save(&part).await.unwrap().unwrap();
        assert_eq!(path, dir.join("evil.zip"));
    }

    #[tokio::test]
    async fn test_unknown_filename_charset() {
        let dir = scratch_dir("charset");
        let part = part(
            "attachment; filename=\"=?x-klingon?B?cWFwbGE=?=.pdf\"",
            None,
            b"data",
        );

        let err = extractor(&dir).save(&part).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_write_failure() {
        let dir = scratch_dir("missing").join("not-created");
        let part = part("attachment; filename=a.pdf", None, b"data");

        let err = extractor(&dir).save(&part).await.unwrap_err();
        assert!(matches!(err, Error::AttachmentWrite { ref path, .. } if path == &dir.join("a.pdf")));
    }

    proptest! {
        #[test]
        fn prop_accepts_any_case(stem in "[a-zA-Z0-9_]{1,12}", upper in any::<bool>()) {
            let extractor = AttachmentExtractor::new("unused", normalize_extensions(["pdf"]));
            let ext = if upper { ".PDF" } else { ".pdf" };
            let accepted = format!("{stem}{ext}");
            let rejected = format!("{stem}.txt");
            prop_assert!(extractor.accepts(&accepted));
            prop_assert!(!extractor.accepts(&rejected));
        }
    }
}
