//! The event handed to handlers.

use std::path::PathBuf;

use serde::Serialize;

/// A decoded email.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmailRecord {
    /// Decoded Subject, empty if absent.
    pub title: String,
    /// Decoded From, empty if absent.
    pub sender: String,
    /// Best-effort plain text body.
    pub body: String,
    /// Saved attachments in the order their parts appear in the message.
    pub attachment_paths: Vec<PathBuf>,
}

impl EmailRecord {
    /// Returns true if any attachment was saved.
    #[must_use]
    pub fn has_attachments(&self) -> bool {
        !self.attachment_paths.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_flat_json() {
        let record = EmailRecord {
            title: "Invoice".to_string(),
            sender: "Иван <ivan@example.com>".to_string(),
            body: "see attached".to_string(),
            attachment_paths: vec![PathBuf::from("downloads/invoice.pdf")],
        };

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "Invoice");
        assert_eq!(json["sender"], "Иван <ivan@example.com>");
        assert_eq!(json["attachment_paths"][0], "downloads/invoice.pdf");
        assert!(record.has_attachments());
    }
}
