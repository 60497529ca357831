//! Field context for encryption operations.

use std::fmt;

/// Context binding a ciphertext to one field of one collection.
///
/// The context is used as associated data during encryption and as the
/// `info` input of key derivation, so that:
/// - Different collections produce different ciphertexts
/// - Different field paths produce different ciphertexts
/// - A ciphertext cannot be transplanted to another field and still decrypt
///
/// # Example
///
/// ```
/// use kasadb::context::FieldContext;
///
/// let ctx = FieldContext::new("invoiceXml", "ssn");
/// assert_eq!(ctx.to_string(), "invoiceXml|ssn");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldContext {
    collection: String,
    path: String,
}

impl FieldContext {
    /// Creates a new field context.
    ///
    /// # Arguments
    ///
    /// * `collection` - Encrypted collection name
    /// * `path` - Field path within the document
    #[must_use]
    pub fn new(collection: impl Into<String>, path: impl Into<String>) -> Self {
        Self { collection: collection.into(), path: path.into() }
    }

    /// Returns the collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the field path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.collection, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_context_display() {
        let ctx = FieldContext::new("invoiceXml", "ssn");
        assert_eq!(ctx.to_string(), "invoiceXml|ssn");
    }

    #[test]
    fn test_field_context_accessors() {
        let ctx = FieldContext::new("invoiceXml", "xml");
        assert_eq!(ctx.collection(), "invoiceXml");
        assert_eq!(ctx.path(), "xml");
    }
}
