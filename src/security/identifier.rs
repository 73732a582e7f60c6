//! Identifier grammar.
//!
//! An identifier is safe for URL construction when it is one or more
//! characters from `[A-Za-z0-9_.-]` and is not made only of dots.

use std::fmt;

use crate::error::ProxyError;
use crate::routing::router::PathMatch;

/// Returns true when `candidate` satisfies the identifier grammar.
pub fn is_valid_identifier(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
        && !candidate.bytes().all(|b| b == b'.')
}

/// A single identifier that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate one identifier segment.
pub fn validate_identifier(candidate: &str) -> Result<Identifier, ProxyError> {
    if is_valid_identifier(candidate) {
        Ok(Identifier(candidate.to_string()))
    } else {
        Err(ProxyError::Validation("identifier contains characters outside [A-Za-z0-9_.-]"))
    }
}

/// Both identifiers of a document request, checked against the grammar.
///
/// The only way to build one is [`ValidatedIdentifiers::validate`], and the
/// upstream dispatcher accepts nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentifiers {
    document_id: Identifier,
    attachment_id: Identifier,
}

impl ValidatedIdentifiers {
    /// Validate both halves of a path match independently.
    pub fn validate(path: &PathMatch) -> Result<Self, ProxyError> {
        Ok(Self {
            document_id: validate_identifier(&path.document_id)?,
            attachment_id: validate_identifier(&path.attachment_id)?,
        })
    }

    pub fn document_id(&self) -> &str {
        self.document_id.as_str()
    }

    pub fn attachment_id(&self) -> &str {
        self.attachment_id.as_str()
    }
}
