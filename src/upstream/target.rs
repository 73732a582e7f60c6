//! Backend URL template.

use url::Url;

use crate::config::BackendConfig;
use crate::error::ProxyError;
use crate::security::ValidatedIdentifiers;

/// `{scheme}://{host}/{container}/{documentId}/attachment/{attachmentId}`
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    prefix: String,
}

impl UpstreamTarget {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            prefix: format!("{}://{}/{}", config.scheme, config.host, config.container),
        }
    }

    /// Plain substitution; identifiers are already restricted to URL-safe characters.
    pub fn url_string(&self, ids: &ValidatedIdentifiers) -> String {
        format!(
            "{}/{}/attachment/{}",
            self.prefix,
            ids.document_id(),
            ids.attachment_id()
        )
    }

    /// The parsed upstream URL for a pair of validated identifiers.
    pub fn url_for(&self, ids: &ValidatedIdentifiers) -> Result<Url, ProxyError> {
        let raw = self.url_string(ids);
        Url::parse(&raw).map_err(|e| ProxyError::Internal(format!("invalid upstream url: {e}")))
    }
}
