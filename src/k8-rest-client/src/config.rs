use std::sync::Arc;

use http::Uri;

use crate::credentials::Anonymous;
use crate::ClientError;
use crate::CredentialProvider;

/// cluster endpoint plus credentials, supplied once at construction
#[derive(Clone)]
pub struct ClusterConfig {
    base: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl ClusterConfig {
    /// `base_uri` must carry a scheme and authority; a trailing slash is
    /// trimmed so path joins always use exactly one separator
    pub fn new(base_uri: impl AsRef<str>) -> Result<Self, ClientError> {
        let raw = base_uri.as_ref();
        let uri: Uri = raw.parse()?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ClientError::Config(format!(
                "base uri '{raw}' must be absolute"
            )));
        }

        Ok(Self {
            base: raw.trim_end_matches('/').to_owned(),
            credentials: Arc::new(Anonymous),
        })
    }

    pub fn with_credentials(
        mut self,
        credentials: impl CredentialProvider + 'static,
    ) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn credentials(&self) -> Arc<dyn CredentialProvider> {
        self.credentials.clone()
    }
}

#[cfg(test)]
mod test {

    use super::ClusterConfig;

    #[test]
    fn test_trailing_slash_trimmed() {
        let config = ClusterConfig::new("https://k.example/").expect("config");
        assert_eq!(config.base(), "https://k.example");
    }

    #[test]
    fn test_relative_base_rejected() {
        assert!(ClusterConfig::new("/not/absolute").is_err());
    }
}
