use http::header::HeaderValue;
use http::header::AUTHORIZATION;
use hyper::Body;
use hyper::Request;
use tracing::trace;

use crate::ClientError;

/// mutates outbound request headers before they are finalized.
/// implementations may attach bearer tokens, basic auth or signatures
pub trait CredentialProvider: Send + Sync {
    fn apply(&self, request: &mut Request<Body>) -> Result<(), ClientError>;
}

/// no credentials; suitable for proxied or unauthenticated endpoints
#[derive(Debug, Default)]
pub struct Anonymous;

impl CredentialProvider for Anonymous {
    fn apply(&self, _request: &mut Request<Body>) -> Result<(), ClientError> {
        Ok(())
    }
}

/// bearer token auth, the common service-account flow
#[derive(Debug)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialProvider for BearerToken {
    fn apply(&self, request: &mut Request<Body>) -> Result<(), ClientError> {
        trace!("attaching bearer token");
        let full_token = format!("Bearer {}", self.token);
        request
            .headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_str(&full_token)?);
        Ok(())
    }
}

#[cfg(test)]
mod test {

    use hyper::Body;
    use hyper::Request;

    use super::{BearerToken, CredentialProvider};

    #[test]
    fn test_bearer_token() {
        let mut request = Request::new(Body::empty());
        BearerToken::new("secret")
            .apply(&mut request)
            .expect("apply");
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer secret"
        );
    }
}
