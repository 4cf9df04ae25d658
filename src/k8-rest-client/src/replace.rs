use std::future::Future;

use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::ClientError;
use crate::K8Request;

impl K8Request {
    /// get-modify-put loop with conflict retry.
    ///
    /// The request must target a single object.  `modify` returns whether
    /// it changed the object; an unchanged object is never PUT.  A 409
    /// conflict refetches and retries, a 404 resolves to `None` unless
    /// `throw_if_missing`.  Dropping the returned future cancels the loop
    /// at its next suspension point
    pub async fn replace<T, F, Fut>(
        &self,
        initial: Option<T>,
        mut modify: F,
        throw_if_missing: bool,
    ) -> Result<Option<T>, ClientError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut current = initial;
        loop {
            let mut object = match current.take() {
                Some(object) => object,
                None => {
                    if throw_if_missing {
                        self.clone().get().fetch_required().await?
                    } else {
                        match self.clone().get().fetch().await? {
                            Some(object) => object,
                            None => return Ok(None),
                        }
                    }
                }
            };

            if !modify(&mut object).await {
                debug!("no changes, skipping put");
                return Ok(Some(object));
            }

            let put = self.clone().put().body_json(&object);
            let mut response = put.execute().await?;
            match response.status_code() {
                StatusCode::CONFLICT => {
                    debug!("conflict on put, refetching");
                    continue;
                }
                StatusCode::NOT_FOUND => {
                    if throw_if_missing {
                        return Err(response.status_error().await.into());
                    }
                    return Ok(None);
                }
                _ if response.is_error() => {
                    return Err(response.status_error().await.into());
                }
                _ => return Ok(Some(response.body_json().await?)),
            }
        }
    }
}
