//! Batch authorization.
//!
//! One request negotiates transfer links for a whole batch of objects. The
//! server answers per object: actionable links, no actions at all (already
//! satisfied), or an object-level error. Only a failure of the request itself
//! fails the batch.

use std::future::Future;

use crate::data::{Authorization, Direction, ObjectSpec};
use crate::error::Result;

/// Remote negotiation of per-object transfer actions.
pub trait BatchAuthorizer: Send + Sync + 'static {
    /// Authorize `objects` for `direction` in a single round-trip.
    ///
    /// Every requested identifier has an entry in the returned map. A
    /// transport or protocol failure of the request fails with
    /// [`TransferError::Authorization`](crate::TransferError::Authorization).
    fn authorize(
        &self,
        direction: Direction,
        objects: &[ObjectSpec],
    ) -> impl Future<Output = Result<Authorization>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::collections::BTreeMap;

    use lfsync_store::Oid;
    use reqwest::header::{ACCEPT, CONTENT_TYPE};
    use serde::{Deserialize, Serialize};
    use tracing::debug;

    use super::*;
    use crate::data::{Action, ObjectResource, RemoteObjectError};
    use crate::effects::http::LFS_MEDIA_TYPE;
    use crate::error::TransferError;

    const BATCH_PATH: &str = "objects/batch";
    const MISSING_FROM_RESPONSE: u16 = 404;

    #[derive(Debug, Serialize)]
    struct BatchRequest<'a> {
        operation: Direction,
        transfers: [&'static str; 1],
        objects:   &'a [ObjectSpec],
    }

    #[derive(Debug, Deserialize)]
    struct BatchResponse {
        #[serde(default)]
        objects: Vec<BatchObject>,
    }

    #[derive(Debug, Deserialize)]
    struct BatchObject {
        oid:     Oid,
        #[serde(default)]
        size:    u64,
        #[serde(default)]
        actions: BTreeMap<String, Action>,
        error:   Option<RemoteObjectError>,
    }

    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        message: String,
    }

    /// Batch endpoint client speaking the LFS batch JSON protocol.
    #[derive(Debug, Clone)]
    pub struct BatchApi {
        client:   reqwest::Client,
        endpoint: String,
        headers:  Vec<(String, String)>,
    }

    impl BatchApi {
        /// `endpoint` is the LFS server root; requests go to
        /// `{endpoint}/objects/batch`.
        pub fn new(endpoint: impl Into<String>) -> Self {
            Self::with_client(reqwest::Client::new(), endpoint)
        }

        pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
            Self {
                client,
                endpoint: endpoint.into().trim_end_matches('/').to_string(),
                headers: Vec::new(),
            }
        }

        /// Add a header (typically credentials) to every batch request.
        pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
            self.headers.push((key.into(), value.into()));
            self
        }

        fn url(&self) -> String { format!("{}/{}", self.endpoint, BATCH_PATH) }

        async fn send(&self, direction: Direction, objects: &[ObjectSpec]) -> Result<BatchResponse> {
            let body = BatchRequest {
                operation: direction,
                transfers: ["basic"],
                objects,
            };
            let request = self
                .headers
                .iter()
                .fold(self.client.post(self.url()), |request, (key, value)| {
                    request.header(key, value)
                })
                .header(ACCEPT, LFS_MEDIA_TYPE)
                .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
                .json(&body);

            let response = request
                .send()
                .await
                .map_err(|e| TransferError::Authorization(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorBody>(&text)
                    .map(|body| body.message)
                    .unwrap_or(text);
                return Err(TransferError::Authorization(format!("{status}: {message}")));
            }

            response
                .json()
                .await
                .map_err(|e| TransferError::Authorization(format!("malformed batch response: {e}")))
        }
    }

    impl BatchAuthorizer for BatchApi {
        async fn authorize(&self, direction: Direction, objects: &[ObjectSpec]) -> Result<Authorization> {
            debug!(%direction, count = objects.len(), "requesting batch authorization");
            let response = self.send(direction, objects).await?;

            let mut authorization = Authorization::with_capacity(objects.len());
            for object in response.objects {
                let entry = match object.error {
                    Some(error) => Err(error),
                    None => Ok(ObjectResource {
                        oid:     object.oid.clone(),
                        size:    object.size,
                        actions: object.actions,
                    }),
                };
                authorization.insert(object.oid, entry);
            }

            for spec in objects {
                authorization.entry(spec.oid.clone()).or_insert_with(|| {
                    Err(RemoteObjectError {
                        code:    MISSING_FROM_RESPONSE,
                        message: "object missing from batch response".to_string(),
                    })
                });
            }
            Ok(authorization)
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::BatchApi;
