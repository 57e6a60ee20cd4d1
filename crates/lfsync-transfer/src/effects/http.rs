use std::future::Future;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::data::{Action, ObjectSpec};

/// A boxed stream type for request and response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Media type of the batch and verify endpoints.
pub const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// Raw byte transport against authorized action links.
///
/// Implementations send the action's headers with every request and map
/// non-success statuses to errors. Authorization negotiation is a separate
/// concern, see [`BatchAuthorizer`](crate::BatchAuthorizer).
///
/// # Implementations
///
/// - [`ReqwestClient`]: production implementation using `reqwest`
/// - Mock implementations for testing
pub trait HttpClient: Send + Sync + 'static {
    /// Error type for HTTP operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a streaming GET against a download action.
    fn get(
        &self,
        action: &Action,
    ) -> impl Future<Output = Result<BoxStream<'static, Result<Bytes, Self::Error>>, Self::Error>> + Send;

    /// Stream `body` to an upload action. `size` is the exact body length.
    ///
    /// The body yields an error when the transfer is cancelled or its
    /// authorization lapses; implementations should abort the request then.
    fn put(
        &self,
        action: &Action,
        body: BoxStream<'static, io::Result<Bytes>>,
        size: u64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Tell a verify action that `object` has been uploaded.
    fn verify(
        &self,
        action: &Action,
        object: &ObjectSpec,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};

    /// Production HTTP client implementation using reqwest.
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new() -> Self { Self::default() }

        /// Share an existing connection pool.
        pub fn with_client(client: reqwest::Client) -> Self { Self { client } }

        fn request(&self, method: reqwest::Method, action: &Action) -> reqwest::RequestBuilder {
            action
                .headers
                .iter()
                .fold(self.client.request(method, &action.href), |request, (key, value)| {
                    request.header(key, value)
                })
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn get(
            &self,
            action: &Action,
        ) -> Result<BoxStream<'static, Result<Bytes, Self::Error>>, Self::Error> {
            let response = self
                .request(reqwest::Method::GET, action)
                .send()
                .await?
                .error_for_status()?;
            Ok(Box::pin(response.bytes_stream()))
        }

        async fn put(
            &self,
            action: &Action,
            body: BoxStream<'static, io::Result<Bytes>>,
            size: u64,
        ) -> Result<(), Self::Error> {
            self.request(reqwest::Method::PUT, action)
                .header(CONTENT_LENGTH, size)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(reqwest::Body::wrap_stream(body))
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        }

        async fn verify(&self, action: &Action, object: &ObjectSpec) -> Result<(), Self::Error> {
            self.request(reqwest::Method::POST, action)
                .header(ACCEPT, LFS_MEDIA_TYPE)
                .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
                .json(object)
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::ReqwestClient;
