use crate::error::SourceError;

use super::rest::request::RestRequest;

/// [`RestRequest`] build strategy for the API being interacted with.
///
/// An API that requires authenticated [`RestRequest`]s will likely utilise the configurable
/// [`RequestSigner`](super::private::RequestSigner) to sign the requests before building.
pub trait HttpRequestBuilder {
    /// Use a [`RestRequest`] and [`reqwest::RequestBuilder`] to construct a [`reqwest::Request`]
    /// that is ready for executing. Signing and any extra headers happen here.
    fn build<Request>(
        &self,
        request: Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SourceError>
    where
        Request: RestRequest;
}
