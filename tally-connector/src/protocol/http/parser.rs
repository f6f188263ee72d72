use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::error;

use crate::error::SourceError;

/// Utilised by a [`RestClient`](super::rest::client::RestClient) to deserialise
/// [`RestRequest::Response`](super::rest::request::RestRequest::Response), and upon failure
/// parses API errors returned from the server.
pub trait HttpParser {
    type ApiError: DeserializeOwned;
    type OutputError: From<SourceError>;

    /// Attempt to parse a [`StatusCode`] & bytes payload into a deserialisable `Response`.
    fn parse<Response>(&self, status: StatusCode, payload: &[u8]) -> Result<Response, Self::OutputError>
    where
        Response: DeserializeOwned,
    {
        let parse_ok_error = match serde_json::from_slice::<Response>(payload) {
            Ok(response) => return Ok(response),
            Err(serde_error) => serde_error,
        };

        let parse_api_error_error = match serde_json::from_slice::<Self::ApiError>(payload) {
            Ok(api_error) => return Err(self.parse_api_error(status, api_error)),
            Err(serde_error) => serde_error,
        };

        error!(
            status_code = ?status,
            ?parse_ok_error,
            ?parse_api_error_error,
            response_body = %String::from_utf8_lossy(payload),
            "error deserializing HTTP response"
        );

        Err(Self::OutputError::from(SourceError::DeserialisingJson {
            error: parse_ok_error,
            payload: String::from_utf8_lossy(payload).into_owned(),
        }))
    }

    /// If [`parse`](Self::parse) fails, attempt to parse the payload into an `ApiError`.
    fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> Self::OutputError;
}
