use std::borrow::Cow;

use reqwest::StatusCode;
use tracing::debug;

use crate::{
    error::SourceError,
    protocol::http::{builder::HttpRequestBuilder, parser::HttpParser},
};

use super::request::RestRequest;

/// Configurable REST client capable of executing signed [`RestRequest`]s. Use this when
/// integrating APIs that require Http in order to interact with resources.
#[derive(Debug)]
pub struct RestClient<'a, Strategy, Parser> {
    /// HTTP [`reqwest::Client`] for executing signed [`reqwest::Request`]s.
    pub http_client: reqwest::Client,

    /// Base Url of the API being interacted with.
    pub base_url: Cow<'a, str>,

    /// [`RestRequest`] build strategy for the API being interacted with that implements
    /// [`HttpRequestBuilder`].
    pub strategy: Strategy,

    /// [`HttpParser`] that deserialises [`RestRequest::Response`]s, and upon failure parses
    /// API errors returned from the server.
    pub parser: Parser,
}

impl<'a, Strategy, Parser> RestClient<'a, Strategy, Parser>
where
    Strategy: HttpRequestBuilder,
    Parser: HttpParser,
{
    pub fn new<Url: Into<Cow<'a, str>>>(base_url: Url, strategy: Strategy, parser: Parser) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
            strategy,
            parser,
        }
    }

    /// Execute the provided [`RestRequest`].
    pub async fn execute<Request>(
        &self,
        request: Request,
    ) -> Result<(StatusCode, Request::Response), Parser::OutputError>
    where
        Request: RestRequest,
    {
        let request = self.build(request)?;
        let (status, payload) = self.send(request).await?;

        self.parser
            .parse::<Request::Response>(status, &payload)
            .map(|response| (status, response))
    }

    /// Use the provided [`RestRequest`] to construct a signed Http [`reqwest::Request`].
    pub fn build<Request>(&self, request: Request) -> Result<reqwest::Request, SourceError>
    where
        Request: RestRequest,
    {
        let url = format!("{}{}", self.base_url, request.path());

        let mut builder = self
            .http_client
            .request(Request::method(), url)
            .timeout(Request::timeout());

        if let Some(query) = request.query_params() {
            builder = builder.query(query);
        }

        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        self.strategy.build(request, builder)
    }

    async fn send(&self, request: reqwest::Request) -> Result<(StatusCode, Vec<u8>), SourceError> {
        debug!(method = %request.method(), path = request.url().path(), "sending HTTP request");

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        let payload = response.bytes().await?;

        Ok((status, payload.to_vec()))
    }
}
