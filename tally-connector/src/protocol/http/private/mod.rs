use hmac::Mac;

use crate::error::SourceError;

use self::encoder::Encoder;
use super::{builder::HttpRequestBuilder, rest::request::RestRequest};

pub mod encoder;

/// API specific signing logic used by a [`RequestSigner`].
pub trait Signer {
    /// Everything the API needs to sign and then build a request.
    type Config<'a>
    where
        Self: 'a;

    /// Extract the signing [`Self::Config`] from a [`RestRequest`].
    fn config<'a, Request>(
        &'a self,
        request: Request,
        builder: &reqwest::RequestBuilder,
    ) -> Result<Self::Config<'a>, SourceError>
    where
        Request: RestRequest;

    /// Feed the bytes the API signs into the [`Mac`].
    fn add_bytes_to_sign<M>(mac: &mut M, config: &Self::Config<'_>)
    where
        M: Mac;

    /// Attach the encoded signature and any auth headers, then build the request.
    fn build_signed_request(
        config: Self::Config<'_>,
        builder: reqwest::RequestBuilder,
        signature: String,
    ) -> Result<reqwest::Request, SourceError>;
}

/// Generic [`HttpRequestBuilder`] that signs every [`RestRequest`] with a [`Mac`] and an
/// [`Encoder`], delegating the API specific parts to a [`Signer`].
#[derive(Debug, Copy, Clone)]
pub struct RequestSigner<Sig, Hmac, SigEncoder> {
    signer: Sig,
    mac: Hmac,
    encoder: SigEncoder,
}

impl<Sig, Hmac, SigEncoder> RequestSigner<Sig, Hmac, SigEncoder> {
    pub fn new(signer: Sig, mac: Hmac, encoder: SigEncoder) -> Self {
        Self { signer, mac, encoder }
    }
}

impl<Sig, Hmac, SigEncoder> HttpRequestBuilder for RequestSigner<Sig, Hmac, SigEncoder>
where
    Sig: Signer,
    Hmac: Mac + Clone,
    SigEncoder: Encoder,
{
    fn build<Request>(
        &self,
        request: Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SourceError>
    where
        Request: RestRequest,
    {
        let config = self.signer.config(request, &builder)?;

        // Each request signs with a fresh copy of the keyed mac
        let mut mac = self.mac.clone();
        Sig::add_bytes_to_sign(&mut mac, &config);

        let signature = self.encoder.encode(mac.finalize().into_bytes());
        Sig::build_signed_request(config, builder, signature)
    }
}
