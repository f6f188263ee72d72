use reqwest::StatusCode;
use serde::Deserialize;

use crate::{error::SourceError, protocol::http::parser::HttpParser};

pub mod signer;
pub mod source;
pub mod spot;

/// Error payload Binance returns alongside a non-2xx status.
///
/// ```json
/// {"code": -1021, "msg": "Timestamp for this request is outside of the recvWindow."}
/// ```
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct BinanceApiError {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Copy, Clone, Default)]
pub struct BinanceParser;

impl HttpParser for BinanceParser {
    type ApiError = BinanceApiError;
    type OutputError = SourceError;

    fn parse_api_error(&self, status: StatusCode, api_error: Self::ApiError) -> Self::OutputError {
        SourceError::Api {
            status,
            code: api_error.code,
            message: api_error.msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_or_api_error() {
        struct TestCase {
            status: StatusCode,
            payload: &'static str,
            expected: Result<Vec<u64>, (i64, &'static str)>,
        }

        let tests = vec![
            TestCase {
                // TC0: successful payload
                status: StatusCode::OK,
                payload: "[1,2,3]",
                expected: Ok(vec![1, 2, 3]),
            },
            TestCase {
                // TC1: api error payload
                status: StatusCode::BAD_REQUEST,
                payload: r#"{"code":-1021,"msg":"Timestamp for this request is outside of the recvWindow."}"#,
                expected: Err((-1021, "Timestamp for this request is outside of the recvWindow.")),
            },
            TestCase {
                // TC2: invalid signature
                status: StatusCode::BAD_REQUEST,
                payload: r#"{"code":-1022,"msg":"Signature for this request is not valid."}"#,
                expected: Err((-1022, "Signature for this request is not valid.")),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = BinanceParser.parse::<Vec<u64>>(test.status, test.payload.as_bytes());
            match (actual, test.expected) {
                (Ok(actual), Ok(expected)) => assert_eq!(actual, expected, "TC{} failed", index),
                (Err(SourceError::Api { status, code, message }), Err((expected_code, expected_message))) => {
                    assert_eq!(status, test.status, "TC{} failed", index);
                    assert_eq!(code, expected_code, "TC{} failed", index);
                    assert_eq!(message, expected_message, "TC{} failed", index);
                }
                (actual, expected) => {
                    panic!("TC{index} failed because actual != expected. \nActual: {actual:?}\nExpected: {expected:?}\n");
                }
            }
        }
    }

    #[test]
    fn test_parse_unexpected_payload() {
        let actual = BinanceParser.parse::<Vec<u64>>(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert!(matches!(actual, Err(SourceError::DeserialisingJson { .. })));
    }
}
