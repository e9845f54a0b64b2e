use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{service} api key is not configured")]
    MissingApiKey { service: &'static str },
    #[error("invalid {service} endpoint url `{url}`")]
    InvalidUrl { service: &'static str, url: String },
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned {status}: {body}")]
    Status { service: &'static str, status: StatusCode, body: String },
    #[error("failed to decode {service} response: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} response did not contain {what}")]
    UnexpectedResponse { service: &'static str, what: &'static str },
}
