//! Response handling shared by both clients

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Map a transport failure, keeping reqwest's timeout wording visible in logs.
pub(crate) fn request_failed(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Http(format!("request timed out: {e}"))
    } else {
        Error::Http(e.to_string())
    }
}

/// Turn a non-2xx response into `Error::Status` with the node's body attached.
pub(crate) async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));
    Err(Error::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| Error::Decode(e.to_string()))
}
