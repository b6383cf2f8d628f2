//! Mapping of transport failures onto the ETL error taxonomy.

use dataflow_core::EtlError;
use reqwest::{Response, StatusCode};

/// Any transport-level failure is treated as a transient outage.
pub(crate) fn network_error(context: &str, err: reqwest::Error) -> EtlError {
    if err.is_timeout() {
        EtlError::SourceUnavailable(format!("{}: request timed out", context))
    } else if err.is_decode() {
        EtlError::SourceUnavailable(format!("{}: undecodable response body: {}", context, err))
    } else {
        EtlError::SourceUnavailable(format!("{}: {}", context, err))
    }
}

pub(crate) fn from_status(context: &str, status: StatusCode, body: &str) -> EtlError {
    EtlError::SourceUnavailable(format!("{} returned {}: {}", context, status, body.trim()))
}

/// Pass a 2xx response through, turning anything else into
/// `SourceUnavailable` carrying the response body.
pub(crate) async fn ensure_success(context: &str, response: Response) -> Result<Response, EtlError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(from_status(context, status, &body))
}
