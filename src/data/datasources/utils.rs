use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize};

use crate::errors::BackendError;

/// Receipts travel to the backend base64-encoded.
pub(crate) fn encode_fetch_token(receipt: &[u8]) -> String {
    STANDARD.encode(receipt)
}

#[derive(Debug, Deserialize)]
struct BackendErrorBodyModel {
    code: Option<i64>,
    message: Option<String>,
}

/// Maps a non-success response body to a `BackendError`, keeping the
/// backend's own code and message when the body carries them.
pub(crate) fn error_from_response(status: u16, body: &str, function_name: &str) -> BackendError {
    match serde_json::from_str::<BackendErrorBodyModel>(body) {
        Ok(BackendErrorBodyModel {
            code,
            message: Some(message),
        }) => BackendError::with_status(message, status, code),
        Ok(BackendErrorBodyModel { code, message: None }) => BackendError::with_status(
            format!("{function_name} returned status {status}"),
            status,
            code,
        ),
        Err(_) => BackendError::with_status(
            format!("{function_name} returned status {status}; {body}"),
            status,
            None,
        ),
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(
    body: &str,
    function_name: &str,
) -> Result<T, BackendError> {
    serde_json::from_str(body).map_err(|e| {
        BackendError::new(
            format!("Failed to parse {function_name} response; {e}"),
            false,
        )
    })
}
