use serde::{Deserialize, Serialize};

use crate::constants::RESULT_OK;

/// Error returned when the API answers with a non-`ok` result marker.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{result} (code {code}): {description}")]
pub struct ApiError {
    pub result: String,
    pub code: i64,
    pub description: String,
}

/// Envelope shared by every JSON response of the drive API.
///
/// `data` is kept raw so that an error response carrying an unrelated (or
/// empty) `data` object never fails to parse before the result marker has
/// been inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<serde_json::value::RawValue>>,
}

impl ApiResponse {
    /// Parses an envelope from a raw response body.
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Returns `true` when the result marker is `ok`.
    pub fn is_ok(&self) -> bool {
        self.result == RESULT_OK
    }

    /// Converts a non-`ok` envelope into an [`ApiError`].
    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(ApiError {
                result: self.result,
                code: self.code,
                description: self.description,
            })
        }
    }

    /// Deserializes the `data` field into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}
