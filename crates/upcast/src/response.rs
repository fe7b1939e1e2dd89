//! The structured reply envelope returned by the upstream.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Outcome reported inside the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

impl std::fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyStatus::Success => write!(f, "success"),
            ReplyStatus::Error => write!(f, "error"),
        }
    }
}

/// Reply envelope: `{result, message: {response, details}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub result: ReplyStatus,
    pub message: Message,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    /// Raw payload of the reply; shape depends on the route.
    #[serde(default)]
    pub response: serde_json::Value,
    #[serde(default)]
    pub details: String,
}

/// Turn a raw status/body pair into an envelope, or the matching error.
///
/// Statuses outside 200-226 are surfaced as [`Error::NonSuccessStatus`],
/// carrying whatever the envelope said if it parsed at all.
pub(crate) fn unmarshal(url: &str, status: u16, body: &[u8]) -> Result<Response, Error> {
    let decoded = serde_json::from_slice::<Response>(body);

    if !(200..=226).contains(&status) {
        return Err(match decoded {
            Ok(response) => Error::NonSuccessStatus {
                url: url.to_owned(),
                status,
                result: response.result.to_string(),
                details: response.message.details,
            },
            Err(err) => Error::NonSuccessStatus {
                url: url.to_owned(),
                status,
                result: "unparseable".to_owned(),
                details: err.to_string(),
            },
        });
    }

    decoded.map_err(|err| Error::Decode { url: url.to_owned(), source: err })
}
