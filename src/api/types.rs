use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::core::geo::Coordinates;

/// The `{success, data?, error?}` wrapper every endpoint returns.
#[derive(Deserialize, Debug)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    /// `data` on success. A successful envelope without data is a parse error.
    pub fn into_data(self) -> Result<T, ApiError> {
        if !self.success {
            return Err(self.failure());
        }
        self.data
            .ok_or_else(|| ApiError::Parse("response is missing `data`".to_string()))
    }

    /// For endpoints whose success carries no payload.
    pub fn into_unit(self) -> Result<(), ApiError> {
        if self.success { Ok(()) } else { Err(self.failure()) }
    }

    fn failure(&self) -> ApiError {
        ApiError::Server(
            self.error
                .clone()
                .unwrap_or_else(|| "Request failed".to_string()),
        )
    }
}

/// Error body on non-2xx responses. Both fields are optional in practice.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Serialize, Debug)]
pub(crate) struct LoginBody<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Debug)]
pub(crate) struct CancelBody<'a> {
    pub reason: &'a str,
}

#[derive(Serialize, Debug)]
pub(crate) struct RouteBody {
    pub from: Coordinates,
    pub to: Coordinates,
}

#[derive(Serialize, Debug)]
pub(crate) struct AvailabilityBody {
    pub online: bool,
}
