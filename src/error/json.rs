use crate::error::app_error::AppError;
use rocket::data::{ByteUnit, Data, FromData, Outcome};
use rocket::http::Status;
use rocket::request::Request;
use serde::de::DeserializeOwned;
use std::ops::Deref;
use tracing::warn;
use validator::Validate;

/// JSON request body that is deserialized and then checked with `validator`.
///
/// Parse and validation failures are logged with the request method and URI
/// and surface as an `AppError`, so they render like every other API error.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<T> Deref for ValidatedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T: DeserializeOwned + Validate> FromData<'r> for ValidatedJson<T> {
    type Error = AppError;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self> {
        let limit = req.limits().get("json").unwrap_or(ByteUnit::Kibibyte(64));

        let bytes = match data.open(limit).into_bytes().await {
            Ok(bytes) if bytes.is_complete() => bytes.into_inner(),
            Ok(_) => {
                warn!(method = %req.method(), uri = %req.uri(), "JSON payload exceeded size limit");
                return Outcome::Error((Status::PayloadTooLarge, AppError::BadRequest("payload too large".to_string())));
            }
            Err(e) => {
                warn!(method = %req.method(), uri = %req.uri(), error = %e, "Failed to read request body");
                return Outcome::Error((Status::BadRequest, AppError::BadRequest("unreadable body".to_string())));
            }
        };

        let value = match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    method = %req.method(),
                    uri = %req.uri(),
                    error_message = %e,
                    error_line = e.line(),
                    error_column = e.column(),
                    "Failed to parse JSON request body"
                );
                return Outcome::Error((Status::UnprocessableEntity, AppError::BadRequest(e.to_string())));
            }
        };

        if let Err(errors) = value.validate() {
            warn!(method = %req.method(), uri = %req.uri(), errors = %errors, "Request body failed validation");
            return Outcome::Error((Status::BadRequest, AppError::ValidationError(errors)));
        }

        Outcome::Success(ValidatedJson(value))
    }
}
