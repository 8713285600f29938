use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::options::OptionsError;

pub const RENDER_FAILED_MESSAGE: &str = "An error occurred while generating the PDF.";

#[derive(Debug)]
pub enum HttpError {
    BadRequest(anyhow::Error),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::BadRequest(err) => {
                tracing::debug!("Rejected request: {}", err);

                (StatusCode::BAD_REQUEST, format!("Bad Request: {}", err)).into_response()
            }
            HttpError::InternalServerError(err) => {
                tracing::error!("Internal Server Error: {:#}", err);

                (StatusCode::INTERNAL_SERVER_ERROR, RENDER_FAILED_MESSAGE).into_response()
            }
        }
    }
}

impl HttpError {
    pub fn bad_request(err: OptionsError) -> Self {
        Self::BadRequest(err.into())
    }
}

// Lets `?` turn any engine failure into a 500. Validation errors must go
// through `HttpError::bad_request` instead.
impl<E> From<E> for HttpError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}
