//! Error types for trainhub.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tera::Context;
use thiserror::Error;

/// Failures talking to the spreadsheet backend.
#[derive(Error, Debug)]
pub enum SheetError {
    /// Network or transport failure
    #[error("Spreadsheet request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("Spreadsheet API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Service account could not be exchanged for an access token
    #[error("Spreadsheet authentication failed: {0}")]
    Auth(String),

    /// JWT assertion could not be signed
    #[error("Cannot sign service account assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Worksheet '{0}' does not exist")]
    WorksheetNotFound(String),

    #[error("Spreadsheet '{0}' not found or not shared with the service account")]
    SpreadsheetNotFound(String),

    /// Response body did not have the expected shape
    #[error("Unexpected spreadsheet response: {0}")]
    Malformed(String),
}

/// Errors surfaced by request handlers. Each one renders as a flat message
/// on `error.html`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Could not reach the database: {0}")]
    Store(#[from] SheetError),

    #[error("Please log in first.")]
    Unauthorized,

    #[error("This page is not available for your account.")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Page could not be rendered: {0}")]
    Template(#[from] tera::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Store(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let message = self.to_string();
        let mut ctx = Context::new();
        ctx.insert("message", &message);
        ctx.insert("status", &status.as_u16());

        let body = crate::templates::get_tera()
            .render("error.html", &ctx)
            .unwrap_or_else(|_| format!("<h1>{}</h1><p>{}</p>", status, message));
        (status, Html(body)).into_response()
    }
}
