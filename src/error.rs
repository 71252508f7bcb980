use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A requested transition or mount was declined (nothing was changed)
    #[error("Refused: {0}")]
    Refused(String),

    #[error("The USB gadget is not enabled, cannot change mount")]
    GadgetNotEnabled,

    #[error("Gadget helper `{op}` failed: {reason}")]
    Helper { op: &'static str, reason: String },

    #[error("Gadget helper `{op}` timed out after {timeout_ms} ms")]
    HelperTimeout { op: &'static str, timeout_ms: u64 },

    #[error("Command `{command}` exited with status {status}: {output}")]
    Command {
        command: String,
        status: i32,
        output: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Shorthand for a failed helper step
    pub fn helper(op: &'static str, reason: impl Into<String>) -> Self {
        Self::Helper {
            op,
            reason: reason.into(),
        }
    }

    /// Whether this error is a user-facing refusal rather than a fault
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            Self::Refused(_) | Self::GadgetNotEnabled | Self::NotFound(_) | Self::BadRequest(_)
        )
    }

    fn status_code(&self) -> StatusCode {
        // Pages are read by humans; the message carries the outcome
        StatusCode::OK
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        if self.is_refusal() {
            tracing::info!(error_message = %message, "Request refused");
        } else {
            tracing::error!(
                error_type = std::any::type_name_of_val(&self),
                error_message = %message,
                "Request failed"
            );
        }

        let body = format!(
            "{}<br><br><a href='/'>Return to USBODE homepage</a>",
            crate::web::escape_html(&message)
        );
        (status, Html(body)).into_response()
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
