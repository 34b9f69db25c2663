use thiserror::Error;

/// Failure of a REST call, categorized by HTTP status the way the UI reports it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable entity: {0}")]
    Unprocessable(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected status {status}: {message}")]
    Unexpected { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Action already in progress")]
    Busy,
}

impl ApiError {
    /// Build an error from a non-success response. The server's `message`
    /// (or `error`) field is kept when the body is JSON. Validation errors
    /// are shown to the user, so they never carry a raw non-JSON body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let extracted = extract_message(body);
        let message = extracted.clone().unwrap_or_else(|| body.trim().to_string());
        match status {
            400 => ApiError::BadRequest(extracted.unwrap_or_default()),
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound,
            409 => ApiError::Conflict(message),
            422 => ApiError::Unprocessable(extracted.unwrap_or_default()),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Unexpected { status, message },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::BadRequest(_) => Some(400),
            ApiError::Unauthorized => Some(401),
            ApiError::Forbidden => Some(403),
            ApiError::NotFound => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::Unprocessable(_) => Some(422),
            ApiError::RateLimited => Some(429),
            ApiError::Server { status, .. } | ApiError::Unexpected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) if !msg.is_empty() => msg.clone(),
            ApiError::BadRequest(_) => "Invalid request. Please check your input.".to_string(),
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            ApiError::Forbidden => "You do not have permission to do that.".to_string(),
            ApiError::NotFound => "The requested content could not be found.".to_string(),
            ApiError::Conflict(_) => "You have already done this.".to_string(),
            ApiError::Unprocessable(msg) if !msg.is_empty() => msg.clone(),
            ApiError::Unprocessable(_) => "Some fields are invalid.".to_string(),
            ApiError::RateLimited => "Too many requests. Please wait a moment and try again.".to_string(),
            ApiError::Server { .. } => "Something went wrong on our side. Please try again later.".to_string(),
            ApiError::Unexpected { .. } => "An unexpected error occurred.".to_string(),
            ApiError::Timeout => "The server took too long to respond.".to_string(),
            ApiError::Transport(_) => "Network error. Check your connection and try again.".to_string(),
            ApiError::Decode(_) => "Received an invalid response from the server.".to_string(),
            ApiError::Cancelled => "The request was cancelled.".to_string(),
            ApiError::Busy => "Please wait for the previous action to finish.".to_string(),
        }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status.as_u16(), "")
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_known_statuses() {
        assert_eq!(ApiError::from_status(401, ""), ApiError::Unauthorized);
        assert_eq!(ApiError::from_status(403, ""), ApiError::Forbidden);
        assert_eq!(ApiError::from_status(404, ""), ApiError::NotFound);
        assert_eq!(ApiError::from_status(429, ""), ApiError::RateLimited);
        assert!(ApiError::from_status(409, "{}").is_conflict());
        assert!(matches!(ApiError::from_status(503, "down"), ApiError::Server { status: 503, .. }));
        assert!(matches!(ApiError::from_status(418, ""), ApiError::Unexpected { status: 418, .. }));
    }

    #[test]
    fn keeps_server_message_for_validation_errors() {
        let err = ApiError::from_status(400, r#"{"message": "Title is required"}"#);
        assert_eq!(err.user_message(), "Title is required");

        let err = ApiError::from_status(422, r#"{"error": "Email already taken"}"#);
        assert_eq!(err.user_message(), "Email already taken");
    }

    #[test]
    fn falls_back_to_generic_text() {
        assert_eq!(
            ApiError::from_status(400, "").user_message(),
            "Invalid request. Please check your input."
        );
        assert_eq!(
            ApiError::from_status(422, "<html><body>Bad Gateway</body></html>").user_message(),
            "Some fields are invalid."
        );
        assert_eq!(
            ApiError::from_status(400, "plain text failure").user_message(),
            "Invalid request. Please check your input."
        );
        assert_eq!(ApiError::from_status(409, "").status(), Some(409));
        assert_eq!(ApiError::Timeout.status(), None);
    }
}
