use thiserror::Error;

/// Failure kinds surfaced by the meal-analysis pipeline.
///
/// Every failure reaches the caller exactly once; nothing in the pipeline
/// retries on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("No internet connection. Check your network and try again.")]
    NoInternetConnection,

    #[error("The vision API key is missing or was rejected.")]
    ApiKeyMissing,

    #[error("The meal photo could not be processed.")]
    ImageProcessingFailed,

    #[error("The analysis request failed: {0}")]
    ApiRequestFailed(String),

    #[error("The analysis service returned a response that could not be read.")]
    InvalidResponse,

    #[error("No food was detected in the photo.")]
    NoFoodDetected,

    #[error("The meal photo is too large to upload.")]
    ImageTooLarge,

    #[error("The analysis request timed out.")]
    RequestTimeout,

    #[error("Too many requests. Wait a moment and try again.")]
    RateLimitExceeded,

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl AnalysisError {
    /// Localization key for the user-facing message.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::NoInternetConnection => "analysis_error_no_internet",
            Self::ApiKeyMissing => "analysis_error_api_key",
            Self::ImageProcessingFailed => "analysis_error_image_processing",
            Self::ApiRequestFailed(_) => "analysis_error_api_request",
            Self::InvalidResponse => "analysis_error_invalid_response",
            Self::NoFoodDetected => "analysis_error_no_food",
            Self::ImageTooLarge => "analysis_error_image_too_large",
            Self::RequestTimeout => "analysis_error_timeout",
            Self::RateLimitExceeded => "analysis_error_rate_limit",
            Self::Unknown(_) => "analysis_error_unknown",
        }
    }

    /// Stable tag used in the event journal.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoInternetConnection => "no_internet_connection",
            Self::ApiKeyMissing => "api_key_missing",
            Self::ImageProcessingFailed => "image_processing_failed",
            Self::ApiRequestFailed(_) => "api_request_failed",
            Self::InvalidResponse => "invalid_response",
            Self::NoFoodDetected => "no_food_detected",
            Self::ImageTooLarge => "image_too_large",
            Self::RequestTimeout => "request_timeout",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Detail carried by the variants that wrap a message.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::ApiRequestFailed(message) | Self::Unknown(message) => Some(message.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AnalysisError;

    #[test]
    fn wrapped_messages_show_in_display() {
        let err = AnalysisError::ApiRequestFailed("HTTP 500".to_string());
        assert_eq!(err.to_string(), "The analysis request failed: HTTP 500");
        assert_eq!(err.detail(), Some("HTTP 500"));
        assert_eq!(err.message_key(), "analysis_error_api_request");
    }

    #[test]
    fn unit_variants_have_no_detail() {
        assert_eq!(AnalysisError::NoFoodDetected.detail(), None);
        assert_eq!(AnalysisError::NoFoodDetected.kind(), "no_food_detected");
        assert_eq!(
            AnalysisError::RateLimitExceeded.message_key(),
            "analysis_error_rate_limit"
        );
    }
}
