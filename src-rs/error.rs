pub type StudioResult<T> = Result<T, StudioError>;

#[derive(thiserror::Error, Debug)]
pub enum StudioError {
    #[error("upload failed: {0}")]
    UploadFailure(String),

    #[error("render surface unavailable: {0}")]
    RenderUnavailable(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StudioError {
    pub fn upload(msg: impl Into<String>) -> Self {
        Self::UploadFailure(msg.into())
    }

    pub fn render_unavailable(msg: impl Into<String>) -> Self {
        Self::RenderUnavailable(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// Failures of the remote edit / video call. Every variant is recoverable at
/// the operation boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway call failed: {0}")]
    Failure(String),

    #[error("image generation failed due to safety settings: {0}. Please adjust your prompt or image.")]
    SafetyBlock(String),

    #[error("no image data found in the gateway response; the request may have been blocked or returned an empty response")]
    EmptyResponse,

    #[error("gateway call timed out after {0}s")]
    Timeout(u64),
}

impl GatewayError {
    pub fn failure(msg: impl Into<String>) -> Self {
        Self::Failure(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Failure(_) => "gateway_failure",
            Self::SafetyBlock(_) => "safety_block",
            Self::EmptyResponse => "empty_response",
            Self::Timeout(_) => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(StudioError::upload("x")
            .to_string()
            .contains("upload failed:"));
        assert!(StudioError::render_unavailable("x")
            .to_string()
            .contains("render surface unavailable:"));
        assert!(StudioError::invalid_state("x")
            .to_string()
            .contains("invalid state:"));
    }

    #[test]
    fn safety_block_reason_is_surfaced_verbatim() {
        let err = StudioError::from(GatewayError::SafetyBlock("PROHIBITED_CONTENT".to_string()));
        assert!(err.to_string().contains("PROHIBITED_CONTENT"));
        assert_eq!(GatewayError::EmptyResponse.kind(), "empty_response");
    }
}
