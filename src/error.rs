use crate::api_connection::connection::ApiConnectionError;

/// Failures of the target derivation layer.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    /// Carbs are the dependent variable; nothing derives calories back from them.
    #[error("Changing {0} directly is not supported; it is derived from the other targets")]
    UnsupportedChange(&'static str),
}

/// Failures reported by the estimation collaborator.
///
/// An unusable image is not one of these; see [`InvalidImage`].
#[derive(Debug, thiserror::Error)]
pub enum EstimationError {
    #[error("Estimation transport failed: {0}")]
    Transport(#[from] ApiConnectionError),

    #[error("Estimation service returned no content")]
    EmptyResponse,

    #[error("Could not parse estimation response: {reason}. Raw: {raw}")]
    MalformedResponse { reason: String, raw: String },

    #[error("Estimation failed: {0}")]
    Service(String),
}

/// The collaborator accepted the call but refused the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("The submitted image could not be used for estimation")]
pub struct InvalidImage;
