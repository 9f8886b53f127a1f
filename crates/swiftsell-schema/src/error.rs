use thiserror::Error;

use crate::{AuthProviderKind, PlatformId};

/// Application error taxonomy. Each variant renders to the single
/// human-readable string the UI shows; none are retried automatically.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no images provided for analysis")]
    NoImages,

    #[error("the model returned an invalid format for the item description")]
    MalformedResponse(#[source] serde_json::Error),

    #[error("failed to sign in with {0}")]
    AuthFailed(AuthProviderKind),

    #[error("user must be signed in first")]
    NotSignedIn,

    #[error("failed to connect {0}")]
    ConnectionFailed(PlatformId),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}
