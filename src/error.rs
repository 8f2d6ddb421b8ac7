use thiserror::Error;

/// Everything that can go wrong while enriching a token.
///
/// None of these are fatal: the claim builder turns each one into a null
/// claim and a warning.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// An operator setting is absent or does not validate.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The client-credentials grant was rejected or returned garbage.
    #[error("credential error: {0}")]
    Credential(String),

    /// The property lookup returned a non-success status or a malformed body.
    #[error("upstream lookup error: {0}")]
    UpstreamLookup(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
