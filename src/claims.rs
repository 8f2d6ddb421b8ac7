use serde_json::{json, Map, Value};

use crate::{
    config::{self, ConfigSource, Setting},
    credentials::{CredentialBroker, ManagementCredentials},
    error::EnrichError,
    properties::{PropertyResolver, LAST_KNOWN_SCORE_KEY},
    transport::Transport,
};

pub const BLOCK_THRESHOLD_CLAIM: &str = "abuseIpdbBlockThreshold";
pub const CACHE_EXPIRY_SECONDS_CLAIM: &str = "abuseIpdbCacheExpirySeconds";
pub const CACHE_URL_CLAIM: &str = "abuseIpdbCacheUrl";
pub const FAIL_OPEN_CLAIM: &str = "abuseIpdbFailOpen";
pub const CURRENT_SCORE_CLAIM: &str = "abuseIpdbCurrentScore";

/// The five custom claims. Each one is resolved on its own, so a `None` here
/// says nothing about its neighbours.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreatIntelClaims {
    pub block_threshold: Option<u8>,
    pub cache_expiry_seconds: Option<u64>,
    pub cache_url: Option<String>,
    pub fail_open: Option<bool>,
    pub current_score: Option<u8>,
}

impl ThreatIntelClaims {
    /// Write every claim onto `target`. Unresolved claims become explicit
    /// JSON nulls, never missing keys.
    pub fn apply(&self, target: &mut Map<String, Value>) {
        target.insert(BLOCK_THRESHOLD_CLAIM.into(), json!(self.block_threshold));
        target.insert(
            CACHE_EXPIRY_SECONDS_CLAIM.into(),
            json!(self.cache_expiry_seconds),
        );
        target.insert(CACHE_URL_CLAIM.into(), json!(self.cache_url));
        target.insert(FAIL_OPEN_CLAIM.into(), json!(self.fail_open));
        target.insert(CURRENT_SCORE_CLAIM.into(), json!(self.current_score));
    }
}

/// Turn a failed resolution into a null claim. This is the only place
/// failures are swallowed.
fn settle<T>(claim: &str, result: Result<T, EnrichError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(why) => {
            tracing::warn!("{} set to null: {}", claim, why);
            None
        }
    }
}

/// Parse a stored score. Blank means the principal has never been scored.
pub fn parse_score(raw: &str) -> Result<Option<u8>, EnrichError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    config::percentage(raw).map(Some).map_err(|expected| {
        EnrichError::UpstreamLookup(format!(
            "invalid abuse score from user properties: {raw:?}. Expected {expected}"
        ))
    })
}

pub struct ClaimBuilder<'a> {
    source: &'a dyn ConfigSource,
    transport: &'a dyn Transport,
}

impl<'a> ClaimBuilder<'a> {
    pub fn new(source: &'a dyn ConfigSource, transport: &'a dyn Transport) -> Self {
        Self { source, transport }
    }

    pub fn block_threshold(&self) -> Option<u8> {
        settle(
            BLOCK_THRESHOLD_CLAIM,
            config::resolve(self.source, Setting::BlockThreshold, config::percentage),
        )
    }

    pub fn cache_expiry_seconds(&self) -> Option<u64> {
        settle(
            CACHE_EXPIRY_SECONDS_CLAIM,
            config::resolve(
                self.source,
                Setting::CacheExpirySeconds,
                config::positive_seconds,
            ),
        )
    }

    pub fn cache_url(&self) -> Option<String> {
        settle(
            CACHE_URL_CLAIM,
            config::resolve(self.source, Setting::CacheUrl, config::non_empty),
        )
    }

    pub fn fail_open(&self) -> Option<bool> {
        settle(
            FAIL_OPEN_CLAIM,
            config::resolve(self.source, Setting::FailOpen, config::fail_open_flag),
        )
    }

    /// The principal's last known score, or `None` if anything on the way
    /// there is missing or fails.
    pub async fn current_score(&self, principal_id: &str) -> Option<u8> {
        let credentials = settle(
            CURRENT_SCORE_CLAIM,
            ManagementCredentials::from_source(self.source),
        )?;

        tracing::info!("looking up abuse score for user {}", principal_id);
        let score = settle(
            CURRENT_SCORE_CLAIM,
            self.fetch_score(&credentials, principal_id).await,
        )
        .flatten();

        match score {
            Some(score) => tracing::info!("abuse score for user {}: {}", principal_id, score),
            None => tracing::info!("no abuse score for user {}", principal_id),
        }
        score
    }

    async fn fetch_score(
        &self,
        credentials: &ManagementCredentials,
        principal_id: &str,
    ) -> Result<Option<u8>, EnrichError> {
        let access_token = CredentialBroker::new(self.transport)
            .acquire(
                &credentials.domain,
                &credentials.client_id,
                &credentials.client_secret,
            )
            .await?;

        let raw = PropertyResolver::new(self.transport)
            .lookup(
                &credentials.domain,
                &access_token,
                principal_id,
                LAST_KNOWN_SCORE_KEY,
            )
            .await?;

        match raw {
            Some(raw) => parse_score(&raw),
            None => Ok(None),
        }
    }

    pub async fn build(&self, principal_id: &str) -> ThreatIntelClaims {
        ThreatIntelClaims {
            block_threshold: self.block_threshold(),
            cache_expiry_seconds: self.cache_expiry_seconds(),
            cache_url: self.cache_url(),
            fail_open: self.fail_open(),
            current_score: self.current_score(principal_id).await,
        }
    }
}
