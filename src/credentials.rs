use openidconnect::{AccessToken, ClientId, ClientSecret, HttpRequest};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Method,
};
use serde::Deserialize;
use url::{form_urlencoded, Url};

use crate::{
    config::{self, ConfigSource, Setting},
    error::EnrichError,
    transport::{CanonicalResponse, Transport},
};

/// Machine-to-machine credentials for the management API.
#[derive(Debug, Clone)]
pub struct ManagementCredentials {
    pub domain: String,
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
}

impl ManagementCredentials {
    /// All three settings must be present and non-blank.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, EnrichError> {
        let domain = config::resolve(source, Setting::Domain, config::credential_value);
        let client_id = config::resolve(source, Setting::ClientId, config::credential_value);
        let client_secret =
            config::resolve(source, Setting::ClientSecret, config::credential_value);

        match (domain, client_id, client_secret) {
            (Ok(domain), Ok(client_id), Ok(client_secret)) => Ok(Self {
                domain,
                client_id: ClientId::new(client_id),
                client_secret: ClientSecret::new(client_secret),
            }),
            (domain, client_id, client_secret) => {
                let missing = [
                    (Setting::Domain, domain.is_err()),
                    (Setting::ClientId, client_id.is_err()),
                    (Setting::ClientSecret, client_secret.is_err()),
                ]
                .into_iter()
                .filter(|(_, missing)| *missing)
                .map(|(setting, _)| setting.as_str())
                .collect::<Vec<_>>();

                Err(EnrichError::Configuration(format!(
                    "missing management API credentials: {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

/// Prefix `https://` unless the domain already carries a scheme. An existing
/// scheme is matched case-insensitively and lowercased.
pub fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    let scheme = ["https://", "http://"].into_iter().find(|scheme| {
        domain
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    });
    match scheme {
        Some(scheme) => format!("{scheme}{}", &domain[scheme.len()..]),
        None => format!("https://{domain}"),
    }
}

/// Audience the management API expects tokens to be minted for.
pub fn management_audience(normalized_domain: &str) -> String {
    format!("{normalized_domain}/api")
}

#[derive(Debug, Deserialize)]
struct GrantBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges client credentials for a short-lived management API token.
///
/// Nothing is cached: every call hits the token endpoint.
pub struct CredentialBroker<'a> {
    transport: &'a dyn Transport,
}

impl<'a> CredentialBroker<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    pub async fn acquire(
        &self,
        domain: &str,
        client_id: &ClientId,
        client_secret: &ClientSecret,
    ) -> Result<AccessToken, EnrichError> {
        let domain = normalize_domain(domain);
        let url = Url::parse(&format!("{domain}/oauth2/token")).map_err(|e| {
            EnrichError::Configuration(format!("invalid identity domain {domain:?}: {e}"))
        })?;

        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", client_id.as_str())
            .append_pair("client_secret", client_secret.secret())
            .append_pair("audience", &management_audience(&domain))
            .finish();

        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let response = self
            .transport
            .execute(HttpRequest {
                url,
                method: Method::POST,
                headers,
                body: body.into_bytes(),
            })
            .await
            .map_err(|e| match e {
                EnrichError::Transport(e) => {
                    EnrichError::Credential(format!("token request failed: {e}"))
                }
                other => other,
            })?;

        let response = CanonicalResponse::from_transport(response).map_err(|e| {
            EnrichError::Credential(format!("token response is not JSON: {e}"))
        })?;
        let status = response.status_code;
        let grant: GrantBody = serde_json::from_value(response.body).map_err(|e| {
            EnrichError::Credential(format!("malformed token response: {e}"))
        })?;

        if let Some(error) = grant.error {
            return Err(EnrichError::Credential(format!(
                "OAuth error: {} - {}",
                error,
                grant.error_description.unwrap_or_default()
            )));
        }
        if !status.is_success() {
            return Err(EnrichError::Credential(format!(
                "token endpoint returned {status}"
            )));
        }

        match grant.access_token {
            Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
            _ => Err(EnrichError::Credential(
                "no access token in response".to_string(),
            )),
        }
    }
}
