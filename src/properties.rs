use openidconnect::{AccessToken, HttpRequest};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Method,
};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::{
    credentials::normalize_domain,
    error::EnrichError,
    transport::{CanonicalResponse, Transport},
};

/// Property the reputation pipeline writes after each authentication.
pub const LAST_KNOWN_SCORE_KEY: &str = "abuseipdb_last_known_score";

#[derive(Debug, Clone, Deserialize)]
pub struct PrincipalProperty {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

impl PrincipalProperty {
    /// Property values are usually strings, but numbers show up too.
    fn value_string(&self) -> Option<String> {
        match &self.value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PropertiesBody {
    #[serde(default)]
    properties: Option<Vec<PrincipalProperty>>,
}

/// Reads principal properties from the management API.
pub struct PropertyResolver<'a> {
    transport: &'a dyn Transport,
}

impl<'a> PropertyResolver<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Fetch the value stored under `property_key` for `principal_id`.
    ///
    /// `Ok(None)` means the principal has no such property, which is normal.
    pub async fn lookup(
        &self,
        domain: &str,
        credential: &AccessToken,
        principal_id: &str,
        property_key: &str,
    ) -> Result<Option<String>, EnrichError> {
        let domain = normalize_domain(domain);
        let url = Url::parse(&format!(
            "{domain}/api/v1/users/{}/properties",
            urlencoding::encode(principal_id)
        ))
        .map_err(|e| EnrichError::UpstreamLookup(format!("invalid properties URL: {e}")))?;

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", credential.secret()))
            .map_err(|_| {
                EnrichError::UpstreamLookup("access token is not a valid header value".into())
            })?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let response = self
            .transport
            .execute(HttpRequest {
                url,
                method: Method::GET,
                headers,
                body: Vec::new(),
            })
            .await
            .map_err(|e| match e {
                EnrichError::Transport(e) => {
                    EnrichError::UpstreamLookup(format!("properties request failed: {e}"))
                }
                other => other,
            })?;

        let response = CanonicalResponse::from_transport(response).map_err(|e| {
            EnrichError::UpstreamLookup(format!("properties response is not JSON: {e}"))
        })?;
        if !response.status_code.is_success() {
            return Err(EnrichError::UpstreamLookup(format!(
                "properties endpoint returned {}",
                response.status_code
            )));
        }

        let body: PropertiesBody = serde_json::from_value(response.body).map_err(|e| {
            EnrichError::UpstreamLookup(format!("malformed properties response: {e}"))
        })?;
        let properties = body.properties.unwrap_or_default();

        match properties.iter().find(|p| p.key == property_key) {
            Some(property) => {
                tracing::debug!("found property {}", property_key);
                Ok(property.value_string())
            }
            None => {
                let keys = properties
                    .iter()
                    .map(|p| p.key.as_str())
                    .collect::<Vec<_>>();
                tracing::debug!(
                    "property {} not found, available: [{}]",
                    property_key,
                    keys.join(", ")
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::test_support::ScriptedTransport;

    fn token() -> AccessToken {
        AccessToken::new("mgmt-token".to_string())
    }

    async fn lookup(transport: &ScriptedTransport) -> Result<Option<String>, EnrichError> {
        PropertyResolver::new(transport)
            .lookup("acme.kinde.com", &token(), "kp_123", LAST_KNOWN_SCORE_KEY)
            .await
    }

    #[tokio::test]
    async fn finds_the_exact_key() {
        let transport = ScriptedTransport::new();
        transport.push_parsed(
            StatusCode::OK,
            json!({
                "properties": [
                    { "key": "abuseipdb_last_known_score_old", "value": "7" },
                    { "key": "abuseipdb_last_known_score", "value": "42" },
                ]
            }),
        );

        assert_eq!(lookup(&transport).await.unwrap().as_deref(), Some("42"));

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.url,
            "https://acme.kinde.com/api/v1/users/kp_123/properties"
        );
        assert_eq!(
            request.headers.get(AUTHORIZATION).unwrap(),
            "Bearer mgmt-token"
        );
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let transport = ScriptedTransport::new();
        transport.push_parsed(
            StatusCode::OK,
            json!({ "properties": [{ "key": "kp_usr_city", "value": "Sydney" }] }),
        );
        assert_eq!(lookup(&transport).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_or_null_list_is_empty() {
        let transport = ScriptedTransport::new();
        transport.push_parsed(StatusCode::OK, json!({ "code": "OK" }));
        transport.push_raw(StatusCode::OK, br#"{"properties":null}"#);

        assert_eq!(lookup(&transport).await.unwrap(), None);
        assert_eq!(lookup(&transport).await.unwrap(), None);
    }

    #[tokio::test]
    async fn numeric_values_are_stringified() {
        let transport = ScriptedTransport::new();
        transport.push_parsed(
            StatusCode::OK,
            json!({ "properties": [{ "key": LAST_KNOWN_SCORE_KEY, "value": 12 }] }),
        );
        assert_eq!(lookup(&transport).await.unwrap().as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let transport = ScriptedTransport::new();
        transport.push_parsed(StatusCode::FORBIDDEN, json!({ "errors": [] }));

        let err = lookup(&transport).await.unwrap_err();
        assert!(matches!(err, EnrichError::UpstreamLookup(_)));
    }

    #[tokio::test]
    async fn malformed_body_is_a_failure() {
        let transport = ScriptedTransport::new();
        transport.push_parsed(StatusCode::OK, json!({ "properties": "nope" }));
        transport.push_raw(StatusCode::OK, b"<html></html>");

        assert!(matches!(
            lookup(&transport).await.unwrap_err(),
            EnrichError::UpstreamLookup(_)
        ));
        assert!(matches!(
            lookup(&transport).await.unwrap_err(),
            EnrichError::UpstreamLookup(_)
        ));
    }

    #[tokio::test]
    async fn principal_id_is_escaped() {
        let transport = ScriptedTransport::new();
        transport.push_parsed(StatusCode::OK, json!({ "properties": [] }));

        PropertyResolver::new(&transport)
            .lookup("acme.kinde.com", &token(), "kp/../admin", LAST_KNOWN_SCORE_KEY)
            .await
            .unwrap();
        assert_eq!(
            transport.requests()[0].url,
            "https://acme.kinde.com/api/v1/users/kp%2F..%2Fadmin/properties"
        );
    }
}
