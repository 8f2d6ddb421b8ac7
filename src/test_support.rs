//! Fakes for exercising the workflow without a real identity provider.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode as AxumStatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use openidconnect::{HttpRequest, HttpResponse};
use reqwest::{header::HeaderMap, Method, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::{
    error::EnrichError,
    transport::{Transport, TransportResponse},
};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: String,
}

/// Replays queued responses in order and records what was sent.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_parsed(&self, status_code: StatusCode, data: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(TransportResponse::Parsed { status_code, data });
    }

    pub fn push_raw(&self, status_code: StatusCode, body: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .push_back(TransportResponse::Raw(HttpResponse {
                status_code,
                headers: HeaderMap::new(),
                body: body.to_vec(),
            }));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<TransportResponse, EnrichError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url.to_string(),
            headers: request.headers,
            body: String::from_utf8_lossy(&request.body).into_owned(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| EnrichError::UpstreamLookup("no scripted response left".into()))
    }
}

/// Canned behaviour for [`spawn_idp_stub`].
#[derive(Clone)]
pub struct IdpStub {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    /// Properties per principal id.
    pub properties: HashMap<String, Value>,
    pub hits: Arc<Mutex<Vec<String>>>,
}

impl IdpStub {
    pub fn new(principal_id: &str, score: &str) -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            principal_id.to_string(),
            json!([
                { "key": "kp_usr_city", "value": "Sydney" },
                { "key": "abuseipdb_last_known_score", "value": score },
            ]),
        );
        Self {
            client_id: "m2m-client".to_string(),
            client_secret: "m2m-secret".to_string(),
            access_token: "stub-access-token".to_string(),
            properties,
            hits: Arc::default(),
        }
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

async fn token(
    State(stub): State<IdpStub>,
    Form(form): Form<HashMap<String, String>>,
) -> (AxumStatusCode, Json<Value>) {
    stub.hits.lock().unwrap().push("token".to_string());
    let valid = form.get("grant_type").map(String::as_str) == Some("client_credentials")
        && form.get("client_id") == Some(&stub.client_id)
        && form.get("client_secret") == Some(&stub.client_secret);
    if !valid {
        return (
            AxumStatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "invalid_client",
                "error_description": "Client authentication failed",
            })),
        );
    }
    (
        AxumStatusCode::OK,
        Json(json!({
            "access_token": stub.access_token,
            "token_type": "bearer",
            "expires_in": 86399,
        })),
    )
}

async fn properties(
    State(stub): State<IdpStub>,
    Path(user_id): Path<String>,
    headers: axum::http::HeaderMap,
) -> (AxumStatusCode, Json<Value>) {
    stub.hits.lock().unwrap().push(format!("properties:{user_id}"));
    let expected = format!("Bearer {}", stub.access_token);
    let authorized = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str());
    if !authorized {
        return (
            AxumStatusCode::UNAUTHORIZED,
            Json(json!({ "errors": [{ "code": "UNAUTHORIZED" }] })),
        );
    }
    match stub.properties.get(&user_id) {
        Some(list) => (
            AxumStatusCode::OK,
            Json(json!({ "code": "OK", "properties": list })),
        ),
        None => (
            AxumStatusCode::NOT_FOUND,
            Json(json!({ "errors": [{ "code": "USER_INVALID" }] })),
        ),
    }
}

/// Serve `stub` on an ephemeral local port and return its base URL.
pub async fn spawn_idp_stub(stub: IdpStub) -> String {
    let app = Router::new()
        .route("/oauth2/token", post(token))
        .route("/api/v1/users/:id/properties", get(properties))
        .with_state(stub);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{addr}")
}

/// Accepts connections and never answers. Sockets stay open so callers see a
/// stall, not a reset.
pub async fn spawn_stalled_listener() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}
