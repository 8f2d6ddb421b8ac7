use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{claims::ClaimBuilder, config::ConfigSource, transport::Transport};

/// How the identity provider should register this workflow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    pub id: &'static str,
    pub name: &'static str,
    pub trigger: &'static str,
    pub failure_policy: FailurePolicy,
    pub bindings: &'static [&'static str],
}

#[derive(Debug, Clone, Serialize)]
pub struct FailurePolicy {
    pub action: &'static str,
}

pub const WORKFLOW_SETTINGS: WorkflowSettings = WorkflowSettings {
    id: "abuseIpdbTokenGeneration",
    name: "Add AbuseIPDB configuration and abuse score to ID token claims",
    trigger: "user:tokens_generation",
    failure_policy: FailurePolicy { action: "stop" },
    bindings: &["kinde.idToken", "kinde.env", "kinde.fetch"],
};

/// One token issuance. The host owns it; the workflow only writes claims.
#[derive(Debug, Clone)]
pub struct TokenGeneratedEvent {
    pub user_id: String,
    pub id_token: Map<String, Value>,
}

#[derive(Clone)]
pub struct Workflow {
    source: Arc<dyn ConfigSource>,
    transport: Arc<dyn Transport>,
}

impl Workflow {
    pub fn new(source: Arc<dyn ConfigSource>, transport: Arc<dyn Transport>) -> Self {
        Self { source, transport }
    }

    /// Resolve the five claims and write them onto the event's ID token.
    ///
    /// This cannot fail. Anything that goes wrong along the way ends up as a
    /// null claim and a warning in the log.
    pub async fn on_token_generated(&self, event: &mut TokenGeneratedEvent) {
        let builder = ClaimBuilder::new(self.source.as_ref(), self.transport.as_ref());
        let claims = builder.build(&event.user_id).await;
        tracing::debug!("claims for user {}: {:?}", event.user_id, claims);
        claims.apply(&mut event.id_token);
    }
}
