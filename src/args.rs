use std::{path::PathBuf, time::Duration};

#[derive(clap::Parser, Debug, Clone)]
pub struct Args {
    /// File containing the management API M2M client ID
    /// (overrides KINDE_WF_M2M_CLIENT_ID)
    #[clap(long = "client-id", short = 'i')]
    pub client_id_path: Option<PathBuf>,

    /// File containing the management API M2M client secret
    /// (overrides KINDE_WF_M2M_CLIENT_SECRET)
    #[clap(long = "client-secret", short = 's')]
    pub client_secret_path: Option<PathBuf>,

    /// Identity provider domain: example acme.kinde.com (overrides KINDE_DOMAIN)
    #[clap(long = "domain", short = 'd')]
    pub domain: Option<String>,

    /// Socket address to listen on
    #[clap(long = "listen", short = 'l', default_value = "0.0.0.0:8080")]
    pub http_listen: String,

    /// Seconds to wait for a connection to the identity provider
    #[clap(long = "connect-timeout", default_value_t = 2)]
    pub connect_timeout_secs: u64,

    /// Seconds to wait for any single identity provider request to complete
    #[clap(long = "request-timeout", default_value_t = 5)]
    pub request_timeout_secs: u64,
}

impl Args {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
