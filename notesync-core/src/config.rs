use serde::Deserialize;

use crate::Result;

/// Client configuration, read from `NOTESYNC_*` environment variables.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub backend_url: String,
    pub anon_key: String,
    pub audit_url: Option<String>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_email_domain")]
    pub email_domain: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub log_json: bool,
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_email_domain() -> String {
    "notesync.com".into()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Config {
    pub const ENV_PREFIX: &'static str = "NOTESYNC_";

    pub fn new(backend_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            anon_key: anon_key.into(),
            audit_url: None,
            poll_interval_secs: default_poll_interval_secs(),
            email_domain: default_email_domain(),
            request_timeout_secs: default_request_timeout_secs(),
            log_json: false,
        }
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::prefixed(Self::ENV_PREFIX).from_env::<Self>()?;

        Ok(config)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::prefixed(Self::ENV_PREFIX).from_iter(vars)?)
    }
}
