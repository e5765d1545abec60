use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::probe::SettlementPolicy;

const URL_ENV_VARS: [&str; 2] = ["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];
const FALLBACK_KEY_ENV: &str = "NEXT_PUBLIC_SUPABASE_ANON_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default = "default_anon_key_env")]
    pub anon_key_env: String,
    #[serde(default = "default_probe_table")]
    pub probe_table: String,
    #[serde(default = "default_probe_columns")]
    pub probe_columns: String,
    pub request_timeout_secs: Option<u64>,
}

fn default_anon_key_env() -> String {
    "SUPABASE_ANON_KEY".to_string()
}

fn default_probe_table() -> String {
    "_test".to_string()
}

fn default_probe_columns() -> String {
    "*".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub policy: SettlementPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_service_label")]
    pub service_label: String,
    #[serde(default = "default_tagline")]
    pub tagline: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            service_label: default_service_label(),
            tagline: default_tagline(),
        }
    }
}

fn default_title() -> String {
    "BORIS Killer - Setup Complete".to_string()
}

fn default_service_label() -> String {
    "Supabase".to_string()
}

fn default_tagline() -> String {
    "Ready to build the future of construction management".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub page: PageConfig,
}

impl AppConfig {
    pub fn load_default() -> anyhow::Result<Self> {
        let default = include_str!("../config/default.toml");
        let cfg: AppConfig = toml::from_str(default)?;
        Ok(cfg)
    }

    pub fn load_from(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let p = path.into();
        let s = fs::read_to_string(&p)?;
        let cfg: AppConfig = toml::from_str(&s)?;
        Ok(cfg)
    }

    /// Apply URL and key overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = URL_ENV_VARS.iter().find_map(|name| non_empty(lookup(*name))) {
            tracing::debug!("backend url overridden from environment");
            self.backend.url = url;
        }

        let key = non_empty(lookup(self.backend.anon_key_env.as_str()))
            .or_else(|| non_empty(lookup(FALLBACK_KEY_ENV)));
        if key.is_some() {
            self.backend.anon_key = key;
        }
        self
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
