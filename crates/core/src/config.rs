use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `FUNNEL_ENGINE__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub funnel: FunnelConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Session carts held before the least recently used one is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Idle time after which a session cart is dropped.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// ─── Funnel Config ──────────────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
pub struct FunnelConfig {
    /// JSON file holding the funnel graphs to seed the store with.
    #[serde(default)]
    pub graph_path: Option<String>,
    /// JSON file holding the product and coupon catalog.
    #[serde(default)]
    pub catalog_path: Option<String>,
    /// Upper bound on decision nodes visited while resolving one step.
    #[serde(default = "default_max_decision_hops")]
    pub max_decision_hops: usize,
}

// ─── Auth Config ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_secret")]
    pub token_secret: String,
    #[serde(default = "default_enforce")]
    pub enforce: bool,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_max_decision_hops() -> usize { 64 }
/// Shipped token secret. Only fit for local development.
pub const DEFAULT_TOKEN_SECRET: &str = "funnel-dev-secret";

fn default_token_secret() -> String { DEFAULT_TOKEN_SECRET.to_string() }
fn default_max_sessions() -> usize { 10_000 }
fn default_session_ttl_secs() -> u64 { 3600 }
fn default_enforce() -> bool { true }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            max_sessions: default_max_sessions(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            graph_path: None,
            catalog_path: None,
            max_decision_hops: default_max_decision_hops(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
            enforce: default_enforce(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            funnel: FunnelConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Tokens are enforced but signed with the shipped secret.
    pub fn uses_default_secret(&self) -> bool {
        self.enforce && self.token_secret == DEFAULT_TOKEN_SECRET
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("FUNNEL_ENGINE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(","),
            )
            .build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert_eq!(config.funnel.max_decision_hops, 64);
        assert!(config.auth.enforce);
        assert!(config.funnel.graph_path.is_none());
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"auth": {"enforce": false}}"#).unwrap();
        assert!(!config.auth.enforce);
        assert_eq!(config.auth.token_secret, "funnel-dev-secret");
        assert_eq!(config.node_id, "node-01");
        assert_eq!(config.api.max_sessions, 10_000);
    }

    #[test]
    fn test_uses_default_secret() {
        let mut auth = AuthConfig::default();
        assert!(auth.uses_default_secret());

        auth.enforce = false;
        assert!(!auth.uses_default_secret());

        auth.enforce = true;
        auth.token_secret = "rotated".into();
        assert!(!auth.uses_default_secret());
    }
}
