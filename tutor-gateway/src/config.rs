//! Gateway configuration from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tutor_executor::{BackendKind, SandboxConfig};

/// Default session lifetime: seven days.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Configuration errors, reported at start-up.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Runtime settings for the gateway binary.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    /// PostgreSQL URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// Development mode: cookies are sent without `Secure`.
    pub dev_mode: bool,
    pub session_ttl: chrono::Duration,
    pub sandbox_backend: BackendKind,
    pub sandbox: SandboxConfig,
    /// Email promoted to admin at start-up.
    pub bootstrap_admin: Option<String>,
    /// How often expired sessions and idle rate-limit windows are swept.
    pub sweep_interval: Duration,
    /// Where uploaded profile photos are stored.
    pub avatar_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database_url: None,
            dev_mode: false,
            session_ttl: chrono::Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            sandbox_backend: BackendKind::Docker,
            sandbox: SandboxConfig::default(),
            bootstrap_admin: None,
            sweep_interval: Duration::from_secs(5 * 60),
            avatar_dir: PathBuf::from("avatars"),
        }
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment, after loading `.env`.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for any unparsable variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] for any unparsable variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(addr) = var("TUTOR_LISTEN_ADDR") {
            config.listen_addr = parse("TUTOR_LISTEN_ADDR", &addr)?;
        }
        config.database_url = var("DATABASE_URL");
        if let Some(dev) = var("TUTOR_DEV") {
            config.dev_mode = parse_flag("TUTOR_DEV", &dev)?;
        }
        if let Some(ttl) = var("TUTOR_SESSION_TTL_SECS") {
            let secs: i64 = parse("TUTOR_SESSION_TTL_SECS", &ttl)?;
            if secs <= 0 {
                return Err(invalid("TUTOR_SESSION_TTL_SECS", "must be positive"));
            }
            config.session_ttl = chrono::Duration::seconds(secs);
        }
        if let Some(secs) = var("TUTOR_RUN_TIMEOUT_SECS") {
            let secs: u64 = parse("TUTOR_RUN_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(invalid("TUTOR_RUN_TIMEOUT_SECS", "must be positive"));
            }
            config.sandbox.default_timeout = Duration::from_secs(secs);
        }
        if let Some(runs) = var("TUTOR_MAX_CONCURRENT_RUNS") {
            let runs: usize = parse("TUTOR_MAX_CONCURRENT_RUNS", &runs)?;
            if runs == 0 {
                return Err(invalid("TUTOR_MAX_CONCURRENT_RUNS", "must be positive"));
            }
            config.sandbox.max_concurrent_runs = runs;
        }
        if let Some(backend) = var("TUTOR_SANDBOX_BACKEND") {
            config.sandbox_backend = backend
                .parse()
                .map_err(|reason| ConfigError::Invalid { var: "TUTOR_SANDBOX_BACKEND", reason })?;
        }
        if let Some(image) = var("TUTOR_SANDBOX_IMAGE") {
            config.sandbox.image = image;
        }
        if let Some(dir) = var("TUTOR_SCRATCH_DIR") {
            config.sandbox.scratch_root = Some(PathBuf::from(dir));
        }
        config.bootstrap_admin = var("TUTOR_BOOTSTRAP_ADMIN");
        if let Some(dir) = var("TUTOR_AVATAR_DIR") {
            config.avatar_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

fn invalid(var: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid { var, reason: reason.to_owned() }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid { var, reason: e.to_string() })
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let env: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        GatewayConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = match config_from(&[]) {
            Ok(c) => c,
            Err(e) => panic!("defaults must parse: {e}"),
        };
        assert_eq!(config.listen_addr.port(), 8080);
        assert!(config.database_url.is_none());
        assert!(!config.dev_mode);
        assert_eq!(config.session_ttl, chrono::Duration::days(7));
        assert_eq!(config.sandbox_backend, BackendKind::Docker);
        assert_eq!(config.sandbox.default_timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_applied() {
        let config = match config_from(&[
            ("TUTOR_LISTEN_ADDR", "0.0.0.0:9000"),
            ("TUTOR_DEV", "1"),
            ("TUTOR_SESSION_TTL_SECS", "3600"),
            ("TUTOR_RUN_TIMEOUT_SECS", "3"),
            ("TUTOR_MAX_CONCURRENT_RUNS", "8"),
            ("TUTOR_SANDBOX_BACKEND", "process"),
            ("TUTOR_SANDBOX_IMAGE", "golang:1.23"),
            ("TUTOR_BOOTSTRAP_ADMIN", "root@example.com"),
            ("TUTOR_AVATAR_DIR", "/srv/tutor/photos"),
        ]) {
            Ok(c) => c,
            Err(e) => panic!("overrides must parse: {e}"),
        };
        assert_eq!(config.listen_addr.port(), 9000);
        assert!(config.dev_mode);
        assert_eq!(config.session_ttl, chrono::Duration::hours(1));
        assert_eq!(config.sandbox.default_timeout, Duration::from_secs(3));
        assert_eq!(config.sandbox.max_concurrent_runs, 8);
        assert_eq!(config.sandbox_backend, BackendKind::Process);
        assert_eq!(config.sandbox.image, "golang:1.23");
        assert_eq!(config.bootstrap_admin.as_deref(), Some("root@example.com"));
        assert_eq!(config.avatar_dir, PathBuf::from("/srv/tutor/photos"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("TUTOR_LISTEN_ADDR", "nowhere")]).is_err());
        assert!(config_from(&[("TUTOR_SESSION_TTL_SECS", "-5")]).is_err());
        assert!(config_from(&[("TUTOR_MAX_CONCURRENT_RUNS", "0")]).is_err());
        assert!(config_from(&[("TUTOR_SANDBOX_BACKEND", "vm")]).is_err());
        assert!(config_from(&[("TUTOR_DEV", "maybe")]).is_err());
    }
}
