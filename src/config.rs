use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// SMTP relay settings. Nothing here has a compiled-in secret.
#[derive(Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub facilities_csv: PathBuf,
    pub mail: MailConfig,
    /// Contact emails keyed by the provider's environment variable.
    pub provider_emails: Vec<(&'static str, String)>,
}

pub fn model_dir_from_env() -> PathBuf {
    PathBuf::from(std::env::var("MODEL_DIR").unwrap_or_else(|_| "model".to_string()))
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any key/value source; `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &'static str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let listen_addr: SocketAddr = optional("LISTEN_ADDR", "[::1]:50051")
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "LISTEN_ADDR",
                reason: e.to_string(),
            })?;
        let port: u16 = optional("SMTP_PORT", "587")
            .parse()
            .map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                name: "SMTP_PORT",
                reason: e.to_string(),
            })?;

        let username = required("SMTP_USERNAME")?;
        let mail = MailConfig {
            host: optional("SMTP_HOST", "smtp.gmail.com"),
            port,
            password: required("SMTP_PASSWORD")?,
            from: optional("MAIL_FROM", &username),
            username,
        };

        let provider_emails = crate::appointment::provider_email_vars()
            .map(|name| required(name).map(|email| (name, email)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            listen_addr,
            facilities_csv: PathBuf::from(optional("FACILITIES_CSV", "facilities.csv")),
            mail,
            provider_emails,
        })
    }
}
