use std::path::PathBuf;
use std::time::Duration;

use actix_web::http::Uri;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "https://frontend-plant.vercel.app";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("could not resolve upload directory: {0}")]
    UploadDir(#[source] std::io::Error),
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    pub allowed_origin: String,
    pub upload_dir: PathBuf,
    pub classifier_program: String,
    pub classifier_args: Vec<String>,
    /// `None` waits on the classifier forever.
    pub classifier_timeout: Option<Duration>,
    pub retain_uploads: bool,
    pub public_base_url: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("GATEWAY_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                var: "GATEWAY_PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let classifier_timeout = match get("GATEWAY_CLASSIFIER_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    var: "GATEWAY_CLASSIFIER_TIMEOUT_SECS",
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => Some(Duration::from_secs(60)),
        };

        let retain_uploads = match get("GATEWAY_RETAIN_UPLOADS") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "GATEWAY_RETAIN_UPLOADS",
                value: raw.clone(),
                reason: "expected true/false".to_string(),
            })?,
            None => false,
        };

        let allowed_origin = match get("GATEWAY_ALLOWED_ORIGIN") {
            Some(raw) => {
                validate_origin(raw.trim()).map_err(|reason| ConfigError::Invalid {
                    var: "GATEWAY_ALLOWED_ORIGIN",
                    value: raw.clone(),
                    reason,
                })?;
                raw.trim().to_string()
            }
            None => DEFAULT_ALLOWED_ORIGIN.to_string(),
        };

        let upload_dir = PathBuf::from(get("GATEWAY_UPLOAD_DIR").unwrap_or_else(|| "uploads".into()));
        let upload_dir = if upload_dir.is_absolute() {
            upload_dir
        } else {
            std::env::current_dir()
                .map_err(ConfigError::UploadDir)?
                .join(upload_dir)
        };

        let classifier_args = get("GATEWAY_CLASSIFIER_ARGS")
            .unwrap_or_else(|| "inference.py".into())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let public_base_url = get("GATEWAY_PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            bind: get("GATEWAY_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            allowed_origin,
            upload_dir,
            classifier_program: get("GATEWAY_CLASSIFIER_PROGRAM").unwrap_or_else(|| "python".into()),
            classifier_args,
            classifier_timeout,
            retain_uploads,
            public_base_url,
        })
    }
}

/// A CORS origin is exactly `scheme://host[:port]`.
fn validate_origin(origin: &str) -> Result<(), String> {
    if origin == "*" {
        return Err("wildcard is not allowed, name a single origin".to_string());
    }
    let uri = origin.parse::<Uri>().map_err(|e| e.to_string())?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err("expected scheme://host[:port]".to_string());
    }
    if origin.ends_with('/') || uri.path() != "/" || uri.query().is_some() {
        return Err("an origin has no path or query".to_string());
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
