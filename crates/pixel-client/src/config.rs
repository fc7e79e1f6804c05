use url::Url;

pub const BACKEND_URL_VAR: &str = "PIXEL_BACKEND_URL";
pub const ANON_KEY_VAR: &str = "PIXEL_ANON_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is unset")]
    Missing(&'static str),

    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },

    #[error("{0} must be an http:// or https:// URL")]
    UnsupportedScheme(&'static str),
}

/// Where the backend lives and the key to present to it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Always ends in `/` so relative joins append instead of replacing.
    pub backend_url: Url,
    pub anon_key: String,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_url = required(&lookup, BACKEND_URL_VAR)?;
        let anon_key = required(&lookup, ANON_KEY_VAR)?;

        let mut backend_url = Url::parse(&raw_url).map_err(|source| ConfigError::InvalidUrl {
            name: BACKEND_URL_VAR,
            source,
        })?;
        if !matches!(backend_url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(BACKEND_URL_VAR));
        }
        if !backend_url.path().ends_with('/') {
            let path = format!("{}/", backend_url.path());
            backend_url.set_path(&path);
        }

        Ok(Self {
            backend_url,
            anon_key,
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}
