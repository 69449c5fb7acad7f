use crate::cipher;
use crate::errors::HTTPError;

use std::time::Duration;

/// Client configuration.
///
/// ```rust
/// use awake_https::Config;
/// use std::time::Duration;
///
/// let config = Config::builder()
///     .with_timeout(Duration::from_secs(5))
///     .with_max_redirects(3)
///     .build()
///     .expect("invalid config");
/// assert_eq!(config.max_redirects, 3);
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// How long the synchronous wrapper waits for progress before giving up.
    pub timeout: Duration,

    pub user_agent: String,
    pub accept: String,
    pub accept_charset: String,

    /// Follow same-host 301, 302 and 303 responses on the open connection.
    pub follow_redirects: bool,
    pub max_redirects: usize,

    /// Report 4xx and 5xx responses as errors instead of returning them.
    pub fail_on_status: bool,

    /// Cipher suites offered in the ClientHello, most preferred first.
    pub cipher_suites: Vec<cipher::CipherName>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("awake-https/", env!("CARGO_PKG_VERSION")).to_string(),
            accept: "*/*".to_string(),
            accept_charset: "utf-8".to_string(),
            follow_redirects: true,
            max_redirects: 10,
            fail_on_status: true,
            cipher_suites: cipher::SUPPORTED.to_vec(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.config.user_agent = user_agent.to_string();
        self
    }

    pub fn with_accept(mut self, accept: &str, accept_charset: &str) -> Self {
        self.config.accept = accept.to_string();
        self.config.accept_charset = accept_charset.to_string();
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.max_redirects = max_redirects;
        self
    }

    pub fn with_fail_on_status(mut self, fail: bool) -> Self {
        self.config.fail_on_status = fail;
        self
    }

    pub fn with_cipher_suites(mut self, cipher_suites: &[cipher::CipherName]) -> Self {
        self.config.cipher_suites = cipher_suites.to_vec();
        self
    }

    pub fn build(self) -> Result<Config, HTTPError> {
        if self.config.timeout == Duration::from_secs(0) {
            return Err(HTTPError::InvalidConfig("timeout must be non-zero"));
        }
        if self.config.cipher_suites.is_empty() {
            return Err(HTTPError::InvalidConfig("no cipher suites"));
        }
        if !self.config.cipher_suites.iter().all(|suite| cipher::is_supported(*suite)) {
            return Err(HTTPError::InvalidConfig("unsupported cipher suite"));
        }
        if [&self.config.user_agent, &self.config.accept, &self.config.accept_charset]
            .iter()
            .any(|value| value.contains('\r') || value.contains('\n'))
        {
            return Err(HTTPError::InvalidConfig("header values may not contain line breaks"));
        }
        Ok(self.config)
    }
}
