//! 클라이언트 설정
//!
//! 코드에서 직접 만들거나, serde로 역직렬화하거나, `RETS_*` 환경 변수에서 읽습니다.
//!
//! | 환경 변수 | 필드 |
//! |-----------|------|
//! | `RETS_LOGIN_URL` | `login_url` (필수) |
//! | `RETS_USERNAME` / `RETS_PASSWORD` | 자격 증명 (필수) |
//! | `RETS_USER_AGENT` / `RETS_USER_AGENT_PASSWORD` | UA 인증 |
//! | `RETS_VERSION` | 프로토콜 버전 |
//! | `RETS_TIMEOUT_SECS` | 요청 타임아웃 |

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::constants::{DEFAULT_EVENT_CAPACITY, DEFAULT_TIMEOUT_SECS};
use crate::error::{Result, RetsError};
use crate::session::Credentials;

/// [`RetsClient`](crate::RetsClient) 설정
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub login_url: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 이벤트 채널 용량. `0`이면 이벤트 채널 없이 콜백만 사용합니다.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl ClientConfig {
    pub fn new(login_url: &str, credentials: Credentials) -> Self {
        Self {
            login_url: login_url.to_string(),
            credentials,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 파싱된 로그인 URL
    pub fn login_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.login_url)?)
    }

    /// `RETS_*` 환경 변수에서 설정을 읽습니다.
    ///
    /// # 에러
    ///
    /// - [`RetsError::InvalidArgument`] — 필수 변수 누락 또는 숫자가 아닌 타임아웃
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| RetsError::InvalidArgument(format!("environment variable {key} is not set")))
        };

        let mut credentials = Credentials::new(&required("RETS_USERNAME")?, &required("RETS_PASSWORD")?);
        credentials.user_agent = lookup("RETS_USER_AGENT");
        credentials.user_agent_password = lookup("RETS_USER_AGENT_PASSWORD");
        if let Some(version) = lookup("RETS_VERSION") {
            credentials.version = version;
        }

        let mut config = Self::new(&required("RETS_LOGIN_URL")?, credentials);
        if let Some(raw) = lookup("RETS_TIMEOUT_SECS") {
            config.timeout_secs = raw
                .trim()
                .parse()
                .map_err(|_| RetsError::InvalidArgument(format!("RETS_TIMEOUT_SECS {raw:?} is not a number")))?;
        }
        Ok(config)
    }
}
