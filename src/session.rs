//! 세션 파생 모듈 — 로그인 응답 하나로부터 작업별 바운드 세션을 만듭니다.
//!
//! ## 흐름
//!
//! 1. [`BoundSession::root`] — 로그인 URL에 묶인 루트 세션 (transport + 인증 상태)
//! 2. [`login`] — 루트 세션으로 Login 트랜잭션 → [`LoginContext`]
//! 3. [`derive_sessions`] — capability URL마다 [`BoundSession`] 하나씩 ([`SessionSet`])
//! 4. [`logout`] — Logout 세션으로 한 번 호출
//!
//! 모든 바운드 세션은 같은 transport(쿠키 저장소)와 같은 HTTP 인증 상태를 공유합니다.
//! 기본 헤더는 `Arc<HeaderSet>`로 공유되며 변경되지 않고,
//! 요청별 헤더는 [`BoundSession::execute`]가 요청 로컬 사본에 병합합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::{
    basic_authorization, compute_ua_auth, digest_header_value, md5_hex, AuthChallenge,
    DigestInput,
};
use crate::constants::{headers, DEFAULT_RETS_VERSION, DEFAULT_USER_AGENT, SESSION_COOKIE};
use crate::error::{RetsError, Result};
use crate::reply::parse_reply;
use crate::transport::{HeaderSet, HttpRequest, HttpResponse, StreamingResponse, Transport};
use crate::types::{Capability, TransactionReply};
use crate::xml::XmlNode;

/// 로그인 자격 증명
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub user_agent_password: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    DEFAULT_RETS_VERSION.to_string()
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            user_agent: None,
            user_agent_password: None,
            version: default_version(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str, password: Option<&str>) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self.user_agent_password = password.map(str::to_string);
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// 설정된 User-Agent, 없으면 기본값
    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    /// 주어진 세션 ID에 대한 UA 다이제스트 (UA 비밀번호가 없으면 `None`)
    pub fn ua_auth(&self, session_id: &str) -> Option<String> {
        compute_ua_auth(
            self.user_agent(),
            self.user_agent_password.as_deref(),
            session_id,
            &self.version,
        )
    }

    /// 모든 요청에 붙는 기본 헤더
    pub fn base_headers(&self, session_id: &str) -> HeaderSet {
        let mut set = HeaderSet::new()
            .with(headers::USER_AGENT, self.user_agent())
            .with(headers::RETS_VERSION, self.version.as_str())
            .with(headers::ACCEPT, "*/*");
        if let Some(digest) = self.ua_auth(session_id) {
            set.set(headers::UA_AUTHORIZATION, digest_header_value(&digest));
        }
        set
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field(
                "user_agent_password",
                &self.user_agent_password.as_ref().map(|_| "<redacted>"),
            )
            .field("version", &self.version)
            .finish()
    }
}

/// HTTP 인증 상태 — 마지막 챌린지와 nonce count
///
/// 쿠키 저장소와 마찬가지로 모든 바운드 세션이 공유합니다.
pub struct SessionAuth {
    credentials: Credentials,
    challenge: Mutex<Option<AuthChallenge>>,
    nonce_count: AtomicU32,
}

impl SessionAuth {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            challenge: Mutex::new(None),
            nonce_count: AtomicU32::new(0),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn current_challenge(&self) -> Option<AuthChallenge> {
        self.challenge
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// 401 응답에서 챌린지를 읽어 저장합니다. 쓸 수 있는 챌린지가 없으면 `false`입니다.
    fn learn(&self, response: &StreamingResponse) -> bool {
        let Some(challenge) = AuthChallenge::select(response.headers_all(headers::WWW_AUTHENTICATE))
        else {
            return false;
        };
        let mut guard = self
            .challenge
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(challenge);
        self.nonce_count.store(0, Ordering::SeqCst);
        true
    }

    /// 저장된 챌린지로 요청의 `Authorization` 값을 계산합니다.
    fn authorization(&self, request: &HttpRequest) -> Option<String> {
        let creds = &self.credentials;
        match self.current_challenge()? {
            AuthChallenge::Basic => Some(basic_authorization(&creds.username, &creds.password)),
            AuthChallenge::Digest(digest) => {
                let nc = self.nonce_count.fetch_add(1, Ordering::SeqCst) + 1;
                let cnonce = client_nonce(nc);
                let uri = request.request_uri();
                let method = request.method.to_string();
                Some(digest.authorization(&DigestInput {
                    username: &creds.username,
                    password: &creds.password,
                    method: &method,
                    uri: &uri,
                    cnonce: &cnonce,
                    nonce_count: nc,
                }))
            }
        }
    }
}

impl fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionAuth")
            .field("credentials", &self.credentials)
            .field("has_challenge", &self.current_challenge().is_some())
            .finish()
    }
}

fn client_nonce(nc: u32) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    md5_hex(&format!("{nanos}:{nc}"))[..16].to_string()
}

/// 한 capability URL에 묶인 요청 템플릿
///
/// `transport`(쿠키 저장소)와 `auth`는 같은 로그인에서 파생된 모든 세션이 공유하고,
/// `headers`는 변경되지 않는 기본 헤더입니다.
#[derive(Debug, Clone)]
pub struct BoundSession {
    capability: Capability,
    url: Url,
    transport: Arc<dyn Transport>,
    headers: Arc<HeaderSet>,
    auth: Arc<SessionAuth>,
}

impl BoundSession {
    /// 로그인 URL에 묶인 루트 세션을 만듭니다. 세션 ID는 아직 비어 있습니다.
    pub fn root(login_url: Url, transport: Arc<dyn Transport>, credentials: Credentials) -> Self {
        let headers = Arc::new(credentials.base_headers(""));
        Self {
            capability: Capability::Login,
            url: login_url,
            transport,
            headers,
            auth: Arc::new(SessionAuth::new(credentials)),
        }
    }

    /// 같은 transport와 인증 상태를 공유하는 새 세션을 만듭니다.
    pub fn bind(&self, capability: Capability, url: Url, headers: Arc<HeaderSet>) -> Self {
        Self {
            capability,
            url,
            transport: Arc::clone(&self.transport),
            headers,
            auth: Arc::clone(&self.auth),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn credentials(&self) -> &Credentials {
        self.auth.credentials()
    }

    /// 두 세션이 같은 transport(쿠키 저장소)를 쓰는지
    pub fn shares_transport_with(&self, other: &BoundSession) -> bool {
        Arc::ptr_eq(&self.transport, &other.transport)
    }

    /// GET 요청을 보내고 본문까지 모두 받습니다.
    ///
    /// - `overlay` 헤더는 기본 헤더의 요청 로컬 사본에 병합됩니다 (기본 헤더는 불변).
    /// - `401`에 새 인증 챌린지가 있으면 그 챌린지로 한 번 다시 보냅니다 (인증 핸드셰이크).
    ///
    /// # 에러
    ///
    /// - [`RetsError::HttpStatus`] — 최종 상태 코드가 200이 아님
    /// - transport가 보고한 모든 에러
    pub async fn execute(
        &self,
        query: Vec<(String, String)>,
        overlay: Option<&HeaderSet>,
    ) -> Result<HttpResponse> {
        self.execute_streaming(query, overlay).await?.collect().await
    }

    /// [`execute`](Self::execute)와 같지만 헤더가 도착하면 바로 돌려줍니다.
    /// 본문은 호출자가 [`StreamingResponse::body`]에서 읽습니다.
    pub async fn execute_streaming(
        &self,
        query: Vec<(String, String)>,
        overlay: Option<&HeaderSet>,
    ) -> Result<StreamingResponse> {
        let headers = match overlay {
            Some(extra) => self.headers.merged(extra),
            None => self.headers.as_ref().clone(),
        };
        let mut request = HttpRequest {
            query,
            headers,
            ..HttpRequest::get(self.url.clone())
        };

        let mut response = self.send_authorized(&mut request).await?;
        if response.status == 401 && self.auth.learn(&response) {
            tracing::debug!(capability = %self.capability, "answering authentication challenge");
            response = self.send_authorized(&mut request).await?;
        }

        if !response.is_ok() {
            return Err(RetsError::HttpStatus {
                status: response.status,
            });
        }
        Ok(response)
    }

    async fn send_authorized(&self, request: &mut HttpRequest) -> Result<StreamingResponse> {
        if let Some(value) = self.auth.authorization(request) {
            request.headers.set(headers::AUTHORIZATION, value);
        }
        tracing::debug!(capability = %self.capability, url = %request.url, "sending request");
        self.transport.send_streaming(request.clone()).await
    }
}

/// 로그인 결과
#[derive(Debug, Clone)]
pub struct LoginContext {
    pub login_url: Url,
    pub capabilities: BTreeMap<Capability, Url>,
    /// capability가 아닌 `RETS-RESPONSE` 항목 (MemberName, User, MetadataVersion 등)
    pub info: BTreeMap<String, String>,
    pub server_version: Option<String>,
    pub server_product: Option<String>,
    pub session_id: Option<String>,
    pub reply: TransactionReply,
}

impl LoginContext {
    /// 로그인 응답에서 capability URL과 서버 정보를 읽습니다.
    ///
    /// 상대 URL은 로그인 URL 기준으로 해석합니다. Login 항목이 없으면 로그인 URL을 씁니다.
    pub fn from_reply(
        login_url: &Url,
        root: &XmlNode,
        reply: TransactionReply,
        response: &HttpResponse,
    ) -> Result<Self> {
        let body = root
            .child("RETS-RESPONSE")
            .map(|node| node.text().to_string())
            .unwrap_or_else(|| root.text().to_string());

        let mut capabilities = BTreeMap::new();
        let mut info = BTreeMap::new();
        for (key, value) in parse_key_values(&body) {
            match Capability::from_key(&key) {
                Some(cap) => {
                    capabilities.insert(cap, login_url.join(&value)?);
                }
                None => {
                    info.insert(key, value);
                }
            }
        }
        capabilities
            .entry(Capability::Login)
            .or_insert_with(|| login_url.clone());

        Ok(Self {
            login_url: login_url.clone(),
            capabilities,
            info,
            server_version: response.header(headers::RETS_VERSION).map(str::to_string),
            server_product: response.header(headers::RETS_SERVER).map(str::to_string),
            session_id: session_id_from_cookies(response),
            reply,
        })
    }

    pub fn url(&self, capability: Capability) -> Option<&Url> {
        self.capabilities.get(&capability)
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains_key(&capability)
    }
}

/// `key=value` 줄 목록을 파싱합니다. `=`가 없는 줄은 건너뜁니다.
pub fn parse_key_values(body: &str) -> Vec<(String, String)> {
    body.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

/// `Set-Cookie` 헤더에서 `RETS-Session-ID` 값을 찾습니다.
pub fn session_id_from_cookies(response: &HttpResponse) -> Option<String> {
    response
        .headers_all(headers::SET_COOKIE)
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
}

/// capability별 바운드 세션 모음
#[derive(Debug, Clone)]
pub struct SessionSet {
    sessions: BTreeMap<Capability, BoundSession>,
}

impl SessionSet {
    pub fn get(&self, capability: Capability) -> Option<&BoundSession> {
        self.sessions.get(&capability)
    }

    /// 없는 capability는 [`RetsError::FeatureUnsupported`]입니다.
    pub fn require(&self, capability: Capability) -> Result<&BoundSession> {
        self.get(capability)
            .ok_or(RetsError::FeatureUnsupported { capability })
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.sessions.keys().copied()
    }
}

/// 로그인 결과의 capability마다 바운드 세션을 만듭니다.
///
/// 모든 세션은 루트 세션의 transport와 인증 상태를 공유하고,
/// 로그인에서 받은 세션 ID로 다시 계산한 기본 헤더를 함께 씁니다.
pub fn derive_sessions(login: &LoginContext, root: &BoundSession) -> SessionSet {
    let session_id = login.session_id.as_deref().unwrap_or_default();
    let headers = Arc::new(root.credentials().base_headers(session_id));
    let sessions = Capability::ALL
        .into_iter()
        .filter_map(|cap| {
            login
                .url(cap)
                .map(|url| (cap, root.bind(cap, url.clone(), Arc::clone(&headers))))
        })
        .collect();
    SessionSet { sessions }
}

/// Login 트랜잭션을 수행합니다.
///
/// # 에러
///
/// - [`RetsError::HttpStatus`] — 인증 실패 등 200이 아닌 응답
/// - [`RetsError::Protocol`] — ReplyCode != 0
/// - [`RetsError::MalformedReply`] — RETS envelope가 아님
pub async fn login(root: &BoundSession) -> Result<LoginContext> {
    let response = root.execute(Vec::new(), None).await?;
    let (node, reply) = parse_reply(&response.text())?;
    let reply = reply.into_result()?;
    let context = LoginContext::from_reply(root.url(), &node, reply, &response)?;
    tracing::info!(
        url = %root.url(),
        capabilities = context.capabilities.len(),
        server_version = ?context.server_version,
        "logged in"
    );
    Ok(context)
}

/// Logout 응답
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogoutInfo {
    pub reply: TransactionReply,
    pub connect_time: Option<String>,
    pub billing: Option<String>,
    pub message: Option<String>,
}

/// Logout 트랜잭션을 수행합니다.
pub async fn logout(session: &BoundSession) -> Result<LogoutInfo> {
    let response = session.execute(Vec::new(), None).await?;
    let (node, reply) = parse_reply(&response.text())?;
    let reply = reply.into_result()?;
    let body = node
        .child("RETS-RESPONSE")
        .map(|n| n.text().to_string())
        .unwrap_or_default();
    let mut info = LogoutInfo {
        reply,
        ..LogoutInfo::default()
    };
    for (key, value) in parse_key_values(&body) {
        match key.to_ascii_lowercase().as_str() {
            "connecttime" => info.connect_time = Some(value),
            "billing" => info.billing = Some(value),
            "signoffmessage" => info.message = Some(value),
            _ => {}
        }
    }
    tracing::info!(url = %session.url(), "logged out");
    Ok(info)
}
