//! RETS 클라이언트 — 로그인/로그아웃 순서 관리와 작업 모듈 호출
//!
//! [`RetsClient`]는 로그인 응답에서 파생한 바운드 세션마다 작업 모듈을 하나씩 보관하고,
//! 모든 작업 결과를 [`Dispatcher`]로 콜백과 이벤트 채널에 전달합니다.
//!
//! ## 통신 플로우
//!
//! 1. [`login`](RetsClient::login) — Login 트랜잭션 → capability URL → 바운드 세션 파생
//! 2. [`get_metadata`](RetsClient::get_metadata) / [`search`](RetsClient::search) /
//!    [`get_objects`](RetsClient::get_objects) / [`update`](RetsClient::update)
//! 3. [`logout`](RetsClient::logout) — 한 번 호출 후 클라이언트는 로그인 전 상태로 돌아갑니다.
//!
//! 각 작업에는 완료 콜백을 받는 `_with` 형태가 있습니다.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::ClientConfig;
use crate::dispatch::{Completion, Dispatcher, Operation, RetsEvent};
use crate::error::{Result, RetsError};
use crate::metadata::MetadataModule;
use crate::object::{ObjectModule, ObjectRequest, TransferState};
use crate::search::{SearchModule, SearchRequest};
use crate::session::{self, derive_sessions, BoundSession, LoginContext, LogoutInfo, SessionSet};
use crate::transport::Transport;
use crate::types::{
    Capability, MetadataResponse, MetadataType, ObjectPart, SearchResult, SystemMetadata,
    UpdateResult,
};
use crate::update::{UpdateModule, UpdateRequest};

/// 로그인 이후 상태
#[derive(Debug)]
struct LoggedIn {
    context: Arc<LoginContext>,
    sessions: SessionSet,
    metadata: Option<MetadataModule>,
    search: Option<SearchModule>,
    objects: Option<ObjectModule>,
    update: Option<UpdateModule>,
}

impl LoggedIn {
    fn new(context: LoginContext, sessions: SessionSet) -> Self {
        let bound = |cap: Capability| sessions.get(cap).cloned();
        let metadata = bound(Capability::GetMetadata).map(MetadataModule::new);
        let search = bound(Capability::Search).map(SearchModule::new);
        let objects = bound(Capability::GetObject).map(ObjectModule::new);
        let update = bound(Capability::Update)
            .map(|session| UpdateModule::new(session, context.session_id.as_deref()));
        Self {
            context: Arc::new(context),
            metadata,
            search,
            objects,
            update,
            sessions,
        }
    }

    fn metadata(&self) -> Result<&MetadataModule> {
        self.metadata.as_ref().ok_or(RetsError::FeatureUnsupported {
            capability: Capability::GetMetadata,
        })
    }

    fn search(&self) -> Result<&SearchModule> {
        self.search.as_ref().ok_or(RetsError::FeatureUnsupported {
            capability: Capability::Search,
        })
    }

    fn objects(&self) -> Result<&ObjectModule> {
        self.objects.as_ref().ok_or(RetsError::FeatureUnsupported {
            capability: Capability::GetObject,
        })
    }

    fn update(&self) -> Result<&UpdateModule> {
        self.update.as_ref().ok_or(RetsError::FeatureUnsupported {
            capability: Capability::Update,
        })
    }
}

/// RETS 클라이언트
///
/// 작업 메서드는 `&self`를 받으므로 여러 작업을 동시에 실행할 수 있습니다.
/// 모든 작업은 같은 transport(쿠키 저장소)를 공유합니다.
///
/// # 예시
///
/// ```no_run
/// use retsra::{ClientConfig, Credentials, RetsClient};
/// use retsra::search::SearchRequest;
///
/// # async fn example() -> retsra::Result<()> {
/// let config = ClientConfig::new(
///     "https://rets.example.com/rets/login",
///     Credentials::new("agent", "secret").with_user_agent("MyApp/1.0", Some("ua-secret")),
/// );
/// let mut client = RetsClient::new(config)?;
/// let context = client.login().await?;
/// println!("server: {:?}", context.server_version);
///
/// let result = client
///     .search(&SearchRequest::new("Property", "RE_1", "(ListPrice=300000+)"))
///     .await?;
/// println!("{} listings", result.records.len());
/// client.logout().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RetsClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    state: Option<LoggedIn>,
}

impl RetsClient {
    /// reqwest transport를 쓰는 클라이언트를 생성합니다 *(feature `"client"`)*.
    ///
    /// # 에러
    ///
    /// - [`RetsError::Http`] — HTTP 클라이언트 생성 실패
    #[cfg(feature = "client")]
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = crate::transport::ReqwestTransport::new(config.timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// 사용자 정의 transport로 클라이언트를 생성합니다.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let dispatcher = match config.event_capacity {
            0 => Dispatcher::callbacks_only(),
            capacity => Dispatcher::new(capacity),
        };
        Self {
            config,
            transport,
            dispatcher,
            state: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 이벤트 구독. `event_capacity == 0`이면 `None`입니다.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<RetsEvent>> {
        self.dispatcher.subscribe()
    }

    /// GetObject 전송 상태 구독 (`Requested → StreamingToBuffer → Complete | Failed`)
    ///
    /// 로그인 세션에 묶이므로 다시 로그인하면 새로 구독해야 합니다.
    ///
    /// # 에러
    ///
    /// - [`RetsError::NotLoggedIn`] — 로그인 전
    /// - [`RetsError::FeatureUnsupported`] — 서버가 GetObject를 제공하지 않음
    pub fn subscribe_transfers(&self) -> Result<broadcast::Receiver<TransferState>> {
        self.state()
            .and_then(LoggedIn::objects)
            .map(ObjectModule::subscribe_transfers)
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.is_some()
    }

    pub fn login_context(&self) -> Option<Arc<LoginContext>> {
        self.state.as_ref().map(|s| Arc::clone(&s.context))
    }

    /// 서버가 capability를 제공하는지 (로그인 전에는 항상 `false`)
    pub fn supports(&self, capability: Capability) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| s.sessions.get(capability).is_some())
    }

    fn state(&self) -> Result<&LoggedIn> {
        self.state.as_ref().ok_or(RetsError::NotLoggedIn)
    }

    pub async fn login(&mut self) -> Result<LoginContext> {
        self.login_with(None).await
    }

    /// 로그인하고 작업 모듈을 준비합니다. 이미 로그인되어 있으면 세션을 새로 만듭니다.
    ///
    /// # 에러
    ///
    /// - [`RetsError::InvalidUrl`] — 설정의 로그인 URL 오류
    /// - [`RetsError::HttpStatus`] — 인증 실패 등
    /// - [`RetsError::Protocol`] — ReplyCode != 0
    pub async fn login_with(&mut self, callback: Option<Completion<LoginContext>>) -> Result<LoginContext> {
        let outcome = self.establish().await;
        self.dispatcher.deliver(Operation::Login, outcome, callback)
    }

    async fn establish(&mut self) -> Result<LoginContext> {
        let root = BoundSession::root(
            self.config.login_url()?,
            Arc::clone(&self.transport),
            self.config.credentials.clone(),
        );
        let context = session::login(&root).await?;
        let sessions = derive_sessions(&context, &root);
        if !context.supports(Capability::Update) {
            tracing::warn!(url = %root.url(), "server does not advertise Update; updates are disabled");
        }
        self.state = Some(LoggedIn::new(context.clone(), sessions));
        Ok(context)
    }

    pub async fn logout(&mut self) -> Result<LogoutInfo> {
        self.logout_with(None).await
    }

    /// 로그아웃합니다. 결과와 상관없이 클라이언트는 로그인 전 상태가 됩니다.
    ///
    /// # 에러
    ///
    /// - [`RetsError::NotLoggedIn`] — 로그인하지 않았거나 이미 로그아웃함 (요청 없음)
    /// - [`RetsError::FeatureUnsupported`] — 서버가 Logout URL을 제공하지 않음
    pub async fn logout_with(&mut self, callback: Option<Completion<LogoutInfo>>) -> Result<LogoutInfo> {
        let outcome = match self.state.take() {
            None => Err(RetsError::NotLoggedIn),
            Some(state) => match state.sessions.require(Capability::Logout) {
                Ok(session) => session::logout(session).await,
                Err(err) => Err(err),
            },
        };
        self.dispatcher.deliver(Operation::Logout, outcome, callback)
    }

    pub async fn get_metadata(&self, metadata_type: MetadataType, id: &str) -> Result<MetadataResponse> {
        self.get_metadata_with(metadata_type, id, None).await
    }

    pub async fn get_metadata_with(
        &self,
        metadata_type: MetadataType,
        id: &str,
        callback: Option<Completion<MetadataResponse>>,
    ) -> Result<MetadataResponse> {
        let outcome = match self.state().and_then(LoggedIn::metadata) {
            Ok(module) => module.get_metadata(metadata_type, id, None).await,
            Err(err) => Err(err),
        };
        self.dispatcher.deliver(Operation::GetMetadata, outcome, callback)
    }

    pub async fn get_system(&self) -> Result<SystemMetadata> {
        self.get_system_with(None).await
    }

    pub async fn get_system_with(&self, callback: Option<Completion<SystemMetadata>>) -> Result<SystemMetadata> {
        let outcome = match self.state().and_then(LoggedIn::metadata) {
            Ok(module) => module.get_system().await,
            Err(err) => Err(err),
        };
        self.dispatcher.deliver(Operation::GetMetadata, outcome, callback)
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        self.search_with(request, None).await
    }

    pub async fn search_with(
        &self,
        request: &SearchRequest,
        callback: Option<Completion<SearchResult>>,
    ) -> Result<SearchResult> {
        let outcome = match self.state().and_then(LoggedIn::search) {
            Ok(module) => module.search(request).await,
            Err(err) => Err(err),
        };
        self.dispatcher.deliver(Operation::Search, outcome, callback)
    }

    pub async fn get_objects(&self, request: &ObjectRequest) -> Result<Vec<ObjectPart>> {
        self.get_objects_with(request, None).await
    }

    pub async fn get_objects_with(
        &self,
        request: &ObjectRequest,
        callback: Option<Completion<Vec<ObjectPart>>>,
    ) -> Result<Vec<ObjectPart>> {
        let outcome = match self.state().and_then(LoggedIn::objects) {
            Ok(module) => module.get_objects(request).await,
            Err(err) => Err(err),
        };
        self.dispatcher.deliver(Operation::GetObject, outcome, callback)
    }

    pub async fn get_photos(&self, resource: &str, id: &str) -> Result<Vec<ObjectPart>> {
        self.get_photos_with(resource, id, None).await
    }

    pub async fn get_photos_with(
        &self,
        resource: &str,
        id: &str,
        callback: Option<Completion<Vec<ObjectPart>>>,
    ) -> Result<Vec<ObjectPart>> {
        let outcome = match self.state().and_then(LoggedIn::objects) {
            Ok(module) => module.get_photos(resource, id).await,
            Err(err) => Err(err),
        };
        self.dispatcher.deliver(Operation::GetObject, outcome, callback)
    }

    pub async fn update(&self, request: &UpdateRequest) -> Result<UpdateResult> {
        self.update_with(request, None).await
    }

    /// Update 트랜잭션
    ///
    /// # 에러
    ///
    /// - [`RetsError::FeatureUnsupported`] — 서버가 Update URL을 제공하지 않음 (요청 없음)
    pub async fn update_with(
        &self,
        request: &UpdateRequest,
        callback: Option<Completion<UpdateResult>>,
    ) -> Result<UpdateResult> {
        let outcome = match self.state().and_then(LoggedIn::update) {
            Ok(module) => module.update(request).await,
            Err(err) => Err(err),
        };
        self.dispatcher.deliver(Operation::Update, outcome, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session::Credentials;
    use crate::transport::testing::{xml_response, ScriptedTransport};
    use crate::types::MetadataPayload;
    use std::sync::Mutex;

    const LOGIN_BODY: &str = "<RETS ReplyCode=\"0\" ReplyText=\"Success\"><RETS-RESPONSE>\n\
        Search=/rets/search\n\
        GetMetadata=/rets/getMetadata\n\
        Logout=/rets/logout\n\
        </RETS-RESPONSE></RETS>";

    fn client(responses: Vec<crate::transport::HttpResponse>) -> (RetsClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(responses));
        let config = ClientConfig::new("http://rets.example.com/rets/login", Credentials::new("u", "p"));
        (RetsClient::with_transport(config, transport.clone()), transport)
    }

    #[tokio::test]
    async fn test_operations_before_login_are_invalid_state() {
        let (mut client, transport) = client(Vec::new());
        let err = client
            .search(&SearchRequest::new("Property", "RE_1", "(A=1)"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let err = client.logout().await.unwrap_err();
        assert!(matches!(err, RetsError::NotLoggedIn));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_update_without_capability_is_feature_unsupported() {
        let (mut client, transport) = client(vec![xml_response(LOGIN_BODY)]);
        client.login().await.unwrap();
        assert!(client.is_logged_in());
        assert!(!client.supports(Capability::Update));

        let err = client
            .update(&UpdateRequest::new("Property", "RE_1", "Change").field("ListingID", "L1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetsError::FeatureUnsupported {
                capability: Capability::Update
            }
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_callback_and_event_receive_metadata() {
        let (mut client, _) = client(vec![
            xml_response(LOGIN_BODY),
            xml_response(
                "<RETS ReplyCode=\"0\"><METADATA><METADATA-RESOURCE Version=\"1\">\
                 <COLUMNS>\tResourceID\t</COLUMNS><DATA>\tProperty\t</DATA>\
                 </METADATA-RESOURCE></METADATA></RETS>",
            ),
        ]);
        let mut events = client.subscribe().unwrap();
        client.login().await.unwrap();

        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        let callback: Completion<MetadataResponse> = Box::new(move |r| {
            *sink.lock().unwrap() = r.as_ref().map(|m| m.records().len()).unwrap_or_default();
        });
        let resp = client
            .get_metadata_with(MetadataType::Resource, "0", Some(callback))
            .await
            .unwrap();
        assert!(matches!(resp.payload, MetadataPayload::Records(ref r) if r.len() == 1));
        assert_eq!(*seen.lock().unwrap(), 1);

        assert_eq!(events.try_recv().unwrap().operation(), Operation::Login);
        let event = events.try_recv().unwrap();
        assert_eq!(event.operation(), Operation::GetMetadata);
        assert_eq!(event.name(), "success");
    }

    #[tokio::test]
    async fn test_logout_invalidates_client() {
        let (mut client, transport) = client(vec![
            xml_response(LOGIN_BODY),
            xml_response("<RETS ReplyCode=\"0\" ReplyText=\"Goodbye\"/>"),
        ]);
        client.login().await.unwrap();
        let info = client.logout().await.unwrap();
        assert_eq!(info.reply.reply_text, "Goodbye");
        assert_eq!(
            transport.last_request().url.as_str(),
            "http://rets.example.com/rets/logout"
        );

        assert!(!client.is_logged_in());
        assert!(client.login_context().is_none());
        assert!(matches!(client.logout().await, Err(RetsError::NotLoggedIn)));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_callbacks_only_client_has_no_event_channel() {
        let transport = Arc::new(ScriptedTransport::new(Vec::new()));
        let config = ClientConfig::new("http://rets.example.com/login", Credentials::new("u", "p"))
            .with_event_capacity(0);
        let client = RetsClient::with_transport(config, transport);
        assert!(client.subscribe().is_none());
    }
}
