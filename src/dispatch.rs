//! 결과 전달 모듈 — 작업 결과 하나를 콜백과 이벤트 두 채널로 나눠 보냅니다.
//!
//! 디코딩은 한 번만 수행되고, 만들어진 결과 값(`Result<T>`)을 그대로:
//!
//! 1. 호출자가 넘긴 완료 콜백([`Completion`])에 빌려주고,
//! 2. 구독자가 있으면 [`RetsEvent`]로 브로드캐스트하고,
//! 3. 호출자에게 소유권째 돌려줍니다.
//!
//! 두 채널은 서로 독립적으로 선택 사항입니다.

use tokio::sync::broadcast;

use crate::error::{ErrorKind, Result, RetsError};
use crate::session::{LoginContext, LogoutInfo};
use crate::types::{
    MetadataResponse, ObjectPart, SearchResult, SystemMetadata, TransactionReply, UpdateResult,
};

/// 호출별 완료 콜백
pub type Completion<T> = Box<dyn FnOnce(&Result<T>) + Send>;

/// 결과를 만든 작업
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Logout,
    GetMetadata,
    Search,
    GetObject,
    Update,
}

/// 성공 이벤트의 본문
#[derive(Debug, Clone)]
pub enum EventPayload {
    Login(Box<LoginContext>),
    Logout(LogoutInfo),
    Metadata(Box<MetadataResponse>),
    System(Box<SystemMetadata>),
    Search(Box<SearchResult>),
    Objects(Vec<ObjectPart>),
    Update(Box<UpdateResult>),
}

impl From<LoginContext> for EventPayload {
    fn from(value: LoginContext) -> Self {
        EventPayload::Login(Box::new(value))
    }
}

impl From<LogoutInfo> for EventPayload {
    fn from(value: LogoutInfo) -> Self {
        EventPayload::Logout(value)
    }
}

impl From<MetadataResponse> for EventPayload {
    fn from(value: MetadataResponse) -> Self {
        EventPayload::Metadata(Box::new(value))
    }
}

impl From<SystemMetadata> for EventPayload {
    fn from(value: SystemMetadata) -> Self {
        EventPayload::System(Box::new(value))
    }
}

impl From<SearchResult> for EventPayload {
    fn from(value: SearchResult) -> Self {
        EventPayload::Search(Box::new(value))
    }
}

impl From<Vec<ObjectPart>> for EventPayload {
    fn from(value: Vec<ObjectPart>) -> Self {
        EventPayload::Objects(value)
    }
}

impl From<UpdateResult> for EventPayload {
    fn from(value: UpdateResult) -> Self {
        EventPayload::Update(Box::new(value))
    }
}

/// 실패 이벤트의 본문. 디코딩된 응답이 있으면 함께 실립니다.
#[derive(Debug, Clone)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    pub reply: Option<TransactionReply>,
}

impl From<&RetsError> for Failure {
    fn from(err: &RetsError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            reply: err.reply().cloned(),
        }
    }
}

/// 클라이언트가 발행하는 이벤트
#[derive(Debug, Clone)]
pub enum RetsEvent {
    Success {
        operation: Operation,
        payload: EventPayload,
    },
    Failure {
        operation: Operation,
        failure: Failure,
    },
}

impl RetsEvent {
    /// 이벤트 이름 (`"success"` / `"failure"`)
    pub fn name(&self) -> &'static str {
        match self {
            RetsEvent::Success { .. } => "success",
            RetsEvent::Failure { .. } => "failure",
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            RetsEvent::Success { operation, .. } | RetsEvent::Failure { operation, .. } => *operation,
        }
    }
}

/// 결과 전달기
///
/// 이벤트 채널이 없는 전달기([`Dispatcher::callbacks_only`])는 콜백만 호출합니다.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    events: Option<broadcast::Sender<RetsEvent>>,
}

impl Dispatcher {
    /// `capacity` 크기의 이벤트 채널을 가진 전달기
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { events: Some(tx) }
    }

    pub fn callbacks_only() -> Self {
        Self { events: None }
    }

    /// 이벤트 구독. 이벤트 채널이 없으면 `None`입니다.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<RetsEvent>> {
        self.events.as_ref().map(broadcast::Sender::subscribe)
    }

    /// 결과를 콜백과 이벤트 채널에 전달하고 그대로 돌려줍니다.
    pub fn deliver<T>(&self, operation: Operation, outcome: Result<T>, callback: Option<Completion<T>>) -> Result<T>
    where
        T: Clone + Into<EventPayload>,
    {
        if let Some(callback) = callback {
            callback(&outcome);
        }
        if let Some(tx) = self.events.as_ref().filter(|tx| tx.receiver_count() > 0) {
            let event = match &outcome {
                Ok(value) => RetsEvent::Success {
                    operation,
                    payload: value.clone().into(),
                },
                Err(err) => RetsEvent::Failure {
                    operation,
                    failure: Failure::from(err),
                },
            };
            // NOTE: Send only fails when every receiver dropped between the check and the send
            if tx.send(event).is_err() {
                tracing::debug!(?operation, "event dropped: no active subscribers");
            }
        }
        if let Err(err) = &outcome {
            tracing::debug!(?operation, kind = ?err.kind(), error = %err, "operation failed");
        }
        outcome
    }
}
