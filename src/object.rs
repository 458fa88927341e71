//! GetObject 작업 모듈 — 사진 및 미디어 객체 조회
//!
//! 요청: `Type=Photo`, `ID=<listing>:<object>`, `Resource=Property`, `Location=1`, `Accept: image/*`
//!
//! ## 응답 형태
//!
//! | Content-Type | 처리 |
//! |--------------|------|
//! | `multipart/*; boundary=...` | 파트마다 [`ObjectPart`] 하나 |
//! | `text/xml` | RETS 응답으로 검증 (ReplyCode != 0 이면 에러) |
//! | 그 밖 | 바이너리 파트 하나 (객체 헤더는 HTTP 헤더에서 읽음) |
//!
//! 전송 단계는 [`TransferState`]로 추적합니다:
//! `Requested → StreamingToBuffer → Complete | Failed`

use std::collections::BTreeMap;

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::constants::{headers, IMAGE_ACCEPT, PHOTO_TYPE, TRANSFER_EVENT_CAPACITY};
use crate::error::{ErrorKind, Result, RetsError};
use crate::multipart::{self, Part};
use crate::reply::parse_reply;
use crate::session::BoundSession;
use crate::transport::{decode_text, HeaderSet, HttpResponse};
use crate::types::ObjectPart;

/// GetObject 요청 파라미터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRequest {
    pub resource: String,
    pub object_type: String,
    /// `"<listing>:<object>"`, `"<listing>:*"` 등
    pub id: String,
    /// `true`면 바이너리 대신 URL(Location 헤더)만 요청
    pub location: bool,
}

impl ObjectRequest {
    pub fn new(resource: &str, object_type: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            object_type: object_type.to_string(),
            id: id.to_string(),
            location: true,
        }
    }

    pub fn with_location(mut self, location: bool) -> Self {
        self.location = location;
        self
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("resource", &self.resource),
            ("object type", &self.object_type),
            ("id", &self.id),
        ] {
            if value.trim().is_empty() {
                return Err(RetsError::InvalidArgument(format!("object {name} is required")));
            }
        }
        Ok(())
    }

    fn query(&self) -> Vec<(String, String)> {
        vec![
            ("Type".to_string(), self.object_type.clone()),
            ("ID".to_string(), self.id.clone()),
            ("Resource".to_string(), self.resource.clone()),
            ("Location".to_string(), if self.location { "1" } else { "0" }.to_string()),
        ]
    }
}

/// 객체 전송 단계
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Requested,
    /// 응답 헤더 도착, 본문 버퍼링 중
    StreamingToBuffer { content_type: Option<String> },
    Complete { parts: usize },
    Failed { kind: ErrorKind },
}

/// 요청 하나의 전송 상태 추적기
///
/// 상태가 바뀔 때마다 구독자가 있으면 새 상태를 보냅니다.
#[derive(Debug, Clone)]
pub struct ObjectTransfer {
    state: TransferState,
    observer: Option<broadcast::Sender<TransferState>>,
}

impl Default for ObjectTransfer {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTransfer {
    pub fn new() -> Self {
        Self {
            state: TransferState::Requested,
            observer: None,
        }
    }

    fn observed(observer: &broadcast::Sender<TransferState>) -> Self {
        let transfer = Self {
            state: TransferState::Requested,
            observer: Some(observer.clone()),
        };
        transfer.publish();
        transfer
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    /// 응답 헤더 도착 — Content-Type을 기록합니다.
    pub fn headers_received(&mut self, content_type: Option<&str>) {
        self.advance(TransferState::StreamingToBuffer {
            content_type: content_type.map(str::to_string),
        });
    }

    /// 결과에 따라 `Complete` 또는 `Failed`로 끝냅니다.
    pub fn finish(&mut self, outcome: &Result<Vec<ObjectPart>>) {
        let next = match outcome {
            Ok(parts) => TransferState::Complete { parts: parts.len() },
            Err(err) => TransferState::Failed { kind: err.kind() },
        };
        self.advance(next);
    }

    fn advance(&mut self, next: TransferState) {
        tracing::trace!(from = ?self.state, to = ?next, "object transfer");
        self.state = next;
        self.publish();
    }

    fn publish(&self) {
        if let Some(tx) = self.observer.as_ref().filter(|tx| tx.receiver_count() > 0) {
            // NOTE: Send fails only when every receiver dropped after the check
            let _ = tx.send(self.state.clone());
        }
    }
}

/// GetObject 세션에 묶인 모듈
#[derive(Debug, Clone)]
pub struct ObjectModule {
    session: BoundSession,
    transfers: broadcast::Sender<TransferState>,
}

impl ObjectModule {
    pub fn new(session: BoundSession) -> Self {
        let (transfers, _) = broadcast::channel(TRANSFER_EVENT_CAPACITY);
        Self { session, transfers }
    }

    pub fn session(&self) -> &BoundSession {
        &self.session
    }

    /// 이후 전송들의 상태 변화를 구독합니다.
    ///
    /// 요청마다 `Requested → StreamingToBuffer → Complete | Failed` 순서로 전달됩니다.
    /// 인자 검사에서 실패한 요청은 전송을 시작하지 않으므로 아무 상태도 보내지 않습니다.
    pub fn subscribe_transfers(&self) -> broadcast::Receiver<TransferState> {
        self.transfers.subscribe()
    }

    /// 객체를 요청합니다. 응답 본문은 있는 그대로 분리합니다.
    ///
    /// # 에러
    ///
    /// - [`RetsError::InvalidArgument`] — 빈 resource / type / id (요청 전 검사)
    /// - [`RetsError::MalformedContentType`] — multipart인데 boundary가 없음
    /// - [`RetsError::Protocol`] — 단일 `text/xml` 응답의 ReplyCode != 0 (예: 20403)
    pub async fn get_objects(&self, request: &ObjectRequest) -> Result<Vec<ObjectPart>> {
        self.fetch(request, false).await
    }

    /// 매물 사진 URL을 조회합니다 (`Type=Photo`, `Location=1`).
    ///
    /// 본문이 비어 있는 파트를 채우기 위해 분리 전에 빈 줄마다 합성 성공 envelope를 넣습니다.
    pub async fn get_photos(&self, resource: &str, id: &str) -> Result<Vec<ObjectPart>> {
        let request = ObjectRequest::new(resource, PHOTO_TYPE, id);
        self.fetch(&request, true).await
    }

    async fn fetch(&self, request: &ObjectRequest, fill_empty_parts: bool) -> Result<Vec<ObjectPart>> {
        request.validate()?;
        let mut transfer = ObjectTransfer::observed(&self.transfers);
        let outcome = self.download(request, fill_empty_parts, &mut transfer).await;
        transfer.finish(&outcome);
        outcome
    }

    async fn download(
        &self,
        request: &ObjectRequest,
        fill_empty_parts: bool,
        transfer: &mut ObjectTransfer,
    ) -> Result<Vec<ObjectPart>> {
        let overlay = HeaderSet::new().with(headers::ACCEPT, IMAGE_ACCEPT);
        let streaming = self
            .session
            .execute_streaming(request.query(), Some(&overlay))
            .await?;
        transfer.headers_received(streaming.header(headers::CONTENT_TYPE));

        let response = streaming.collect().await?;
        let parts = decode_object_response(&response, fill_empty_parts)?;
        tracing::debug!(
            resource = %request.resource,
            id = %request.id,
            bytes = response.body.len(),
            parts = parts.len(),
            "objects received"
        );
        Ok(parts)
    }
}

/// GetObject 응답을 파트 목록으로 디코딩합니다.
///
/// `fill_empty_parts`가 `true`면 multipart 분리 전에
/// [`multipart::insert_empty_part_envelopes`]를 적용합니다.
pub fn decode_object_response(response: &HttpResponse, fill_empty_parts: bool) -> Result<Vec<ObjectPart>> {
    let content_type = response.header(headers::CONTENT_TYPE).unwrap_or_default();

    if multipart::is_multipart(content_type) {
        let boundary = multipart::boundary_from_content_type(content_type)?;
        let parts = if fill_empty_parts {
            multipart::split(&multipart::insert_empty_part_envelopes(&response.body), &boundary)?
        } else {
            multipart::split(&response.body, &boundary)?
        };
        return parts.into_iter().map(object_part).collect();
    }

    if is_xml(content_type) {
        let (_, reply) = parse_reply(&response.text())?;
        let reply = reply.into_result()?;
        return Ok(vec![ObjectPart {
            content_type: Some(content_type.to_string()),
            reply: Some(reply),
            ..single_part_headers(response)
        }]);
    }

    Ok(vec![ObjectPart {
        data: response.body.clone(),
        ..single_part_headers(response)
    }])
}

fn is_xml(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case("text/xml") || essence.eq_ignore_ascii_case("application/xml")
}

/// 본문 앞부분이 RETS envelope인지
fn looks_like_envelope(body: &[u8]) -> bool {
    let trimmed = body.trim_ascii_start();
    trimmed.starts_with(b"<RETS")
        || (trimmed.starts_with(b"<?xml") && trimmed.windows(5).any(|w| w == b"<RETS"))
}

fn describe(headers: BTreeMap<String, String>) -> ObjectPart {
    let lookup = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };
    ObjectPart {
        content_id: lookup("Content-ID"),
        object_id: lookup("Object-ID"),
        content_type: lookup("Content-Type"),
        location: lookup("Location"),
        description: lookup("Content-Description"),
        preferred: lookup("Preferred").is_some_and(|v| v.trim() == "1"),
        headers,
        ..ObjectPart::default()
    }
}

fn single_part_headers(response: &HttpResponse) -> ObjectPart {
    describe(response.headers.iter().cloned().collect())
}

fn object_part(part: Part) -> Result<ObjectPart> {
    let Part { headers, body } = part;
    let mut object = describe(headers.into_iter().collect());

    let stripped = multipart::strip_synthetic_envelope(&body);
    // NOTE: A part that held only the synthetic envelope still reports its success reply
    let envelope = if stripped.trim_ascii().is_empty() {
        &body[..]
    } else {
        stripped
    };

    if looks_like_envelope(envelope) {
        let text = decode_text(envelope);
        let (_, reply) = parse_reply(&text)?;
        if !reply.is_success() {
            tracing::debug!(
                object_id = ?object.object_id,
                code = reply.reply_code,
                "object part carries a failure reply"
            );
        }
        object.reply = Some(reply);
    } else {
        object.data = Bytes::copy_from_slice(stripped);
    }
    Ok(object)
}

/// 파트의 응답이 실패인지 (응답이 없으면 성공으로 간주)
pub fn part_failed(part: &ObjectPart) -> bool {
    part.reply.as_ref().is_some_and(|r| !r.is_success())
}
