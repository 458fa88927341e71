//! RETS 클라이언트의 에러 타입 계층 구조를 정의합니다.
//!
//! 모든 에러는 [`RetsError`] enum으로 표현되며, [`thiserror`]를 통해
//! `Display` 및 `Error` 트레이트가 자동 구현됩니다.
//! 각 변형은 [`RetsError::kind`]로 7가지 [`ErrorKind`] 중 하나에 대응합니다.

use crate::types::{Capability, TransactionReply};

/// 에러 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    /// 필수 호출 인자 누락 (I/O 이전에 검사)
    InvalidArgument,
    /// 로그인 전 호출, 또는 서버가 제공하지 않는 기능 호출
    InvalidState,
    /// 네트워크/HTTP 계층 실패 또는 200이 아닌 상태 코드
    TransportError,
    /// RETS envelope 또는 필수 속성이 없는 XML
    MalformedReply,
    /// 형식은 올바르지만 ReplyCode가 0이 아닌 응답
    ProtocolError,
    /// multipart boundary를 해석할 수 없는 객체 응답
    MalformedContentType,
    /// compact 행 불일치, 예상치 못한 노드 형태
    DecodeError,
}

/// RETS 클라이언트의 최상위 에러 타입
///
/// HTTP/네트워크 에러 변형 중 reqwest 래핑은 feature `"client"` 활성화 시에만 포함됩니다.
#[derive(Debug, thiserror::Error)]
pub enum RetsError {
    /// 필수 인자 누락 또는 잘못된 값
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// URL 파싱 실패
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// 로그인되지 않은 상태에서 요청 시도
    #[error("not logged in: login must succeed before this operation")]
    NotLoggedIn,

    /// 서버가 해당 capability URL을 제공하지 않음
    #[error("server does not support the {capability} transaction")]
    FeatureUnsupported { capability: Capability },

    /// HTTP 클라이언트 에러 (reqwest 래핑)
    #[cfg(feature = "client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 사용자 정의 transport가 보고한 실패
    #[error("transport error: {0}")]
    Transport(String),

    /// 예기치 않은 HTTP 상태 코드
    #[error("unexpected HTTP status: {status}")]
    HttpStatus { status: u16 },

    /// RETS envelope 누락 또는 ReplyCode 속성 누락
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// XML 파싱 실패
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    /// ReplyCode != 0 인 응답. 디코딩된 응답 전체를 보존합니다.
    #[error("RETS protocol error: {}", describe_reply(.0))]
    Protocol(Box<TransactionReply>),

    /// Content-Type에서 multipart boundary를 찾을 수 없음
    #[error("malformed content type: {0}")]
    MalformedContentType(String),

    /// 행의 필드 수가 컬럼 수와 다름
    #[error("ragged compact row {row}: expected {expected} fields, got {actual}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// DELIMITER 값이 두 자리 16진수가 아님
    #[error("invalid delimiter encoding: {value:?}")]
    InvalidDelimiter { value: String },

    /// 그 밖의 디코딩 실패
    #[error("decode error: {0}")]
    Decode(String),
}

impl RetsError {
    /// 에러 분류를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RetsError::InvalidArgument(_) | RetsError::InvalidUrl(_) => ErrorKind::InvalidArgument,
            RetsError::NotLoggedIn | RetsError::FeatureUnsupported { .. } => ErrorKind::InvalidState,
            #[cfg(feature = "client")]
            RetsError::Http(_) => ErrorKind::TransportError,
            RetsError::Transport(_) | RetsError::HttpStatus { .. } => ErrorKind::TransportError,
            RetsError::MalformedReply(_) | RetsError::Xml(_) => ErrorKind::MalformedReply,
            RetsError::Protocol(_) => ErrorKind::ProtocolError,
            RetsError::MalformedContentType(_) => ErrorKind::MalformedContentType,
            RetsError::RaggedRow { .. } | RetsError::InvalidDelimiter { .. } | RetsError::Decode(_) => {
                ErrorKind::DecodeError
            }
        }
    }

    /// ProtocolError가 담고 있는 디코딩된 응답
    pub fn reply(&self) -> Option<&TransactionReply> {
        match self {
            RetsError::Protocol(reply) => Some(reply),
            _ => None,
        }
    }
}

/// 구조화된 에러가 있으면 첫 항목을, 없으면 `"<replyText> (<replyCode>)"`를 씁니다.
fn describe_reply(reply: &TransactionReply) -> String {
    match reply.errors.first() {
        Some(entry) => format!(
            "{} ({}): {} [field {}, code {}]",
            reply.reply_text,
            reply.reply_code,
            entry.text,
            entry.field,
            entry.code_text()
        ),
        None => format!("{} ({})", reply.reply_text, reply.reply_code),
    }
}

/// [`RetsError`]를 사용하는 편의 Result 타입 별칭
pub type Result<T> = std::result::Result<T, RetsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorEntry;

    fn reply(code: i32, text: &str) -> TransactionReply {
        TransactionReply {
            reply_code: code,
            reply_text: text.to_string(),
            ..TransactionReply::default()
        }
    }

    #[test]
    fn test_protocol_error_plain_message() {
        let err = RetsError::Protocol(Box::new(reply(20203, "Miscellaneous search error")));
        assert_eq!(
            err.to_string(),
            "RETS protocol error: Miscellaneous search error (20203)"
        );
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
        assert_eq!(err.reply().map(|r| r.reply_code), Some(20203));
    }

    #[test]
    fn test_protocol_error_with_entries() {
        let mut r = reply(20022, "Update failed");
        r.errors.push(ErrorEntry {
            field: "ListPrice".to_string(),
            code: 20302,
            offset: 0,
            text: "required".to_string(),
            ..ErrorEntry::default()
        });
        let err = RetsError::Protocol(Box::new(r));
        assert!(err.to_string().contains("required"));
        assert!(err.to_string().contains("ListPrice"));
    }

    #[test]
    fn test_state_kinds() {
        assert_eq!(RetsError::NotLoggedIn.kind(), ErrorKind::InvalidState);
        let err = RetsError::FeatureUnsupported {
            capability: Capability::Update,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.to_string(), "server does not support the Update transaction");
    }

    #[test]
    fn test_url_error_conversion() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let err: RetsError = url_err.into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_ragged_row_display() {
        let err = RetsError::RaggedRow {
            row: 2,
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.to_string(), "ragged compact row 2: expected 3 fields, got 4");
        assert_eq!(err.kind(), ErrorKind::DecodeError);
    }

    #[test]
    fn test_http_status_display() {
        let err = RetsError::HttpStatus { status: 401 };
        assert_eq!(err.to_string(), "unexpected HTTP status: 401");
        assert_eq!(err.kind(), ErrorKind::TransportError);
    }
}
