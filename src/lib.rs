//! # retsra
//!
//! RETS (Real Estate Transaction Standard) 프로토콜 클라이언트 라이브러리.
//!
//! 로그인 응답 하나로부터 작업별 바운드 세션을 만들고,
//! Search / GetMetadata / GetObject / Update 트랜잭션의 요청과 응답 디코딩을 처리합니다.
//!
//! ## 모듈 구조
//!
//! - [`constants`] — 헤더 이름, 기본값, 응답 코드 상수
//! - [`error`] — 에러 타입 계층 구조 ([`RetsError`], [`ErrorKind`])
//! - [`types`] — 공유 타입 정의 ([`TransactionReply`], [`MetadataRecord`], [`Capability`] 등)
//! - [`auth`] — UA / 위임 다이제스트, HTTP Digest·Basic 챌린지 응답
//! - [`xml`] — XML 트리 ([`XmlNode`](xml::XmlNode))
//! - [`compact`] — compact 포맷 디코딩 ([`decode_compact`](compact::decode_compact))
//! - [`reply`] — RETS envelope 검증 ([`validate`](reply::validate))
//! - [`transport`] — HTTP transport 추상화 ([`Transport`])
//! - [`session`] — 자격 증명, 로그인, 세션 파생 ([`derive_sessions`](session::derive_sessions))
//! - [`metadata`] / [`search`] / [`object`] / [`update`] — 작업 모듈
//! - [`multipart`] — multipart 본문 분리
//! - [`dispatch`] — 결과 전달 (콜백 + 이벤트)
//! - [`config`] — 클라이언트 설정 ([`ClientConfig`])
//! - [`client`] — 클라이언트 ([`RetsClient`])
//!
//! ## 사용 예시
//!
//! ```rust
//! use retsra::auth::compute_ua_auth;
//! use retsra::compact::decode_delimiter;
//! use retsra::reply::parse_reply;
//!
//! let (_, reply) = parse_reply(r#"<RETS ReplyCode="20201" ReplyText="No Records Found"/>"#).unwrap();
//! assert_eq!(reply.reply_code, 20201);
//! assert!(!reply.is_success());
//!
//! assert_eq!(decode_delimiter("09").unwrap(), '\t');
//! assert!(compute_ua_auth("MyApp/1.0", None, "SID", "RETS/1.7.2").is_none());
//! ```

pub mod auth;
pub mod client;
pub mod compact;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod metadata;
pub mod multipart;
pub mod object;
pub mod reply;
pub mod search;
pub mod session;
pub mod transport;
pub mod types;
pub mod update;
pub mod xml;

// NOTE: Selective re-export — only expose commonly used types
pub use client::RetsClient;
pub use config::ClientConfig;
pub use dispatch::{Completion, RetsEvent};
pub use error::{ErrorKind, Result, RetsError};
pub use session::{Credentials, LoginContext, LogoutInfo};
pub use transport::Transport;
#[cfg(feature = "client")]
pub use transport::ReqwestTransport;
pub use types::{
    Capability, MetadataRecord, MetadataResponse, MetadataType, ObjectPart, SearchResult,
    SystemMetadata, TransactionId, TransactionReply, UpdateResult,
};
