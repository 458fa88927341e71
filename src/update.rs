//! Update 작업 모듈 — 레코드 추가/변경
//!
//! 요청 쿼리:
//!
//! | 파라미터 | 값 |
//! |----------|----|
//! | `Resource` | `Property` 등 |
//! | `ClassName` | `RE_1` 등 |
//! | `Type` | 업데이트 타입 (`Add`, `Change` ...) |
//! | `Validate` | `0` (적용) / `1` (검증만) |
//! | `Delimiter` | 구분자의 두 자리 16진수 (`7C` = `|`) |
//! | `Record` | `field=value`를 구분자로 이은 문자열 |
//!
//! 위임 인증 값이 모두 주어지면 `X-Delegate-ID`, `X-Delegate-Authorization` 헤더를
//! 호출마다 새로 계산해 요청 로컬 헤더에만 붙입니다. 세션의 기본 헤더는 바뀌지 않습니다.

use std::fmt;

use crate::auth::{compute_delegate_auth, digest_header_value};
use crate::compact::{decode_rows, encode_delimiter};
use crate::constants::{headers, DEFAULT_UPDATE_DELIMITER};
use crate::error::{Result, RetsError};
use crate::reply::parse_reply;
use crate::session::BoundSession;
use crate::transport::HeaderSet;
use crate::types::UpdateResult;

/// 위임 인증 입력. 세 값이 모두 있을 때만 헤더를 만듭니다.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Delegation {
    pub id: Option<String>,
    pub password: Option<String>,
    pub hash: Option<String>,
}

impl Delegation {
    pub fn new(id: &str, password: &str, hash: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            password: Some(password.to_string()),
            hash: Some(hash.to_string()),
        }
    }

    /// `(id, password, hash)` — 하나라도 없으면 `None`
    fn complete(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.id.as_deref()?,
            self.password.as_deref()?,
            self.hash.as_deref()?,
        ))
    }
}

impl fmt::Debug for Delegation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegation")
            .field("id", &self.id)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("hash", &self.hash.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Update 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub resource: String,
    pub class_name: String,
    pub update_type: String,
    /// 순서가 유지되는 `field=value` 쌍
    pub fields: Vec<(String, String)>,
    pub delimiter: char,
    /// `true`면 `Validate=1` (서버가 검증만 수행)
    pub validate_only: bool,
    pub delegation: Option<Delegation>,
}

impl UpdateRequest {
    pub fn new(resource: &str, class_name: &str, update_type: &str) -> Self {
        Self {
            resource: resource.to_string(),
            class_name: class_name.to_string(),
            update_type: update_type.to_string(),
            fields: Vec::new(),
            delimiter: DEFAULT_UPDATE_DELIMITER,
            validate_only: false,
            delegation: None,
        }
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_delegation(mut self, delegation: Delegation) -> Self {
        self.delegation = Some(delegation);
        self
    }

    pub fn validate_only(mut self, validate_only: bool) -> Self {
        self.validate_only = validate_only;
        self
    }

    /// `Record` 파라미터 값
    pub fn record(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string())
    }

    fn check(&self) -> Result<()> {
        for (name, value) in [
            ("resource", &self.resource),
            ("class name", &self.class_name),
            ("type", &self.update_type),
        ] {
            if value.trim().is_empty() {
                return Err(RetsError::InvalidArgument(format!("update {name} is required")));
            }
        }
        if self.fields.is_empty() {
            return Err(RetsError::InvalidArgument("update record has no fields".into()));
        }
        if let Some((name, _)) = self
            .fields
            .iter()
            .find(|(name, value)| name.contains(self.delimiter) || value.contains(self.delimiter))
        {
            return Err(RetsError::InvalidArgument(format!(
                "field {name:?} contains the record delimiter {:?}",
                self.delimiter
            )));
        }
        Ok(())
    }

    fn query(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![
            ("Resource".to_string(), self.resource.clone()),
            ("ClassName".to_string(), self.class_name.clone()),
            ("Type".to_string(), self.update_type.clone()),
            (
                "Validate".to_string(),
                if self.validate_only { "1" } else { "0" }.to_string(),
            ),
            ("Delimiter".to_string(), encode_delimiter(self.delimiter)?),
            ("Record".to_string(), self.record()),
        ])
    }
}

/// Update 세션에 묶인 모듈
#[derive(Debug, Clone)]
pub struct UpdateModule {
    session: BoundSession,
    session_id: String,
}

impl UpdateModule {
    /// `session_id`는 위임 인증 계산에 쓰는 로그인 세션 ID입니다.
    pub fn new(session: BoundSession, session_id: Option<&str>) -> Self {
        Self {
            session,
            session_id: session_id.unwrap_or_default().to_string(),
        }
    }

    pub fn session(&self) -> &BoundSession {
        &self.session
    }

    /// 이 요청에만 붙는 위임 헤더
    pub fn delegation_headers(&self, delegation: &Delegation) -> Option<HeaderSet> {
        let (id, password, hash) = delegation.complete()?;
        // NOTE: Without a UA password the UA digest is the empty string
        let ua_digest = self
            .session
            .credentials()
            .ua_auth(&self.session_id)
            .unwrap_or_default();
        let digest = compute_delegate_auth(&ua_digest, password, hash, id);
        Some(
            HeaderSet::new()
                .with(headers::DELEGATE_ID, id)
                .with(headers::DELEGATE_AUTHORIZATION, digest_header_value(&digest)),
        )
    }

    /// Update 트랜잭션을 수행합니다.
    ///
    /// # 에러
    ///
    /// - [`RetsError::InvalidArgument`] — 필수 값 누락, 필드에 구분자 포함 (요청 전 검사)
    /// - [`RetsError::Protocol`] — ReplyCode != 0. ERRORBLOCK 항목이 응답에 담깁니다.
    pub async fn update(&self, request: &UpdateRequest) -> Result<UpdateResult> {
        request.check()?;
        let query = request.query()?;
        let overlay = match &request.delegation {
            Some(delegation) => {
                let overlay = self.delegation_headers(delegation);
                if overlay.is_none() {
                    tracing::debug!("incomplete delegation inputs; sending without delegate headers");
                }
                overlay
            }
            None => None,
        };

        let response = self.session.execute(query, overlay.as_ref()).await?;
        let result = decode_update(&response.text())?;
        tracing::debug!(
            resource = %request.resource,
            class = %request.class_name,
            records = result.records.len(),
            "update applied"
        );
        Ok(result)
    }
}

/// Update 응답을 디코딩합니다.
pub fn decode_update(text: &str) -> Result<UpdateResult> {
    let (root, reply) = parse_reply(text)?;
    let reply = reply.into_result()?;
    let (_, records) = decode_rows(&root, "DATA", reply.delimiter)?;
    Ok(UpdateResult { reply, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::compute_ua_auth;
    use crate::constants::DEFAULT_RETS_VERSION;
    use crate::session::Credentials;
    use crate::transport::testing::{xml_response, ScriptedTransport};
    use crate::types::{Capability, TransactionId};
    use std::sync::Arc;
    use url::Url;

    const UPDATE_OK: &str = "<RETS ReplyCode=\"0\" ReplyText=\"Success\">\
        <TRANSACTIONID value=\"tx-77\"/>\
        <DELIMITER value=\"09\"/>\
        <COLUMNS>\tListingID\tListPrice\t</COLUMNS>\
        <DATA>\tL100\t250000\t</DATA>\
        </RETS>";

    fn module(responses: Vec<crate::transport::HttpResponse>) -> (UpdateModule, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(responses));
        let root = BoundSession::root(
            Url::parse("http://rets.example.com/login").unwrap(),
            transport.clone(),
            Credentials::new("u", "p").with_user_agent("Agent/1.0", Some("uapw")),
        );
        let session = root.bind(
            Capability::Update,
            Url::parse("http://rets.example.com/update").unwrap(),
            Arc::new(root.headers().clone()),
        );
        (UpdateModule::new(session, Some("SID1")), transport)
    }

    #[test]
    fn test_delegation_debug_redacts_secrets() {
        let shown = format!("{:?}", Delegation::new("agent7", "s3cret", "h4sh"));
        assert!(shown.contains("agent7"));
        assert!(!shown.contains("s3cret"));
        assert!(!shown.contains("h4sh"));
    }

    #[test]
    fn test_record_joined_with_delimiter() {
        let req = UpdateRequest::new("Property", "RE_1", "Change")
            .field("ListingID", "L100")
            .field("ListPrice", "250000");
        assert_eq!(req.record(), "ListingID=L100|ListPrice=250000");
        let query = req.query().unwrap();
        assert!(query.contains(&("Delimiter".into(), "7C".into())));
        assert!(query.contains(&("Validate".into(), "0".into())));
    }

    #[test]
    fn test_field_containing_delimiter_rejected() {
        let req = UpdateRequest::new("Property", "RE_1", "Change").field("Remarks", "a|b");
        assert!(matches!(req.check(), Err(RetsError::InvalidArgument(_))));
    }

    #[test]
    fn test_decode_update_records_and_transaction_id() {
        let result = decode_update(UPDATE_OK).unwrap();
        assert_eq!(
            result.reply.transaction_id,
            Some(TransactionId::Attribute("tx-77".into()))
        );
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].get("ListPrice"), Some("250000"));
    }

    #[test]
    fn test_decode_update_error_block() {
        let body = "<RETS ReplyCode=\"20302\" ReplyText=\"Validation failed\">\
            <ERRORBLOCK><ERRORDATA>\tListPrice\t20401\t0\tPrice must be positive\t</ERRORDATA></ERRORBLOCK>\
            </RETS>";
        let err = decode_update(body).unwrap_err();
        let reply = err.reply().unwrap();
        assert_eq!(reply.errors.len(), 1);
        assert_eq!(reply.errors[0].field, "ListPrice");
        assert_eq!(reply.errors[0].code, 20401);
    }

    #[test]
    fn test_delegation_headers_use_ua_digest() {
        let (module, _) = module(Vec::new());
        let set = module
            .delegation_headers(&Delegation::new("agent7", "dpw", "h1"))
            .unwrap();
        let ua = compute_ua_auth("Agent/1.0", Some("uapw"), "SID1", DEFAULT_RETS_VERSION).unwrap();
        let expected = compute_delegate_auth(&ua, "dpw", "h1", "agent7");
        assert_eq!(set.get("X-Delegate-ID"), Some("agent7"));
        assert_eq!(
            set.get("X-Delegate-Authorization"),
            Some(format!("Digest {expected}").as_str())
        );
    }

    #[test]
    fn test_incomplete_delegation_has_no_headers() {
        let (module, _) = module(Vec::new());
        let partial = Delegation {
            id: Some("agent7".into()),
            ..Delegation::default()
        };
        assert!(module.delegation_headers(&partial).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_their_own_delegation() {
        let (module, transport) = module(vec![xml_response(UPDATE_OK), xml_response(UPDATE_OK)]);
        let first = UpdateRequest::new("Property", "RE_1", "Change")
            .field("ListingID", "L1")
            .with_delegation(Delegation::new("alice", "pw-a", "ha"));
        let second = UpdateRequest::new("Property", "RE_1", "Change")
            .field("ListingID", "L2")
            .with_delegation(Delegation::new("bob", "pw-b", "hb"));

        let (a, b) = tokio::join!(module.update(&first), module.update(&second));
        a.unwrap();
        b.unwrap();

        let requests = transport.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        for req in &requests {
            let record = req
                .query
                .iter()
                .find(|(k, _)| k == "Record")
                .map(|(_, v)| v.as_str())
                .unwrap();
            let id = req.headers.get("X-Delegate-ID").unwrap();
            let expected = if record == "ListingID=L1" { "alice" } else { "bob" };
            assert_eq!(id, expected);
            let auth = req.headers.get("X-Delegate-Authorization").unwrap();
            let own = module
                .delegation_headers(&if expected == "alice" {
                    Delegation::new("alice", "pw-a", "ha")
                } else {
                    Delegation::new("bob", "pw-b", "hb")
                })
                .unwrap();
            assert_eq!(Some(auth), own.get("X-Delegate-Authorization"));
        }
        assert!(!module.session().headers().contains("X-Delegate-ID"));
    }

    #[tokio::test]
    async fn test_update_without_fields_rejected_before_io() {
        let (module, transport) = module(Vec::new());
        let err = module
            .update(&UpdateRequest::new("Property", "RE_1", "Add"))
            .await
            .unwrap_err();
        assert!(matches!(err, RetsError::InvalidArgument(_)));
        assert_eq!(transport.request_count(), 0);
    }
}
