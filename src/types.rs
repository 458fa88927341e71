//! RETS 클라이언트 전반에서 공유되는 타입 정의입니다.
//!
//! [`Capability`], [`MetadataType`], [`TransactionReply`], [`MetadataRecord`] 등
//! 디코더와 작업 모듈 사이에서 오가는 값을 정의합니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// 로그인 응답이 광고하는 트랜잭션 종류 (capability URL 키)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Capability {
    Login,
    Search,
    GetMetadata,
    GetObject,
    Update,
    Logout,
}

impl Capability {
    /// 세션을 파생하는 모든 capability
    pub const ALL: [Capability; 6] = [
        Capability::Login,
        Capability::Search,
        Capability::GetMetadata,
        Capability::GetObject,
        Capability::Update,
        Capability::Logout,
    ];

    /// `RETS-RESPONSE` 본문에서 사용하는 키 이름
    pub fn key(self) -> &'static str {
        match self {
            Capability::Login => "Login",
            Capability::Search => "Search",
            Capability::GetMetadata => "GetMetadata",
            Capability::GetObject => "GetObject",
            Capability::Update => "Update",
            Capability::Logout => "Logout",
        }
    }

    /// 키 이름으로 capability를 찾습니다 (대소문자 무시).
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|cap| cap.key().eq_ignore_ascii_case(key.trim()))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// GetMetadata가 요청할 수 있는 메타데이터 종류
///
/// [`System`](Self::System)을 제외한 9개 종류는 모두 compact 포맷으로 디코딩됩니다.
/// [`LookupType`](Self::LookupType)만 노드별 결과 목록을 반환합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MetadataType {
    System,
    Resource,
    ForeignKeys,
    Class,
    Table,
    Lookup,
    LookupType,
    Object,
    SearchHelp,
    EditMask,
}

impl MetadataType {
    /// compact 디코더를 사용하는 9개 종류
    pub const COMPACT: [MetadataType; 9] = [
        MetadataType::Resource,
        MetadataType::ForeignKeys,
        MetadataType::Class,
        MetadataType::Table,
        MetadataType::Lookup,
        MetadataType::LookupType,
        MetadataType::Object,
        MetadataType::SearchHelp,
        MetadataType::EditMask,
    ];

    /// `Type` 쿼리 파라미터이자 응답 XML의 태그 이름
    pub fn tag(self) -> &'static str {
        match self {
            MetadataType::System => "METADATA-SYSTEM",
            MetadataType::Resource => "METADATA-RESOURCE",
            MetadataType::ForeignKeys => "METADATA-FOREIGNKEYS",
            MetadataType::Class => "METADATA-CLASS",
            MetadataType::Table => "METADATA-TABLE",
            MetadataType::Lookup => "METADATA-LOOKUP",
            MetadataType::LookupType => "METADATA-LOOKUP_TYPE",
            MetadataType::Object => "METADATA-OBJECT",
            MetadataType::SearchHelp => "METADATA-SEARCH_HELP",
            MetadataType::EditMask => "METADATA-EDITMASK",
        }
    }

    /// 노드별 결과를 병합하지 않고 그대로 반환해야 하는 종류인지
    pub fn is_per_node(self) -> bool {
        matches!(self, MetadataType::LookupType)
    }
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// compact DATA 한 행
///
/// `fields`의 키 집합은 COLUMNS와 정확히 같고,
/// `attributes`에는 블록을 감싼 XML 노드의 속성(Resource, Version, Date 등)이 들어갑니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    pub fields: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
}

impl MetadataRecord {
    /// 컬럼 값
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// 노드 속성 값
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// ERRORDATA 한 줄
///
/// `code`/`offset`은 숫자로 읽을 수 없으면 0이며, 서버가 보낸 원문은 `raw_code`/`raw_offset`에 남습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub field: String,
    pub code: i64,
    pub offset: i64,
    pub text: String,
    pub raw_code: String,
    pub raw_offset: String,
}

impl ErrorEntry {
    /// 표시용 코드: 원문이 있으면 원문, 없으면 숫자 코드
    pub fn code_text(&self) -> String {
        if self.raw_code.is_empty() {
            self.code.to_string()
        } else {
            self.raw_code.clone()
        }
    }
}

/// WARNINGDATA 한 줄. `response_required`는 5번째 위치의 플래그입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarningEntry {
    pub field: String,
    pub code: i64,
    pub offset: i64,
    pub text: String,
    pub response_required: bool,
    pub raw_code: String,
    pub raw_offset: String,
}

/// 트랜잭션 ID가 어느 형태로 전달되었는지
///
/// 서버에 따라 `<TRANSACTIONID value="..."/>` 속성 형태와
/// `<TRANSACTIONID>...</TRANSACTIONID>` 텍스트 형태가 모두 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionId {
    Attribute(String),
    Text(String),
}

impl TransactionId {
    pub fn value(&self) -> &str {
        match self {
            TransactionId::Attribute(v) | TransactionId::Text(v) => v,
        }
    }
}

/// 검증된 RETS 응답 envelope
///
/// `reply_code != 0`인 응답도 에러/경고 블록과 함께 그대로 보존됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionReply {
    pub reply_code: i32,
    pub reply_text: String,
    pub transaction_id: Option<TransactionId>,
    pub delimiter: char,
    pub errors: Vec<ErrorEntry>,
    pub warnings: Vec<WarningEntry>,
}

impl Default for TransactionReply {
    fn default() -> Self {
        Self {
            reply_code: 0,
            reply_text: String::new(),
            transaction_id: None,
            delimiter: crate::constants::DEFAULT_DELIMITER,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl TransactionReply {
    pub fn is_success(&self) -> bool {
        self.reply_code == crate::constants::reply_codes::SUCCESS
    }

    /// 성공이면 `Ok(self)`, 아니면 응답 전체를 담은 [`RetsError::Protocol`]을 반환합니다.
    ///
    /// [`RetsError::Protocol`]: crate::error::RetsError::Protocol
    pub fn into_result(self) -> crate::error::Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(crate::error::RetsError::Protocol(Box::new(self)))
        }
    }
}

/// METADATA-SYSTEM 응답
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemMetadata {
    pub version: Option<String>,
    pub date: Option<String>,
    pub system_id: String,
    pub description: Option<String>,
    pub time_zone_offset: Option<String>,
    pub comments: Option<String>,
}

/// GetMetadata 결과 본문
///
/// LookupType만 [`PerNode`](Self::PerNode)로, 나머지는 [`Records`](Self::Records)로 반환됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MetadataPayload {
    Records(Vec<MetadataRecord>),
    PerNode(Vec<Vec<MetadataRecord>>),
    System(SystemMetadata),
}

/// GetMetadata 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataResponse {
    pub metadata_type: MetadataType,
    pub reply: TransactionReply,
    pub payload: MetadataPayload,
}

impl MetadataResponse {
    /// 모든 노드의 레코드를 순서대로 펼쳐 반환합니다.
    pub fn records(&self) -> Vec<&MetadataRecord> {
        match &self.payload {
            MetadataPayload::Records(records) => records.iter().collect(),
            MetadataPayload::PerNode(nodes) => nodes.iter().flatten().collect(),
            MetadataPayload::System(_) => Vec::new(),
        }
    }
}

/// Search 응답
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub reply: TransactionReply,
    /// `COUNT` 요소의 `Records` 속성 (Count 요청 시)
    pub count: Option<u64>,
    pub columns: Vec<String>,
    pub records: Vec<MetadataRecord>,
    /// 서버가 `MAXROWS`로 결과를 잘랐는지
    pub max_rows: bool,
}

/// GetObject 응답의 한 파트
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectPart {
    pub content_id: Option<String>,
    pub object_id: Option<String>,
    pub content_type: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub preferred: bool,
    pub headers: BTreeMap<String, String>,
    #[serde(skip)]
    pub data: bytes::Bytes,
    /// 파트 본문이 RETS envelope이면 검증된 응답
    pub reply: Option<TransactionReply>,
}

/// Update 응답
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub reply: TransactionReply,
    pub records: Vec<MetadataRecord>,
}
