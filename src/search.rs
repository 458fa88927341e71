//! Search 작업 모듈
//!
//! 쿼리 문자열(DMQL2)은 조립하지 않고 그대로 전달합니다.
//!
//! 응답:
//!
//! ```text
//! <RETS ReplyCode="0" ReplyText="Success">
//!   <COUNT Records="1520"/>
//!   <DELIMITER value="09"/>
//!   <COLUMNS>\tListingID\tListPrice\t</COLUMNS>
//!   <DATA>\tL1\t250000\t</DATA>
//!   <MAXROWS/>
//! </RETS>
//! ```
//!
//! `ReplyCode=20201` (검색 결과 없음)은 에러가 아니라 빈 결과입니다.

use crate::compact::decode_rows;
use crate::constants::{reply_codes, DEFAULT_SEARCH_FORMAT, DEFAULT_SEARCH_QUERY_TYPE};
use crate::error::{Result, RetsError};
use crate::reply::parse_reply;
use crate::session::BoundSession;
use crate::types::SearchResult;

/// `Count` 파라미터
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountMode {
    /// 레코드만 (`Count` 생략)
    #[default]
    None,
    /// 레코드와 전체 건수 (`Count=1`)
    WithRecords,
    /// 건수만 (`Count=2`)
    CountOnly,
}

/// Search 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub search_type: String,
    pub class: String,
    pub query: String,
    pub query_type: String,
    pub format: String,
    pub count: CountMode,
    /// `None`이면 `Limit=NONE`
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub select: Vec<String>,
    pub standard_names: bool,
    pub restricted_indicator: Option<String>,
}

impl SearchRequest {
    pub fn new(search_type: &str, class: &str, query: &str) -> Self {
        Self {
            search_type: search_type.to_string(),
            class: class.to_string(),
            query: query.to_string(),
            query_type: DEFAULT_SEARCH_QUERY_TYPE.to_string(),
            format: DEFAULT_SEARCH_FORMAT.to_string(),
            count: CountMode::None,
            limit: None,
            offset: None,
            select: Vec::new(),
            standard_names: false,
            restricted_indicator: None,
        }
    }

    pub fn with_count(mut self, count: CountMode) -> Self {
        self.count = count;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_select<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.select = fields.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    pub fn with_standard_names(mut self, standard_names: bool) -> Self {
        self.standard_names = standard_names;
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = format.to_string();
        self
    }

    pub fn with_restricted_indicator(mut self, indicator: &str) -> Self {
        self.restricted_indicator = Some(indicator.to_string());
        self
    }

    fn check(&self) -> Result<()> {
        for (name, value) in [
            ("search type", &self.search_type),
            ("class", &self.class),
            ("query", &self.query),
        ] {
            if value.trim().is_empty() {
                return Err(RetsError::InvalidArgument(format!("search {name} is required")));
            }
        }
        Ok(())
    }

    fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("SearchType".to_string(), self.search_type.clone()),
            ("Class".to_string(), self.class.clone()),
            ("Query".to_string(), self.query.clone()),
            ("QueryType".to_string(), self.query_type.clone()),
            ("Format".to_string(), self.format.clone()),
            (
                "Limit".to_string(),
                self.limit.map_or_else(|| "NONE".to_string(), |l| l.to_string()),
            ),
            (
                "StandardNames".to_string(),
                if self.standard_names { "1" } else { "0" }.to_string(),
            ),
        ];
        match self.count {
            CountMode::None => {}
            CountMode::WithRecords => params.push(("Count".to_string(), "1".to_string())),
            CountMode::CountOnly => params.push(("Count".to_string(), "2".to_string())),
        }
        if let Some(offset) = self.offset {
            params.push(("Offset".to_string(), offset.to_string()));
        }
        if !self.select.is_empty() {
            params.push(("Select".to_string(), self.select.join(",")));
        }
        if let Some(indicator) = &self.restricted_indicator {
            params.push(("RestrictedIndicator".to_string(), indicator.clone()));
        }
        params
    }
}

/// Search 세션에 묶인 모듈
#[derive(Debug, Clone)]
pub struct SearchModule {
    session: BoundSession,
}

impl SearchModule {
    pub fn new(session: BoundSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &BoundSession {
        &self.session
    }

    /// 검색을 수행합니다.
    ///
    /// # 에러
    ///
    /// - [`RetsError::InvalidArgument`] — 빈 search type / class / query (요청 전 검사)
    /// - [`RetsError::Protocol`] — 20201 이외의 ReplyCode != 0
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        request.check()?;
        let response = self.session.execute(request.params(), None).await?;
        let result = decode_search(&response.text())?;
        tracing::debug!(
            resource = %request.search_type,
            class = %request.class,
            records = result.records.len(),
            count = ?result.count,
            max_rows = result.max_rows,
            "search completed"
        );
        Ok(result)
    }
}

/// Search 응답을 디코딩합니다.
pub fn decode_search(text: &str) -> Result<SearchResult> {
    let (root, reply) = parse_reply(text)?;
    let count = match root.child("COUNT").and_then(|c| c.attr("Records")) {
        Some(raw) => Some(
            raw.trim()
                .parse::<u64>()
                .map_err(|_| RetsError::Decode(format!("COUNT Records {raw:?} is not numeric")))?,
        ),
        None => None,
    };

    if reply.reply_code == reply_codes::NO_RECORDS_FOUND {
        return Ok(SearchResult {
            reply,
            count: count.or(Some(0)),
            ..SearchResult::default()
        });
    }

    let reply = reply.into_result()?;
    let (columns, records) = decode_rows(&root, "DATA", reply.delimiter)?;
    Ok(SearchResult {
        count,
        columns,
        records,
        max_rows: root.child("MAXROWS").is_some(),
        reply,
    })
}
