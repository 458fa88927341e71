//! 트랜잭션 응답 검증 모듈 — RETS envelope 디코딩
//!
//! 모든 RETS XML 응답은 `<RETS ReplyCode="..." ReplyText="...">` envelope로 감싸져 있습니다.
//!
//! ## 검증 단계
//!
//! 1. 루트가 `RETS`이고 숫자 `ReplyCode` 속성이 있는지 확인 → 없으면 [`RetsError::MalformedReply`]
//! 2. `RETS-STATUS` 자식이 있으면 그 코드/텍스트가 우선
//! 3. `TRANSACTIONID` / `TRANSACTION-ID` — 속성(`value`) 또는 텍스트 형태
//! 4. `DELIMITER` — 두 자리 16진수, 없으면 TAB
//! 5. `ERRORBLOCK/ERRORDATA`, `WARNINGBLOCK/WARNINGDATA` — 위치 1..4 (경고는 1..5)
//!
//! `ReplyCode != 0`이어도 위 정보를 모두 디코딩해 [`TransactionReply`]로 돌려줍니다.
//! 실패로 다룰지는 호출자가 [`TransactionReply::into_result`]로 결정합니다.

use crate::compact::resolve_delimiter;
use crate::error::{RetsError, Result};
use crate::types::{ErrorEntry, TransactionId, TransactionReply, WarningEntry};
use crate::xml::{self, XmlNode};

/// envelope 루트 태그
pub const ENVELOPE_TAG: &str = "RETS";

/// 트랜잭션 ID 태그의 두 가지 표기
pub const TRANSACTION_ID_TAGS: [&str; 2] = ["TRANSACTIONID", "TRANSACTION-ID"];

/// XML 텍스트를 파싱하고 검증합니다. 루트 노드도 함께 반환합니다.
pub fn parse_reply(text: &str) -> Result<(XmlNode, TransactionReply)> {
    let root = xml::parse(text)?;
    let reply = validate(&root)?;
    Ok((root, reply))
}

/// RETS envelope를 검증하고 [`TransactionReply`]를 만듭니다.
///
/// # 에러
///
/// - [`RetsError::MalformedReply`] — 루트가 RETS가 아니거나 ReplyCode가 없거나 숫자가 아님
/// - [`RetsError::Decode`] — 트랜잭션 ID 노드가 값을 담고 있지 않거나 두 형태가 서로 다름
/// - [`RetsError::InvalidDelimiter`] — DELIMITER 값 오류
pub fn validate(root: &XmlNode) -> Result<TransactionReply> {
    if root.name != ENVELOPE_TAG {
        return Err(RetsError::MalformedReply(format!(
            "expected <{ENVELOPE_TAG}> root, got <{}>",
            root.name
        )));
    }
    let (mut reply_code, mut reply_text) = read_status(root)?;

    // NOTE: RETS 1.7 servers may report the real status in a nested RETS-STATUS element
    if let Some(status) = root.child("RETS-STATUS") {
        (reply_code, reply_text) = read_status(status)?;
    }

    let transaction_id = match TRANSACTION_ID_TAGS.iter().find_map(|tag| root.child(tag)) {
        Some(node) => Some(resolve_transaction_id(node)?),
        None => None,
    };

    let delimiter = resolve_delimiter(root)?;

    let mut errors = Vec::new();
    for block in root.children("ERRORBLOCK") {
        for line in block.children("ERRORDATA") {
            errors.push(parse_error_line(line.text(), delimiter));
        }
    }

    let mut warnings = Vec::new();
    for block in root.children("WARNINGBLOCK") {
        for line in block.children("WARNINGDATA") {
            warnings.push(parse_warning_line(line.text(), delimiter));
        }
    }

    if reply_code != 0 {
        tracing::debug!(reply_code, %reply_text, errors = errors.len(), "non-zero reply code");
    }

    Ok(TransactionReply {
        reply_code,
        reply_text,
        transaction_id,
        delimiter,
        errors,
        warnings,
    })
}

fn read_status(node: &XmlNode) -> Result<(i32, String)> {
    let raw = node.attr("ReplyCode").ok_or_else(|| {
        RetsError::MalformedReply(format!("<{}> has no ReplyCode attribute", node.name))
    })?;
    let code = raw.trim().parse::<i32>().map_err(|_| {
        RetsError::MalformedReply(format!("ReplyCode {raw:?} is not numeric"))
    })?;
    let text = node.attr("ReplyText").unwrap_or_default().to_string();
    Ok((code, text))
}

/// 트랜잭션 ID 노드를 속성 형태 또는 텍스트 형태로 정규화합니다.
///
/// 두 형태가 모두 있고 값이 같으면 속성 형태로 봅니다.
pub fn resolve_transaction_id(node: &XmlNode) -> Result<TransactionId> {
    let attribute = node.attr("value").map(str::trim).filter(|v| !v.is_empty());
    let text = Some(node.text().trim()).filter(|t| !t.is_empty());
    match (attribute, text) {
        (Some(a), None) => Ok(TransactionId::Attribute(a.to_string())),
        (None, Some(t)) => Ok(TransactionId::Text(t.to_string())),
        (Some(a), Some(t)) if a == t => Ok(TransactionId::Attribute(a.to_string())),
        (Some(a), Some(t)) => Err(RetsError::Decode(format!(
            "<{}> carries conflicting values: attribute {a:?}, text {t:?}",
            node.name
        ))),
        (None, None) => Err(RetsError::Decode(format!(
            "<{}> has neither a value attribute nor text",
            node.name
        ))),
    }
}

/// 위치 0(그룹 마커)을 버리고 원시 필드 목록을 반환합니다.
fn positional_fields(line: &str, delimiter: char) -> Vec<&str> {
    line.split(delimiter).skip(1).collect()
}

/// 숫자 필드를 읽습니다. 비어 있거나 숫자가 아니면 0이고, 원문은 호출자가 따로 보관합니다.
fn parse_number(raw: &str, what: &str, line: &str) -> i64 {
    if raw.is_empty() {
        return 0;
    }
    raw.parse::<i64>().unwrap_or_else(|_| {
        tracing::warn!(value = raw, line, "{what} is not numeric; keeping raw value");
        0
    })
}

fn trimmed_at(fields: &[&str], idx: usize) -> String {
    fields.get(idx).map(|v| v.trim().to_string()).unwrap_or_default()
}

fn field_at(fields: &[&str], idx: usize) -> String {
    fields.get(idx).map(|v| v.to_string()).unwrap_or_default()
}

/// ERRORDATA 한 줄을 파싱합니다 (위치 1..4 = field, code, offset, text).
///
/// 코드나 오프셋이 숫자가 아니어도 항목을 버리지 않습니다.
pub fn parse_error_line(line: &str, delimiter: char) -> ErrorEntry {
    let fields = positional_fields(line, delimiter);
    let raw_code = trimmed_at(&fields, 1);
    let raw_offset = trimmed_at(&fields, 2);
    ErrorEntry {
        field: field_at(&fields, 0),
        code: parse_number(&raw_code, "error code", line),
        offset: parse_number(&raw_offset, "error offset", line),
        text: field_at(&fields, 3),
        raw_code,
        raw_offset,
    }
}

/// WARNINGDATA 한 줄을 파싱합니다 (위치 5 = 응답 필요 플래그).
pub fn parse_warning_line(line: &str, delimiter: char) -> WarningEntry {
    let fields = positional_fields(line, delimiter);
    let flag = fields.get(4).map(|v| v.trim()).unwrap_or_default();
    let raw_code = trimmed_at(&fields, 1);
    let raw_offset = trimmed_at(&fields, 2);
    WarningEntry {
        field: field_at(&fields, 0),
        code: parse_number(&raw_code, "warning code", line),
        offset: parse_number(&raw_offset, "warning offset", line),
        text: field_at(&fields, 3),
        response_required: matches!(flag, "1" | "Y" | "y") || flag.eq_ignore_ascii_case("true"),
        raw_code,
        raw_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_without_blocks() {
        let (_, reply) = parse_reply(r#"<RETS ReplyCode="0" ReplyText="Operation Successful"/>"#).unwrap();
        assert_eq!(reply.reply_code, 0);
        assert_eq!(reply.reply_text, "Operation Successful");
        assert!(reply.errors.is_empty());
        assert!(reply.warnings.is_empty());
        assert!(reply.transaction_id.is_none());
        assert_eq!(reply.delimiter, '\t');
        assert!(reply.is_success());
    }

    #[test]
    fn test_missing_reply_code_is_malformed() {
        let root = xml::parse(r#"<RETS ReplyText="x"/>"#).unwrap();
        assert!(matches!(validate(&root), Err(RetsError::MalformedReply(_))));

        let root = xml::parse(r#"<RETS ReplyCode="abc"/>"#).unwrap();
        assert!(matches!(validate(&root), Err(RetsError::MalformedReply(_))));

        let root = xml::parse(r#"<HTML ReplyCode="0"/>"#).unwrap();
        assert!(matches!(validate(&root), Err(RetsError::MalformedReply(_))));
    }

    #[test]
    fn test_error_blocks_on_failure_code() {
        let body = "<RETS ReplyCode=\"20022\" ReplyText=\"Update failed\">\
            <TRANSACTIONID value=\"T-77\"/>\
            <ERRORBLOCK>\
            <ERRORDATA>\tListPrice\t20302\t0\tValue required\t</ERRORDATA>\
            <ERRORDATA>\tStatus\t20303\t12\tInvalid lookup\t</ERRORDATA>\
            </ERRORBLOCK></RETS>";
        let (_, reply) = parse_reply(body).unwrap();
        assert_eq!(reply.reply_code, 20022);
        assert_eq!(reply.errors.len(), 2);
        assert_eq!(
            reply.errors[0],
            ErrorEntry {
                field: "ListPrice".into(),
                code: 20302,
                offset: 0,
                text: "Value required".into(),
                raw_code: "20302".into(),
                raw_offset: "0".into(),
            }
        );
        assert_eq!(reply.errors[1].field, "Status");
        assert_eq!(reply.errors[1].offset, 12);
        assert_eq!(reply.transaction_id, Some(TransactionId::Attribute("T-77".into())));

        let err = reply.into_result().unwrap_err();
        assert_eq!(err.reply().map(|r| r.errors.len()), Some(2));
    }

    #[test]
    fn test_warning_blocks_with_custom_delimiter() {
        let body = "<RETS ReplyCode=\"0\" ReplyText=\"OK\">\
            <DELIMITER value=\"7C\"/>\
            <WARNINGBLOCK>\
            <WARNINGDATA>|Remarks|20400|5|Truncated|1|</WARNINGDATA>\
            <WARNINGDATA>|Beds|20401|0|Unusual value|0|</WARNINGDATA>\
            </WARNINGBLOCK></RETS>";
        let (_, reply) = parse_reply(body).unwrap();
        assert_eq!(reply.delimiter, '|');
        assert_eq!(reply.warnings.len(), 2);
        assert_eq!(reply.warnings[0].code, 20400);
        assert!(reply.warnings[0].response_required);
        assert!(!reply.warnings[1].response_required);
        assert_eq!(reply.warnings[1].text, "Unusual value");
    }

    #[test]
    fn test_transaction_id_text_form_and_hyphenated_tag() {
        let (_, reply) =
            parse_reply("<RETS ReplyCode=\"0\"><TRANSACTION-ID> abc-1 </TRANSACTION-ID></RETS>").unwrap();
        assert_eq!(reply.transaction_id, Some(TransactionId::Text("abc-1".into())));
        assert_eq!(reply.reply_text, "");
    }

    #[test]
    fn test_transaction_id_conflict_and_empty() {
        let root = xml::parse("<RETS ReplyCode=\"0\"><TRANSACTIONID value=\"a\">b</TRANSACTIONID></RETS>")
            .unwrap();
        assert!(matches!(validate(&root), Err(RetsError::Decode(_))));

        let root = xml::parse("<RETS ReplyCode=\"0\"><TRANSACTIONID/></RETS>").unwrap();
        assert!(matches!(validate(&root), Err(RetsError::Decode(_))));

        let root = xml::parse("<RETS ReplyCode=\"0\"><TRANSACTIONID value=\"a\">a</TRANSACTIONID></RETS>")
            .unwrap();
        assert_eq!(
            validate(&root).unwrap().transaction_id,
            Some(TransactionId::Attribute("a".into()))
        );
    }

    #[test]
    fn test_rets_status_overrides_envelope() {
        let (_, reply) = parse_reply(
            "<RETS ReplyCode=\"0\" ReplyText=\"OK\"><RETS-STATUS ReplyCode=\"20201\" ReplyText=\"No Records Found\"/></RETS>",
        )
        .unwrap();
        assert_eq!(reply.reply_code, 20201);
        assert_eq!(reply.reply_text, "No Records Found");
    }

    #[test]
    fn test_non_numeric_codes_keep_failure_reply() {
        let body = "<RETS ReplyCode=\"20022\" ReplyText=\"Update failed\">\
            <ERRORBLOCK>\
            <ERRORDATA>\tListPrice\tE-20302\t0\tValue required\t</ERRORDATA>\
            <ERRORDATA>\tStatus\t20303\tn/a\tInvalid lookup\t</ERRORDATA>\
            </ERRORBLOCK>\
            <WARNINGBLOCK><WARNINGDATA>\tBeds\tW1\t0\tOdd\t0\t</WARNINGDATA></WARNINGBLOCK>\
            </RETS>";
        let (_, reply) = parse_reply(body).unwrap();
        assert_eq!(reply.reply_code, 20022);
        assert_eq!(reply.reply_text, "Update failed");
        assert_eq!(reply.errors.len(), 2);
        assert_eq!(reply.errors[0].raw_code, "E-20302");
        assert_eq!(reply.errors[0].code, 0);
        assert_eq!(reply.errors[0].text, "Value required");
        assert_eq!(reply.errors[1].code, 20303);
        assert_eq!(reply.errors[1].raw_offset, "n/a");
        assert_eq!(reply.warnings[0].raw_code, "W1");

        let err = reply.into_result().unwrap_err();
        assert!(err.to_string().contains("E-20302"));
    }

    #[test]
    fn test_non_numeric_error_code_keeps_entry() {
        let entry = parse_error_line("\tField\tabc\t0\ttext\t", '\t');
        assert_eq!(entry.code, 0);
        assert_eq!(entry.raw_code, "abc");
        assert_eq!(entry.text, "text");

        let short = parse_error_line("\tField", '\t');
        assert_eq!(short.field, "Field");
        assert_eq!(short.code, 0);
        assert_eq!(short.text, "");
    }
}
