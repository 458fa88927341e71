//! compact 포맷 디코딩 모듈
//!
//! RETS의 compact 포맷은 구분자로 나뉜 표 형태 인코딩입니다.
//! 메타데이터 9종, Search 결과, Update 결과가 모두 이 형식을 사용합니다.
//!
//! ```text
//! <METADATA-CLASS Resource="Property" Version="1.0" Date="...">
//!   <DELIMITER value="09"/>             (선택, 두 자리 16진수)
//!   <COLUMNS>\tClassName\tDescription\t</COLUMNS>
//!   <DATA>\tRES\tResidential\t</DATA>
//!   <DATA>\tLND\tLand\t</DATA>
//! </METADATA-CLASS>
//! ```
//!
//! ## 핵심 함수
//!
//! - [`decode_compact`] — 노드 하나를 [`MetadataRecord`] 목록으로 디코딩 (노드 속성 포함)
//! - [`decode_rows`] — 노드 속성 없이 행만 디코딩 (Search 결과용)
//! - [`split_line`] — 한 줄을 구분자로 분리하고 양 끝 빈 필드 제거
//!
//! 값은 모두 문자열로 유지됩니다. 숫자/날짜 해석은 호출자의 몫입니다.

use std::collections::BTreeMap;

use crate::constants::DEFAULT_DELIMITER;
use crate::error::{RetsError, Result};
use crate::types::MetadataRecord;
use crate::xml::XmlNode;

/// 노드 하나에서 읽어낸 표 데이터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactBlock {
    pub delimiter: char,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// 두 자리 16진수로 인코딩된 구분자를 문자로 변환합니다.
///
/// ```
/// use retsra::compact::decode_delimiter;
///
/// assert_eq!(decode_delimiter("09").unwrap(), '\t');
/// assert_eq!(decode_delimiter("7C").unwrap(), '|');
/// ```
///
/// # 에러
///
/// - [`RetsError::InvalidDelimiter`] — 두 자리 16진수가 아닌 값
pub fn decode_delimiter(value: &str) -> Result<char> {
    let trimmed = value.trim();
    let invalid = || RetsError::InvalidDelimiter {
        value: value.to_string(),
    };
    if trimmed.len() != 2 {
        return Err(invalid());
    }
    let byte = u8::from_str_radix(trimmed, 16).map_err(|_| invalid())?;
    Ok(char::from(byte))
}

/// 구분자를 두 자리 대문자 16진수로 인코딩합니다.
///
/// # 에러
///
/// - [`RetsError::InvalidArgument`] — 한 바이트로 표현할 수 없는 문자
pub fn encode_delimiter(delimiter: char) -> Result<String> {
    u8::try_from(delimiter)
        .map(|byte| format!("{byte:02X}"))
        .map_err(|_| RetsError::InvalidArgument(format!("delimiter {delimiter:?} is not a single byte")))
}

/// 노드의 `DELIMITER` 자식에서 구분자를 읽습니다. 없으면 TAB입니다.
///
/// 값은 `value` 속성 또는 노드 텍스트 어느 쪽으로도 올 수 있습니다.
pub fn resolve_delimiter(node: &XmlNode) -> Result<char> {
    match node.child("DELIMITER") {
        Some(delim) => {
            let raw = delim.attr("value").unwrap_or_else(|| delim.text());
            decode_delimiter(raw)
        }
        None => Ok(DEFAULT_DELIMITER),
    }
}

/// 한 줄을 구분자로 분리하고, 앞뒤 구분자가 만든 첫 번째/마지막 빈 필드를 버립니다.
///
/// ```
/// use retsra::compact::split_line;
///
/// assert_eq!(split_line("\tA\tB\t", '\t'), vec!["A", "B"]);
/// assert_eq!(split_line("\t123\t\t", '\t'), vec!["123", ""]);
/// ```
pub fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields: Vec<String> = line.split(delimiter).map(str::to_string).collect();
    if fields.first().is_some_and(String::is_empty) {
        fields.remove(0);
    }
    if fields.last().is_some_and(String::is_empty) {
        fields.pop();
    }
    fields
}

/// 값 목록을 앞뒤 구분자를 포함한 한 줄로 씁니다.
pub fn encode_line<S: AsRef<str>>(values: &[S], delimiter: char) -> String {
    let mut line = String::new();
    line.push(delimiter);
    for value in values {
        line.push_str(value.as_ref());
        line.push(delimiter);
    }
    line
}

impl CompactBlock {
    /// 노드에서 DELIMITER / COLUMNS / `data_key` 줄들을 읽습니다.
    pub fn from_node(node: &XmlNode, data_key: &str) -> Result<Self> {
        let delimiter = resolve_delimiter(node)?;
        Self::from_node_with_delimiter(node, data_key, delimiter)
    }

    /// 바깥에서 이미 결정된 구분자로 읽습니다 (노드 자체의 DELIMITER가 우선).
    pub fn from_node_with_delimiter(node: &XmlNode, data_key: &str, fallback: char) -> Result<Self> {
        let delimiter = match node.child("DELIMITER") {
            Some(_) => resolve_delimiter(node)?,
            None => fallback,
        };
        let columns = node
            .child("COLUMNS")
            .map(|c| split_line(c.text(), delimiter))
            .unwrap_or_default();
        let rows = node
            .children(data_key)
            .iter()
            .map(|d| split_line(d.text(), delimiter))
            .collect();
        Ok(Self {
            delimiter,
            columns,
            rows,
        })
    }

    /// 각 행을 컬럼과 위치별로 짝지어 레코드를 만듭니다.
    ///
    /// 컬럼 수를 넘는 꼬리 빈 필드는 잘라냅니다. 그 밖의 불일치는 에러입니다.
    ///
    /// # 에러
    ///
    /// - [`RetsError::RaggedRow`] — 필드 수가 컬럼 수와 다른 행
    pub fn into_records(self, attributes: &BTreeMap<String, String>) -> Result<Vec<MetadataRecord>> {
        if self.columns.is_empty() {
            return Ok(Vec::new());
        }
        let expected = self.columns.len();
        let mut records = Vec::with_capacity(self.rows.len());
        for (idx, mut row) in self.rows.into_iter().enumerate() {
            if row.len() > expected {
                let surplus_blank = row[expected..].iter().all(String::is_empty);
                if surplus_blank {
                    tracing::warn!(row = idx + 1, extra = row.len() - expected, "trimming blank surplus fields");
                    row.truncate(expected);
                }
            }
            if row.len() != expected {
                return Err(RetsError::RaggedRow {
                    row: idx + 1,
                    expected,
                    actual: row.len(),
                });
            }
            let fields = self.columns.iter().cloned().zip(row).collect();
            records.push(MetadataRecord {
                fields,
                attributes: attributes.clone(),
            });
        }
        Ok(records)
    }

    /// 블록을 다시 XML 노드로 씁니다.
    pub fn to_node(&self, name: &str, data_key: &str) -> Result<XmlNode> {
        let mut node = XmlNode::new(name)
            .with_child(XmlNode::new("DELIMITER").with_attr("value", &encode_delimiter(self.delimiter)?))
            .with_child(XmlNode::new("COLUMNS").with_text(&encode_line(&self.columns, self.delimiter)));
        for row in &self.rows {
            node = node.with_child(XmlNode::new(data_key).with_text(&encode_line(row, self.delimiter)));
        }
        Ok(node)
    }
}

/// compact 노드를 레코드 목록으로 디코딩합니다. 노드 속성이 각 레코드에 붙습니다.
///
/// - DATA가 없으면 빈 목록
/// - COLUMNS가 없으면 빈 목록
///
/// # 에러
///
/// - [`RetsError::InvalidDelimiter`] — DELIMITER 값 오류
/// - [`RetsError::RaggedRow`] — 필드 수 불일치
pub fn decode_compact(node: &XmlNode, data_key: &str) -> Result<Vec<MetadataRecord>> {
    CompactBlock::from_node(node, data_key)?.into_records(&node.attributes)
}

/// 노드 속성 없이 행만 디코딩합니다.
pub fn decode_rows(node: &XmlNode, data_key: &str, delimiter: char) -> Result<(Vec<String>, Vec<MetadataRecord>)> {
    let block = CompactBlock::from_node_with_delimiter(node, data_key, delimiter)?;
    let columns = block.columns.clone();
    let records = block.into_records(&BTreeMap::new())?;
    Ok((columns, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with(columns: &str, data: &[&str]) -> XmlNode {
        let mut node = XmlNode::new("METADATA-CLASS")
            .with_attr("Resource", "Property")
            .with_attr("Version", "1.00.000")
            .with_child(XmlNode::new("COLUMNS").with_text(columns));
        for line in data {
            node = node.with_child(XmlNode::new("DATA").with_text(line));
        }
        node
    }

    #[test]
    fn test_decode_delimiter_values() {
        assert_eq!(decode_delimiter("09").unwrap(), '\t');
        assert_eq!(decode_delimiter("2c").unwrap(), ',');
        assert_eq!(decode_delimiter(" 7C ").unwrap(), '|');
    }

    #[test]
    fn test_decode_delimiter_invalid() {
        assert!(matches!(decode_delimiter("9"), Err(RetsError::InvalidDelimiter { .. })));
        assert!(matches!(decode_delimiter("ZZ"), Err(RetsError::InvalidDelimiter { .. })));
        assert!(matches!(decode_delimiter(""), Err(RetsError::InvalidDelimiter { .. })));
    }

    #[test]
    fn test_encode_delimiter() {
        assert_eq!(encode_delimiter('|').unwrap(), "7C");
        assert_eq!(encode_delimiter('\t').unwrap(), "09");
        assert!(encode_delimiter('가').is_err());
    }

    #[test]
    fn test_split_line_edges() {
        assert_eq!(split_line("", '\t'), Vec::<String>::new());
        assert_eq!(split_line("\t", '\t'), Vec::<String>::new());
        assert_eq!(split_line("A\tB", '\t'), vec!["A", "B"]);
        assert_eq!(split_line("\t\tB\t", '\t'), vec!["", "B"]);
    }

    #[test]
    fn test_decode_compact_basic() {
        let node = node_with(
            "\tClassName\tDescription\t",
            &["\tRES\tResidential\t", "\tLND\tLand\t"],
        );
        let records = decode_compact(&node, "DATA").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("ClassName"), Some("RES"));
        assert_eq!(records[1].get("Description"), Some("Land"));
        assert_eq!(records[0].attribute("Resource"), Some("Property"));
        assert_eq!(records[1].attribute("Version"), Some("1.00.000"));
    }

    #[test]
    fn test_record_keys_equal_columns() {
        let node = node_with("\tA\tB\tC\t", &["\t1\t2\t3\t", "\t\t\t\t", "\tx\t\tz\t"]);
        let records = decode_compact(&node, "DATA").unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            let keys: Vec<&str> = record.fields.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["A", "B", "C"]);
        }
        assert_eq!(records[1].get("B"), Some(""));
        assert_eq!(records[2].get("B"), Some(""));
    }

    #[test]
    fn test_hex_tab_delimiter_with_trailing_blank() {
        let node = XmlNode::new("RETS")
            .with_child(XmlNode::new("DELIMITER").with_attr("value", "09"))
            .with_child(XmlNode::new("COLUMNS").with_text("\tListingID\tPropertyType\t"))
            .with_child(XmlNode::new("DATA").with_text("\t123\tRESI\t\t"));
        let (columns, records) = decode_rows(&node, "DATA", DEFAULT_DELIMITER).unwrap();
        assert_eq!(columns, vec!["ListingID", "PropertyType"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields.len(), 2);
        assert_eq!(records[0].get("ListingID"), Some("123"));
        assert_eq!(records[0].get("PropertyType"), Some("RESI"));
    }

    #[test]
    fn test_custom_delimiter_in_text_form() {
        let node = XmlNode::new("METADATA-TABLE")
            .with_child(XmlNode::new("DELIMITER").with_text("7C"))
            .with_child(XmlNode::new("COLUMNS").with_text("|SystemName|DataType|"))
            .with_child(XmlNode::new("DATA").with_text("|ListPrice|Decimal|"));
        let records = decode_compact(&node, "DATA").unwrap();
        assert_eq!(records[0].get("DataType"), Some("Decimal"));
    }

    #[test]
    fn test_ragged_row_is_error() {
        let node = node_with("\tA\tB\t", &["\t1\t2\t3\t"]);
        let err = decode_compact(&node, "DATA").unwrap_err();
        assert!(matches!(
            err,
            RetsError::RaggedRow {
                row: 1,
                expected: 2,
                actual: 3
            }
        ));

        let short = node_with("\tA\tB\tC\t", &["\t1\t2\t"]);
        assert!(matches!(
            decode_compact(&short, "DATA"),
            Err(RetsError::RaggedRow { actual: 2, .. })
        ));
    }

    #[test]
    fn test_empty_data_and_missing_columns() {
        let no_data = node_with("\tA\tB\t", &[]);
        assert!(decode_compact(&no_data, "DATA").unwrap().is_empty());

        let no_columns = XmlNode::new("METADATA-RESOURCE")
            .with_child(XmlNode::new("DATA").with_text("\t1\t2\t"));
        assert!(decode_compact(&no_columns, "DATA").unwrap().is_empty());
    }

    #[test]
    fn test_encoded_fixture_decodes_to_same_fields() {
        let block = CompactBlock {
            delimiter: ',',
            columns: vec!["LookupName".into(), "Value".into(), "LongValue".into()],
            rows: vec![
                vec!["Status".into(), "A".into(), "Active".into()],
                vec!["Status".into(), "S".into(), "".into()],
            ],
        };
        let node = block.to_node("METADATA-LOOKUP_TYPE", "DATA").unwrap();
        let records = decode_compact(&node, "DATA").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("LongValue"), Some("Active"));
        assert_eq!(records[1].get("Value"), Some("S"));
        assert_eq!(records[1].get("LongValue"), Some(""));
    }
}
