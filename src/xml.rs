//! XML 텍스트를 소유 트리([`XmlNode`])로 변환합니다.
//!
//! 각 노드는 속성 맵, 태그 이름별 자식 목록, 직접 텍스트를 가집니다.
//! 파싱은 `roxmltree`가 담당하며, RETS 응답에 흔한 DOCTYPE 선언을 허용합니다.

use std::collections::BTreeMap;

use crate::error::Result;

/// 파싱된 XML 요소
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: BTreeMap<String, Vec<XmlNode>>,
    /// 직접 텍스트 자식을 이어붙인 값 (공백 보존)
    pub text: String,
}

impl XmlNode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// 속성 값
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// 같은 태그의 자식 목록 (없으면 빈 슬라이스)
    pub fn children(&self, name: &str) -> &[XmlNode] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 같은 태그의 첫 번째 자식
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children(name).first()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.entry(child.name.clone()).or_default().push(child);
        self
    }
}

/// XML 텍스트를 파싱하여 루트 요소를 반환합니다.
///
/// # 에러
///
/// - [`RetsError::Xml`](crate::error::RetsError::Xml) — 잘 구성되지 않은 XML
pub fn parse(text: &str) -> Result<XmlNode> {
    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;
    let doc = roxmltree::Document::parse_with_options(text, options)?;
    Ok(convert(doc.root_element()))
}

fn convert(node: roxmltree::Node<'_, '_>) -> XmlNode {
    let mut out = XmlNode::new(node.tag_name().name());
    for attr in node.attributes() {
        out.attributes
            .insert(attr.name().to_string(), attr.value().to_string());
    }
    for child in node.children() {
        if child.is_element() {
            let converted = convert(child);
            out.children
                .entry(converted.name.clone())
                .or_default()
                .push(converted);
        } else if child.is_text() {
            if let Some(text) = child.text() {
                out.text.push_str(text);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attributes_children_text() {
        let root = parse(
            "<RETS ReplyCode=\"0\" ReplyText=\"OK\"><COUNT Records=\"3\"/>\
             <DATA>\ta\tb\t</DATA><DATA>\tc\td\t</DATA></RETS>",
        )
        .unwrap();
        assert_eq!(root.name, "RETS");
        assert_eq!(root.attr("ReplyCode"), Some("0"));
        assert_eq!(root.child("COUNT").and_then(|c| c.attr("Records")), Some("3"));
        assert_eq!(root.children("DATA").len(), 2);
        assert_eq!(root.children("DATA")[0].text(), "\ta\tb\t");
        assert!(root.children("MISSING").is_empty());
    }

    #[test]
    fn test_parse_with_doctype() {
        let root = parse(
            "<?xml version=\"1.0\"?>\n<!DOCTYPE RETS SYSTEM \"RETS-20041001.dtd\">\n<RETS ReplyCode=\"0\"/>",
        )
        .unwrap();
        assert_eq!(root.attr("ReplyCode"), Some("0"));
    }

    #[test]
    fn test_parse_entities_decoded() {
        let root = parse("<RETS ReplyCode=\"0\" ReplyText=\"A &amp; B\">x &lt; y</RETS>").unwrap();
        assert_eq!(root.attr("ReplyText"), Some("A & B"));
        assert_eq!(root.text(), "x < y");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse("<RETS><open></RETS>").is_err());
    }

    #[test]
    fn test_builder_helpers() {
        let node = XmlNode::new("RETS")
            .with_attr("ReplyCode", "0")
            .with_child(XmlNode::new("DELIMITER").with_attr("value", "7C"));
        assert_eq!(node.child("DELIMITER").and_then(|d| d.attr("value")), Some("7C"));
    }
}
