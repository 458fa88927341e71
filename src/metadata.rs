//! GetMetadata 작업 모듈
//!
//! 요청: `Type=METADATA-*`, `ID=<id>`, `Format=COMPACT`
//!
//! 응답:
//!
//! ```text
//! <RETS ReplyCode="0" ReplyText="...">
//!   <METADATA>
//!     <METADATA-CLASS Resource="Property" Version="..." Date="...">
//!       <COLUMNS>...</COLUMNS>
//!       <DATA>...</DATA>
//!     </METADATA-CLASS>
//!   </METADATA>
//! </RETS>
//! ```
//!
//! 같은 태그의 노드가 여럿이면 LookupType은 노드별로, 나머지는 하나로 합쳐 반환합니다.

use crate::compact::decode_compact;
use crate::constants::DEFAULT_METADATA_FORMAT;
use crate::error::{RetsError, Result};
use crate::reply::parse_reply;
use crate::session::BoundSession;
use crate::types::{MetadataPayload, MetadataResponse, MetadataType, SystemMetadata};
use crate::xml::XmlNode;

/// GetMetadata 세션에 묶인 모듈
#[derive(Debug, Clone)]
pub struct MetadataModule {
    session: BoundSession,
}

impl MetadataModule {
    pub fn new(session: BoundSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &BoundSession {
        &self.session
    }

    /// 메타데이터를 요청하고 디코딩합니다.
    ///
    /// # 에러
    ///
    /// - [`RetsError::InvalidArgument`] — 빈 `id` (요청 전 검사)
    /// - [`RetsError::Protocol`] — ReplyCode != 0 (예: 20502 메타데이터 없음)
    /// - 디코딩 에러 ([`RetsError::RaggedRow`] 등)
    pub async fn get_metadata(
        &self,
        metadata_type: MetadataType,
        id: &str,
        format: Option<&str>,
    ) -> Result<MetadataResponse> {
        if id.trim().is_empty() {
            return Err(RetsError::InvalidArgument("metadata id is required".into()));
        }
        let query = vec![
            ("Type".to_string(), metadata_type.tag().to_string()),
            ("ID".to_string(), id.to_string()),
            (
                "Format".to_string(),
                format.unwrap_or(DEFAULT_METADATA_FORMAT).to_string(),
            ),
        ];
        let response = self.session.execute(query, None).await?;
        decode_metadata(metadata_type, &response.text())
    }

    pub async fn get_system(&self) -> Result<SystemMetadata> {
        let response = self.get_metadata(MetadataType::System, "0", None).await?;
        match response.payload {
            MetadataPayload::System(system) => Ok(system),
            _ => Err(RetsError::Decode("METADATA-SYSTEM decoded as records".into())),
        }
    }

    pub async fn get_resources(&self) -> Result<MetadataResponse> {
        self.get_metadata(MetadataType::Resource, "0", None).await
    }

    pub async fn get_foreign_keys(&self) -> Result<MetadataResponse> {
        self.get_metadata(MetadataType::ForeignKeys, "0", None).await
    }

    pub async fn get_classes(&self, resource: &str) -> Result<MetadataResponse> {
        self.get_metadata(MetadataType::Class, resource, None).await
    }

    pub async fn get_table(&self, resource: &str, class: &str) -> Result<MetadataResponse> {
        self.get_metadata(MetadataType::Table, &format!("{resource}:{class}"), None)
            .await
    }

    pub async fn get_lookups(&self, resource: &str) -> Result<MetadataResponse> {
        self.get_metadata(MetadataType::Lookup, resource, None).await
    }

    /// `lookup`이 `None`이면 리소스의 모든 LookupType (`Resource:*`)
    pub async fn get_lookup_types(&self, resource: &str, lookup: Option<&str>) -> Result<MetadataResponse> {
        let id = format!("{resource}:{}", lookup.unwrap_or("*"));
        self.get_metadata(MetadataType::LookupType, &id, None).await
    }

    pub async fn get_object_types(&self, resource: &str) -> Result<MetadataResponse> {
        self.get_metadata(MetadataType::Object, resource, None).await
    }

    pub async fn get_search_help(&self, resource: &str) -> Result<MetadataResponse> {
        self.get_metadata(MetadataType::SearchHelp, resource, None).await
    }

    pub async fn get_edit_masks(&self, resource: &str) -> Result<MetadataResponse> {
        self.get_metadata(MetadataType::EditMask, resource, None).await
    }
}

/// 메타데이터 응답 본문을 디코딩합니다.
pub fn decode_metadata(metadata_type: MetadataType, text: &str) -> Result<MetadataResponse> {
    let (root, reply) = parse_reply(text)?;
    let reply = reply.into_result()?;

    // NOTE: Some servers omit the METADATA wrapper and put METADATA-* directly under RETS
    let container = root.child("METADATA").unwrap_or(&root);
    let nodes = container.children(metadata_type.tag());

    let payload = match metadata_type {
        MetadataType::System => MetadataPayload::System(decode_system(nodes.first())?),
        t if t.is_per_node() => MetadataPayload::PerNode(
            nodes
                .iter()
                .map(|node| decode_compact(node, "DATA"))
                .collect::<Result<Vec<_>>>()?,
        ),
        _ => {
            let mut merged = Vec::new();
            for node in nodes {
                merged.extend(decode_compact(node, "DATA")?);
            }
            MetadataPayload::Records(merged)
        }
    };

    Ok(MetadataResponse {
        metadata_type,
        reply,
        payload,
    })
}

fn decode_system(node: Option<&XmlNode>) -> Result<SystemMetadata> {
    let node = node.ok_or_else(|| RetsError::Decode("reply has no METADATA-SYSTEM element".into()))?;
    let system = node
        .child("SYSTEM")
        .ok_or_else(|| RetsError::Decode("METADATA-SYSTEM has no SYSTEM element".into()))?;
    let non_empty = |value: &str| Some(value.trim().to_string()).filter(|v| !v.is_empty());
    Ok(SystemMetadata {
        version: node.attr("Version").map(str::to_string),
        date: node.attr("Date").map(str::to_string),
        system_id: system.attr("SystemID").unwrap_or_default().to_string(),
        description: system.attr("SystemDescription").map(str::to_string),
        time_zone_offset: system.attr("TimeZoneOffset").map(str::to_string),
        comments: node.child("COMMENTS").and_then(|c| non_empty(c.text())),
    })
}
