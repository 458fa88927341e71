//! multipart 본문 처리 모듈 — boundary 추출, 빈 파트 보정, 파트 분리
//!
//! GetObject 응답은 `multipart/parallel; boundary="..."` 형태로 여러 객체를 한 번에 보냅니다.
//!
//! ```text
//! --simple boundary\r\n
//! Content-ID: 123\r\n
//! Object-ID: 1\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <binary>\r\n
//! --simple boundary--\r\n
//! ```
//!
//! ## 핵심 함수
//!
//! - [`boundary_from_content_type`] — `boundary=` 파라미터 (따옴표 유무 무관)
//! - [`insert_empty_part_envelopes`] — 빈 줄마다 합성 성공 envelope 삽입 (photo 경로)
//! - [`split`] — 버퍼를 [`Part`] 목록으로 분리

use bytes::Bytes;

use crate::constants::SYNTHETIC_SUCCESS_ENVELOPE;
use crate::error::{RetsError, Result};

/// multipart 본문의 파트 하나
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Part {
    /// 이름이 같은 첫 번째 헤더 값 (대소문자 무시)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Content-Type이 multipart인지
pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/")
}

/// Content-Type 헤더에서 boundary 토큰을 추출합니다.
///
/// ```
/// use retsra::multipart::boundary_from_content_type;
///
/// let b = boundary_from_content_type(r#"multipart/parallel; boundary="simple boundary""#).unwrap();
/// assert_eq!(b, "simple boundary");
/// let b = boundary_from_content_type("multipart/parallel;boundary=abc123").unwrap();
/// assert_eq!(b, "abc123");
/// ```
///
/// # 에러
///
/// - [`RetsError::MalformedContentType`] — boundary 파라미터가 없거나 비어 있음
pub fn boundary_from_content_type(content_type: &str) -> Result<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
        .ok_or_else(|| {
            RetsError::MalformedContentType(format!("no boundary parameter in {content_type:?}"))
        })
}

/// 빈 줄 바로 뒤마다 합성 RETS 성공 envelope를 삽입합니다.
///
/// 일부 서버는 `Location=1` 응답에서 파트 본문을 통째로 생략합니다.
/// 삽입된 envelope가 그 자리를 채우고, [`strip_synthetic_envelope`]가 나중에 걷어냅니다.
pub fn insert_empty_part_envelopes(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 64);
    for line in body.split_inclusive(|b| *b == b'\n') {
        out.extend_from_slice(line);
        let ending: &[u8] = match line {
            b"\r\n" => b"\r\n",
            b"\n" => b"\n",
            _ => continue,
        };
        out.extend_from_slice(SYNTHETIC_SUCCESS_ENVELOPE.as_bytes());
        out.extend_from_slice(ending);
    }
    out
}

/// 파트 본문 앞의 합성 envelope와 그 줄바꿈을 제거합니다.
pub fn strip_synthetic_envelope(body: &[u8]) -> &[u8] {
    let Some(rest) = body.strip_prefix(SYNTHETIC_SUCCESS_ENVELOPE.as_bytes()) else {
        return body;
    };
    rest.strip_prefix(b"\r\n")
        .or_else(|| rest.strip_prefix(b"\n"))
        .unwrap_or(rest)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| idx + from)
}

/// `idx` 위치의 boundary 줄 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    /// 다음 파트가 이 위치에서 시작
    Open(usize),
    /// 닫는 boundary (`--B--`)
    Close,
}

/// `idx`에서 `--boundary`가 시작하고 그 뒤가 `--`, 또는 공백 뒤 줄 끝(혹은 버퍼 끝)일 때만 boundary로 봅니다.
fn delimiter_at(buf: &[u8], idx: usize, delimiter: &[u8]) -> Option<Delimiter> {
    let rest = buf.get(idx..)?.strip_prefix(delimiter)?;
    if rest.starts_with(b"--") {
        return Some(Delimiter::Close);
    }
    let padding = rest.iter().take_while(|b| matches!(b, b' ' | b'\t')).count();
    let tail = &rest[padding..];
    let line_end = if tail.starts_with(b"\r\n") {
        2
    } else if tail.starts_with(b"\n") {
        1
    } else if tail.is_empty() {
        0
    } else {
        return None;
    };
    Some(Delimiter::Open(idx + delimiter.len() + padding + line_end))
}

/// 줄 머리에 있는 첫 번째 유효한 boundary
fn first_delimiter(buf: &[u8], delimiter: &[u8]) -> Option<Delimiter> {
    let mut from = 0;
    while let Some(idx) = find(buf, delimiter, from) {
        if idx == 0 || buf[idx - 1] == b'\n' {
            if let Some(found) = delimiter_at(buf, idx, delimiter) {
                return Some(found);
            }
        }
        from = idx + 1;
    }
    None
}

/// `from` 이후 다음 유효한 boundary 줄: (본문 끝의 `\n` 위치, 판정)
fn next_delimiter(buf: &[u8], delimiter: &[u8], from: usize) -> Option<(usize, Delimiter)> {
    let mut search = from;
    while let Some(newline) = find(buf, b"\n", search) {
        if let Some(found) = delimiter_at(buf, newline + 1, delimiter) {
            return Some((newline, found));
        }
        search = newline + 1;
    }
    None
}

/// 버퍼를 boundary 기준으로 파트 목록으로 분리합니다.
///
/// 프리앰블과 닫는 boundary 이후의 에필로그는 무시합니다.
/// `--boundary` 뒤에 `--`나 줄 끝이 오지 않는 줄은 본문의 일부입니다.
///
/// # 에러
///
/// - [`RetsError::Decode`] — 버퍼에 boundary가 한 번도 나오지 않음
pub fn split(buffer: &[u8], boundary: &str) -> Result<Vec<Part>> {
    let delimiter = format!("--{boundary}").into_bytes();

    let mut current = first_delimiter(buffer, &delimiter)
        .ok_or_else(|| RetsError::Decode(format!("boundary {boundary:?} not found in body")))?;
    let mut parts = Vec::new();
    while let Delimiter::Open(content_start) = current {
        if content_start >= buffer.len() {
            break;
        }
        match next_delimiter(buffer, &delimiter, content_start) {
            Some((newline, next)) => {
                let mut content_end = newline.max(content_start);
                if content_end > content_start && buffer[content_end - 1] == b'\r' {
                    content_end -= 1;
                }
                parts.push(parse_part(&buffer[content_start..content_end]));
                current = next;
            }
            None => {
                // NOTE: Unterminated final part is kept rather than dropped
                parts.push(parse_part(&buffer[content_start..]));
                break;
            }
        }
    }
    Ok(parts)
}

fn parse_part(content: &[u8]) -> Part {
    let (header_bytes, body) = if content.starts_with(b"\r\n") {
        (&content[..0], &content[2..])
    } else if content.starts_with(b"\n") {
        (&content[..0], &content[1..])
    } else {
        let crlf = find(content, b"\r\n\r\n", 0).map(|i| (i, i + 4));
        let lf = find(content, b"\n\n", 0).map(|i| (i, i + 2));
        let split = match (crlf, lf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        };
        match split {
            Some((header_end, body_start)) => (&content[..header_end], &content[body_start..]),
            None => (content, &content[content.len()..]),
        }
    };

    let headers = String::from_utf8_lossy(header_bytes)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect();

    Part {
        headers,
        body: Bytes::copy_from_slice(body),
    }
}
