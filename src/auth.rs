//! 인증 헤더 계산 모듈
//!
//! ## RETS 고유 다이제스트
//!
//! ```text
//! A1       = md5hex(userAgent ":" userAgentPassword)
//! UA-Auth  = md5hex(A1 ":" "" ":" sessionId ":" version)
//! Delegate = md5hex(uaAuth ":" delegatePassword ":" delegateHash ":" delegateId)
//! ```
//!
//! 두 함수 모두 순수 함수이며 세션 상태를 읽거나 쓰지 않습니다.
//!
//! ## HTTP 인증 챌린지
//!
//! 로그인 핸드셰이크에서 서버가 `401`과 함께 보내는 `WWW-Authenticate` 챌린지를
//! [`AuthChallenge`]로 해석하고 `Authorization` 헤더 값을 계산합니다 (RFC 2617 Digest, Basic).

use base64::Engine as _;
use md5::{Digest, Md5};

/// 문자열의 MD5 다이제스트를 소문자 16진수 32자리로 반환합니다.
pub fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// `RETS-UA-Authorization` 다이제스트를 계산합니다.
///
/// User-Agent 비밀번호가 없으면 `None`을 반환하며, 이때 헤더는 붙지 않습니다.
///
/// ```
/// use retsra::auth::compute_ua_auth;
///
/// assert!(compute_ua_auth("MyAgent/1.0", None, "sid", "RETS/1.7.2").is_none());
/// let digest = compute_ua_auth("MyAgent/1.0", Some("secret"), "sid", "RETS/1.7.2").unwrap();
/// assert_eq!(digest.len(), 32);
/// ```
pub fn compute_ua_auth(
    user_agent: &str,
    user_agent_password: Option<&str>,
    session_id: &str,
    version: &str,
) -> Option<String> {
    let password = user_agent_password?;
    let a1 = md5_hex(&format!("{user_agent}:{password}"));
    Some(md5_hex(&format!("{a1}::{session_id}:{version}")))
}

/// `X-Delegate-Authorization` 다이제스트를 계산합니다.
///
/// 호출자는 위임 입력 세 가지가 모두 있을 때만 호출해야 합니다.
pub fn compute_delegate_auth(
    ua_auth_digest: &str,
    delegate_password: &str,
    delegate_hash: &str,
    delegate_id: &str,
) -> String {
    md5_hex(&format!(
        "{ua_auth_digest}:{delegate_password}:{delegate_hash}:{delegate_id}"
    ))
}

/// 다이제스트 값을 헤더 형식(`Digest <hex32>`)으로 감쌉니다.
pub fn digest_header_value(digest: &str) -> String {
    format!("Digest {digest}")
}

/// `WWW-Authenticate` 헤더의 Digest 챌린지 파라미터
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    pub algorithm: Option<String>,
}

/// 서버가 요구한 HTTP 인증 방식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    Digest(DigestChallenge),
    Basic,
}

impl AuthChallenge {
    /// `WWW-Authenticate` 값 하나를 해석합니다. 알 수 없는 방식이면 `None`입니다.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(char::is_whitespace).unwrap_or((header, ""));
        if scheme.eq_ignore_ascii_case("basic") {
            return Some(AuthChallenge::Basic);
        }
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }
        let mut challenge = DigestChallenge::default();
        for (key, value) in parse_params(rest) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => challenge.realm = value,
                "nonce" => challenge.nonce = value,
                "opaque" => challenge.opaque = Some(value),
                "qop" => challenge.qop = Some(value),
                "algorithm" => challenge.algorithm = Some(value),
                _ => {}
            }
        }
        if challenge.nonce.is_empty() {
            return None;
        }
        Some(AuthChallenge::Digest(challenge))
    }

    /// 여러 `WWW-Authenticate` 값 중 Digest를 우선으로 고릅니다.
    pub fn select<'a>(headers: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut basic = None;
        for value in headers {
            match Self::parse(value) {
                Some(digest @ AuthChallenge::Digest(_)) => return Some(digest),
                Some(AuthChallenge::Basic) => basic = Some(AuthChallenge::Basic),
                None => {}
            }
        }
        basic
    }
}

/// 콤마로 구분된 `key=value` / `key="value"` 목록을 파싱합니다.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let key: String = chars
            .by_ref()
            .take_while(|c| *c != '=')
            .collect::<String>()
            .trim()
            .to_string();
        if key.is_empty() {
            break;
        }
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut escaped = false;
            for c in chars.by_ref() {
                match (escaped, c) {
                    (false, '\\') => escaped = true,
                    (false, '"') => break,
                    _ => {
                        value.push(c);
                        escaped = false;
                    }
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
            value = value.trim().to_string();
        }
        params.push((key, value));
    }
    params
}

/// Digest 응답 계산에 필요한 요청별 입력
#[derive(Debug, Clone)]
pub struct DigestInput<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub method: &'a str,
    /// 요청 URI (경로 + 쿼리)
    pub uri: &'a str,
    pub cnonce: &'a str,
    pub nonce_count: u32,
}

impl DigestChallenge {
    /// RFC 2617 `Authorization: Digest ...` 헤더 값을 계산합니다.
    pub fn authorization(&self, input: &DigestInput<'_>) -> String {
        let md5_sess = self
            .algorithm
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case("MD5-sess"));
        let mut ha1 = md5_hex(&format!("{}:{}:{}", input.username, self.realm, input.password));
        if md5_sess {
            ha1 = md5_hex(&format!("{ha1}:{}:{}", self.nonce, input.cnonce));
        }
        let ha2 = md5_hex(&format!("{}:{}", input.method, input.uri));
        let qop_auth = self
            .qop
            .as_deref()
            .is_some_and(|q| q.split(',').any(|v| v.trim().eq_ignore_ascii_case("auth")));
        let nc = format!("{:08x}", input.nonce_count);

        let response = if qop_auth {
            md5_hex(&format!("{ha1}:{}:{nc}:{}:auth:{ha2}", self.nonce, input.cnonce))
        } else {
            md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            input.username, self.realm, self.nonce, input.uri, response
        );
        if let Some(algorithm) = &self.algorithm {
            header.push_str(&format!(", algorithm={algorithm}"));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        if qop_auth {
            header.push_str(&format!(", qop=auth, nc={nc}, cnonce=\"{}\"", input.cnonce));
        }
        header
    }
}

/// `Authorization: Basic ...` 헤더 값
pub fn basic_authorization(username: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex_known_vector() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_ua_auth_absent_without_password() {
        assert_eq!(compute_ua_auth("Agent/1.0", None, "s1", "RETS/1.7.2"), None);
    }

    #[test]
    fn test_ua_auth_matches_manual_computation() {
        let a1 = md5_hex("Agent/1.0:pw");
        let expected = md5_hex(&format!("{a1}::SESSION:RETS/1.7.2"));
        assert_eq!(
            compute_ua_auth("Agent/1.0", Some("pw"), "SESSION", "RETS/1.7.2"),
            Some(expected)
        );
    }

    #[test]
    fn test_ua_auth_depends_on_session() {
        let a = compute_ua_auth("Agent/1.0", Some("pw"), "s1", "RETS/1.7.2");
        let b = compute_ua_auth("Agent/1.0", Some("pw"), "s2", "RETS/1.7.2");
        assert_ne!(a, b);
    }

    #[test]
    fn test_delegate_auth() {
        let expected = md5_hex("ua:dpw:dhash:did");
        assert_eq!(compute_delegate_auth("ua", "dpw", "dhash", "did"), expected);
        assert_eq!(digest_header_value(&expected), format!("Digest {expected}"));
    }

    #[test]
    fn test_parse_digest_challenge() {
        let challenge = AuthChallenge::parse(
            r#"Digest realm="rets@example.com", qop="auth", nonce="abc123", opaque="xyz""#,
        )
        .unwrap();
        let AuthChallenge::Digest(d) = challenge else {
            panic!("expected digest challenge");
        };
        assert_eq!(d.realm, "rets@example.com");
        assert_eq!(d.nonce, "abc123");
        assert_eq!(d.qop.as_deref(), Some("auth"));
        assert_eq!(d.opaque.as_deref(), Some("xyz"));
    }

    #[test]
    fn test_select_prefers_digest() {
        let selected = AuthChallenge::select([
            r#"Basic realm="x""#,
            r#"Digest realm="x", nonce="n""#,
        ]);
        assert!(matches!(selected, Some(AuthChallenge::Digest(_))));
        assert_eq!(AuthChallenge::select([r#"Basic realm="x""#]), Some(AuthChallenge::Basic));
        assert_eq!(AuthChallenge::select(["Bearer token"]), None);
    }

    #[test]
    fn test_digest_rfc2617_example() {
        // RFC 2617 section 3.5
        let challenge = DigestChallenge {
            realm: "testrealm@host.com".into(),
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093".into(),
            opaque: Some("5ccc069c403ebaf9f0171e9517f40e41".into()),
            qop: Some("auth,auth-int".into()),
            algorithm: None,
        };
        let header = challenge.authorization(&DigestInput {
            username: "Mufasa",
            password: "Circle Of Life",
            method: "GET",
            uri: "/dir/index.html",
            cnonce: "0a4f113b",
            nonce_count: 1,
        });
        assert!(header.contains(r#"response="6629fae49393a05397450978507c4ef1""#));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains(r#"opaque="5ccc069c403ebaf9f0171e9517f40e41""#));
    }

    #[test]
    fn test_basic_authorization() {
        assert_eq!(basic_authorization("Aladdin", "open sesame"), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }
}
