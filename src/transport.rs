//! HTTP transport 추상화
//!
//! 코어는 [`Transport`] 트레이트만 사용합니다. 요청 하나를 보내고 상태 코드, 헤더,
//! 본문을 받아오는 것이 전부이며, 쿠키 저장소는 transport 구현이 소유합니다.
//! [`Transport::send_streaming`]은 헤더가 도착하는 즉시 돌려주고 본문은 [`BodyStream`]으로 넘깁니다.
//!
//! [`ReqwestTransport`]는 cookie_store를 활성화한 reqwest 기반 기본 구현입니다
//! *(feature `"client"` 활성화 시)*.

use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use url::Url;

use crate::error::Result;

/// HTTP 메서드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// 순서를 보존하고 이름을 대소문자 구분 없이 비교하는 헤더 목록
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 같은 이름의 기존 값을 대체합니다.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// `overlay`의 값이 우선하는 새 헤더 목록을 만듭니다. 두 원본은 그대로입니다.
    pub fn merged(&self, overlay: &HeaderSet) -> HeaderSet {
        let mut out = self.clone();
        for (name, value) in overlay.iter() {
            out.set(name, value);
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// transport에 넘기는 요청
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub headers: HeaderSet,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            query: Vec::new(),
            headers: HeaderSet::new(),
            body: None,
        }
    }

    /// Digest 인증에 쓰는 요청 URI (경로 + 인코딩된 쿼리)
    pub fn request_uri(&self) -> String {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        }
    }
}

/// transport가 돌려주는 응답
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    /// 이름이 같은 첫 번째 헤더 값 (대소문자 무시)
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// 이름이 같은 모든 헤더 값
    pub fn headers_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        all_headers(&self.headers, name)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// 본문을 UTF-8 텍스트로 반환합니다.
    ///
    /// 잘못된 바이트(예: ISO-8859-1 본문)는 대체 문자로 바뀌며 이때 경고를 남깁니다.
    pub fn text(&self) -> String {
        decode_text(&self.body)
    }
}

/// UTF-8이 아닌 바이트를 대체 문자로 바꿔 디코딩합니다.
pub(crate) fn decode_text(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(err) => {
            tracing::warn!(
                valid_up_to = err.valid_up_to(),
                bytes = body.len(),
                "response body is not valid UTF-8; invalid bytes replaced with U+FFFD"
            );
            String::from_utf8_lossy(body).into_owned()
        }
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn all_headers<'a>(headers: &'a [(String, String)], name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .iter()
        .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// 응답 본문을 청크 단위로 읽는 스트림
#[async_trait]
pub trait BodyStream: Send {
    /// 다음 청크. 본문이 끝나면 `None`입니다.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// 이미 버퍼링된 본문을 청크 하나로 내보내는 스트림
#[derive(Debug)]
struct Buffered(Option<Bytes>);

#[async_trait]
impl BodyStream for Buffered {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        Ok(self.0.take().filter(|chunk| !chunk.is_empty()))
    }
}

/// 헤더는 도착했고 본문은 아직 읽지 않은 응답
pub struct StreamingResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Box<dyn BodyStream>,
}

impl StreamingResponse {
    /// 이미 받은 응답을 스트리밍 형태로 감쌉니다.
    pub fn buffered(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: Box::new(Buffered(Some(response.body))),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn headers_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        all_headers(&self.headers, name)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// 본문을 끝까지 읽어 [`HttpResponse`]로 만듭니다.
    pub async fn collect(self) -> Result<HttpResponse> {
        let Self {
            status,
            headers,
            mut body,
        } = self;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next_chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(HttpResponse {
            status,
            headers,
            body: buffer.freeze(),
        })
    }
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// HTTP 요청을 보내는 협력자
///
/// 구현은 호출 사이에 쿠키 저장소를 공유해야 합니다.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// 헤더가 도착하면 바로 돌려주고 본문은 스트림으로 넘깁니다.
    ///
    /// 기본 구현은 [`send`](Transport::send)로 본문을 모두 받은 뒤 감쌉니다.
    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse> {
        let response = self.send(request).await?;
        Ok(StreamingResponse::buffered(response))
    }
}

#[cfg(feature = "client")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "client")]
mod reqwest_transport {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::cookie::Jar;
    use reqwest::Client;

    use bytes::Bytes;

    use super::{BodyStream, HttpRequest, HttpResponse, Method, StreamingResponse, Transport};
    use crate::error::Result;

    /// reqwest 기반 transport
    ///
    /// 모든 바운드 세션이 이 인스턴스 하나를 공유하므로 쿠키 저장소도 하나입니다.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        http: Client,
        jar: Arc<Jar>,
    }

    impl ReqwestTransport {
        /// cookie_store와 rustls-tls를 사용하는 클라이언트를 생성합니다.
        pub fn new(timeout: Duration) -> Result<Self> {
            let jar = Arc::new(Jar::default());
            let http = Client::builder()
                .cookie_provider(Arc::clone(&jar))
                .timeout(timeout)
                .build()?;
            Ok(Self { http, jar })
        }

        /// 공유 쿠키 저장소
        pub fn cookie_jar(&self) -> Arc<Jar> {
            Arc::clone(&self.jar)
        }
    }

    /// reqwest 응답 본문 스트림
    struct ReqwestBody {
        response: reqwest::Response,
        received: usize,
    }

    #[async_trait]
    impl BodyStream for ReqwestBody {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
            let chunk = self.response.chunk().await?;
            match &chunk {
                Some(bytes) => self.received += bytes.len(),
                None => tracing::debug!(
                    url = %self.response.url(),
                    bytes = self.received,
                    "response body complete"
                ),
            }
            Ok(chunk)
        }
    }

    #[async_trait]
    impl Transport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.send_streaming(request).await?.collect().await
        }

        async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse> {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
            };
            let mut builder = self.http.request(method, request.url.clone());
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            for (name, value) in request.headers.iter() {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    )
                })
                .collect();
            tracing::debug!(url = %request.url, status, "response headers received");

            Ok(StreamingResponse {
                status,
                headers,
                body: Box::new(ReqwestBody {
                    response,
                    received: 0,
                }),
            })
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_set_case_insensitive_replace() {
        let mut headers = HeaderSet::new();
        headers.set("RETS-Version", "RETS/1.5");
        headers.set("rets-version", "RETS/1.7.2");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("RETS-VERSION"), Some("RETS/1.7.2"));
    }

    #[test]
    fn test_header_set_merged_leaves_base_untouched() {
        let base = HeaderSet::new().with("User-Agent", "a").with("Accept", "*/*");
        let overlay = HeaderSet::new().with("X-Delegate-ID", "d1").with("accept", "image/*");
        let merged = base.merged(&overlay);
        assert_eq!(merged.get("Accept"), Some("image/*"));
        assert_eq!(merged.get("X-Delegate-ID"), Some("d1"));
        assert!(!base.contains("X-Delegate-ID"));
        assert_eq!(base.get("Accept"), Some("*/*"));
    }

    #[test]
    fn test_request_uri_includes_query() {
        let mut req = HttpRequest::get(Url::parse("http://rets.example.com/rets/search").unwrap());
        req.query.push(("Class".into(), "RES".into()));
        req.query.push(("Query".into(), "(Status=A)".into()));
        assert_eq!(req.request_uri(), "/rets/search?Class=RES&Query=%28Status%3DA%29");
    }

    #[test]
    fn test_response_header_lookup() {
        let resp = HttpResponse {
            status: 200,
            headers: vec![
                ("set-cookie".into(), "a=1".into()),
                ("Set-Cookie".into(), "b=2".into()),
            ],
            body: Bytes::new(),
        };
        assert_eq!(resp.header("SET-COOKIE"), Some("a=1"));
        assert_eq!(resp.headers_all("set-cookie").count(), 2);
        assert!(resp.is_ok());
    }

    #[test]
    fn test_header_value_outlives_name() {
        let resp = HttpResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "text/xml".into())],
            body: Bytes::new(),
        };
        let value = {
            let name = String::from("content-type");
            resp.header(&name)
        };
        assert_eq!(value, Some("text/xml"));
    }

    #[test]
    fn test_text_replaces_latin1_bytes() {
        let resp = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: Bytes::from_static(b"<DATA>Caf\xE9</DATA>"),
        };
        assert_eq!(resp.text(), "<DATA>Caf\u{FFFD}</DATA>");
        assert_eq!(decode_text("plain".as_bytes()), "plain");
    }

    #[tokio::test]
    async fn test_buffered_streaming_response_collects_body() {
        let streaming = StreamingResponse::buffered(HttpResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "image/jpeg".into())],
            body: Bytes::from_static(b"\xFF\xD8jpeg"),
        });
        assert_eq!(streaming.header("content-type"), Some("image/jpeg"));
        let response = streaming.collect().await.unwrap();
        assert_eq!(&response.body[..], b"\xFF\xD8jpeg");
        assert_eq!(response.status, 200);
    }
}
