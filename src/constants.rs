//! RETS 프로토콜에서 사용하는 헤더 이름, 기본값, 응답 코드 상수를 정의합니다.

/// 기본 RETS 프로토콜 버전
pub const DEFAULT_RETS_VERSION: &str = "RETS/1.7.2";

/// 기본 User-Agent 문자열
pub const DEFAULT_USER_AGENT: &str = "retsra/0.1";

/// compact 포맷의 기본 구분자 (TAB)
pub const DEFAULT_DELIMITER: char = '\t';

/// Update `Record` 파라미터의 기본 필드 구분자
pub const DEFAULT_UPDATE_DELIMITER: char = '|';

/// 요청 타임아웃 기본값 (초)
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// 이벤트 브로드캐스트 채널 기본 용량
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// 객체 전송 상태 채널 용량
pub const TRANSFER_EVENT_CAPACITY: usize = 16;

/// Search 기본 QueryType
pub const DEFAULT_SEARCH_QUERY_TYPE: &str = "DMQL2";

/// Search 기본 Format
pub const DEFAULT_SEARCH_FORMAT: &str = "COMPACT-DECODED";

/// GetMetadata 기본 Format
pub const DEFAULT_METADATA_FORMAT: &str = "COMPACT";

/// 사진 조회에 쓰는 객체 타입
pub const PHOTO_TYPE: &str = "Photo";

/// 객체 요청 Accept 헤더 값
pub const IMAGE_ACCEPT: &str = "image/*";

/// 헤더 이름
pub mod headers {
    pub const USER_AGENT: &str = "User-Agent";
    pub const RETS_VERSION: &str = "RETS-Version";
    pub const RETS_SERVER: &str = "RETS-Server";
    pub const UA_AUTHORIZATION: &str = "RETS-UA-Authorization";
    pub const DELEGATE_ID: &str = "X-Delegate-ID";
    pub const DELEGATE_AUTHORIZATION: &str = "X-Delegate-Authorization";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
    pub const ACCEPT: &str = "Accept";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const SET_COOKIE: &str = "Set-Cookie";
}

/// 세션 ID를 담는 쿠키 이름
pub const SESSION_COOKIE: &str = "RETS-Session-ID";

/// 응답 코드
pub mod reply_codes {
    /// 성공
    pub const SUCCESS: i32 = 0;
    /// Search: 조건에 맞는 레코드 없음
    pub const NO_RECORDS_FOUND: i32 = 20201;
    /// GetObject: 객체 없음
    pub const NO_OBJECT_FOUND: i32 = 20403;
}

/// photo 경로에서 빈 파트 본문 자리에 삽입하는 합성 성공 envelope
pub const SYNTHETIC_SUCCESS_ENVELOPE: &str = "<RETS ReplyCode=\"0\" ReplyText=\"Operation Successful\" />";
