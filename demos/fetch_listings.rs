//! 매물 검색 결과를 JSON으로 출력하는 CLI 예제
//!
//! 접속 정보는 `RETS_*` 환경 변수에서 읽습니다
//! (`RETS_LOGIN_URL`, `RETS_USERNAME`, `RETS_PASSWORD`, 선택: `RETS_USER_AGENT`, `RETS_USER_AGENT_PASSWORD`).
//!
//! 사용법:
//! ```bash
//! cargo run --example fetch_listings -- <resource> <class> <query> [limit]
//! ```
//!
//! 예시:
//! ```bash
//! RUST_LOG=retsra=debug cargo run --example fetch_listings -- Property RE_1 "(ListPrice=300000+)" 10
//! ```

use std::env;

use retsra::search::{CountMode, SearchRequest};
use retsra::{ClientConfig, MetadataRecord, RetsClient};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// JSON 출력용 데이터 구조
#[derive(Debug, Serialize)]
struct OutputData {
    /// 성공 여부
    success: bool,
    /// 메시지 (에러 시 에러 메시지)
    message: String,
    /// 서버가 보고한 전체 건수
    count: Option<u64>,
    /// 검색 결과 (컬럼 → 값)
    records: Vec<MetadataRecord>,
}

impl OutputData {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            count: None,
            records: Vec::new(),
        }
    }
}

fn print_usage() {
    eprintln!("RETS 매물 검색 CLI");
    eprintln!();
    eprintln!("사용법:");
    eprintln!("  cargo run --example fetch_listings -- <resource> <class> <query> [limit]");
    eprintln!();
    eprintln!("인자:");
    eprintln!("  resource - SearchType (예: Property)");
    eprintln!("  class    - Class (예: RE_1)");
    eprintln!("  query    - DMQL2 쿼리 (예: \"(ListPrice=300000+)\")");
    eprintln!("  limit    - 최대 건수 (기본: 서버 설정)");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if !(4..=5).contains(&args.len()) {
        print_usage();
        std::process::exit(1);
    }

    let mut request = SearchRequest::new(&args[1], &args[2], &args[3]).with_count(CountMode::WithRecords);
    if let Some(raw) = args.get(4) {
        match raw.parse() {
            Ok(limit) => request = request.with_limit(limit),
            Err(_) => {
                eprintln!("limit은 숫자여야 합니다: {raw}");
                std::process::exit(1);
            }
        }
    }

    let result = fetch_listings(&request).await;

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("JSON 직렬화 실패: {}", e);
            std::process::exit(1);
        }
    }

    if !result.success {
        std::process::exit(1);
    }
}

async fn fetch_listings(request: &SearchRequest) -> OutputData {
    let config = match ClientConfig::from_env() {
        Ok(c) => c,
        Err(e) => return OutputData::failure(format!("설정 읽기 실패: {}", e)),
    };

    let mut client = match RetsClient::new(config) {
        Ok(c) => c,
        Err(e) => return OutputData::failure(format!("클라이언트 생성 실패: {}", e)),
    };

    // 1. 로그인
    if let Err(e) = client.login().await {
        return OutputData::failure(format!("로그인 실패: {}", e));
    }

    // 2. 검색
    let outcome = client.search(request).await;

    // 3. 로그아웃 (실패해도 검색 결과는 출력)
    if let Err(e) = client.logout().await {
        tracing::warn!(error = %e, "logout failed");
    }

    match outcome {
        Ok(result) => OutputData {
            success: true,
            message: format!(
                "조회 성공: {} 건 (전체 {:?}){}",
                result.records.len(),
                result.count,
                if result.max_rows { ", 서버 최대 건수에서 잘림" } else { "" }
            ),
            count: result.count,
            records: result.records,
        },
        Err(e) => OutputData::failure(format!("검색 실패: {}", e)),
    }
}
