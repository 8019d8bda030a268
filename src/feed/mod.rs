// 거래소 데이터 수집 모듈
// 결합 스트림 WebSocket 하나로 모든 K선 스트림을 수신하고,
// 캐시 미스 시 REST 백필로 윈도우를 채운 뒤 라이브 구독을 등록합니다.
//
// # 주요 컴포넌트
// - combined_stream: 단일 결합 스트림 소비자와 구독자별 큐 분배
// - rest: K선 백필 / 미결제약정 / 펀딩비 REST 클라이언트
// - message: 스트림 페이로드 디코딩
// - monitor: (심볼, 주기)별 캔들 윈도우 유지와 조회 API

pub mod combined_stream;
pub mod message;
pub mod monitor;
pub mod rest;

pub use combined_stream::CombinedStreamClient;
pub use monitor::MarketMonitor;
pub use rest::{OpenInterest, RestClient};

use std::fmt::Display;

/// 수집 계층 오류
#[derive(Debug)]
pub enum FeedError {
    /// WebSocket 전송 오류
    Transport(String),
    /// REST 호출 오류 (네트워크, 비 2xx)
    Http(String),
    /// 페이로드 디코딩 오류
    Decode(String),
    /// 연결 전 구독 시도
    NotConnected,
    /// 구독 제어 프레임 전송 실패
    Subscribe(String),
}

impl Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Transport(msg) => write!(f, "전송 오류: {}", msg),
            FeedError::Http(msg) => write!(f, "REST 오류: {}", msg),
            FeedError::Decode(msg) => write!(f, "디코딩 오류: {}", msg),
            FeedError::NotConnected => write!(f, "스트림이 연결되어 있지 않습니다"),
            FeedError::Subscribe(msg) => write!(f, "구독 오류: {}", msg),
        }
    }
}

impl std::error::Error for FeedError {}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> FeedError {
        FeedError::Http(err.to_string())
    }
}
