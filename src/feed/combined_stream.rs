use crate::feed::message::CombinedFrame;
use crate::feed::FeedError;
use crate::model::CandleInterval;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const DEFAULT_ENDPOINT: &str = "wss://fstream.binance.com/stream";
const MAX_BACKOFF_SECS: u64 = 60;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Default)]
struct StreamState {
    /// 스트림 이름 → 구독자 큐
    subscribers: HashMap<String, mpsc::Sender<Vec<u8>>>,
    /// 재연결 시 복구할 구독 스트림 집합
    streams_of_record: HashSet<String>,
    /// 현재 세션의 제어 프레임 송신 채널
    command_tx: Option<mpsc::Sender<String>>,
}

/// 결합 스트림 WebSocket 클라이언트
///
/// 하나의 논리적 연결로 여러 K선 스트림을 수신하고 스트림 이름별
/// 구독자 큐로 분배합니다. 구독자가 큐를 비우지 못하면 초과 메시지는
/// 버려지며(drop-tail), 전송 오류 시 백오프 재연결 후 기록된 스트림을
/// 다시 구독합니다.
pub struct CombinedStreamClient {
    endpoint: String,
    state: Arc<RwLock<StreamState>>,
    next_request_id: AtomicU64,
}

impl CombinedStreamClient {
    pub fn new() -> CombinedStreamClient {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> CombinedStreamClient {
        CombinedStreamClient {
            endpoint: endpoint.to_string(),
            state: Arc::new(RwLock::new(StreamState::default())),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// 스트림 구독자를 등록하고 수신 큐를 반환합니다.
    ///
    /// # Arguments
    /// * `stream` - 스트림 이름 (예: "btcusdt@kline_3m")
    /// * `buffer` - 큐 버퍼 크기
    pub async fn add_subscriber(&self, stream: &str, buffer: usize) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut state = self.state.write().await;
        if state.subscribers.insert(stream.to_string(), tx).is_some() {
            log::debug!("{} 스트림 구독자 교체", stream);
        }
        rx
    }

    /// 최초 연결을 수립하고 백그라운드 수신/재연결 루프를 시작합니다.
    pub async fn connect(&self) -> Result<(), FeedError> {
        let (ws, _) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;
        log::info!("결합 스트림 연결 성공: {}", self.endpoint);

        let endpoint = self.endpoint.clone();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            let mut session: Option<WsStream> = Some(ws);
            let mut backoff = 1u64;

            loop {
                let ws = match session.take() {
                    Some(ws) => ws,
                    None => match connect_async(endpoint.as_str()).await {
                        Ok((ws, _)) => {
                            log::info!("결합 스트림 재연결 성공");
                            backoff = 1;
                            ws
                        }
                        Err(e) => {
                            log::warn!("재연결 실패 ({}초 후 재시도): {}", backoff, e);
                            tokio::time::sleep(Duration::from_secs(backoff)).await;
                            backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                            continue;
                        }
                    },
                };

                run_session(ws, &state).await;

                // 세션 종료: 제어 채널을 닫고 백오프 후 재연결
                state.write().await.command_tx = None;
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
            }
        });

        Ok(())
    }

    /// 주어진 심볼 목록의 K선 스트림을 일괄 구독합니다.
    ///
    /// 이미 기록된 (심볼, 주기) 스트림은 건너뛰므로 반복 호출해도
    /// 안전합니다.
    pub async fn batch_subscribe_klines(
        &self,
        symbols: &[String],
        interval: CandleInterval,
    ) -> Result<(), FeedError> {
        let streams: Vec<String> = symbols
            .iter()
            .map(|symbol| kline_stream_name(symbol, interval))
            .collect();
        self.subscribe_streams(&streams).await
    }

    /// 이미 열린 연결에 스트림을 추가 구독합니다 (동적 확장).
    pub async fn subscribe_streams(&self, streams: &[String]) -> Result<(), FeedError> {
        let new_streams: Vec<String> = {
            let mut state = self.state.write().await;
            streams
                .iter()
                .filter(|s| state.streams_of_record.insert((*s).clone()))
                .cloned()
                .collect()
        };

        if new_streams.is_empty() {
            return Ok(());
        }

        let frame = self.subscribe_frame(&new_streams);
        let command_tx = self.state.read().await.command_tx.clone();
        let Some(command_tx) = command_tx else {
            return Err(FeedError::NotConnected);
        };

        command_tx
            .send(frame)
            .await
            .map_err(|e| FeedError::Subscribe(e.to_string()))?;

        log::info!("스트림 {}개 구독 요청", new_streams.len());
        Ok(())
    }

    fn subscribe_frame(&self, streams: &[String]) -> String {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        json!({
            "method": "SUBSCRIBE",
            "params": streams,
            "id": id,
        })
        .to_string()
    }
}

impl Default for CombinedStreamClient {
    fn default() -> CombinedStreamClient {
        CombinedStreamClient::new()
    }
}

/// K선 스트림 이름 ("<symbol소문자>@kline_<주기>")
pub fn kline_stream_name(symbol: &str, interval: CandleInterval) -> String {
    format!("{}@kline_{}", symbol.to_lowercase(), interval)
}

/// 단일 연결 세션: 제어 프레임 송신과 수신 분배를 전송이 끊길 때까지 수행
async fn run_session(ws: WsStream, state: &Arc<RwLock<StreamState>>) {
    let (mut write, mut read) = ws.split();
    let (command_tx, mut command_rx) = mpsc::channel::<String>(64);

    // 세션 시작: 제어 채널 교체 후 기록된 스트림 전체 재구독
    let resubscribe: Vec<String> = {
        let mut guard = state.write().await;
        guard.command_tx = Some(command_tx);
        guard.streams_of_record.iter().cloned().collect()
    };

    if !resubscribe.is_empty() {
        let frame = json!({
            "method": "SUBSCRIBE",
            "params": resubscribe,
            "id": 0,
        })
        .to_string();
        if let Err(e) = write.send(Message::Text(frame.into())).await {
            log::error!("재구독 프레임 전송 실패: {}", e);
            return;
        }
        log::info!("재연결 후 스트림 {}개 재구독", resubscribe.len());
    }

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else { break };
                if let Err(e) = write.send(Message::Text(command.into())).await {
                    log::error!("제어 프레임 전송 실패: {}", e);
                    break;
                }
            }
            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(state, text.as_ref()).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        log::warn!("서버가 연결을 종료함: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::error!("수신 오류: {}", e);
                        break;
                    }
                    None => {
                        log::warn!("스트림이 종료됨");
                        break;
                    }
                }
            }
        }
    }
}

/// 프레임의 stream 이름으로 구독자를 찾아 data 부분을 전달합니다.
/// 디코딩에 실패한 메시지는 버리고 스트림 소비는 계속합니다.
async fn dispatch(state: &Arc<RwLock<StreamState>>, text: &str) {
    let frame: CombinedFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            // 구독 응답 등 데이터 프레임이 아닌 메시지
            log::trace!("데이터 프레임이 아닌 메시지 무시: {}", text);
            return;
        }
    };

    let payload = match serde_json::to_vec(&frame.data) {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("{} 페이로드 직렬화 실패: {}", frame.stream, e);
            return;
        }
    };

    let guard = state.read().await;
    let Some(sender) = guard.subscribers.get(&frame.stream) else {
        log::trace!("구독자 없는 스트림: {}", frame.stream);
        return;
    };

    // 느린 구독자는 버퍼 초과분을 잃음 (drop-tail)
    if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(payload) {
        log::warn!("{} 구독자 큐 포화, 메시지 폐기", frame.stream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CandleInterval;

    #[test]
    fn test_kline_stream_name() {
        assert_eq!(
            kline_stream_name("BTCUSDT", CandleInterval::Minute3),
            "btcusdt@kline_3m"
        );
        assert_eq!(
            kline_stream_name("ethusdt", CandleInterval::Hour4),
            "ethusdt@kline_4h"
        );
    }

    #[tokio::test]
    async fn test_subscribe_streams_requires_connection() {
        let client = CombinedStreamClient::new();
        let result = client
            .subscribe_streams(&["btcusdt@kline_3m".to_string()])
            .await;
        assert!(matches!(result, Err(FeedError::NotConnected)));
    }

    #[tokio::test]
    async fn test_batch_subscribe_is_idempotent_per_stream() {
        let client = CombinedStreamClient::new();
        // 연결 없이 기록만 확인: 첫 호출은 NotConnected, 기록은 남음
        let symbols = vec!["BTCUSDT".to_string()];
        let _ = client
            .batch_subscribe_klines(&symbols, CandleInterval::Minute3)
            .await;
        // 같은 스트림 재시도는 신규 스트림이 없어 성공 (no-op)
        let result = client
            .batch_subscribe_klines(&symbols, CandleInterval::Minute3)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_drop_tail_on_full_subscriber_queue() {
        let client = CombinedStreamClient::new();
        let mut rx = client.add_subscriber("btcusdt@kline_3m", 1).await;

        let frame = r#"{"stream":"btcusdt@kline_3m","data":{"n":1}}"#;
        dispatch(&client.state, frame).await;
        dispatch(&client.state, frame).await; // 버퍼 1 초과분은 폐기

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }
}
