use crate::candle_store::CandleStore;
use crate::feed::combined_stream::{kline_stream_name, CombinedStreamClient};
use crate::feed::message::KlineEvent;
use crate::feed::rest::RestClient;
use crate::feed::FeedError;
use crate::model::{normalize_symbol, CandleInterval, Kline};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

const DEFAULT_BACKFILL_LIMIT: usize = 300;
const DEFAULT_SUBSCRIBER_BUFFER: usize = 100;

type SharedStore = Arc<RwLock<CandleStore<Kline>>>;
type StoreMap = RwLock<HashMap<String, SharedStore>>;

/// 캔들 윈도우 모니터
///
/// (심볼, 주기)별 롤링 윈도우를 유지합니다. 조회 시 캐시가 없으면
/// REST로 백필하고 해당 스트림의 라이브 구독을 등록해 이후 업데이트가
/// 윈도우를 유지하게 합니다. 주기별 맵은 서로 독립적으로 잠깁니다.
pub struct MarketMonitor {
    rest: RestClient,
    stream: Arc<CombinedStreamClient>,
    stores_3m: StoreMap,
    stores_15m: StoreMap,
    stores_30m: StoreMap,
    stores_1h: StoreMap,
    stores_4h: StoreMap,
    backfill_limit: usize,
    subscriber_buffer: usize,
}

impl MarketMonitor {
    pub fn new(rest: RestClient, stream: Arc<CombinedStreamClient>) -> MarketMonitor {
        MarketMonitor {
            rest,
            stream,
            stores_3m: RwLock::new(HashMap::new()),
            stores_15m: RwLock::new(HashMap::new()),
            stores_30m: RwLock::new(HashMap::new()),
            stores_1h: RwLock::new(HashMap::new()),
            stores_4h: RwLock::new(HashMap::new()),
            backfill_limit: DEFAULT_BACKFILL_LIMIT,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }

    fn stores(&self, interval: CandleInterval) -> &StoreMap {
        match interval {
            CandleInterval::Minute3 => &self.stores_3m,
            CandleInterval::Minute15 => &self.stores_15m,
            CandleInterval::Minute30 => &self.stores_30m,
            CandleInterval::Hour1 => &self.stores_1h,
            CandleInterval::Hour4 => &self.stores_4h,
        }
    }

    /// 스트림 연결 후 심볼 전체를 초기화합니다.
    ///
    /// 모든 (심볼, 주기)에 대해 히스토리를 백필하고 구독자를 등록한 뒤
    /// 주기별로 일괄 구독 프레임을 전송합니다.
    pub async fn start(self: &Arc<Self>, symbols: &[String]) -> Result<(), FeedError> {
        self.stream.connect().await?;

        log::info!("{}개 심볼 모니터링 시작", symbols.len());
        for symbol in symbols {
            let symbol = normalize_symbol(symbol);
            for interval in CandleInterval::ALL {
                if let Err(e) = self.backfill_and_track(&symbol, interval).await {
                    log::warn!("{} {} 초기화 실패: {}", symbol, interval, e);
                }
            }
        }

        let normalized: Vec<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        for interval in CandleInterval::ALL {
            self.stream
                .batch_subscribe_klines(&normalized, interval)
                .await?;
        }

        Ok(())
    }

    /// 현재 윈도우 스냅샷을 반환합니다.
    ///
    /// 캐시 미스 시 REST 백필(기본 300개)을 수행하고 윈도우를 등록한 뒤
    /// 해당 스트림의 라이브 구독을 시작합니다. REST 백필까지 실패한
    /// 경우에만 오류를 반환합니다.
    pub async fn get_current_klines(
        self: &Arc<Self>,
        symbol: &str,
        interval: CandleInterval,
    ) -> Result<Vec<Kline>, FeedError> {
        let symbol = normalize_symbol(symbol);

        {
            let stores = self.stores(interval).read().await;
            if let Some(store) = stores.get(&symbol) {
                log::trace!("{} {} 캐시 적중", symbol, interval);
                return Ok(store.read().await.snapshot());
            }
        }

        log::info!("{} {} 캐시 미스, REST 백필 수행", symbol, interval);
        let store = self.backfill_and_track(&symbol, interval).await?;

        // 라이브 구독 실패는 로그만 남김. 백필 데이터가 이미 있으므로
        // 다음 재연결 시 기록된 스트림으로 복구됨
        let stream_name = kline_stream_name(&symbol, interval);
        if let Err(e) = self.stream.subscribe_streams(&[stream_name]).await {
            log::warn!("{} {} 동적 구독 실패: {}", symbol, interval, e);
        }

        let snapshot = store.read().await.snapshot();
        Ok(snapshot)
    }

    /// REST 백필로 윈도우를 만들고 구독자 리더 태스크를 시작합니다.
    async fn backfill_and_track(
        self: &Arc<Self>,
        symbol: &str,
        interval: CandleInterval,
    ) -> Result<SharedStore, FeedError> {
        let klines = self
            .rest
            .get_klines(symbol, interval, self.backfill_limit)
            .await?;

        let store = {
            let mut stores = self.stores(interval).write().await;
            if let Some(existing) = stores.get(symbol) {
                // 동시 백필 경합: 먼저 등록된 윈도우를 사용
                Arc::clone(existing)
            } else {
                let store = Arc::new(RwLock::new(CandleStore::new(
                    klines,
                    self.backfill_limit,
                )));
                stores.insert(symbol.to_string(), Arc::clone(&store));

                let stream_name = kline_stream_name(symbol, interval);
                let receiver = self.stream.add_subscriber(&stream_name, self.subscriber_buffer).await;
                tokio::spawn(run_reader(
                    symbol.to_string(),
                    interval,
                    Arc::clone(&store),
                    receiver,
                ));

                store
            }
        };

        Ok(store)
    }

    /// 스트림 캔들 하나를 윈도우에 병합합니다.
    ///
    /// 시작 시각이 말단과 같으면 말단을 덮어쓰고, 새 시각이면 덧붙인 뒤
    /// 용량 초과분을 앞에서 제거합니다. 윈도우가 없으면 새로 만듭니다.
    pub async fn process_kline_update(
        &self,
        symbol: &str,
        interval: CandleInterval,
        kline: Kline,
    ) {
        let symbol = normalize_symbol(symbol);
        let store = {
            let mut stores = self.stores(interval).write().await;
            Arc::clone(stores.entry(symbol).or_insert_with(|| {
                Arc::new(RwLock::new(CandleStore::new(
                    Vec::new(),
                    self.backfill_limit,
                )))
            }))
        };

        store.write().await.merge(kline);
    }

    /// 테스트/사전 적재용: 윈도우를 직접 설정합니다.
    pub async fn seed_klines(&self, symbol: &str, interval: CandleInterval, klines: Vec<Kline>) {
        let symbol = normalize_symbol(symbol);
        let store = Arc::new(RwLock::new(CandleStore::new(klines, self.backfill_limit)));
        self.stores(interval).write().await.insert(symbol, store);
    }

    /// 현재 보유 중인 윈도우 스냅샷 (구독/백필 없이 조회만)
    pub async fn peek_klines(
        &self,
        symbol: &str,
        interval: CandleInterval,
    ) -> Option<Vec<Kline>> {
        let symbol = normalize_symbol(symbol);
        let stores = self.stores(interval).read().await;
        let store = stores.get(&symbol)?.clone();
        drop(stores);
        let snapshot = store.read().await.snapshot();
        Some(snapshot)
    }
}

/// 구독자 큐를 소비해 윈도우 병합을 수행하는 리더 태스크
///
/// 디코딩에 실패한 메시지는 버리고 소비를 계속합니다.
async fn run_reader(
    symbol: String,
    interval: CandleInterval,
    store: SharedStore,
    mut receiver: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(payload) = receiver.recv().await {
        let event: KlineEvent = match serde_json::from_slice(&payload) {
            Ok(event) => event,
            Err(e) => {
                log::warn!("{} {} K선 디코딩 실패: {}", symbol, interval, e);
                continue;
            }
        };

        match event.kline.to_kline() {
            Ok(kline) => {
                store.write().await.merge(kline);
            }
            Err(e) => {
                log::warn!("{} {} K선 변환 실패: {}", symbol, interval, e);
            }
        }
    }

    log::debug!("{} {} 리더 태스크 종료", symbol, interval);
}
