use crate::model::Candle;

/// 제한된 크기의 캔들 윈도우 저장소
///
/// 캔들은 시작 시각 기준으로 엄격한 오름차순으로 저장됩니다
/// (가장 오래된 캔들이 앞, 진행 중 캔들이 마지막). 스트림 업데이트는
/// 시작 시각이 일치하는 원소를 제자리 갱신하거나 새 캔들로 덧붙이며,
/// 최대 크기를 초과하면 가장 오래된 캔들이 제거됩니다.
#[derive(Debug)]
pub struct CandleStore<C: Candle> {
    items: Vec<C>,
    pub max_size: usize,
}

impl<C> CandleStore<C>
where
    C: Candle,
{
    /// 초기 캔들 목록으로 저장소를 생성합니다.
    ///
    /// # Arguments
    /// * `items` - 초기 캔들 목록 (정렬 상태 무관)
    /// * `max_size` - 저장소의 최대 크기
    pub fn new(mut items: Vec<C>, max_size: usize) -> CandleStore<C> {
        items.sort_by_key(|c| c.open_time());
        // 동일 시작 시각 중복은 마지막 항목만 유지
        items.dedup_by(|next, prev| next.open_time() == prev.open_time());

        // 최대 크기 초과분은 가장 오래된 캔들부터 제거
        if items.len() > max_size {
            let excess = items.len() - max_size;
            items.drain(0..excess);
        }

        CandleStore { items, max_size }
    }

    /// 스트림으로 들어온 캔들을 윈도우에 병합합니다.
    ///
    /// 시작 시각이 기존 캔들과 일치하면 해당 캔들을 덮어쓰고,
    /// 새로운 시각이면 정렬 위치에 삽입한 뒤 초과분을 제거합니다.
    /// 같은 캔들을 두 번 병합해도 윈도우는 변하지 않습니다.
    pub fn merge(&mut self, candle: C) {
        match self
            .items
            .binary_search_by_key(&candle.open_time(), |c| c.open_time())
        {
            Ok(index) => {
                // 진행 중 캔들 갱신 (보통 마지막 원소)
                self.items[index] = candle;
            }
            Err(index) => {
                if index < self.items.len() {
                    log::debug!(
                        "순서가 어긋난 캔들 병합: open_time={} (윈도우 끝={})",
                        candle.open_time(),
                        self.items.last().map(|c| c.open_time()).unwrap_or(0)
                    );
                }
                self.items.insert(index, candle);
                if self.items.len() > self.max_size {
                    self.items.remove(0);
                }
            }
        }
    }

    /// 저장된 캔들 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 저장소가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 가장 오래된 캔들을 반환합니다.
    pub fn oldest(&self) -> Option<&C> {
        self.items.first()
    }

    /// 가장 최신 캔들(진행 중 캔들)을 반환합니다.
    pub fn latest(&self) -> Option<&C> {
        self.items.last()
    }

    /// 최신 종가를 반환합니다.
    pub fn latest_price(&self) -> Option<f64> {
        self.items.last().map(|c| c.close_price())
    }

    /// 지정된 인덱스의 캔들을 반환합니다.
    pub fn get(&self, index: usize) -> Option<&C> {
        self.items.get(index)
    }

    /// 전체 캔들 슬라이스를 반환합니다 (오래된 것부터 최신 순).
    pub fn items(&self) -> &[C] {
        &self.items
    }

    /// 분석기에 전달할 스냅샷 복사본을 반환합니다.
    pub fn snapshot(&self) -> Vec<C> {
        self.items.clone()
    }

    /// 최근 n개 캔들의 종가가 연속 상승했는지 확인합니다.
    pub fn is_rise(&self, n: usize) -> bool {
        let count = self.items.len().min(n);
        if count < 2 {
            return false;
        }

        let start = self.items.len() - count;
        self.items[start..]
            .windows(2)
            .all(|w| w[1].close_price() > w[0].close_price())
    }

    /// 최근 n개 캔들의 종가가 연속 하락했는지 확인합니다.
    pub fn is_fall(&self, n: usize) -> bool {
        let count = self.items.len().min(n);
        if count < 2 {
            return false;
        }

        let start = self.items.len() - count;
        self.items[start..]
            .windows(2)
            .all(|w| w[1].close_price() < w[0].close_price())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kline;

    fn kline(open_time: i64, close: f64) -> Kline {
        Kline {
            open_time,
            close_time: open_time + 180_000 - 1,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            quote_volume: 100.0 * close,
            taker_buy_volume: 50.0,
            taker_buy_quote_volume: 50.0 * close,
            trades: 10,
        }
    }

    #[test]
    fn test_new_sorts_ascending_and_bounds() {
        let store = CandleStore::new(vec![kline(3, 3.0), kline(1, 1.0), kline(2, 2.0)], 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.oldest().unwrap().open_time, 2);
        assert_eq!(store.latest().unwrap().open_time, 3);
    }

    #[test]
    fn test_merge_replaces_matching_open_time() {
        let mut store = CandleStore::new(vec![kline(1, 1.0), kline(2, 2.0)], 10);
        store.merge(kline(2, 5.0));
        assert_eq!(store.len(), 2);
        assert_eq!(store.latest().unwrap().close, 5.0);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut store = CandleStore::new(vec![kline(1, 1.0)], 10);
        store.merge(kline(2, 2.0));
        let before = store.snapshot();
        store.merge(kline(2, 2.0));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_merge_appends_and_evicts_oldest() {
        let mut store = CandleStore::new(vec![kline(1, 1.0), kline(2, 2.0), kline(3, 3.0)], 3);
        store.merge(kline(4, 4.0));
        assert_eq!(store.len(), 3);
        assert_eq!(store.oldest().unwrap().open_time, 2);
        assert_eq!(store.latest().unwrap().open_time, 4);
    }

    #[test]
    fn test_open_times_strictly_increasing_after_merges() {
        let mut store = CandleStore::new(Vec::new(), 50);
        for t in [5i64, 1, 3, 3, 2, 9, 7, 9] {
            store.merge(kline(t, t as f64));
        }
        let times: Vec<i64> = store.items().iter().map(|c| c.open_time).collect();
        for w in times.windows(2) {
            assert!(w[0] < w[1], "시작 시각이 엄격히 증가해야 함: {:?}", times);
        }
    }

    #[test]
    fn test_is_rise_and_fall() {
        let store = CandleStore::new(
            vec![kline(1, 1.0), kline(2, 2.0), kline(3, 3.0)],
            10,
        );
        assert!(store.is_rise(3));
        assert!(!store.is_fall(3));
    }
}
