use crate::model::{Candle, SignalAction};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 볼륨 프로파일 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpConfig {
    /// 가격 빈 크기
    pub tick_size: f64,
    /// 가치 영역 커버리지 (0~1 비율, 기본 70%)
    pub value_area_percent: f64,
    /// 빈 채택 최소 거래량
    pub min_volume: f64,
    /// 이동평균 평활 폭 (1 이하이면 평활 없음)
    pub smoothing_factor: f64,
    /// 빈 개수 상한 (초과 시 tick_size를 확대)
    pub max_levels: usize,
}

impl Default for VpConfig {
    fn default() -> VpConfig {
        VpConfig {
            tick_size: 0.01,
            value_area_percent: 0.70,
            min_volume: 0.001,
            smoothing_factor: 1.0,
            max_levels: 200,
        }
    }
}

impl VpConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_size <= 0.0 {
            return Err("tick_size는 양수여야 합니다".to_string());
        }
        if !(0.0..=1.0).contains(&self.value_area_percent) {
            return Err("value_area_percent는 0~1 범위여야 합니다".to_string());
        }
        if self.max_levels == 0 {
            return Err("max_levels는 0일 수 없습니다".to_string());
        }
        Ok(())
    }
}

/// 가격 빈 하나의 집계
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    /// 빈 중심 가격
    pub price: f64,
    pub volume: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    /// 전체 거래량 대비 비율 [0,100]
    pub volume_percent: f64,
    /// 이 빈에 기여한 캔들 수
    pub trades: u64,
    pub is_poc: bool,
    pub in_value_area: bool,
}

/// 가치 영역
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueArea {
    pub high: f64,
    pub low: f64,
    /// 영역 누적 거래량 비율 [0,100]
    pub volume_percent: f64,
    pub price_range: f64,
    /// 전체 가격 범위 대비 영역 범위 비율 [0,100]
    pub price_range_percent: f64,
    pub profile_width: f64,
    /// 거래량 비율 / 빈 비율 (1보다 크면 집중)
    pub concentration: f64,
}

/// 거래량 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeStats {
    pub total_volume: f64,
    pub total_buy_volume: f64,
    pub total_sell_volume: f64,
    pub buy_sell_ratio: f64,
    /// 거래량 가중 평균가
    pub avg_price: f64,
    pub median_price: f64,
    /// 거래량 가중 가격 표준편차
    pub price_std_dev: f64,
    pub max_level: Option<PriceLevel>,
    pub min_level: Option<PriceLevel>,
}

/// 볼륨 프로파일 분석 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeProfile {
    pub poc: Option<PriceLevel>,
    pub vah: f64,
    pub val: f64,
    pub value_area: ValueArea,
    pub levels: Vec<PriceLevel>,
    pub stats: VolumeStats,
}

/// 볼륨 프로파일 신호 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VpSignalKind {
    PocTest,
    ValueAreaBreakout,
    ValueAreaReturn,
    HighVolume,
    LowVolume,
    Imbalance,
}

/// 볼륨 프로파일 신호
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpSignal {
    pub kind: VpSignalKind,
    /// 신호가 기준으로 삼은 가격 레벨
    pub level: f64,
    pub current_price: f64,
    pub strength: f64,
    pub description: String,
    pub action: SignalAction,
    pub confidence: f64,
    pub timestamp: i64,
}

/// 볼륨 프로파일 분석기
#[derive(Debug, Clone)]
pub struct VolumeProfileAnalyzer {
    config: VpConfig,
}

impl Display for VolumeProfileAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VolumeProfileAnalyzer {{ tick: {}, coverage: {} }}",
            self.config.tick_size, self.config.value_area_percent
        )
    }
}

impl VolumeProfileAnalyzer {
    pub fn new() -> VolumeProfileAnalyzer {
        VolumeProfileAnalyzer {
            config: VpConfig::default(),
        }
    }

    pub fn with_config(config: VpConfig) -> VolumeProfileAnalyzer {
        VolumeProfileAnalyzer { config }
    }

    pub fn config(&self) -> &VpConfig {
        &self.config
    }

    /// 윈도우의 거래량 분포를 계산합니다.
    pub fn analyze<C: Candle>(&self, candles: &[C]) -> Option<VolumeProfile> {
        if candles.is_empty() {
            return None;
        }

        let levels = self.calculate_price_levels(candles);
        if levels.is_empty() {
            return None;
        }

        let stats = self.calculate_stats(&levels);
        let poc_index = find_poc_index(&levels)?;

        let (value_area, lower_index, upper_index) =
            self.calculate_value_area(&levels, poc_index, stats.total_volume);

        let mut levels = levels;
        levels[poc_index].is_poc = true;
        for (i, level) in levels.iter_mut().enumerate() {
            level.in_value_area = i >= lower_index && i <= upper_index;
        }

        let poc = levels[poc_index].clone();
        Some(VolumeProfile {
            vah: value_area.high,
            val: value_area.low,
            poc: Some(poc),
            value_area,
            levels,
            stats,
        })
    }

    /// 캔들별 거래량을 가격 빈에 분배합니다.
    fn calculate_price_levels<C: Candle>(&self, candles: &[C]) -> Vec<PriceLevel> {
        let mut min_price = f64::MAX;
        let mut max_price = f64::MIN;
        for c in candles {
            min_price = min_price.min(c.low_price());
            max_price = max_price.max(c.high_price());
        }
        if !(min_price.is_finite() && max_price.is_finite()) || max_price < min_price {
            return Vec::new();
        }

        let price_range = max_price - min_price;
        let mut tick = self.config.tick_size;

        // 빈 수 상한을 넘으면 tick을 확대
        if price_range / tick > self.config.max_levels as f64 {
            tick = price_range / self.config.max_levels as f64;
        }

        let bin_count = (price_range / tick).round() as usize + 1;
        let mut bins: Vec<PriceLevel> = (0..bin_count)
            .map(|i| PriceLevel {
                price: min_price + i as f64 * tick,
                volume: 0.0,
                buy_volume: 0.0,
                sell_volume: 0.0,
                volume_percent: 0.0,
                trades: 0,
                is_poc: false,
                in_value_area: false,
            })
            .collect();

        for candle in candles {
            let low = candle.low_price();
            let high = candle.high_price();
            let start = (((low - min_price) / tick).round() as usize).min(bin_count - 1);
            let end = (((high - min_price) / tick).round() as usize).min(bin_count - 1);
            let spanned = end - start + 1;

            let volume_per_level = candle.volume() / spanned as f64;

            // 매수 비중: 0.5 기준에서 캔들 몸통/범위 비율로 ±0.2 조정
            let range = high - low;
            let buy_ratio = if range > 0.0 {
                (0.5 + 0.2 * (candle.close_price() - candle.open_price()) / range)
                    .clamp(0.1, 0.9)
            } else {
                0.5
            };

            for bin in &mut bins[start..=end] {
                bin.volume += volume_per_level;
                bin.buy_volume += volume_per_level * buy_ratio;
                bin.sell_volume += volume_per_level * (1.0 - buy_ratio);
                bin.trades += 1;
            }
        }

        let mut levels: Vec<PriceLevel> = bins
            .into_iter()
            .filter(|b| b.volume >= self.config.min_volume)
            .collect();

        let total_volume: f64 = levels.iter().map(|l| l.volume).sum();
        if total_volume > 0.0 {
            for level in &mut levels {
                level.volume_percent = level.volume / total_volume * 100.0;
            }
        }

        if self.config.smoothing_factor > 1.0 {
            self.smooth_volumes(&mut levels);
        }

        levels
    }

    /// 중심 이동평균으로 빈 거래량을 평활합니다.
    fn smooth_volumes(&self, levels: &mut [PriceLevel]) {
        if levels.len() < 3 {
            return;
        }

        let window = self.config.smoothing_factor as usize;
        let half = window / 2;
        let smoothed: Vec<f64> = (0..levels.len())
            .map(|i| {
                let start = i.saturating_sub(half);
                let end = (i + half).min(levels.len() - 1);
                let slice = &levels[start..=end];
                slice.iter().map(|l| l.volume).sum::<f64>() / slice.len() as f64
            })
            .collect();

        for (level, value) in levels.iter_mut().zip(smoothed) {
            if level.volume > 0.0 {
                let ratio = value / level.volume;
                level.buy_volume *= ratio;
                level.sell_volume *= ratio;
            }
            level.volume = value;
        }
    }

    fn calculate_stats(&self, levels: &[PriceLevel]) -> VolumeStats {
        let mut stats = VolumeStats::default();
        if levels.is_empty() {
            return stats;
        }

        let mut weighted_price = 0.0;
        let mut max_level: Option<&PriceLevel> = None;
        let mut min_level: Option<&PriceLevel> = None;

        for level in levels {
            stats.total_volume += level.volume;
            stats.total_buy_volume += level.buy_volume;
            stats.total_sell_volume += level.sell_volume;
            weighted_price += level.price * level.volume;

            if max_level.map(|m| level.volume > m.volume).unwrap_or(true) {
                max_level = Some(level);
            }
            if min_level.map(|m| level.volume < m.volume).unwrap_or(true) {
                min_level = Some(level);
            }
        }

        stats.max_level = max_level.cloned();
        stats.min_level = min_level.cloned();

        if stats.total_sell_volume > 0.0 {
            stats.buy_sell_ratio = stats.total_buy_volume / stats.total_sell_volume;
        }
        if stats.total_volume > 0.0 {
            stats.avg_price = weighted_price / stats.total_volume;
        }

        let mut prices: Vec<f64> = levels.iter().map(|l| l.price).collect();
        prices.sort_by(f64::total_cmp);
        let mid = prices.len() / 2;
        stats.median_price = if prices.len() % 2 == 0 {
            (prices[mid - 1] + prices[mid]) / 2.0
        } else {
            prices[mid]
        };

        if stats.total_volume > 0.0 {
            let variance: f64 = levels
                .iter()
                .map(|l| (l.price - stats.avg_price).powi(2) * (l.volume / stats.total_volume))
                .sum();
            stats.price_std_dev = variance.sqrt();
        }

        stats
    }

    /// POC에서 양방향으로 확장하며 목표 커버리지에 도달할 때까지
    /// 다음 빈 거래량이 큰 쪽을 선택합니다.
    fn calculate_value_area(
        &self,
        levels: &[PriceLevel],
        poc_index: usize,
        total_volume: f64,
    ) -> (ValueArea, usize, usize) {
        if levels.is_empty() || total_volume <= 0.0 {
            return (ValueArea::default(), 0, 0);
        }

        let target = total_volume * self.config.value_area_percent;
        let mut accumulated = levels[poc_index].volume;
        let mut upper_index = poc_index;
        let mut lower_index = poc_index;

        while accumulated < target {
            let upper_volume = if upper_index < levels.len() - 1 {
                levels[upper_index + 1].volume
            } else {
                0.0
            };
            let lower_volume = if lower_index > 0 {
                levels[lower_index - 1].volume
            } else {
                0.0
            };

            if upper_volume >= lower_volume && upper_index < levels.len() - 1 {
                upper_index += 1;
                accumulated += upper_volume;
            } else if lower_index > 0 {
                lower_index -= 1;
                accumulated += lower_volume;
            } else if upper_index < levels.len() - 1 {
                upper_index += 1;
                accumulated += upper_volume;
            } else {
                break;
            }
        }

        let high = levels[upper_index].price;
        let low = levels[lower_index].price;
        let price_range = high - low;

        let full_range = levels[levels.len() - 1].price - levels[0].price;
        let price_range_percent = if full_range > 0.0 {
            price_range / full_range * 100.0
        } else {
            0.0
        };

        let volume_ratio = accumulated / total_volume;
        let bins_ratio = (upper_index - lower_index + 1) as f64 / levels.len() as f64;
        let concentration = if bins_ratio > 0.0 {
            volume_ratio / bins_ratio
        } else {
            0.0
        };

        (
            ValueArea {
                high,
                low,
                volume_percent: volume_ratio * 100.0,
                price_range,
                price_range_percent,
                profile_width: price_range.abs(),
                concentration,
            },
            lower_index,
            upper_index,
        )
    }

    /// 프로파일과 현재 가격으로 신호를 생성합니다.
    pub fn generate_signals(
        &self,
        profile: &VolumeProfile,
        current_price: f64,
        now_ms: i64,
    ) -> Vec<VpSignal> {
        let mut signals = Vec::new();
        if profile.poc.is_none() {
            return signals;
        }

        if let Some(signal) = self.poc_signal(profile, current_price, now_ms) {
            signals.push(signal);
        }
        if let Some(signal) = self.value_area_signal(profile, current_price, now_ms) {
            signals.push(signal);
        }
        if let Some(signal) = self.volume_level_signal(profile, current_price, now_ms) {
            signals.push(signal);
        }
        if let Some(signal) = self.imbalance_signal(profile, current_price, now_ms) {
            signals.push(signal);
        }

        signals
    }

    /// POC 근접(1% 이내) 테스트 신호
    fn poc_signal(&self, profile: &VolumeProfile, current_price: f64, now_ms: i64) -> Option<VpSignal> {
        let poc = profile.poc.as_ref()?;
        if poc.price <= 0.0 {
            return None;
        }

        let distance = (current_price - poc.price).abs() / poc.price;
        if distance >= 0.01 {
            return None;
        }

        let strength = if profile.stats.total_volume > 0.0 {
            poc.volume / profile.stats.total_volume * 100.0
        } else {
            0.0
        };
        let confidence = (strength * 2.0).min(100.0);

        let (action, description) = if poc.buy_volume > poc.sell_volume * 1.2 {
            (SignalAction::Buy, "price testing POC with buy dominance")
        } else if poc.sell_volume > poc.buy_volume * 1.2 {
            (SignalAction::Sell, "price testing POC with sell dominance")
        } else {
            (SignalAction::Hold, "price testing POC, flows balanced")
        };

        Some(VpSignal {
            kind: VpSignalKind::PocTest,
            level: poc.price,
            current_price,
            strength,
            description: description.to_string(),
            action,
            confidence,
            timestamp: now_ms,
        })
    }

    /// 가치 영역 돌파(0.5% 확인 밴드) / 평균 회귀 신호
    fn value_area_signal(
        &self,
        profile: &VolumeProfile,
        current_price: f64,
        now_ms: i64,
    ) -> Option<VpSignal> {
        let vah = profile.vah;
        let val = profile.val;
        if vah <= 0.0 || val <= 0.0 {
            return None;
        }

        if current_price > vah * 1.005 {
            return Some(VpSignal {
                kind: VpSignalKind::ValueAreaBreakout,
                level: vah,
                current_price,
                strength: (current_price - vah) / vah * 100.0,
                description: "breakout above value area high".to_string(),
                action: SignalAction::Buy,
                confidence: (70.0 + profile.value_area.concentration * 10.0).min(100.0),
                timestamp: now_ms,
            });
        }

        if current_price < val * 0.995 {
            return Some(VpSignal {
                kind: VpSignalKind::ValueAreaBreakout,
                level: val,
                current_price,
                strength: (val - current_price) / val * 100.0,
                description: "breakdown below value area low".to_string(),
                action: SignalAction::Sell,
                confidence: (70.0 + profile.value_area.concentration * 10.0).min(100.0),
                timestamp: now_ms,
            });
        }

        if current_price > val && current_price < vah {
            let center = (vah + val) / 2.0;
            let distance_from_center = (current_price - center).abs() / center;
            return Some(VpSignal {
                kind: VpSignalKind::ValueAreaReturn,
                level: center,
                current_price,
                strength: (1.0 - distance_from_center) * 100.0,
                description: "price inside value area, mean reversion bias".to_string(),
                action: SignalAction::Hold,
                confidence: (60.0 - distance_from_center * 100.0).max(0.0),
                timestamp: now_ms,
            });
        }

        None
    }

    /// 현재 가격 최근접 빈의 고/저 거래량 신호 (x2 / x0.3 기준)
    fn volume_level_signal(
        &self,
        profile: &VolumeProfile,
        current_price: f64,
        now_ms: i64,
    ) -> Option<VpSignal> {
        let nearest = profile
            .levels
            .iter()
            .min_by(|a, b| {
                (a.price - current_price)
                    .abs()
                    .total_cmp(&(b.price - current_price).abs())
            })?;

        let avg_volume = profile.stats.total_volume / profile.levels.len() as f64;
        if avg_volume <= 0.0 {
            return None;
        }
        let ratio = nearest.volume / avg_volume;

        if ratio > 2.0 {
            let (action, description) = if nearest.buy_volume > nearest.sell_volume * 1.3 {
                (SignalAction::Buy, "heavy volume node, buyers dominant")
            } else if nearest.sell_volume > nearest.buy_volume * 1.3 {
                (SignalAction::Sell, "heavy volume node, sellers dominant")
            } else {
                (SignalAction::Hold, "heavy volume node, flows balanced")
            };

            return Some(VpSignal {
                kind: VpSignalKind::HighVolume,
                level: nearest.price,
                current_price,
                strength: ratio * 20.0,
                description: description.to_string(),
                action,
                confidence: (ratio * 25.0).min(100.0),
                timestamp: now_ms,
            });
        }

        if ratio < 0.3 {
            return Some(VpSignal {
                kind: VpSignalKind::LowVolume,
                level: nearest.price,
                current_price,
                strength: (1.0 - ratio) * 100.0,
                description: "thin volume node, little support or resistance".to_string(),
                action: SignalAction::Hold,
                confidence: 50.0,
                timestamp: now_ms,
            });
        }

        None
    }

    /// 전체 매수/매도 불균형 신호 (1.5배 기준)
    fn imbalance_signal(
        &self,
        profile: &VolumeProfile,
        current_price: f64,
        now_ms: i64,
    ) -> Option<VpSignal> {
        let ratio = profile.stats.buy_sell_ratio;
        if ratio == 0.0 {
            return None;
        }

        let threshold = 1.5;
        if ratio > threshold {
            let strength = ((ratio - 1.0) * 100.0).min(100.0);
            return Some(VpSignal {
                kind: VpSignalKind::Imbalance,
                level: profile.stats.avg_price,
                current_price,
                strength,
                description: "aggregate buy flow dominates".to_string(),
                action: SignalAction::Buy,
                confidence: (strength * 1.5).min(100.0),
                timestamp: now_ms,
            });
        }

        if ratio < 1.0 / threshold {
            let strength = ((1.0 / ratio - 1.0) * 100.0).min(100.0);
            return Some(VpSignal {
                kind: VpSignalKind::Imbalance,
                level: profile.stats.avg_price,
                current_price,
                strength,
                description: "aggregate sell flow dominates".to_string(),
                action: SignalAction::Sell,
                confidence: (strength * 1.5).min(100.0),
                timestamp: now_ms,
            });
        }

        None
    }
}

impl Default for VolumeProfileAnalyzer {
    fn default() -> VolumeProfileAnalyzer {
        VolumeProfileAnalyzer::new()
    }
}

/// 거래량 최대 빈의 인덱스
fn find_poc_index(levels: &[PriceLevel]) -> Option<usize> {
    levels
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.volume.total_cmp(&b.volume))
        .map(|(i, _)| i)
}
