use crate::model::{Candle, SignalAction, TrendDirection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

/// 피보나치 분석 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibonacciConfig {
    /// 되돌림 구성에 필요한 최소 추세 길이 (비율)
    pub min_trend_length: f64,
    /// 되돌림 최대 수명 (캔들 수)
    pub max_retracement_age: usize,
    /// 레벨 터치 판정 비율
    pub touch_sensitivity: f64,
    /// 품질 임계값 (0~1)
    pub quality_threshold: f64,
    /// 클러스터 그룹화 거리 (비율)
    pub cluster_distance: f64,
    /// 골든 포켓 비율 범위 [하한, 상한]
    pub golden_pocket_range: [f64; 2],
    /// 확장 분석 사용 여부
    pub enable_extensions: bool,
    /// 품질 평가에서 거래량 비중
    pub volume_weight: f64,
    /// 되돌림 비율 집합
    pub ratios: Vec<f64>,
}

impl Default for FibonacciConfig {
    fn default() -> FibonacciConfig {
        FibonacciConfig {
            min_trend_length: 0.03,
            max_retracement_age: 100,
            touch_sensitivity: 0.002,
            quality_threshold: 0.6,
            cluster_distance: 0.005,
            golden_pocket_range: [0.618, 0.65],
            enable_extensions: true,
            volume_weight: 0.3,
            ratios: vec![0.236, 0.382, 0.5, 0.618, 0.786, 1.0, 1.272, 1.618, 2.618],
        }
    }
}

impl FibonacciConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ratios.is_empty() {
            return Err("되돌림 비율 집합이 비어 있습니다".to_string());
        }
        if self.golden_pocket_range[0] >= self.golden_pocket_range[1] {
            return Err("골든 포켓 범위가 올바르지 않습니다".to_string());
        }
        if self.cluster_distance <= 0.0 {
            return Err("cluster_distance는 양수여야 합니다".to_string());
        }
        Ok(())
    }
}

/// 피보나치 품질 등급
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FibQuality {
    High,
    Medium,
    Low,
}

/// 레벨 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FibLevelKind {
    Retracement,
    Extension,
}

/// 터치 반응 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    Bounce,
    Break,
    Consolidation,
}

/// 가격-시각-인덱스 좌표
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp: i64,
    pub index: usize,
}

/// 파동 (시작점→끝점)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceWave {
    pub start_point: PricePoint,
    pub end_point: PricePoint,
    /// 파동 길이 (절대 가격)
    pub length: f64,
    /// 지속 시간 (ms)
    pub duration: i64,
}

/// 가격 범위
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: f64,
    pub high: f64,
}

/// 피보나치 레벨
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibLevel {
    pub ratio: f64,
    pub price: f64,
    pub kind: FibLevelKind,
    /// 비율 의존 중요도 (0.618/0.382가 1.0)
    pub importance: f64,
    /// 형성 이후 터치 수
    pub touch_count: usize,
    pub last_touch: i64,
    /// ratio ∈ {0.618, 0.382}
    pub is_golden_ratio: bool,
}

/// 피보나치 되돌림
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibRetracement {
    pub id: String,
    pub start_point: PricePoint,
    pub end_point: PricePoint,
    pub trend: TrendDirection,
    pub levels: Vec<FibLevel>,
    pub quality: FibQuality,
    /// 강도 점수 [0,100]
    pub strength: f64,
    /// 끝점 이후 경과 캔들 수
    pub age: usize,
    pub active: bool,
    /// 비율 문자열("0.618") → 터치 수
    pub touch_count: HashMap<String, usize>,
    pub created_at: i64,
}

/// 피보나치 확장
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibExtension {
    pub id: String,
    pub base_wave: PriceWave,
    pub return_wave: PriceWave,
    pub levels: Vec<FibLevel>,
    pub quality: FibQuality,
    pub confidence: f64,
    /// 마지막 스윙이 윈도우 끝이면 예측 단계
    pub is_projected: bool,
}

/// 터치 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouchEvent {
    pub price: f64,
    pub timestamp: i64,
    pub reaction: ReactionType,
    pub volume: f64,
    pub strength: f64,
}

/// 거래량 요약
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub average_volume: f64,
    pub current_volume: f64,
    pub volume_ratio: f64,
    pub spikes_count: usize,
}

/// 0.618~0.65 골든 포켓
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenPocket {
    pub id: String,
    pub price_range: PriceRange,
    pub center_price: f64,
    pub quality: FibQuality,
    pub strength: f64,
    pub trend_context: TrendDirection,
    pub volume_profile: VolumeInfo,
    pub touch_events: Vec<TouchEvent>,
    pub active: bool,
    pub last_update: i64,
}

/// 피보나치 클러스터 (인접 레벨 밀집 구간)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibCluster {
    pub id: String,
    pub center_price: f64,
    pub price_range: PriceRange,
    /// 레벨 수 / 가격 범위
    pub density: f64,
    pub level_count: usize,
    /// 구성 레벨이 속한 되돌림/확장 id
    pub sources: Vec<String>,
    pub importance: f64,
}

/// 피보나치 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FibStatistics {
    pub total_retracements: usize,
    pub active_retracements: usize,
    pub high_quality_count: usize,
    pub avg_strength: f64,
    pub golden_ratio_hits: usize,
    pub cluster_count: usize,
    /// 고품질 비율 (0~1)
    pub success_rate: f64,
}

/// 피보나치 분석 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibonacciData {
    pub retracements: Vec<FibRetracement>,
    pub extensions: Vec<FibExtension>,
    pub clusters: Vec<FibCluster>,
    pub golden_pocket: Option<GoldenPocket>,
    pub statistics: FibStatistics,
}

impl FibonacciData {
    fn empty() -> FibonacciData {
        FibonacciData {
            retracements: Vec::new(),
            extensions: Vec::new(),
            clusters: Vec::new(),
            golden_pocket: None,
            statistics: FibStatistics::default(),
        }
    }
}

/// 피보나치 신호 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FibSignalKind {
    GoldenPocket,
    Bounce,
    Cluster,
}

/// 피보나치 신호
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FibSignal {
    pub id: String,
    pub kind: FibSignalKind,
    pub action: SignalAction,
    pub price: f64,
    /// 관련 피보나치 비율 (클러스터는 0)
    pub level_ratio: f64,
    pub confidence: f64,
    pub strength: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    /// 복수 목표가 (가까운 순)
    pub take_profit: Vec<f64>,
    pub risk_reward: f64,
    pub context: String,
    pub quality: FibQuality,
    pub timestamp: i64,
}

/// 피보나치 분석기
#[derive(Debug, Clone)]
pub struct FibonacciAnalyzer {
    config: FibonacciConfig,
}

impl Display for FibonacciAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FibonacciAnalyzer {{ min_trend: {}, pocket: {:?} }}",
            self.config.min_trend_length, self.config.golden_pocket_range
        )
    }
}

impl FibonacciAnalyzer {
    pub fn new() -> FibonacciAnalyzer {
        FibonacciAnalyzer {
            config: FibonacciConfig::default(),
        }
    }

    pub fn with_config(config: FibonacciConfig) -> FibonacciAnalyzer {
        FibonacciAnalyzer { config }
    }

    pub fn config(&self) -> &FibonacciConfig {
        &self.config
    }

    /// 스윙 구조에서 되돌림/확장/클러스터/골든 포켓을 도출합니다.
    pub fn analyze<C: Candle>(&self, candles: &[C]) -> FibonacciData {
        if candles.len() < 10 {
            return FibonacciData::empty();
        }

        let swing_points = self.identify_swing_points(candles);
        let retracements = self.calculate_retracements(&swing_points, candles);
        let extensions = if self.config.enable_extensions {
            self.calculate_extensions(&swing_points, candles)
        } else {
            Vec::new()
        };
        let clusters = self.identify_clusters(&retracements, &extensions);
        let golden_pocket = self.analyze_golden_pocket(&retracements, candles);
        let statistics =
            self.calculate_statistics(&retracements, &clusters);

        FibonacciData {
            retracements,
            extensions,
            clusters,
            golden_pocket,
            statistics,
        }
    }

    /// 5캔들 대칭 룩백으로 스윙 포인트 수열을 만듭니다.
    fn identify_swing_points<C: Candle>(&self, candles: &[C]) -> Vec<PricePoint> {
        let lookback = 5;
        let mut points = Vec::new();

        if candles.len() < lookback * 2 + 1 {
            return points;
        }

        for i in lookback..candles.len() - lookback {
            let current = &candles[i];

            let is_high = (i - lookback..=i + lookback)
                .filter(|&j| j != i)
                .all(|j| candles[j].high_price() < current.high_price());
            let is_low = (i - lookback..=i + lookback)
                .filter(|&j| j != i)
                .all(|j| candles[j].low_price() > current.low_price());

            if is_high {
                points.push(PricePoint {
                    price: current.high_price(),
                    timestamp: current.open_time(),
                    index: i,
                });
            } else if is_low {
                points.push(PricePoint {
                    price: current.low_price(),
                    timestamp: current.open_time(),
                    index: i,
                });
            }
        }

        points
    }

    /// 인접 스윙 쌍마다 되돌림을 구성합니다.
    fn calculate_retracements<C: Candle>(
        &self,
        swing_points: &[PricePoint],
        candles: &[C],
    ) -> Vec<FibRetracement> {
        let mut retracements = Vec::new();
        let created_at = candles.last().map(|c| c.close_time()).unwrap_or(0);

        for pair in swing_points.windows(2) {
            let start = pair[0];
            let end = pair[1];

            let price_move = (end.price - start.price).abs();
            if price_move / start.price < self.config.min_trend_length {
                continue;
            }

            let trend = if end.price > start.price {
                TrendDirection::Up
            } else {
                TrendDirection::Down
            };

            let mut levels = self.calculate_levels(&start, &end);
            let (quality, strength) = self.evaluate_retracement(&start, &end, candles);
            let touch_count = self.level_touch_counts(&mut levels, candles, end.index);

            retracements.push(FibRetracement {
                id: format!("fib_ret_{}_{}", start.index, end.index),
                start_point: start,
                end_point: end,
                trend,
                levels,
                quality,
                strength,
                age: candles.len() - end.index,
                active: candles.len() - end.index <= self.config.max_retracement_age,
                touch_count,
                created_at,
            });
        }

        retracements
    }

    /// 끝점에서 시작점 방향으로 각 비율을 투영합니다.
    ///
    /// 부호 있는 가격 범위를 쓰므로 상승/하락 추세 모두 같은 식으로
    /// 시작점 쪽을 향해 투영됩니다.
    fn calculate_levels(&self, start: &PricePoint, end: &PricePoint) -> Vec<FibLevel> {
        let price_range = end.price - start.price;

        self.config
            .ratios
            .iter()
            .map(|&ratio| {
                let price = end.price - price_range * ratio;

                FibLevel {
                    ratio,
                    price,
                    kind: FibLevelKind::Retracement,
                    importance: level_importance(ratio),
                    touch_count: 0,
                    last_touch: 0,
                    is_golden_ratio: is_golden_ratio(ratio),
                }
            })
            .collect()
    }

    /// 되돌림 품질/강도: 이동 폭 30 + 기간 20 + 거래량 확인 가중
    fn evaluate_retracement<C: Candle>(
        &self,
        start: &PricePoint,
        end: &PricePoint,
        candles: &[C],
    ) -> (FibQuality, f64) {
        let mut score = 0.0;

        let price_move = (end.price - start.price).abs() / start.price;
        score += if price_move > 0.05 {
            30.0
        } else if price_move > 0.03 {
            20.0
        } else {
            10.0
        };

        let time_span = end.index - start.index;
        score += if time_span > 20 {
            20.0
        } else if time_span > 10 {
            15.0
        } else {
            10.0
        };

        let volume_score = self.volume_confirmation(start.index, end.index, candles);
        score += volume_score * self.config.volume_weight * 50.0;

        let quality = if score >= 70.0 {
            FibQuality::High
        } else if score >= 40.0 {
            FibQuality::Medium
        } else {
            FibQuality::Low
        };

        (quality, score)
    }

    /// 추세 구간 평균 거래량을 전체 평균과 비교해 [0,1] 점수로 변환
    fn volume_confirmation<C: Candle>(&self, start: usize, end: usize, candles: &[C]) -> f64 {
        if end <= start + 1 || end >= candles.len() {
            return 0.5;
        }

        let trend_volume: f64 = candles[start..=end].iter().map(|c| c.volume()).sum();
        let avg_trend_volume = trend_volume / (end - start + 1) as f64;

        let lookback = 50.min(end + 1);
        let overall_start = end + 1 - lookback;
        let overall_volume: f64 = candles[overall_start..=end].iter().map(|c| c.volume()).sum();
        let avg_overall = overall_volume / lookback as f64;

        if avg_overall <= 0.0 {
            return 0.5;
        }

        let ratio = avg_trend_volume / avg_overall;
        if ratio > 1.5 {
            1.0
        } else if ratio > 1.2 {
            0.8
        } else if ratio > 1.0 {
            0.6
        } else {
            0.3
        }
    }

    /// 형성 이후 캔들이 각 레벨에 닿은 횟수를 셉니다.
    fn level_touch_counts<C: Candle>(
        &self,
        levels: &mut [FibLevel],
        candles: &[C],
        end_index: usize,
    ) -> HashMap<String, usize> {
        let mut touch_count = HashMap::new();
        let tolerance = self.config.touch_sensitivity;

        for candle in &candles[(end_index + 1).min(candles.len())..] {
            for level in levels.iter_mut() {
                if level.price <= 0.0 {
                    continue;
                }

                let touched = (candle.low_price() - level.price).abs() / level.price <= tolerance
                    || (candle.high_price() - level.price).abs() / level.price <= tolerance
                    || (candle.low_price() <= level.price && candle.high_price() >= level.price);

                if touched {
                    level.touch_count += 1;
                    level.last_touch = candle.open_time();
                    *touch_count.entry(format!("{:.3}", level.ratio)).or_insert(0) += 1;
                }
            }
        }

        touch_count
    }

    /// 스윙 3개 단위로 확장을 구성합니다.
    fn calculate_extensions<C: Candle>(
        &self,
        swing_points: &[PricePoint],
        candles: &[C],
    ) -> Vec<FibExtension> {
        let mut extensions = Vec::new();

        for triple in swing_points.windows(3) {
            let base_wave = PriceWave {
                start_point: triple[0],
                end_point: triple[1],
                length: (triple[1].price - triple[0].price).abs(),
                duration: triple[1].timestamp - triple[0].timestamp,
            };
            let return_wave = PriceWave {
                start_point: triple[1],
                end_point: triple[2],
                length: (triple[2].price - triple[1].price).abs(),
                duration: triple[2].timestamp - triple[1].timestamp,
            };

            if base_wave.length == 0.0 || base_wave.duration == 0 {
                continue;
            }

            let levels = self.extension_levels(&base_wave, &return_wave);
            let quality = self.extension_quality(&base_wave, &return_wave);
            let confidence = extension_confidence(&base_wave, &return_wave);

            extensions.push(FibExtension {
                id: format!(
                    "fib_ext_{}_{}_{}",
                    triple[0].index, triple[1].index, triple[2].index
                ),
                base_wave,
                return_wave,
                levels,
                quality,
                confidence,
                is_projected: triple[2].index == candles.len() - 1,
            });
        }

        extensions
    }

    /// 기준 파동 방향으로 회귀 파동 끝에서 확장 비율을 투영합니다.
    fn extension_levels(&self, base_wave: &PriceWave, return_wave: &PriceWave) -> Vec<FibLevel> {
        let extension_ratios = [1.0, 1.272, 1.618, 2.618];
        let base_up = base_wave.end_point.price > base_wave.start_point.price;

        extension_ratios
            .iter()
            .map(|&ratio| {
                let price = if base_up {
                    return_wave.end_point.price + base_wave.length * ratio
                } else {
                    return_wave.end_point.price - base_wave.length * ratio
                };

                FibLevel {
                    ratio,
                    price,
                    kind: FibLevelKind::Extension,
                    importance: level_importance(ratio),
                    touch_count: 0,
                    last_touch: 0,
                    is_golden_ratio: false,
                }
            })
            .collect()
    }

    /// 확장 품질: 회귀/기준 길이 비 40 + 시간 비 30 + 방향 반전 30
    fn extension_quality(&self, base_wave: &PriceWave, return_wave: &PriceWave) -> FibQuality {
        let mut score = 0.0;

        let length_ratio = return_wave.length / base_wave.length;
        score += if length_ratio > 0.3 && length_ratio < 0.7 {
            40.0
        } else if length_ratio > 0.2 && length_ratio < 0.8 {
            25.0
        } else {
            10.0
        };

        let time_ratio = return_wave.duration as f64 / base_wave.duration as f64;
        score += if time_ratio > 0.3 && time_ratio < 1.5 {
            30.0
        } else {
            15.0
        };

        let base_up = base_wave.end_point.price > base_wave.start_point.price;
        let return_up = return_wave.end_point.price > return_wave.start_point.price;
        if base_up != return_up {
            score += 30.0;
        }

        if score >= 70.0 {
            FibQuality::High
        } else if score >= 40.0 {
            FibQuality::Medium
        } else {
            FibQuality::Low
        }
    }

    /// 최고 품질 되돌림 위에 골든 포켓을 투영합니다.
    fn analyze_golden_pocket<C: Candle>(
        &self,
        retracements: &[FibRetracement],
        candles: &[C],
    ) -> Option<GoldenPocket> {
        let best = best_retracement(retracements)?;

        let price_range = (best.end_point.price - best.start_point.price).abs();
        let [pocket_low_ratio, pocket_high_ratio] = self.config.golden_pocket_range;

        let (golden_low, golden_high) = if best.trend == TrendDirection::Up {
            (
                best.end_point.price - price_range * pocket_high_ratio,
                best.end_point.price - price_range * pocket_low_ratio,
            )
        } else {
            (
                best.end_point.price + price_range * pocket_low_ratio,
                best.end_point.price + price_range * pocket_high_ratio,
            )
        };

        let touch_events =
            self.pocket_touch_events(golden_low, golden_high, best.trend, candles, best.end_point.index);
        let volume_profile = self.pocket_volume_profile(candles, best.end_point.index);

        let strength = self.golden_pocket_strength(best, &touch_events, &volume_profile);
        let quality = golden_pocket_quality(best, &touch_events);

        Some(GoldenPocket {
            id: format!("golden_pocket_{}", best.id),
            price_range: PriceRange {
                low: golden_low,
                high: golden_high,
            },
            center_price: (golden_low + golden_high) / 2.0,
            quality,
            strength,
            trend_context: best.trend,
            volume_profile,
            touch_events,
            active: self.pocket_active(golden_low, golden_high, candles),
            last_update: candles.last().map(|c| c.close_time()).unwrap_or(0),
        })
    }

    /// 포켓 터치 이벤트를 3캔들 추적으로 분류합니다.
    fn pocket_touch_events<C: Candle>(
        &self,
        low: f64,
        high: f64,
        trend: TrendDirection,
        candles: &[C],
        start_index: usize,
    ) -> Vec<TouchEvent> {
        let mut events = Vec::new();
        let tolerance = self.config.touch_sensitivity;

        for i in (start_index + 1).min(candles.len())..candles.len() {
            let candle = &candles[i];

            let touched = candle.low_price() <= high * (1.0 + tolerance)
                && candle.high_price() >= low * (1.0 - tolerance);
            if !touched {
                continue;
            }

            let reaction = if i + 3 < candles.len() {
                let price_after = candles[i + 3].close_price();
                let price_at_touch = candle.close_price();
                let change = (price_after - price_at_touch) / price_at_touch;

                if change.abs() > 0.01 {
                    // 포켓이 밀어야 하는 방향과 일치하면 반등, 반대면 돌파
                    let favorable = match trend {
                        TrendDirection::Up => change > 0.0,
                        TrendDirection::Down => change < 0.0,
                        TrendDirection::Flat => change > 0.0,
                    };
                    if favorable {
                        ReactionType::Bounce
                    } else {
                        ReactionType::Break
                    }
                } else {
                    ReactionType::Consolidation
                }
            } else {
                ReactionType::Consolidation
            };

            events.push(TouchEvent {
                price: candle.hl2(),
                timestamp: candle.open_time(),
                reaction,
                volume: candle.volume(),
                strength: self.reaction_strength(candles, i),
            });
        }

        events
    }

    /// 터치 캔들의 반응 강도: 가격 범위 + 거래량 비율 합성 [0,100]
    fn reaction_strength<C: Candle>(&self, candles: &[C], index: usize) -> f64 {
        let candle = &candles[index];
        let price_range = if candle.open_price() > 0.0 {
            (candle.high_price() - candle.low_price()) / candle.open_price()
        } else {
            0.0
        };

        let lookback = 10.min(index);
        let volume_ratio = if lookback > 0 {
            let avg: f64 = candles[index - lookback..index]
                .iter()
                .map(|c| c.volume())
                .sum::<f64>()
                / lookback as f64;
            if avg > 0.0 {
                candle.volume() / avg
            } else {
                1.0
            }
        } else {
            1.0
        };

        ((price_range * 50.0 + volume_ratio.min(3.0) * 25.0) / 75.0 * 100.0).min(100.0)
    }

    fn pocket_volume_profile<C: Candle>(&self, candles: &[C], start_index: usize) -> VolumeInfo {
        let start = (start_index + 1).min(candles.len());
        let periods = candles.len() - start;
        if periods == 0 {
            return VolumeInfo::default();
        }

        let mut total_volume = 0.0;
        let mut spikes = 0usize;

        for i in start..candles.len() {
            let candle = &candles[i];
            total_volume += candle.volume();

            if i > 0 {
                let prev = candles[i - 1].volume();
                if prev > 0.0 && candle.volume() / prev > 2.0 {
                    spikes += 1;
                }
            }
        }

        let average_volume = total_volume / periods as f64;
        let current_volume = candles[candles.len() - 1].volume();
        let volume_ratio = if average_volume > 0.0 {
            current_volume / average_volume
        } else {
            1.0
        };

        VolumeInfo {
            average_volume,
            current_volume,
            volume_ratio,
            spikes_count: spikes,
        }
    }

    /// 포켓 강도: 되돌림 0.4 + 터치 반응 0.3 + 거래량 0.2 + 시간 0.1
    fn golden_pocket_strength(
        &self,
        retracement: &FibRetracement,
        touches: &[TouchEvent],
        volume: &VolumeInfo,
    ) -> f64 {
        let mut score = retracement.strength * 0.4;

        let touch_score = if touches.is_empty() {
            0.0
        } else {
            let avg_strength: f64 =
                touches.iter().map(|t| t.strength).sum::<f64>() / touches.len() as f64;
            let bounce_rate = touches
                .iter()
                .filter(|t| t.reaction == ReactionType::Bounce)
                .count() as f64
                / touches.len() as f64;
            (avg_strength + bounce_rate * 100.0) / 2.0
        };
        score += touch_score * 0.3;

        let volume_score =
            (volume.volume_ratio * 25.0).min(50.0) + (volume.spikes_count as f64 * 10.0).min(50.0);
        score += volume_score * 0.2;

        let age_score = (100.0 - retracement.age as f64 * 2.0).max(0.0);
        score += age_score * 0.1;

        score.min(100.0)
    }

    /// 현재 가격이 포켓 범위 ±2% 안에 있으면 활성
    fn pocket_active<C: Candle>(&self, low: f64, high: f64, candles: &[C]) -> bool {
        let Some(last) = candles.last() else {
            return false;
        };
        let price = last.close_price();
        let tolerance = 0.02;
        price >= low * (1.0 - tolerance) && price <= high * (1.0 + tolerance)
    }

    /// 되돌림과 확장의 모든 레벨 가격을 정렬 후 그리디 그룹화합니다.
    fn identify_clusters(
        &self,
        retracements: &[FibRetracement],
        extensions: &[FibExtension],
    ) -> Vec<FibCluster> {
        struct LevelRef {
            price: f64,
            source: String,
            ratio: f64,
        }

        let mut all_levels = Vec::new();
        for retracement in retracements {
            for level in &retracement.levels {
                all_levels.push(LevelRef {
                    price: level.price,
                    source: retracement.id.clone(),
                    ratio: level.ratio,
                });
            }
        }
        for extension in extensions {
            for level in &extension.levels {
                all_levels.push(LevelRef {
                    price: level.price,
                    source: extension.id.clone(),
                    ratio: level.ratio,
                });
            }
        }

        all_levels.sort_by(|a, b| a.price.total_cmp(&b.price));

        let mut clusters = Vec::new();
        let mut i = 0;
        while i < all_levels.len() {
            let anchor_price = all_levels[i].price;
            if anchor_price <= 0.0 {
                i += 1;
                continue;
            }

            let mut j = i;
            while j < all_levels.len()
                && (all_levels[j].price - anchor_price).abs() / anchor_price
                    <= self.config.cluster_distance
            {
                j += 1;
            }

            let group = &all_levels[i..j];
            if group.len() >= 2 {
                let min_price = group[0].price;
                let max_price = group[group.len() - 1].price;
                let range = max_price - min_price;

                let importance = cluster_importance(group.iter().map(|l| l.ratio));

                clusters.push(FibCluster {
                    id: format!("fib_cluster_{}", clusters.len()),
                    center_price: (min_price + max_price) / 2.0,
                    price_range: PriceRange {
                        low: min_price,
                        high: max_price,
                    },
                    density: if range > 0.0 {
                        group.len() as f64 / range
                    } else {
                        group.len() as f64
                    },
                    level_count: group.len(),
                    sources: group.iter().map(|l| l.source.clone()).collect(),
                    importance,
                });
            }

            i = j;
        }

        clusters
    }

    fn calculate_statistics(
        &self,
        retracements: &[FibRetracement],
        clusters: &[FibCluster],
    ) -> FibStatistics {
        let mut stats = FibStatistics {
            total_retracements: retracements.len(),
            cluster_count: clusters.len(),
            ..FibStatistics::default()
        };

        for retracement in retracements {
            if retracement.active {
                stats.active_retracements += 1;
            }
            if retracement.quality == FibQuality::High {
                stats.high_quality_count += 1;
            }

            for level in &retracement.levels {
                if level.is_golden_ratio {
                    stats.golden_ratio_hits += level.touch_count;
                }
            }
        }

        if !retracements.is_empty() {
            stats.avg_strength = retracements.iter().map(|r| r.strength).sum::<f64>()
                / retracements.len() as f64;
            stats.success_rate = stats.high_quality_count as f64 / retracements.len() as f64;
        }

        stats
    }

    /// 골든 포켓 / 레벨 반등 / 클러스터 신호를 생성합니다.
    pub fn generate_signals(
        &self,
        data: &FibonacciData,
        current_price: f64,
        now_ms: i64,
    ) -> Vec<FibSignal> {
        let mut signals = Vec::new();

        if let Some(pocket) = &data.golden_pocket {
            if pocket.active {
                if let Some(signal) = self.golden_pocket_signal(pocket, current_price, now_ms) {
                    signals.push(signal);
                }
            }
        }

        for retracement in &data.retracements {
            if !retracement.active {
                continue;
            }
            signals.extend(self.level_signals(retracement, current_price, now_ms));
        }

        for cluster in &data.clusters {
            if let Some(signal) = self.cluster_signal(cluster, current_price, now_ms) {
                signals.push(signal);
            }
        }

        signals
    }

    fn golden_pocket_signal(
        &self,
        pocket: &GoldenPocket,
        current_price: f64,
        now_ms: i64,
    ) -> Option<FibSignal> {
        if current_price < pocket.price_range.low || current_price > pocket.price_range.high {
            return None;
        }

        let (action, stop_loss, take_profit) = if pocket.trend_context == TrendDirection::Up {
            (
                SignalAction::Buy,
                pocket.price_range.low * 0.99,
                vec![
                    pocket.price_range.high * 1.05,
                    pocket.price_range.high * 1.1,
                ],
            )
        } else {
            (
                SignalAction::Sell,
                pocket.price_range.high * 1.01,
                vec![pocket.price_range.low * 0.95, pocket.price_range.low * 0.9],
            )
        };

        let risk = (current_price - stop_loss).abs();
        let risk_reward = if risk > 0.0 {
            (take_profit[0] - current_price).abs() / risk
        } else {
            0.0
        };

        Some(FibSignal {
            id: format!("golden_pocket_{}", pocket.id),
            kind: FibSignalKind::GoldenPocket,
            action,
            price: current_price,
            level_ratio: 0.618,
            confidence: pocket.strength,
            strength: pocket.strength,
            entry_price: current_price,
            stop_loss,
            take_profit,
            risk_reward,
            context: "golden pocket 0.618 retracement".to_string(),
            quality: pocket.quality,
            timestamp: now_ms,
        })
    }

    /// 중요도 0.7 이상 레벨의 터치 반등 신호
    fn level_signals(
        &self,
        retracement: &FibRetracement,
        current_price: f64,
        now_ms: i64,
    ) -> Vec<FibSignal> {
        let mut signals = Vec::new();
        let tolerance = self.config.touch_sensitivity;

        for level in &retracement.levels {
            if level.price <= 0.0 || level.importance < 0.7 {
                continue;
            }

            let distance = (current_price - level.price).abs() / level.price;
            if distance > tolerance {
                continue;
            }

            let action = if retracement.trend == TrendDirection::Up {
                SignalAction::Buy
            } else {
                SignalAction::Sell
            };

            // 반등 신호의 보호선: 레벨 반대편 1%, 목표는 2R
            let stop_loss = match action {
                SignalAction::Buy => level.price * 0.99,
                _ => level.price * 1.01,
            };
            let risk = (level.price - stop_loss).abs();
            let take_profit = match action {
                SignalAction::Buy => level.price + risk * 2.0,
                _ => level.price - risk * 2.0,
            };

            signals.push(FibSignal {
                id: format!("fib_level_{}_{:.3}", retracement.id, level.ratio),
                kind: FibSignalKind::Bounce,
                action,
                price: current_price,
                level_ratio: level.ratio,
                confidence: (retracement.strength * level.importance).min(100.0),
                strength: level.importance * 100.0,
                entry_price: level.price,
                stop_loss,
                take_profit: vec![take_profit],
                risk_reward: 2.0,
                context: format!("{:.1}% retracement level", level.ratio * 100.0),
                quality: retracement.quality,
                timestamp: now_ms,
            });
        }

        signals
    }

    /// 중요도 60 이상 클러스터 내부의 관망 신호
    fn cluster_signal(
        &self,
        cluster: &FibCluster,
        current_price: f64,
        now_ms: i64,
    ) -> Option<FibSignal> {
        if current_price < cluster.price_range.low || current_price > cluster.price_range.high {
            return None;
        }
        if cluster.importance < 60.0 {
            return None;
        }

        Some(FibSignal {
            id: format!("fib_cluster_{}", cluster.id),
            kind: FibSignalKind::Cluster,
            action: SignalAction::Hold,
            price: current_price,
            level_ratio: 0.0,
            confidence: cluster.importance,
            strength: (cluster.density * 10.0).min(100.0),
            entry_price: cluster.center_price,
            stop_loss: 0.0,
            take_profit: Vec::new(),
            risk_reward: 0.0,
            context: format!("fib confluence zone ({} levels)", cluster.level_count),
            quality: FibQuality::Medium,
            timestamp: now_ms,
        })
    }
}

impl Default for FibonacciAnalyzer {
    fn default() -> FibonacciAnalyzer {
        FibonacciAnalyzer::new()
    }
}

/// 비율별 중요도 테이블 (황금비 1.0, 나머지는 고정 가중)
fn level_importance(ratio: f64) -> f64 {
    if is_golden_ratio(ratio) {
        return 1.0;
    }

    match ratio {
        r if (r - 0.236).abs() < 0.001 => 0.7,
        r if (r - 0.5).abs() < 0.001 => 0.8,
        r if (r - 0.786).abs() < 0.001 => 0.7,
        r if (r - 1.0).abs() < 0.001 => 0.6,
        r if (r - 1.272).abs() < 0.001 => 0.6,
        r if (r - 1.618).abs() < 0.001 => 0.8,
        _ => 0.5,
    }
}

fn is_golden_ratio(ratio: f64) -> bool {
    (ratio - 0.618).abs() < 0.001 || (ratio - 0.382).abs() < 0.001
}

/// 회귀 파동 비율에 따른 확장 신뢰도 (0.382~0.618이 최상)
fn extension_confidence(base_wave: &PriceWave, return_wave: &PriceWave) -> f64 {
    let length_ratio = return_wave.length / base_wave.length;

    if (0.382..=0.618).contains(&length_ratio) {
        0.9
    } else if (0.3..=0.7).contains(&length_ratio) {
        0.7
    } else if (0.2..=0.8).contains(&length_ratio) {
        0.5
    } else {
        0.3
    }
}

/// 품질 우선, 동률이면 강도가 높은 활성 되돌림
fn best_retracement(retracements: &[FibRetracement]) -> Option<&FibRetracement> {
    let mut best: Option<&FibRetracement> = None;

    for quality in [FibQuality::High, FibQuality::Medium] {
        for retracement in retracements.iter().filter(|r| r.active) {
            if retracement.quality != quality {
                continue;
            }
            if best
                .map(|b| retracement.strength > b.strength)
                .unwrap_or(true)
            {
                best = Some(retracement);
            }
        }
        if best.is_some() {
            return best;
        }
    }

    best
}

fn golden_pocket_quality(retracement: &FibRetracement, touches: &[TouchEvent]) -> FibQuality {
    if retracement.quality == FibQuality::High && !touches.is_empty() {
        let bounce_count = touches
            .iter()
            .filter(|t| t.reaction == ReactionType::Bounce)
            .count();
        if bounce_count as f64 / touches.len() as f64 > 0.6 {
            FibQuality::High
        } else {
            FibQuality::Medium
        }
    } else if retracement.quality == FibQuality::Medium {
        FibQuality::Medium
    } else if retracement.quality == FibQuality::High {
        FibQuality::High
    } else {
        FibQuality::Low
    }
}

/// 클러스터 중요도 = 레벨 수 x 20 + 비율별 가점 (상한 100)
fn cluster_importance(ratios: impl Iterator<Item = f64>) -> f64 {
    let mut importance = 0.0;
    let mut count = 0usize;

    for ratio in ratios {
        count += 1;
        importance += if is_golden_ratio(ratio) {
            30.0
        } else if (ratio - 0.5).abs() < 0.001 || (ratio - 1.618).abs() < 0.001 {
            20.0
        } else {
            10.0
        };
    }

    (importance + count as f64 * 20.0).min(100.0)
}
