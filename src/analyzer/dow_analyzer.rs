use crate::analyzer::base::{
    count_line_touches, is_swing_high, is_swing_low, split_swings, SwingPoint, SwingType,
    TrendLine, TrendLineType,
};
use crate::indicator;
use crate::model::{Candle, SignalAction, TrendDirection};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 스윙 포인트 탐지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingPointConfig {
    /// 좌우 대칭 룩백 기간
    pub lookback_period: usize,
    /// 최소 스윙 강도
    pub min_strength: f64,
    /// 확정까지 필요한 캔들 수
    pub confirm_period: usize,
    /// 최소 가격 변화 비율
    pub min_price_change: f64,
}

/// 추세선 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendLineConfig {
    /// 최소 터치 수
    pub min_touches: usize,
    /// 터치 판정 거리 비율
    pub max_distance: f64,
    /// 돌파 판정 비율
    pub break_threshold: f64,
    /// 캔들당 최소 기울기 (절대 가격)
    pub min_slope: f64,
    /// 추세선 최대 수명 (캔들 수)
    pub max_age: usize,
}

/// 평행 채널 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// 최소 채널 폭 (가격 대비 비율)
    pub min_width: f64,
    /// 최대 채널 폭
    pub max_width: f64,
    /// 신호 생성에 요구되는 품질
    pub quality_threshold: f64,
    /// 평행 판정 허용 오차
    pub parallel_tolerance: f64,
}

/// 신호 생성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    /// 최소 신뢰도
    pub min_confidence: f64,
    /// 최소 손익비
    pub risk_reward_min: f64,
    /// 돌파 강도 요구치 (비율)
    pub breakout_strength: f64,
    /// 거래량 확인 사용 여부
    pub volume_confirmation: bool,
}

/// 다우 이론 분석기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DowConfig {
    pub swing: SwingPointConfig,
    pub trend_line: TrendLineConfig,
    pub channel: ChannelConfig,
    pub signal: SignalConfig,
}

impl Default for DowConfig {
    fn default() -> DowConfig {
        DowConfig {
            swing: SwingPointConfig {
                lookback_period: 5,
                min_strength: 0.5,
                confirm_period: 3,
                min_price_change: 0.01,
            },
            trend_line: TrendLineConfig {
                min_touches: 2,
                max_distance: 0.02,
                break_threshold: 0.01,
                min_slope: 0.0001,
                max_age: 50,
            },
            channel: ChannelConfig {
                min_width: 0.02,
                max_width: 0.15,
                quality_threshold: 0.7,
                parallel_tolerance: 0.1,
            },
            signal: SignalConfig {
                min_confidence: 60.0,
                risk_reward_min: 1.5,
                breakout_strength: 0.015,
                volume_confirmation: true,
            },
        }
    }
}

impl DowConfig {
    /// 설정 범위 검증
    pub fn validate(&self) -> Result<(), String> {
        if self.swing.lookback_period == 0 {
            return Err("스윙 룩백 기간은 0일 수 없습니다".to_string());
        }
        if self.channel.min_width <= 0.0 || self.channel.min_width >= self.channel.max_width {
            return Err("채널 폭 범위가 올바르지 않습니다".to_string());
        }
        if self.trend_line.min_touches < 2 {
            return Err("추세선 최소 터치 수는 2 이상이어야 합니다".to_string());
        }
        if self.signal.risk_reward_min <= 0.0 {
            return Err("최소 손익비는 양수여야 합니다".to_string());
        }
        Ok(())
    }
}

/// 채널 내 현재 가격 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPosition {
    Upper,
    Middle,
    Lower,
    Break,
}

/// 평행 채널
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelChannel {
    pub upper_line: TrendLine,
    pub lower_line: TrendLine,
    /// 상/하단의 기울기·절편 평균으로 만든 중앙선
    pub middle_line: TrendLine,
    /// 현재 가격 대비 채널 폭 비율
    pub width: f64,
    pub direction: TrendDirection,
    /// 채널 품질 [0,1]
    pub quality: f64,
    pub current_position: ChannelPosition,
    /// 채널 내 가격 비율 (0=하단, 1=상단)
    pub price_ratio: f64,
}

/// 추세 품질 등급
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendQuality {
    Strong,
    Moderate,
    Weak,
}

/// 추세 강도 평가
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendStrength {
    /// 전체 강도 = 0.3*단기 + 0.7*장기
    pub overall: f64,
    pub short_term: f64,
    pub long_term: f64,
    pub direction: TrendDirection,
    pub quality: TrendQuality,
    /// 동량 평가 (ROC, RSI 편차, MACD 합성)
    pub momentum: f64,
    /// 단기/장기 방향 일치도 [0,100]
    pub consistency: f64,
    /// 거래량 지지도 {25,50,75,100}
    pub volume_support: f64,
}

/// 다우 신호 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DowSignalKind {
    ChannelBounce,
    ChannelBreakout,
    TrendFollowing,
    Reversal,
    Hold,
}

/// 다우 이론 트레이딩 신호
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub kind: DowSignalKind,
    pub action: SignalAction,
    /// 신뢰도 [0,100]
    pub confidence: f64,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
    pub description: String,
    /// 신호 기준 시각 (윈도우 마지막 캔들의 종료 시각)
    pub timestamp: i64,
    pub channel_based: bool,
    pub breakout_based: bool,
}

impl TradingSignal {
    fn hold(confidence: f64, description: &str, timestamp: i64) -> TradingSignal {
        TradingSignal {
            kind: DowSignalKind::Hold,
            action: SignalAction::Hold,
            confidence,
            entry: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            risk_reward: 0.0,
            description: description.to_string(),
            timestamp,
            channel_based: false,
            breakout_based: false,
        }
    }

    /// 손익비 계산 (진입/손절/익절이 모두 있어야 유효)
    pub fn calculate_risk_reward(&self) -> f64 {
        if self.entry == 0.0 || self.stop_loss == 0.0 || self.take_profit == 0.0 {
            return 0.0;
        }

        let (risk, reward) = match self.action {
            SignalAction::Buy => (self.entry - self.stop_loss, self.take_profit - self.entry),
            _ => (self.stop_loss - self.entry, self.entry - self.take_profit),
        };

        if risk <= 0.0 {
            return 0.0;
        }
        reward / risk
    }
}

/// 다우 이론 분석 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DowTheoryData {
    pub swing_points: Vec<SwingPoint>,
    pub trend_lines: Vec<TrendLine>,
    pub channel: Option<ParallelChannel>,
    pub trend_strength: Option<TrendStrength>,
    pub trading_signal: Option<TradingSignal>,
}

impl DowTheoryData {
    fn empty_with_hold(timestamp: i64) -> DowTheoryData {
        DowTheoryData {
            swing_points: Vec::new(),
            trend_lines: Vec::new(),
            channel: None,
            trend_strength: None,
            trading_signal: Some(TradingSignal::hold(0.0, "insufficient data", timestamp)),
        }
    }
}

/// 다우 이론 분석기
///
/// 장기 윈도우에서 스윙 구조와 추세선, 평행 채널을 도출하고
/// 단기 윈도우로 추세 강도와 진입 신호를 보정합니다.
#[derive(Debug, Clone)]
pub struct DowAnalyzer {
    config: DowConfig,
}

impl Display for DowAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DowAnalyzer {{ lookback: {}, min_touches: {} }}",
            self.config.swing.lookback_period, self.config.trend_line.min_touches
        )
    }
}

impl DowAnalyzer {
    pub fn new() -> DowAnalyzer {
        DowAnalyzer {
            config: DowConfig::default(),
        }
    }

    pub fn with_config(config: DowConfig) -> DowAnalyzer {
        DowAnalyzer { config }
    }

    pub fn config(&self) -> &DowConfig {
        &self.config
    }

    /// 다우 이론 전체 분석을 수행합니다.
    ///
    /// # Arguments
    /// * `short` - 단기 윈도우 (기본 3m)
    /// * `long` - 장기 윈도우 (기본 4h)
    /// * `current_price` - 현재 가격
    pub fn analyze<C: Candle>(&self, short: &[C], long: &[C], current_price: f64) -> DowTheoryData {
        let now_ms = long
            .last()
            .map(|c| c.close_time())
            .or_else(|| short.last().map(|c| c.close_time()))
            .unwrap_or(0);

        let min_len = self.config.swing.lookback_period * 2 + 1;
        if long.len() < min_len {
            log::debug!("다우 분석 데이터 부족: long={}개", long.len());
            return DowTheoryData::empty_with_hold(now_ms);
        }

        let swing_points = self.identify_swing_points(long);
        let trend_lines = self.calculate_trend_lines(long, &swing_points);
        let channel = self.build_parallel_channel(long, &trend_lines, &swing_points, current_price, now_ms);
        let trend_strength = self.assess_trend_strength(short, long, &swing_points);
        let trading_signal = self.generate_trading_signal(
            short,
            current_price,
            channel.as_ref(),
            &trend_strength,
            &trend_lines,
            now_ms,
        );

        DowTheoryData {
            swing_points,
            trend_lines,
            channel,
            trend_strength: Some(trend_strength),
            trading_signal: Some(trading_signal),
        }
    }

    /// 대칭 룩백 극값 검사로 스윙 포인트를 식별합니다.
    pub fn identify_swing_points<C: Candle>(&self, candles: &[C]) -> Vec<SwingPoint> {
        let lookback = self.config.swing.lookback_period;
        if candles.len() < lookback * 2 + 1 {
            return Vec::new();
        }

        let mut swing_points = Vec::new();
        for i in lookback..candles.len() - lookback {
            let confirmed = i < candles.len() - self.config.swing.confirm_period;

            if is_swing_high(candles, i, lookback) {
                let strength = self.swing_point_strength(candles, i, SwingType::High);
                if strength >= self.config.swing.min_strength {
                    swing_points.push(SwingPoint {
                        swing_type: SwingType::High,
                        price: candles[i].high_price(),
                        time: candles[i].open_time(),
                        index: i,
                        strength,
                        confirmed,
                    });
                }
            }

            if is_swing_low(candles, i, lookback) {
                let strength = self.swing_point_strength(candles, i, SwingType::Low);
                if strength >= self.config.swing.min_strength {
                    swing_points.push(SwingPoint {
                        swing_type: SwingType::Low,
                        price: candles[i].low_price(),
                        time: candles[i].open_time(),
                        index: i,
                        strength,
                        confirmed,
                    });
                }
            }
        }

        swing_points
    }

    /// 스윙 강도: ±10캔들 대비 돌출도 0.7 + 거래량 비율(상한 2) 0.3, 상한 10
    fn swing_point_strength<C: Candle>(
        &self,
        candles: &[C],
        index: usize,
        swing_type: SwingType,
    ) -> f64 {
        if index < 1 || index >= candles.len() {
            return 0.0;
        }

        let candle = &candles[index];
        let mut price_range = (candle.high_price() - candle.low_price()) / candle.low_price();

        let start = index.saturating_sub(10);
        let end = (index + 10).min(candles.len() - 1);
        let mut max_high = f64::MIN;
        let mut min_low = f64::MAX;
        for c in &candles[start..=end] {
            max_high = max_high.max(c.high_price());
            min_low = min_low.min(c.low_price());
        }

        if max_high > min_low {
            price_range = match swing_type {
                SwingType::High => (candle.high_price() - min_low) / (max_high - min_low),
                SwingType::Low => (max_high - candle.low_price()) / (max_high - min_low),
            };
        }

        let vol_start = index.saturating_sub(20);
        let vol_end = (index + 20).min(candles.len());
        let window = &candles[vol_start..vol_end];
        let avg_volume: f64 =
            window.iter().map(|c| c.volume()).sum::<f64>() / window.len() as f64;

        let volume_weight = if avg_volume > 0.0 {
            candle.volume() / avg_volume
        } else {
            0.0
        };

        (price_range * 0.7 + volume_weight.min(2.0) * 0.3).min(10.0)
    }

    /// 같은 유형의 스윙 쌍을 모두 이어 추세선 후보를 만들고 강도순 상위만 남깁니다.
    pub fn calculate_trend_lines<C: Candle>(
        &self,
        candles: &[C],
        swing_points: &[SwingPoint],
    ) -> Vec<TrendLine> {
        if swing_points.len() < 2 {
            return Vec::new();
        }

        let bar_ms = average_bar_ms(candles);
        let (highs, lows) = split_swings(swing_points);

        let mut trend_lines = Vec::new();
        trend_lines.extend(self.lines_from_points(&highs, TrendLineType::Resistance, bar_ms));
        trend_lines.extend(self.lines_from_points(&lows, TrendLineType::Support, bar_ms));

        trend_lines.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        trend_lines.truncate(10);
        trend_lines
    }

    fn lines_from_points(
        &self,
        points: &[SwingPoint],
        line_type: TrendLineType,
        bar_ms: f64,
    ) -> Vec<TrendLine> {
        if points.len() < 2 {
            return Vec::new();
        }

        let mut lines = Vec::new();
        for i in 0..points.len() - 1 {
            for j in i + 1..points.len() {
                let Some(mut line) = TrendLine::through(&points[i], &points[j], line_type) else {
                    continue;
                };

                // 캔들당 가격 변화로 환산하여 수평에 가까운 선을 걸러냄
                if (line.slope * bar_ms).abs() < self.config.trend_line.min_slope {
                    continue;
                }

                let touches =
                    count_line_touches(&line, points, self.config.trend_line.max_distance);
                if touches < self.config.trend_line.min_touches {
                    continue;
                }

                line.touches = touches;
                line.strength = self.trend_line_strength(&line, bar_ms);
                lines.push(line);
            }
        }

        lines
    }

    /// 추세선 강도: 터치 수 + 기간 가점(최대 2) + 평균 포인트 강도*0.5 + 각도 가점
    fn trend_line_strength(&self, line: &TrendLine, bar_ms: f64) -> f64 {
        let mut strength = line.touches as f64;

        strength += (line.span_days() / 10.0).min(2.0);

        if !line.points.is_empty() {
            let point_sum: f64 = line.points.iter().map(|p| p.strength).sum();
            strength += (point_sum / line.points.len() as f64) * 0.5;
        }

        // 너무 가파르지도 수평하지도 않은 각도 선호
        let slope_per_bar = line.slope * bar_ms;
        let reference = line.points.first().map(|p| p.price).unwrap_or(1.0);
        if reference > 0.0 {
            let angle = (slope_per_bar.abs() / reference * 100.0).atan().to_degrees();
            if angle > 15.0 && angle < 75.0 {
                strength += 0.5;
            }
        }

        strength
    }

    /// 가장 강한 추세선을 기준으로 평행 채널을 조립합니다.
    pub fn build_parallel_channel<C: Candle>(
        &self,
        candles: &[C],
        trend_lines: &[TrendLine],
        swing_points: &[SwingPoint],
        current_price: f64,
        now_ms: i64,
    ) -> Option<ParallelChannel> {
        let main_line = trend_lines.first()?;
        let bar_ms = average_bar_ms(candles);

        // 기존 추세선 중 평행한 짝을 찾고, 없으면 반대 유형 스윙으로 구성
        let parallel = trend_lines[1..]
            .iter()
            .find(|line| self.are_parallel(main_line, line))
            .cloned()
            .or_else(|| self.construct_parallel_line(main_line, swing_points));
        let parallel = parallel?;

        let (upper_line, lower_line) = if main_line.line_type == TrendLineType::Support {
            (parallel, main_line.clone())
        } else {
            (main_line.clone(), parallel)
        };

        let middle_line = middle_of(&upper_line, &lower_line);

        let upper_price = upper_line.price_at(now_ms);
        let lower_price = lower_line.price_at(now_ms);
        if current_price <= 0.0 {
            return None;
        }

        let width = (upper_price - lower_price).abs() / current_price;
        if width < self.config.channel.min_width || width > self.config.channel.max_width {
            return None;
        }

        let direction = slope_direction(upper_line.slope * bar_ms);
        let quality = self.channel_quality(&upper_line, &lower_line);
        let (current_position, price_ratio) =
            channel_position(current_price, upper_price, lower_price);

        Some(ParallelChannel {
            upper_line,
            lower_line,
            middle_line,
            width,
            direction,
            quality,
            current_position,
            price_ratio,
        })
    }

    fn are_parallel(&self, line1: &TrendLine, line2: &TrendLine) -> bool {
        let slope_diff = (line1.slope - line2.slope).abs();
        let avg_slope = (line1.slope.abs() + line2.slope.abs()) / 2.0;
        if avg_slope == 0.0 {
            return slope_diff < self.config.channel.parallel_tolerance;
        }

        slope_diff / avg_slope < self.config.channel.parallel_tolerance
    }

    /// 반대 유형 스윙 쌍 중 주선과 평행하면서 평균 거리가 가장 큰 선을 고릅니다.
    fn construct_parallel_line(
        &self,
        main_line: &TrendLine,
        swing_points: &[SwingPoint],
    ) -> Option<TrendLine> {
        let target_type = if main_line.line_type == TrendLineType::Support {
            SwingType::High
        } else {
            SwingType::Low
        };
        let candidate_type = if main_line.line_type == TrendLineType::Support {
            TrendLineType::Resistance
        } else {
            TrendLineType::Support
        };

        let candidates: Vec<&SwingPoint> = swing_points
            .iter()
            .filter(|p| p.swing_type == target_type)
            .collect();
        if candidates.len() < 2 {
            return None;
        }

        let mut best_distance = 0.0;
        let mut best_line = None;

        for i in 0..candidates.len() - 1 {
            for j in i + 1..candidates.len() {
                let Some(line) = TrendLine::through(candidates[i], candidates[j], candidate_type)
                else {
                    continue;
                };

                if !self.are_parallel(main_line, &line) {
                    continue;
                }

                let distance = average_line_distance(main_line, &line);
                if distance > best_distance {
                    best_distance = distance;
                    best_line = Some(line);
                }
            }
        }

        best_line
    }

    /// 채널 품질: 선 강도 0.3 + 평행도 0.2 + 터치 0.3 + 기간 0.2
    fn channel_quality(&self, upper: &TrendLine, lower: &TrendLine) -> f64 {
        let mut quality = (upper.strength + lower.strength) / 2.0 * 0.3;

        let max_slope = upper.slope.abs().max(lower.slope.abs());
        let parallel_score = if max_slope > 0.0 {
            1.0 - (upper.slope - lower.slope).abs() / max_slope
        } else {
            1.0
        };
        quality += parallel_score * 0.2;

        let total_touches = (upper.touches + lower.touches) as f64;
        quality += (total_touches / 10.0).min(1.0) * 0.3;

        let span_days = upper.span_days().max(lower.span_days());
        quality += (span_days / 30.0).min(1.0) * 0.2;

        quality.min(1.0)
    }

    /// 단기/장기 윈도우에서 추세 강도를 평가합니다.
    pub fn assess_trend_strength<C: Candle>(
        &self,
        short: &[C],
        long: &[C],
        swing_points: &[SwingPoint],
    ) -> TrendStrength {
        if long.len() < 20 {
            return TrendStrength {
                overall: 0.0,
                short_term: 0.0,
                long_term: 0.0,
                direction: TrendDirection::Flat,
                quality: TrendQuality::Weak,
                momentum: 0.0,
                consistency: 0.0,
                volume_support: 0.0,
            };
        }

        let short_term = self.short_term_strength(short);
        let long_term = self.long_term_strength(long);
        let overall = short_term * 0.3 + long_term * 0.7;

        let direction = self.determine_trend_direction(long, swing_points);
        let momentum = self.calculate_momentum(long);
        let consistency = self.calculate_consistency(short, long);
        let volume_support = self.calculate_volume_support(long);
        let quality = trend_quality(overall, consistency, volume_support);

        TrendStrength {
            overall,
            short_term,
            long_term,
            direction,
            quality,
            momentum,
            consistency,
            volume_support,
        }
    }

    /// 단기 강도: 누적 수익률 50 + 이동평균 배열 30 + 저변동성 20
    fn short_term_strength<C: Candle>(&self, candles: &[C]) -> f64 {
        if candles.len() < 20 {
            return 0.0;
        }

        let recent = &candles[candles.len() - 20..];
        let price_change =
            (recent[recent.len() - 1].close_price() - recent[0].open_price()) / recent[0].open_price();

        let ma5 = indicator::sma(recent, 5);
        let ma10 = indicator::sma(recent, 10);
        let ma20 = indicator::sma(recent, 20);

        let ma_trend: f64 = if ma5 > ma10 && ma10 > ma20 {
            1.0
        } else if ma5 < ma10 && ma10 < ma20 {
            -1.0
        } else {
            0.0
        };

        let volatility = indicator::volatility(recent);

        let strength = price_change.abs() * 50.0 + ma_trend.abs() * 30.0 + (1.0 - volatility) * 20.0;
        strength.min(100.0)
    }

    /// 장기 강도: 기울기 40 + 선형성 R² 40 + 이동평균 위치 20
    fn long_term_strength<C: Candle>(&self, candles: &[C]) -> f64 {
        if candles.len() < 50 {
            return 0.0;
        }

        let period = 30.min(candles.len());
        let recent = &candles[candles.len() - period..];

        let prices: Vec<f64> = recent.iter().map(|c| c.close_price()).collect();
        let slope = indicator::trend_slope(&prices);
        let r_squared = indicator::r_squared(&prices);

        let ma20 = indicator::sma(recent, 20);
        let ma50 = indicator::sma(candles, 50);
        let current_price = recent[recent.len() - 1].close_price();

        let ma_position = if (current_price > ma20 && ma20 > ma50)
            || (current_price < ma20 && ma20 < ma50)
        {
            1.0
        } else {
            0.0
        };

        let strength = slope.abs() * 40.0 + r_squared * 40.0 + ma_position * 20.0;
        strength.min(100.0)
    }

    /// 추세 방향: 가격 변화 0.6 + 스윙 수열 방향 0.4, ±2% 데드밴드
    fn determine_trend_direction<C: Candle>(
        &self,
        candles: &[C],
        swing_points: &[SwingPoint],
    ) -> TrendDirection {
        if candles.len() < 10 {
            return TrendDirection::Flat;
        }

        let recent = &candles[candles.len() - 10..];
        let price_direction =
            (recent[recent.len() - 1].close_price() - recent[0].open_price()) / recent[0].open_price();

        let mut swing_direction = 0.0;
        if swing_points.len() >= 4 {
            let recent_swings = &swing_points[swing_points.len() - 4..];
            let (highs, lows) = split_swings(recent_swings);

            if highs.len() >= 2 {
                swing_direction += if highs[highs.len() - 1].price > highs[0].price {
                    0.5
                } else {
                    -0.5
                };
            }
            if lows.len() >= 2 {
                swing_direction += if lows[lows.len() - 1].price > lows[0].price {
                    0.5
                } else {
                    -0.5
                };
            }
        }

        let overall = price_direction * 0.6 + swing_direction * 0.4;
        if overall > 0.02 {
            TrendDirection::Up
        } else if overall < -0.02 {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        }
    }

    /// 동량: |ROC|*30 + |RSI-50|*1.4 + |MACD|*20, 상한 100
    fn calculate_momentum<C: Candle>(&self, candles: &[C]) -> f64 {
        if candles.len() < 11 {
            return 0.0;
        }

        let current = candles[candles.len() - 1].close_price();
        let past = candles[candles.len() - 11].close_price();
        let roc = (current - past) / past;

        let rsi = indicator::rsi(candles, 14);
        let macd = indicator::macd(candles);

        (roc.abs() * 30.0 + (rsi - 50.0).abs() * 1.4 + macd.abs() * 20.0).min(100.0)
    }

    /// 단기/장기 추세 방향의 일치도 [0,100]
    fn calculate_consistency<C: Candle>(&self, short: &[C], long: &[C]) -> f64 {
        if short.len() < 20 || long.len() < 5 {
            return 0.0;
        }

        let short_trend = (short[short.len() - 1].close_price()
            - short[short.len() - 20].close_price())
            / short[short.len() - 20].close_price();
        let long_trend = (long[long.len() - 1].close_price() - long[long.len() - 5].close_price())
            / long[long.len() - 5].close_price();

        let consistency = if short_trend.signum() == long_trend.signum() {
            100.0 - (short_trend - long_trend).abs() * 100.0
        } else {
            100.0 - (short_trend.abs() + long_trend.abs()) * 100.0
        };

        consistency.clamp(0.0, 100.0)
    }

    /// 거래량 지지도: 최근 5캔들 평균 / 이전 15캔들 평균을 구간화
    fn calculate_volume_support<C: Candle>(&self, candles: &[C]) -> f64 {
        if candles.len() < 20 {
            return 0.0;
        }

        let recent = &candles[candles.len() - 5..];
        let historical = &candles[candles.len() - 20..candles.len() - 5];

        let recent_avg: f64 = recent.iter().map(|c| c.volume()).sum::<f64>() / recent.len() as f64;
        let historical_avg: f64 =
            historical.iter().map(|c| c.volume()).sum::<f64>() / historical.len() as f64;

        if historical_avg == 0.0 {
            return 0.0;
        }

        let ratio = recent_avg / historical_avg;
        if ratio > 1.5 {
            100.0
        } else if ratio > 1.2 {
            75.0
        } else if ratio > 0.8 {
            50.0
        } else {
            25.0
        }
    }

    /// 신호 생성: 채널 → 돌파 → 추세 추종 순으로 시도하고
    /// 신뢰도/손익비 조건을 만족하는 첫 신호를 채택합니다.
    pub fn generate_trading_signal<C: Candle>(
        &self,
        short: &[C],
        current_price: f64,
        channel: Option<&ParallelChannel>,
        trend_strength: &TrendStrength,
        trend_lines: &[TrendLine],
        now_ms: i64,
    ) -> TradingSignal {
        if short.is_empty() {
            return TradingSignal::hold(0.0, "insufficient data", now_ms);
        }

        if let Some(channel) = channel {
            if channel.quality > self.config.channel.quality_threshold {
                if let Some(signal) =
                    self.channel_signal(current_price, channel, trend_strength, now_ms)
                {
                    if self.accepts(&signal) {
                        return signal;
                    }
                }
            }
        }

        if let Some(signal) =
            self.breakout_signal(short, current_price, trend_lines, now_ms)
        {
            if self.accepts(&signal) {
                return signal;
            }
        }

        if let Some(signal) =
            self.trend_following_signal(current_price, trend_strength, channel, now_ms)
        {
            if self.accepts(&signal) {
                return signal;
            }
        }

        TradingSignal::hold(50.0, "no clear setup, stay flat", now_ms)
    }

    fn accepts(&self, signal: &TradingSignal) -> bool {
        signal.confidence >= self.config.signal.min_confidence
            && (!signal.action.is_entry()
                || signal.risk_reward >= self.config.signal.risk_reward_min)
    }

    fn channel_signal(
        &self,
        current_price: f64,
        channel: &ParallelChannel,
        trend_strength: &TrendStrength,
        now_ms: i64,
    ) -> Option<TradingSignal> {
        let upper_price = channel.upper_line.price_at(now_ms);
        let lower_price = channel.lower_line.price_at(now_ms);
        let middle_price = channel.middle_line.price_at(now_ms);
        let confidence = channel.quality * 100.0;

        let mut signal = match channel.current_position {
            ChannelPosition::Lower => {
                if channel.direction == TrendDirection::Up
                    || (channel.direction == TrendDirection::Flat && trend_strength.overall > 60.0)
                {
                    Some(TradingSignal {
                        kind: DowSignalKind::ChannelBounce,
                        action: SignalAction::Buy,
                        confidence,
                        entry: current_price,
                        stop_loss: lower_price * 0.99,
                        take_profit: middle_price,
                        risk_reward: 0.0,
                        description: "support at lower channel rail".to_string(),
                        timestamp: now_ms,
                        channel_based: true,
                        breakout_based: false,
                    })
                } else {
                    None
                }
            }
            ChannelPosition::Upper => {
                if channel.direction == TrendDirection::Down
                    || (channel.direction == TrendDirection::Flat && trend_strength.overall < 40.0)
                {
                    Some(TradingSignal {
                        kind: DowSignalKind::ChannelBounce,
                        action: SignalAction::Sell,
                        confidence,
                        entry: current_price,
                        stop_loss: upper_price * 1.01,
                        take_profit: middle_price,
                        risk_reward: 0.0,
                        description: "resistance at upper channel rail".to_string(),
                        timestamp: now_ms,
                        channel_based: true,
                        breakout_based: false,
                    })
                } else {
                    None
                }
            }
            ChannelPosition::Break => {
                if current_price > upper_price * 1.01 && channel.direction == TrendDirection::Up {
                    Some(TradingSignal {
                        kind: DowSignalKind::ChannelBreakout,
                        action: SignalAction::Buy,
                        confidence: confidence * 0.9,
                        entry: current_price,
                        stop_loss: upper_price,
                        take_profit: current_price * 1.05,
                        risk_reward: 0.0,
                        description: "upward channel breakout".to_string(),
                        timestamp: now_ms,
                        channel_based: true,
                        breakout_based: true,
                    })
                } else if current_price < lower_price * 0.99
                    && channel.direction == TrendDirection::Down
                {
                    Some(TradingSignal {
                        kind: DowSignalKind::ChannelBreakout,
                        action: SignalAction::Sell,
                        confidence: confidence * 0.9,
                        entry: current_price,
                        stop_loss: lower_price,
                        take_profit: current_price * 0.95,
                        risk_reward: 0.0,
                        description: "downward channel breakout".to_string(),
                        timestamp: now_ms,
                        channel_based: true,
                        breakout_based: true,
                    })
                } else {
                    None
                }
            }
            ChannelPosition::Middle => None,
        }?;

        signal.risk_reward = signal.calculate_risk_reward();
        if signal.risk_reward < self.config.signal.risk_reward_min {
            signal.confidence *= 0.7;
        }

        Some(signal)
    }

    fn breakout_signal<C: Candle>(
        &self,
        short: &[C],
        current_price: f64,
        trend_lines: &[TrendLine],
        now_ms: i64,
    ) -> Option<TradingSignal> {
        if trend_lines.is_empty() || short.len() < 5 {
            return None;
        }

        for line in trend_lines {
            if line.strength < 3.0 {
                continue;
            }

            let expected = line.price_at(now_ms);
            if expected <= 0.0 {
                continue;
            }
            let breakout_strength = (current_price - expected).abs() / expected;
            if breakout_strength <= self.config.signal.breakout_strength {
                continue;
            }

            let mut signal = if line.line_type == TrendLineType::Support
                && current_price < expected * 0.99
            {
                TradingSignal {
                    kind: DowSignalKind::ChannelBreakout,
                    action: SignalAction::Sell,
                    confidence: line.strength * 15.0,
                    entry: current_price,
                    stop_loss: expected,
                    take_profit: current_price * 0.97,
                    risk_reward: 0.0,
                    description: "break below major support line".to_string(),
                    timestamp: now_ms,
                    channel_based: false,
                    breakout_based: true,
                }
            } else if line.line_type == TrendLineType::Resistance
                && current_price > expected * 1.01
            {
                TradingSignal {
                    kind: DowSignalKind::ChannelBreakout,
                    action: SignalAction::Buy,
                    confidence: line.strength * 15.0,
                    entry: current_price,
                    stop_loss: expected,
                    take_profit: current_price * 1.03,
                    risk_reward: 0.0,
                    description: "break above major resistance line".to_string(),
                    timestamp: now_ms,
                    channel_based: false,
                    breakout_based: true,
                }
            } else {
                continue;
            };

            signal.risk_reward = signal.calculate_risk_reward();

            if self.config.signal.volume_confirmation {
                signal.confidence *= self.volume_confirmation(short);
            }
            signal.confidence = signal.confidence.min(100.0);

            return Some(signal);
        }

        None
    }

    fn trend_following_signal(
        &self,
        current_price: f64,
        trend_strength: &TrendStrength,
        channel: Option<&ParallelChannel>,
        now_ms: i64,
    ) -> Option<TradingSignal> {
        if trend_strength.quality != TrendQuality::Strong || trend_strength.overall < 70.0 {
            return None;
        }

        let confidence = trend_strength.overall * 0.8;
        let middle_price = channel.map(|c| c.middle_line.price_at(now_ms));

        let mut signal = if trend_strength.direction == TrendDirection::Up
            && trend_strength.consistency > 70.0
        {
            // 채널이 있으면 중앙선 아래·근처에서만 추격 매수
            if let Some(middle) = middle_price {
                if current_price >= middle * 1.02 {
                    return None;
                }
            }
            TradingSignal {
                kind: DowSignalKind::TrendFollowing,
                action: SignalAction::Buy,
                confidence,
                entry: current_price,
                stop_loss: current_price * 0.97,
                take_profit: current_price * 1.05,
                risk_reward: 0.0,
                description: "strong uptrend continuation".to_string(),
                timestamp: now_ms,
                channel_based: false,
                breakout_based: false,
            }
        } else if trend_strength.direction == TrendDirection::Down
            && trend_strength.consistency > 70.0
        {
            if let Some(middle) = middle_price {
                if current_price <= middle * 0.98 {
                    return None;
                }
            }
            TradingSignal {
                kind: DowSignalKind::TrendFollowing,
                action: SignalAction::Sell,
                confidence,
                entry: current_price,
                stop_loss: current_price * 1.03,
                take_profit: current_price * 0.95,
                risk_reward: 0.0,
                description: "strong downtrend continuation".to_string(),
                timestamp: now_ms,
                channel_based: false,
                breakout_based: false,
            }
        } else {
            return None;
        };

        signal.risk_reward = signal.calculate_risk_reward();
        Some(signal)
    }

    /// 거래량 확인 배율: 최근 캔들 거래량 / 직전 10캔들 평균
    fn volume_confirmation<C: Candle>(&self, candles: &[C]) -> f64 {
        if candles.len() < 10 {
            return 0.8;
        }

        let recent_volume = candles[candles.len() - 1].volume();
        let lookback = &candles[candles.len().saturating_sub(11)..candles.len() - 1];
        let avg_volume: f64 =
            lookback.iter().map(|c| c.volume()).sum::<f64>() / lookback.len() as f64;

        if avg_volume == 0.0 {
            return 0.8;
        }

        let ratio = recent_volume / avg_volume;
        if ratio > 2.0 {
            1.0
        } else if ratio > 1.5 {
            0.9
        } else if ratio > 1.2 {
            0.8
        } else {
            0.6
        }
    }
}

impl Default for DowAnalyzer {
    fn default() -> DowAnalyzer {
        DowAnalyzer::new()
    }
}

/// 윈도우의 평균 캔들 간격 (ms)
fn average_bar_ms<C: Candle>(candles: &[C]) -> f64 {
    if candles.len() < 2 {
        return 1.0;
    }
    let span = candles[candles.len() - 1].open_time() - candles[0].open_time();
    (span as f64 / (candles.len() - 1) as f64).max(1.0)
}

/// 상/하단의 쌍별 평균으로 중앙선을 만듭니다.
fn middle_of(upper: &TrendLine, lower: &TrendLine) -> TrendLine {
    TrendLine {
        line_type: TrendLineType::Support,
        points: Vec::new(),
        slope: (upper.slope + lower.slope) / 2.0,
        intercept: (upper.intercept + lower.intercept) / 2.0,
        strength: (upper.strength + lower.strength) / 2.0,
        touches: 0,
        last_touch: upper.last_touch.max(lower.last_touch),
        broken: false,
        break_time: 0,
    }
}

/// 캔들당 기울기를 방향으로 분류합니다 (±0.001 데드밴드).
fn slope_direction(slope_per_bar: f64) -> TrendDirection {
    if slope_per_bar > 0.001 {
        TrendDirection::Up
    } else if slope_per_bar < -0.001 {
        TrendDirection::Down
    } else {
        TrendDirection::Flat
    }
}

/// 채널 내 위치와 가격 비율 계산
fn channel_position(current_price: f64, upper_price: f64, lower_price: f64) -> (ChannelPosition, f64) {
    if current_price > upper_price * 1.01 {
        return (ChannelPosition::Break, 1.0);
    }
    if current_price < lower_price * 0.99 {
        return (ChannelPosition::Break, 0.0);
    }

    let range = upper_price - lower_price;
    let ratio = if range > 0.0 {
        ((current_price - lower_price) / range).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let position = if ratio > 0.7 {
        ChannelPosition::Upper
    } else if ratio < 0.3 {
        ChannelPosition::Lower
    } else {
        ChannelPosition::Middle
    };

    (position, ratio)
}

/// 전체/일치도/거래량 평균을 품질 등급으로 변환
fn trend_quality(overall: f64, consistency: f64, volume_support: f64) -> TrendQuality {
    let score = (overall + consistency + volume_support) / 3.0;
    if score > 75.0 {
        TrendQuality::Strong
    } else if score > 50.0 {
        TrendQuality::Moderate
    } else {
        TrendQuality::Weak
    }
}
