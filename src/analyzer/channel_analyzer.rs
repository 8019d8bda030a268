use crate::analyzer::base::{
    count_line_touches, is_swing_high, is_swing_low, split_swings, SwingPoint, SwingType,
    TrendLine, TrendLineType,
};
use crate::model::{Candle, TrendDirection};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 독립 채널 분석기 설정
///
/// 다우 분석기의 채널 단계보다 좁은 허용 오차와 높은 명중 요구치로
/// 더 깨끗한 채널만 채택합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAnalysisConfig {
    /// 스윙 포인트 룩백 기간
    pub swing_lookback: usize,
    /// 최소 스윙 강도
    pub min_swing_strength: f64,
    /// 추세선 최소 명중 수
    pub min_trendline_hits: usize,
    /// 명중 판정 거리 비율
    pub max_distance: f64,
    /// 최소 채널 폭
    pub min_channel_width: f64,
    /// 최대 채널 폭
    pub max_channel_width: f64,
    /// 평행 허용 오차
    pub parallel_tolerance: f64,
    /// 채널 채택 품질 기준
    pub quality_threshold: f64,
    /// 분석에 사용하는 최근 캔들 수
    pub analysis_window: usize,
}

impl Default for ChannelAnalysisConfig {
    fn default() -> ChannelAnalysisConfig {
        ChannelAnalysisConfig {
            swing_lookback: 7,
            min_swing_strength: 0.6,
            min_trendline_hits: 3,
            max_distance: 0.015,
            min_channel_width: 0.02,
            max_channel_width: 0.18,
            parallel_tolerance: 0.08,
            quality_threshold: 0.75,
            analysis_window: 300,
        }
    }
}

impl ChannelAnalysisConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.swing_lookback == 0 {
            return Err("채널 스윙 룩백은 0일 수 없습니다".to_string());
        }
        if self.min_channel_width <= 0.0 || self.min_channel_width >= self.max_channel_width {
            return Err("채널 폭 범위가 올바르지 않습니다".to_string());
        }
        if self.min_trendline_hits < 2 {
            return Err("추세선 최소 명중 수는 2 이상이어야 합니다".to_string());
        }
        Ok(())
    }
}

/// 채널 내 가격 위치 (돌파 방향 구분 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPricePosition {
    Upper,
    Middle,
    Lower,
    BreakUp,
    BreakDown,
}

impl Display for ChannelPricePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelPricePosition::Upper => "upper",
            ChannelPricePosition::Middle => "middle",
            ChannelPricePosition::Lower => "lower",
            ChannelPricePosition::BreakUp => "break_up",
            ChannelPricePosition::BreakDown => "break_down",
        };
        f.write_str(name)
    }
}

/// 채택된 채널
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub upper_line: TrendLine,
    pub lower_line: TrendLine,
    pub middle_line: TrendLine,
    /// 현재 가격 대비 채널 폭 비율
    pub width: f64,
    /// 품질 [0,1]
    pub quality: f64,
    pub direction: TrendDirection,
    /// 채널 존속 기간 (ms)
    pub age_ms: i64,
}

/// 채널 분석 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelData {
    pub active_channel: Option<Channel>,
    pub trend_lines: Vec<TrendLine>,
    pub current_position: Option<ChannelPricePosition>,
    /// 채널 내 가격 비율 (0=하단, 1=상단)
    pub price_ratio: f64,
    pub quality: f64,
    pub direction: Option<TrendDirection>,
    /// 짧은 분석 요약
    pub analysis: String,
}

impl ChannelData {
    fn note(analysis: &str) -> ChannelData {
        ChannelData {
            active_channel: None,
            trend_lines: Vec::new(),
            current_position: None,
            price_ratio: 0.0,
            quality: 0.0,
            direction: None,
            analysis: analysis.to_string(),
        }
    }
}

/// 독립 평행 채널 분석기
#[derive(Debug, Clone)]
pub struct ChannelAnalyzer {
    config: ChannelAnalysisConfig,
}

impl Display for ChannelAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChannelAnalyzer {{ lookback: {}, min_hits: {} }}",
            self.config.swing_lookback, self.config.min_trendline_hits
        )
    }
}

impl ChannelAnalyzer {
    pub fn new() -> ChannelAnalyzer {
        ChannelAnalyzer {
            config: ChannelAnalysisConfig::default(),
        }
    }

    pub fn with_config(config: ChannelAnalysisConfig) -> ChannelAnalyzer {
        ChannelAnalyzer { config }
    }

    pub fn config(&self) -> &ChannelAnalysisConfig {
        &self.config
    }

    /// 장기 윈도우에서 최적 채널을 찾습니다.
    pub fn analyze<C: Candle>(&self, candles: &[C], current_price: f64) -> ChannelData {
        if candles.len() < 50 {
            return ChannelData::note("not enough candles for channel analysis");
        }

        let window = if candles.len() > self.config.analysis_window {
            &candles[candles.len() - self.config.analysis_window..]
        } else {
            candles
        };
        let now_ms = window[window.len() - 1].close_time();

        let swing_points = self.identify_swing_points(window);
        if swing_points.len() < 4 {
            return ChannelData::note("too few swing points to build a channel");
        }

        let trend_lines = self.calculate_trend_lines(&swing_points);
        if trend_lines.len() < 2 {
            return ChannelData::note("too few trend lines to build a channel");
        }

        let Some(channel) = self.find_best_channel(&trend_lines, &swing_points, current_price, now_ms)
        else {
            return ChannelData {
                trend_lines,
                ..ChannelData::note("no valid channel found")
            };
        };

        let (position, ratio) = self.price_position(current_price, &channel, now_ms);
        let analysis = self.describe(&channel, position, ratio);

        ChannelData {
            quality: channel.quality,
            direction: Some(channel.direction),
            active_channel: Some(channel),
            trend_lines,
            current_position: Some(position),
            price_ratio: ratio,
            analysis,
        }
    }

    fn identify_swing_points<C: Candle>(&self, candles: &[C]) -> Vec<SwingPoint> {
        let lookback = self.config.swing_lookback;
        let mut swing_points = Vec::new();

        if candles.len() < lookback * 2 + 1 {
            return swing_points;
        }

        for i in lookback..candles.len() - lookback {
            if is_swing_high(candles, i, lookback) {
                let strength = self.swing_strength(candles, i, true);
                if strength >= self.config.min_swing_strength {
                    swing_points.push(SwingPoint {
                        swing_type: SwingType::High,
                        price: candles[i].high_price(),
                        time: candles[i].open_time(),
                        index: i,
                        strength,
                        confirmed: true,
                    });
                }
            }

            if is_swing_low(candles, i, lookback) {
                let strength = self.swing_strength(candles, i, false);
                if strength >= self.config.min_swing_strength {
                    swing_points.push(SwingPoint {
                        swing_type: SwingType::Low,
                        price: candles[i].low_price(),
                        time: candles[i].open_time(),
                        index: i,
                        strength,
                        confirmed: true,
                    });
                }
            }
        }

        swing_points
    }

    /// 스윙 강도: 캔들 범위 0.4 + 거래량 비율 0.3 + 상대 위치 0.3 (x2 스케일)
    fn swing_strength<C: Candle>(&self, candles: &[C], index: usize, is_high: bool) -> f64 {
        if index < 10 || index + 10 >= candles.len() {
            return 0.0;
        }

        let candle = &candles[index];
        let price_range = (candle.high_price() - candle.low_price()) / candle.close_price();

        let start = index - 10;
        let end = (index + 10).min(candles.len() - 1);
        let window = &candles[start..=end];
        let avg_volume: f64 =
            window.iter().map(|c| c.volume()).sum::<f64>() / window.len() as f64;
        let volume_score = if avg_volume > 0.0 {
            (candle.volume() / avg_volume).min(2.0)
        } else {
            1.0
        };

        let pos_start = index.saturating_sub(15);
        let pos_end = (index + 15).min(candles.len() - 1);
        let position_score = if is_high {
            let max_high = candles[pos_start..=pos_end]
                .iter()
                .map(|c| c.high_price())
                .fold(f64::MIN, f64::max);
            if max_high > 0.0 {
                candle.high_price() / max_high
            } else {
                0.0
            }
        } else {
            let min_low = candles[pos_start..=pos_end]
                .iter()
                .map(|c| c.low_price())
                .fold(f64::MAX, f64::min);
            if candle.low_price() > 0.0 {
                min_low / candle.low_price()
            } else {
                0.0
            }
        };

        (price_range * 0.4 + volume_score * 0.3 + position_score * 0.3) * 2.0
    }

    fn calculate_trend_lines(&self, swing_points: &[SwingPoint]) -> Vec<TrendLine> {
        let (highs, lows) = split_swings(swing_points);

        let mut trend_lines = Vec::new();
        trend_lines.extend(self.lines_from_points(&highs, TrendLineType::Resistance));
        trend_lines.extend(self.lines_from_points(&lows, TrendLineType::Support));

        trend_lines.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        trend_lines
    }

    fn lines_from_points(&self, points: &[SwingPoint], line_type: TrendLineType) -> Vec<TrendLine> {
        if points.len() < 2 {
            return Vec::new();
        }

        let mut lines = Vec::new();
        for i in 0..points.len() - 1 {
            for j in i + 1..points.len() {
                let Some(mut line) = TrendLine::through(&points[i], &points[j], line_type) else {
                    continue;
                };

                let hits = count_line_touches(&line, points, self.config.max_distance);
                if hits < self.config.min_trendline_hits {
                    continue;
                }

                line.touches = hits;
                line.strength = self.trend_line_strength(&line);
                lines.push(line);
            }
        }

        lines
    }

    /// 추세선 강도: 명중 수*2 + 기간 가점(최대 3) + 평균 포인트 강도
    fn trend_line_strength(&self, line: &TrendLine) -> f64 {
        let mut strength = line.touches as f64 * 2.0;

        strength += (line.span_days() / 7.0).min(3.0);

        if !line.points.is_empty() {
            let point_sum: f64 = line.points.iter().map(|p| p.strength).sum();
            strength += point_sum / line.points.len() as f64;
        }

        strength
    }

    /// 추세선 쌍을 전수 평가해 품질 기준을 넘는 최고 점수 채널을 고릅니다.
    fn find_best_channel(
        &self,
        trend_lines: &[TrendLine],
        swing_points: &[SwingPoint],
        current_price: f64,
        now_ms: i64,
    ) -> Option<Channel> {
        let mut best_channel: Option<Channel> = None;
        let mut best_score = 0.0;

        for i in 0..trend_lines.len() {
            for j in i + 1..trend_lines.len() {
                let line1 = &trend_lines[i];
                let line2 = &trend_lines[j];

                if !self.can_form_channel(line1, line2) {
                    continue;
                }

                let Some(mut channel) = self.create_channel(line1, line2, current_price, now_ms)
                else {
                    continue;
                };

                let score = self.score_channel(&mut channel, swing_points, now_ms);
                if score > best_score && channel.quality >= self.config.quality_threshold {
                    best_score = score;
                    best_channel = Some(channel);
                }
            }
        }

        best_channel
    }

    fn can_form_channel(&self, line1: &TrendLine, line2: &TrendLine) -> bool {
        if line1.line_type == line2.line_type {
            return false;
        }

        let max_slope = line1.slope.abs().max(line2.slope.abs());
        if max_slope == 0.0 {
            return true;
        }

        (line1.slope - line2.slope).abs() <= self.config.parallel_tolerance * max_slope
    }

    fn create_channel(
        &self,
        line1: &TrendLine,
        line2: &TrendLine,
        current_price: f64,
        now_ms: i64,
    ) -> Option<Channel> {
        let price1 = line1.price_at(now_ms);
        let price2 = line2.price_at(now_ms);

        let (upper_line, lower_line) = if price1 > price2 {
            (line1.clone(), line2.clone())
        } else {
            (line2.clone(), line1.clone())
        };

        if current_price <= 0.0 {
            return None;
        }
        let width = (price1 - price2).abs() / current_price;
        if width < self.config.min_channel_width || width > self.config.max_channel_width {
            return None;
        }

        let middle_line = TrendLine {
            line_type: TrendLineType::Support,
            points: Vec::new(),
            slope: (upper_line.slope + lower_line.slope) / 2.0,
            intercept: (upper_line.intercept + lower_line.intercept) / 2.0,
            strength: (upper_line.strength + lower_line.strength) / 2.0,
            touches: 0,
            last_touch: upper_line.last_touch.max(lower_line.last_touch),
            broken: false,
            break_time: 0,
        };

        // 캔들 시각 기준 기울기를 하루 단위 가격 변화로 환산해 방향 분류
        let slope_per_day = upper_line.slope * 24.0 * 3600.0 * 1000.0;
        let direction = if slope_per_day > 0.001 {
            TrendDirection::Up
        } else if slope_per_day < -0.001 {
            TrendDirection::Down
        } else {
            TrendDirection::Flat
        };

        let first_time = upper_line
            .points
            .first()
            .map(|p| p.time)
            .unwrap_or(now_ms)
            .min(lower_line.points.first().map(|p| p.time).unwrap_or(now_ms));
        let age_ms = now_ms - first_time;

        Some(Channel {
            upper_line,
            lower_line,
            middle_line,
            width,
            quality: 0.0,
            direction,
            age_ms,
        })
    }

    /// 채널 점수를 매기고 품질(점수/10, 상한 1)을 함께 기록합니다.
    fn score_channel(&self, channel: &mut Channel, _swing_points: &[SwingPoint], _now_ms: i64) -> f64 {
        let mut score = (channel.upper_line.strength + channel.lower_line.strength) / 2.0;

        let total_hits = channel.upper_line.touches + channel.lower_line.touches;
        score += total_hits as f64 * 0.5;

        let age_days = channel.age_ms as f64 / (24.0 * 3600.0 * 1000.0);
        if age_days <= 7.0 {
            score += 2.0;
        } else if age_days <= 30.0 {
            score += 1.0;
        }

        if channel.width >= 0.03 && channel.width <= 0.08 {
            score += 1.0;
        }

        channel.quality = (score / 10.0).min(1.0);
        score
    }

    fn price_position(
        &self,
        current_price: f64,
        channel: &Channel,
        now_ms: i64,
    ) -> (ChannelPricePosition, f64) {
        let upper_price = channel.upper_line.price_at(now_ms);
        let lower_price = channel.lower_line.price_at(now_ms);

        let range = upper_price - lower_price;
        let ratio = if range > 0.0 {
            ((current_price - lower_price) / range).clamp(0.0, 1.0)
        } else {
            0.5
        };

        let position = if current_price > upper_price * 1.01 {
            ChannelPricePosition::BreakUp
        } else if current_price < lower_price * 0.99 {
            ChannelPricePosition::BreakDown
        } else if ratio > 0.8 {
            ChannelPricePosition::Upper
        } else if ratio < 0.2 {
            ChannelPricePosition::Lower
        } else {
            ChannelPricePosition::Middle
        };

        (position, ratio)
    }

    fn describe(&self, channel: &Channel, position: ChannelPricePosition, ratio: f64) -> String {
        let direction = match channel.direction {
            TrendDirection::Up => "ascending channel",
            TrendDirection::Down => "descending channel",
            TrendDirection::Flat => "horizontal channel",
        };

        let location = match position {
            ChannelPricePosition::Upper => "price near upper rail resistance",
            ChannelPricePosition::Lower => "price near lower rail support",
            ChannelPricePosition::Middle => "price in mid-channel",
            ChannelPricePosition::BreakUp => "price breaking above the channel",
            ChannelPricePosition::BreakDown => "price breaking below the channel",
        };

        format!(
            "{}, quality {:.1}, {} ({:.1}%)",
            direction,
            channel.quality * 10.0,
            location,
            ratio * 100.0
        )
    }
}

impl Default for ChannelAnalyzer {
    fn default() -> ChannelAnalyzer {
        ChannelAnalyzer::new()
    }
}
