use crate::model::{Candle, SignalAction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

/// FVG 분석 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FvgConfig {
    /// 최소 갭 비율 (0~1)
    pub min_gap_percent: f64,
    /// 최대 갭 비율 (0~1)
    pub max_gap_percent: f64,
    /// 거래량 확인 배수
    pub min_volume_ratio: f64,
    /// 최대 수명 (캔들 수)
    pub max_age: usize,
    /// 비활성화 터치 수
    pub max_touch_count: usize,
    /// 채움 완료 임계값 (0~1)
    pub fill_threshold: f64,
    /// 반응 검증 사용 여부
    pub enable_validation: bool,
    /// 중간 캔들 거래량 확인 요구 여부
    pub require_volume_confirmation: bool,
}

impl Default for FvgConfig {
    fn default() -> FvgConfig {
        FvgConfig {
            min_gap_percent: 0.002,
            max_gap_percent: 0.05,
            min_volume_ratio: 1.2,
            max_age: 50,
            max_touch_count: 3,
            fill_threshold: 0.8,
            enable_validation: true,
            require_volume_confirmation: false,
        }
    }
}

impl FvgConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_gap_percent >= self.max_gap_percent {
            return Err("갭 비율 범위가 올바르지 않습니다".to_string());
        }
        if !(0.0..=1.0).contains(&self.fill_threshold) {
            return Err("fill_threshold는 0~1 범위여야 합니다".to_string());
        }
        Ok(())
    }
}

/// FVG 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FvgType {
    Bullish,
    Bearish,
}

/// FVG 형성 맥락 (±5캔들 추세 부호로 분류)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationType {
    Breakout,
    Pullback,
    Continuation,
    Reversal,
}

/// FVG 품질
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FvgQuality {
    High,
    Medium,
    Low,
}

/// FVG 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FvgStatus {
    Fresh,
    Tested,
    PartialFill,
    Filled,
    Expired,
}

/// 형성에 관여한 캔들 요약
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSnapshot {
    pub index: usize,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: i64,
}

impl CandleSnapshot {
    fn of<C: Candle>(candle: &C, index: usize) -> CandleSnapshot {
        CandleSnapshot {
            index,
            open: candle.open_price(),
            high: candle.high_price(),
            low: candle.low_price(),
            close: candle.close_price(),
            volume: candle.volume(),
            timestamp: candle.open_time(),
        }
    }
}

/// FVG 기원 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FvgOrigin {
    /// 중간 캔들 인덱스
    pub kline_index: usize,
    pub previous_candle: CandleSnapshot,
    pub current_candle: CandleSnapshot,
    pub next_candle: CandleSnapshot,
    /// 형성 구간의 이동 비율 [0,100]
    pub impulsive_move: f64,
    pub formation_type: FormationType,
}

/// FVG 거래량 맥락
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FvgVolumeContext {
    pub formation_volume: f64,
    pub average_volume: f64,
    pub volume_ratio: f64,
    pub touch_volumes: Vec<f64>,
    pub fill_volume: f64,
    pub volume_confirmation: bool,
}

/// FVG 검증 정보
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FvgValidation {
    pub has_reaction: bool,
    pub reaction_strength: f64,
    /// 100 - fill_progress (+반응 가점)
    pub holding_strength: f64,
    pub reversal_sign: bool,
    pub volume_validation: bool,
    pub time_validation: bool,
}

/// 공정 가치 갭
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairValueGap {
    pub id: String,
    pub fvg_type: FvgType,
    pub upper_bound: f64,
    pub lower_bound: f64,
    pub center_price: f64,
    pub width: f64,
    /// 폭 비율 [0,100]
    pub width_percent: f64,
    pub origin: FvgOrigin,
    /// 강도 [0,100]
    pub strength: f64,
    pub quality: FvgQuality,
    pub status: FvgStatus,
    pub touch_count: usize,
    /// 최대 관측 침투율 [0,100]
    pub fill_progress: f64,
    pub last_touch: i64,
    pub creation_time: i64,
    pub fill_time: i64,
    pub active: bool,
    pub filled: bool,
    pub partial_fill: bool,
    pub volume_context: FvgVolumeContext,
    pub validation: Option<FvgValidation>,
}

impl FairValueGap {
    /// 가격이 갭 내부에 있는지 확인
    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower_bound && price <= self.upper_bound
    }

    fn touched_by<C: Candle>(&self, candle: &C) -> bool {
        !(candle.high_price() < self.lower_bound || candle.low_price() > self.upper_bound)
    }
}

/// FVG 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FvgStatistics {
    pub total_bullish: usize,
    pub total_bearish: usize,
    pub active_bullish: usize,
    pub active_bearish: usize,
    pub avg_width_percent: f64,
    pub avg_strength: f64,
    /// 채움 완료 비율 [0,100]
    pub fill_rate: f64,
    /// 반응 발생 비율 [0,100]
    pub success_rate: f64,
    /// 평균 채움 시간 (시간)
    pub avg_fill_time_hours: f64,
    pub quality_distribution: HashMap<String, usize>,
}

/// FVG 분석 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FvgData {
    pub bullish_fvgs: Vec<FairValueGap>,
    pub bearish_fvgs: Vec<FairValueGap>,
    pub active_fvgs: Vec<FairValueGap>,
    pub statistics: FvgStatistics,
    pub last_analysis: i64,
}

impl FvgData {
    /// id로 FVG를 찾습니다 (신호의 fvg_id 역참조용).
    pub fn fvg_by_id(&self, id: &str) -> Option<&FairValueGap> {
        self.bullish_fvgs
            .iter()
            .chain(self.bearish_fvgs.iter())
            .find(|g| g.id == id)
    }
}

/// FVG 신호 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FvgSignalKind {
    Reaction,
    FillEntry,
    Rejection,
    Breakthrough,
}

/// FVG 신호 (갭은 id로 참조)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FvgSignal {
    pub kind: FvgSignalKind,
    pub fvg_id: String,
    pub fvg_type: FvgType,
    pub current_price: f64,
    pub action: SignalAction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
    pub confidence: f64,
    pub strength: f64,
    pub description: String,
    pub timestamp: i64,
}

/// 공정 가치 갭 분석기
#[derive(Debug, Clone)]
pub struct FvgAnalyzer {
    config: FvgConfig,
}

impl Display for FvgAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FvgAnalyzer {{ gap: {}~{}, fill: {} }}",
            self.config.min_gap_percent, self.config.max_gap_percent, self.config.fill_threshold
        )
    }
}

impl FvgAnalyzer {
    pub fn new() -> FvgAnalyzer {
        FvgAnalyzer {
            config: FvgConfig::default(),
        }
    }

    pub fn with_config(config: FvgConfig) -> FvgAnalyzer {
        FvgAnalyzer { config }
    }

    pub fn config(&self) -> &FvgConfig {
        &self.config
    }

    /// 윈도우 전체에서 FVG를 탐지하고 상태를 갱신합니다.
    pub fn analyze<C: Candle>(&self, candles: &[C]) -> Option<FvgData> {
        if candles.len() < 3 {
            return None;
        }
        let last_analysis = candles[candles.len() - 1].close_time();

        let mut all_fvgs = Vec::new();
        for i in 1..candles.len() - 1 {
            if let Some(gap) = self.identify_fvg(candles, i, FvgType::Bullish) {
                all_fvgs.push(gap);
            }
            if let Some(gap) = self.identify_fvg(candles, i, FvgType::Bearish) {
                all_fvgs.push(gap);
            }
        }

        self.update_statuses(&mut all_fvgs, candles);

        for gap in &mut all_fvgs {
            self.calculate_strength(gap, candles);
            self.assess_quality(gap);
            if self.config.enable_validation {
                gap.validation = Some(self.validate(gap, candles));
            }
        }

        let active_fvgs: Vec<FairValueGap> = all_fvgs
            .iter()
            .filter(|g| g.active && !g.filled)
            .cloned()
            .collect();

        let mut bullish_fvgs = Vec::new();
        let mut bearish_fvgs = Vec::new();
        for gap in all_fvgs {
            match gap.fvg_type {
                FvgType::Bullish => bullish_fvgs.push(gap),
                FvgType::Bearish => bearish_fvgs.push(gap),
            }
        }

        let statistics = self.calculate_statistics(&bullish_fvgs, &bearish_fvgs, &active_fvgs);

        Some(FvgData {
            bullish_fvgs,
            bearish_fvgs,
            active_fvgs,
            statistics,
            last_analysis,
        })
    }

    /// 3캔들 갭 조건 검사: 상승형은 prev.high < next.low, 하락형은 그 반대
    fn identify_fvg<C: Candle>(
        &self,
        candles: &[C],
        index: usize,
        fvg_type: FvgType,
    ) -> Option<FairValueGap> {
        let prev = &candles[index - 1];
        let curr = &candles[index];
        let next = &candles[index + 1];

        let (gap_low, gap_high, reference) = match fvg_type {
            FvgType::Bullish => {
                if prev.high_price() >= next.low_price() {
                    return None;
                }
                (prev.high_price(), next.low_price(), prev.high_price())
            }
            FvgType::Bearish => {
                if prev.low_price() <= next.high_price() {
                    return None;
                }
                (next.high_price(), prev.low_price(), prev.low_price())
            }
        };

        let gap_width = gap_high - gap_low;
        let gap_width_percent = gap_width / reference * 100.0;

        if gap_width_percent < self.config.min_gap_percent * 100.0
            || gap_width_percent > self.config.max_gap_percent * 100.0
        {
            return None;
        }

        if self.config.require_volume_confirmation {
            let avg = average_volume(candles, index.saturating_sub(10), index);
            if curr.volume() < avg * self.config.min_volume_ratio {
                return None;
            }
        }

        let impulsive_move = match fvg_type {
            FvgType::Bullish => {
                (next.close_price() - prev.close_price()) / prev.close_price() * 100.0
            }
            FvgType::Bearish => {
                (prev.close_price() - next.close_price()) / prev.close_price() * 100.0
            }
        };

        let prefix = match fvg_type {
            FvgType::Bullish => "bull_fvg",
            FvgType::Bearish => "bear_fvg",
        };

        Some(FairValueGap {
            id: format!("{}_{}", prefix, index),
            fvg_type,
            upper_bound: gap_high,
            lower_bound: gap_low,
            center_price: (gap_high + gap_low) / 2.0,
            width: gap_width,
            width_percent: gap_width_percent,
            origin: FvgOrigin {
                kline_index: index,
                previous_candle: CandleSnapshot::of(prev, index - 1),
                current_candle: CandleSnapshot::of(curr, index),
                next_candle: CandleSnapshot::of(next, index + 1),
                impulsive_move,
                formation_type: self.formation_type(candles, index, fvg_type),
            },
            strength: 0.0,
            quality: FvgQuality::Low,
            status: FvgStatus::Fresh,
            touch_count: 0,
            fill_progress: 0.0,
            last_touch: 0,
            creation_time: curr.open_time(),
            fill_time: 0,
            active: true,
            filled: false,
            partial_fill: false,
            volume_context: self.volume_context(candles, index),
            validation: None,
        })
    }

    /// 형성 전후 ±5캔들의 추세 부호로 형성 유형을 분류합니다.
    fn formation_type<C: Candle>(
        &self,
        candles: &[C],
        index: usize,
        fvg_type: FvgType,
    ) -> FormationType {
        if index < 5 || index + 5 >= candles.len() {
            return FormationType::Continuation;
        }

        let pre_trend = segment_trend(candles, index - 5, index - 1);
        let post_trend = segment_trend(candles, index + 1, index + 5);

        match fvg_type {
            FvgType::Bullish => {
                if pre_trend > 0.01 && post_trend > 0.01 {
                    FormationType::Continuation
                } else if pre_trend < -0.01 && post_trend > 0.01 {
                    FormationType::Reversal
                } else if pre_trend > 0.01 && post_trend < -0.01 {
                    FormationType::Pullback
                } else {
                    FormationType::Breakout
                }
            }
            FvgType::Bearish => {
                if pre_trend < -0.01 && post_trend < -0.01 {
                    FormationType::Continuation
                } else if pre_trend > 0.01 && post_trend < -0.01 {
                    FormationType::Reversal
                } else if pre_trend < -0.01 && post_trend > 0.01 {
                    FormationType::Pullback
                } else {
                    FormationType::Breakout
                }
            }
        }
    }

    fn volume_context<C: Candle>(&self, candles: &[C], index: usize) -> FvgVolumeContext {
        if index < 10 || index >= candles.len() {
            return FvgVolumeContext::default();
        }

        let formation_volume = candles[index].volume();
        let average = average_volume(candles, index - 10, index);
        let ratio = if average > 0.0 {
            formation_volume / average
        } else {
            1.0
        };

        FvgVolumeContext {
            formation_volume,
            average_volume: average,
            volume_ratio: ratio,
            touch_volumes: Vec::new(),
            fill_volume: 0.0,
            volume_confirmation: ratio >= self.config.min_volume_ratio,
        }
    }

    /// 윈도우 말단 기준으로 수명/채움/터치 상태를 갱신합니다.
    fn update_statuses<C: Candle>(&self, gaps: &mut [FairValueGap], candles: &[C]) {
        let Some(last) = candles.last() else {
            return;
        };
        let current_time = last.open_time();
        let current_price = last.close_price();

        for gap in gaps.iter_mut() {
            let age = candles.len() - gap.origin.kline_index - 1;
            if age > self.config.max_age {
                gap.status = FvgStatus::Expired;
                gap.active = false;
                continue;
            }

            let fill_progress = self.fill_progress(gap, candles);
            gap.fill_progress = fill_progress;

            if fill_progress >= self.config.fill_threshold * 100.0 {
                gap.status = FvgStatus::Filled;
                gap.filled = true;
                gap.active = false;
                gap.fill_time = current_time;
            } else if fill_progress > 20.0 {
                gap.status = FvgStatus::PartialFill;
                gap.partial_fill = true;
            }

            let touch_count = self.count_touches(gap, candles);
            gap.touch_count = touch_count;

            if touch_count > self.config.max_touch_count {
                gap.active = false;
            } else if touch_count > 0 && !gap.filled && !gap.partial_fill {
                gap.status = FvgStatus::Tested;
                gap.last_touch = current_time;
            }

            if gap.contains(current_price) {
                gap.last_touch = current_time;
            }
        }
    }

    /// 형성 이후 최대 침투 깊이를 갭 폭으로 정규화합니다.
    ///
    /// 형성 3캔들의 마지막 캔들은 갭 경계 자체를 정의하므로 제외합니다.
    fn fill_progress<C: Candle>(&self, gap: &FairValueGap, candles: &[C]) -> f64 {
        let start = gap.origin.kline_index + 2;
        if start >= candles.len() || gap.width <= 0.0 {
            return 0.0;
        }

        let mut max_penetration: f64 = 0.0;
        for candle in &candles[start..] {
            let penetration = match gap.fvg_type {
                FvgType::Bullish => {
                    if candle.low_price() <= gap.upper_bound {
                        gap.upper_bound - candle.low_price()
                    } else {
                        0.0
                    }
                }
                FvgType::Bearish => {
                    if candle.high_price() >= gap.lower_bound {
                        candle.high_price() - gap.lower_bound
                    } else {
                        0.0
                    }
                }
            };
            max_penetration = max_penetration.max(penetration);
        }

        (max_penetration / gap.width * 100.0).min(100.0)
    }

    fn count_touches<C: Candle>(&self, gap: &mut FairValueGap, candles: &[C]) -> usize {
        let start = gap.origin.kline_index + 2;
        if start >= candles.len() {
            return 0;
        }

        let mut touches = 0;
        for candle in &candles[start..] {
            if gap.touched_by(candle) {
                touches += 1;
                gap.volume_context.touch_volumes.push(candle.volume());
            }
        }

        touches
    }

    /// 강도: 폭 30 + 임펄스 25 + 거래량 20 + 형성 유형 + 미채움 기간 - 터치 벌점
    fn calculate_strength<C: Candle>(&self, gap: &mut FairValueGap, candles: &[C]) {
        let mut strength = (gap.width_percent * 20.0).min(30.0);

        strength += (gap.origin.impulsive_move.abs() * 10.0).min(25.0);

        if gap.volume_context.volume_ratio > 1.0 {
            strength += ((gap.volume_context.volume_ratio - 1.0) * 15.0).min(20.0);
        }

        strength += match gap.origin.formation_type {
            FormationType::Breakout => 15.0,
            FormationType::Reversal => 12.0,
            FormationType::Continuation => 8.0,
            FormationType::Pullback => 5.0,
        };

        let age = candles.len() - gap.origin.kline_index - 1;
        if age > 10 && !gap.filled {
            strength += ((age as f64 - 10.0) * 0.5).min(10.0);
        }

        strength -= gap.touch_count as f64 * 3.0;

        gap.strength = strength.clamp(0.0, 100.0);
    }

    fn assess_quality(&self, gap: &mut FairValueGap) {
        let mut score = gap.strength;

        if gap.fill_progress > 50.0 {
            score *= 0.7;
        } else if gap.fill_progress < 20.0 {
            score += 10.0;
        }

        if gap.volume_context.volume_confirmation {
            score += 5.0;
        }

        score += match gap.origin.formation_type {
            FormationType::Breakout | FormationType::Reversal => 8.0,
            FormationType::Continuation => 5.0,
            FormationType::Pullback => 0.0,
        };

        gap.quality = if score >= 80.0 {
            FvgQuality::High
        } else if score >= 60.0 {
            FvgQuality::Medium
        } else {
            FvgQuality::Low
        };
    }

    /// 터치 후 3캔들 반응, 유지 강도, 반전 징후를 검증합니다.
    fn validate<C: Candle>(&self, gap: &FairValueGap, candles: &[C]) -> FvgValidation {
        let mut validation = FvgValidation {
            volume_validation: gap.volume_context.volume_confirmation,
            ..FvgValidation::default()
        };

        if gap.origin.kline_index + 5 >= candles.len() {
            return validation;
        }

        let reaction = self.reaction_strength(gap, candles);
        validation.has_reaction = reaction > 0.01;
        validation.reaction_strength = reaction;

        validation.holding_strength = self.holding_strength(gap, reaction);
        validation.reversal_sign = self.reversal_sign(gap, candles);

        let age = candles.len() - gap.origin.kline_index - 1;
        validation.time_validation = age >= 3 && age <= self.config.max_age;

        validation
    }

    /// 갭 터치 후 3캔들 내 최대 반응 비율
    fn reaction_strength<C: Candle>(&self, gap: &FairValueGap, candles: &[C]) -> f64 {
        let start = gap.origin.kline_index + 2;
        let mut max_reaction: f64 = 0.0;

        for i in start..candles.len().min(start + 10) {
            if !gap.touched_by(&candles[i]) || i + 2 >= candles.len() {
                continue;
            }

            for j in 1..=3 {
                if i + j >= candles.len() {
                    break;
                }
                let next = &candles[i + j];
                let reaction = match gap.fvg_type {
                    FvgType::Bullish => {
                        (next.close_price() - candles[i].low_price()) / candles[i].low_price()
                    }
                    FvgType::Bearish => {
                        (candles[i].high_price() - next.close_price()) / candles[i].high_price()
                    }
                };
                max_reaction = max_reaction.max(reaction);
            }
        }

        max_reaction
    }

    fn holding_strength(&self, gap: &FairValueGap, reaction: f64) -> f64 {
        if gap.touch_count == 0 {
            return 100.0;
        }

        let mut holding = 100.0 - gap.fill_progress;
        if reaction > 0.01 {
            holding += reaction * 50.0;
        }
        holding.min(100.0)
    }

    /// 최근 추세가 갭 방향과 반대로 움직이는지 확인
    fn reversal_sign<C: Candle>(&self, gap: &FairValueGap, candles: &[C]) -> bool {
        if gap.touch_count < 2 || gap.origin.kline_index + 5 >= candles.len() {
            return false;
        }

        let recent_start = (candles.len() - 5).max(gap.origin.kline_index + 1);
        let trend = segment_trend(candles, recent_start, candles.len() - 1);

        match gap.fvg_type {
            FvgType::Bullish => trend < -0.02,
            FvgType::Bearish => trend > 0.02,
        }
    }

    fn calculate_statistics(
        &self,
        bullish: &[FairValueGap],
        bearish: &[FairValueGap],
        active: &[FairValueGap],
    ) -> FvgStatistics {
        let mut stats = FvgStatistics {
            total_bullish: bullish.len(),
            total_bearish: bearish.len(),
            ..FvgStatistics::default()
        };

        for gap in active {
            match gap.fvg_type {
                FvgType::Bullish => stats.active_bullish += 1,
                FvgType::Bearish => stats.active_bearish += 1,
            }
        }

        let all: Vec<&FairValueGap> = bullish.iter().chain(bearish.iter()).collect();
        if all.is_empty() {
            return stats;
        }

        let mut filled = 0usize;
        let mut success = 0usize;
        let mut total_fill_hours = 0.0;

        for gap in &all {
            stats.avg_width_percent += gap.width_percent;
            stats.avg_strength += gap.strength;

            let quality_key = match gap.quality {
                FvgQuality::High => "high",
                FvgQuality::Medium => "medium",
                FvgQuality::Low => "low",
            };
            *stats
                .quality_distribution
                .entry(quality_key.to_string())
                .or_insert(0) += 1;

            if gap.filled {
                filled += 1;
                if gap.fill_time > gap.creation_time {
                    total_fill_hours +=
                        (gap.fill_time - gap.creation_time) as f64 / (1000.0 * 3600.0);
                }
            }

            if gap
                .validation
                .as_ref()
                .map(|v| v.has_reaction)
                .unwrap_or(false)
            {
                success += 1;
            }
        }

        let count = all.len() as f64;
        stats.avg_width_percent /= count;
        stats.avg_strength /= count;
        stats.fill_rate = filled as f64 / count * 100.0;
        stats.success_rate = success as f64 / count * 100.0;
        if filled > 0 {
            stats.avg_fill_time_hours = total_fill_hours / filled as f64;
        }

        stats
    }

    /// 활성 FVG와 현재 가격으로 신호를 생성합니다 (신뢰도 내림차순).
    pub fn generate_signals(
        &self,
        data: &FvgData,
        current_price: f64,
        now_ms: i64,
    ) -> Vec<FvgSignal> {
        let mut signals = Vec::new();

        for gap in &data.active_fvgs {
            if let Some(signal) = self.gap_signal(gap, current_price, now_ms) {
                signals.push(signal);
            }
        }

        signals.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        signals
    }

    fn gap_signal(
        &self,
        gap: &FairValueGap,
        current_price: f64,
        now_ms: i64,
    ) -> Option<FvgSignal> {
        let distance = distance_to_gap(gap, current_price);

        if gap.contains(current_price) {
            return self.reaction_signal(gap, current_price, now_ms);
        }
        if distance < 0.01 {
            if let Some(signal) = self.fill_entry_signal(gap, current_price, now_ms, distance) {
                return Some(signal);
            }
        }
        if let Some(signal) = self.rejection_signal(gap, current_price, now_ms, distance) {
            return Some(signal);
        }

        self.breakthrough_signal(gap, current_price, now_ms)
    }

    /// 갭 내부 반응 신호
    fn reaction_signal(
        &self,
        gap: &FairValueGap,
        current_price: f64,
        now_ms: i64,
    ) -> Option<FvgSignal> {
        let (action, entry, stop_loss, take_profit, description) = match gap.fvg_type {
            FvgType::Bullish => (
                SignalAction::Buy,
                current_price,
                gap.lower_bound * 0.995,
                current_price + gap.width * 2.0,
                format!(
                    "inside bullish FVG {:.2}-{:.2}, expecting upward reaction",
                    gap.lower_bound, gap.upper_bound
                ),
            ),
            FvgType::Bearish => (
                SignalAction::Sell,
                current_price,
                gap.upper_bound * 1.005,
                current_price - gap.width * 2.0,
                format!(
                    "inside bearish FVG {:.2}-{:.2}, expecting downward reaction",
                    gap.lower_bound, gap.upper_bound
                ),
            ),
        };

        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

        let mut confidence = gap.strength * 0.9;
        if gap.quality == FvgQuality::High {
            confidence += 10.0;
        }
        if gap.touch_count == 0 {
            confidence += 5.0;
        }
        if gap
            .validation
            .as_ref()
            .map(|v| v.volume_validation)
            .unwrap_or(false)
        {
            confidence += 5.0;
        }

        Some(FvgSignal {
            kind: FvgSignalKind::Reaction,
            fvg_id: gap.id.clone(),
            fvg_type: gap.fvg_type,
            current_price,
            action,
            entry,
            stop_loss,
            take_profit,
            risk_reward,
            confidence: confidence.min(100.0),
            strength: gap.strength,
            description,
            timestamp: now_ms,
        })
    }

    /// 갭 반대편에서 되돌림 진입을 기다리는 신호
    fn fill_entry_signal(
        &self,
        gap: &FairValueGap,
        current_price: f64,
        now_ms: i64,
        distance: f64,
    ) -> Option<FvgSignal> {
        let (action, entry, stop_loss, take_profit, description) = match gap.fvg_type {
            FvgType::Bullish => {
                if current_price <= gap.upper_bound {
                    return None;
                }
                (
                    SignalAction::Buy,
                    gap.center_price,
                    gap.lower_bound * 0.995,
                    current_price + gap.width * 1.5,
                    format!("waiting for pullback into bullish FVG {:.2}", gap.center_price),
                )
            }
            FvgType::Bearish => {
                if current_price >= gap.lower_bound {
                    return None;
                }
                (
                    SignalAction::Sell,
                    gap.center_price,
                    gap.upper_bound * 1.005,
                    current_price - gap.width * 1.5,
                    format!("waiting for rally into bearish FVG {:.2}", gap.center_price),
                )
            }
        };

        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

        let mut confidence = gap.strength * (1.0 - distance / 0.01) * 0.8;
        if gap.quality == FvgQuality::High {
            confidence += 8.0;
        }

        Some(FvgSignal {
            kind: FvgSignalKind::FillEntry,
            fvg_id: gap.id.clone(),
            fvg_type: gap.fvg_type,
            current_price,
            action,
            entry,
            stop_loss,
            take_profit,
            risk_reward,
            confidence: confidence.clamp(0.0, 100.0),
            strength: gap.strength,
            description,
            timestamp: now_ms,
        })
    }

    /// 강한 반응 이력이 있는 갭의 경계 근접(0.5%) 거부 신호
    fn rejection_signal(
        &self,
        gap: &FairValueGap,
        current_price: f64,
        now_ms: i64,
        distance: f64,
    ) -> Option<FvgSignal> {
        if gap.touch_count < 2 || gap.fill_progress > 30.0 {
            return None;
        }

        let validation = gap.validation.as_ref()?;
        if !validation.has_reaction || validation.reaction_strength < 0.02 {
            return None;
        }

        if distance >= 0.005 {
            return None;
        }

        let (action, entry, stop_loss, take_profit, description) = match gap.fvg_type {
            FvgType::Bullish => (
                SignalAction::Buy,
                gap.lower_bound,
                gap.lower_bound * 0.99,
                gap.upper_bound + gap.width,
                format!("bullish FVG {:.2} shows strong rejection", gap.lower_bound),
            ),
            FvgType::Bearish => (
                SignalAction::Sell,
                gap.upper_bound,
                gap.upper_bound * 1.01,
                gap.lower_bound - gap.width,
                format!("bearish FVG {:.2} shows strong rejection", gap.upper_bound),
            ),
        };

        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

        let confidence = gap.strength * 0.85 + validation.reaction_strength * 100.0;

        Some(FvgSignal {
            kind: FvgSignalKind::Rejection,
            fvg_id: gap.id.clone(),
            fvg_type: gap.fvg_type,
            current_price,
            action,
            entry,
            stop_loss,
            take_profit,
            risk_reward,
            confidence: confidence.min(100.0),
            strength: gap.strength,
            description,
            timestamp: now_ms,
        })
    }

    /// 가격이 갭을 반대 방향으로 통과한 돌파 신호
    fn breakthrough_signal(
        &self,
        gap: &FairValueGap,
        current_price: f64,
        now_ms: i64,
    ) -> Option<FvgSignal> {
        let (cleared, action, entry, stop_loss, take_profit, description) = match gap.fvg_type {
            FvgType::Bullish => (
                current_price < gap.lower_bound * 0.995,
                SignalAction::Sell,
                current_price,
                gap.upper_bound * 1.005,
                current_price - gap.width * 2.0,
                format!("price broke through bullish FVG {:.2}", gap.lower_bound),
            ),
            FvgType::Bearish => (
                current_price > gap.upper_bound * 1.005,
                SignalAction::Buy,
                current_price,
                gap.lower_bound * 0.995,
                current_price + gap.width * 2.0,
                format!("price broke through bearish FVG {:.2}", gap.upper_bound),
            ),
        };

        if !cleared || gap.fill_progress < 50.0 {
            return None;
        }

        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        let risk_reward = if risk > 0.0 { reward / risk } else { 0.0 };

        Some(FvgSignal {
            kind: FvgSignalKind::Breakthrough,
            fvg_id: gap.id.clone(),
            fvg_type: gap.fvg_type,
            current_price,
            action,
            entry,
            stop_loss,
            take_profit,
            risk_reward,
            confidence: (gap.strength * 0.6).min(100.0),
            strength: gap.strength,
            description,
            timestamp: now_ms,
        })
    }

    /// 강도순 상위 활성 FVG
    pub fn strongest_fvgs<'a>(&self, data: &'a FvgData, count: usize) -> Vec<&'a FairValueGap> {
        let mut fvgs: Vec<&FairValueGap> = data.active_fvgs.iter().collect();
        fvgs.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        fvgs.truncate(count);
        fvgs
    }

    /// 현재 가격에서 가까운 활성 FVG를 거리순으로 반환합니다.
    pub fn find_nearest_fvgs<'a>(
        &self,
        data: &'a FvgData,
        current_price: f64,
        max_distance: f64,
    ) -> Vec<&'a FairValueGap> {
        let mut fvgs: Vec<&FairValueGap> = data
            .active_fvgs
            .iter()
            .filter(|gap| distance_to_gap(gap, current_price) <= max_distance)
            .collect();

        fvgs.sort_by(|a, b| {
            distance_to_gap(a, current_price).total_cmp(&distance_to_gap(b, current_price))
        });
        fvgs
    }
}

impl Default for FvgAnalyzer {
    fn default() -> FvgAnalyzer {
        FvgAnalyzer::new()
    }
}

fn average_volume<C: Candle>(candles: &[C], start: usize, end: usize) -> f64 {
    let end = end.min(candles.len().saturating_sub(1));
    if start >= end {
        return 0.0;
    }
    let slice = &candles[start..=end];
    slice.iter().map(|c| c.volume()).sum::<f64>() / slice.len() as f64
}

/// 구간 종가 수익률
fn segment_trend<C: Candle>(candles: &[C], start: usize, end: usize) -> f64 {
    if start >= end || end >= candles.len() {
        return 0.0;
    }
    let start_price = candles[start].close_price();
    if start_price == 0.0 {
        return 0.0;
    }
    (candles[end].close_price() - start_price) / start_price
}

fn distance_to_gap(gap: &FairValueGap, current_price: f64) -> f64 {
    if gap.contains(current_price) {
        return 0.0;
    }

    if current_price > gap.upper_bound {
        (current_price - gap.upper_bound) / gap.upper_bound
    } else {
        (gap.lower_bound - current_price) / gap.lower_bound
    }
}
