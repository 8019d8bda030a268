use crate::analyzer::channel_analyzer::{ChannelAnalyzer, ChannelData};
use crate::analyzer::dow_analyzer::{DowAnalyzer, DowSignalKind, DowTheoryData};
use crate::analyzer::fibonacci_analyzer::{
    FibQuality, FibSignalKind, FibonacciAnalyzer, FibonacciData,
};
use crate::analyzer::fvg_analyzer::{FvgAnalyzer, FvgData, FvgSignalKind, FvgType};
use crate::analyzer::supply_demand_analyzer::{
    SdSignalKind, SupplyDemandAnalyzer, SupplyDemandData, ZoneType,
};
use crate::analyzer::volume_profile_analyzer::{VolumeProfile, VolumeProfileAnalyzer, VpSignalKind};
use crate::model::{Candle, CandleInterval, RiskLevel, SignalAction, TrendDirection};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;

/// 종합 분석 설정 (분석기 on/off, 가중치, 신호 융합 기준)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveConfig {
    pub enable_dow_theory: bool,
    pub enable_volume_profile: bool,
    pub enable_supply_demand: bool,
    pub enable_fvg: bool,
    pub enable_fibonacci: bool,
    pub weight_dow_theory: f64,
    pub weight_volume_profile: f64,
    pub weight_supply_demand: f64,
    pub weight_fvg: f64,
    pub weight_fibonacci: f64,
    /// 최종 신호 최소 신뢰도
    pub min_confidence: f64,
    /// 진입 신호 최소 손익비
    pub min_risk_reward: f64,
    /// 최종 신호 최대 개수
    pub max_signals: usize,
}

impl Default for ComprehensiveConfig {
    fn default() -> ComprehensiveConfig {
        ComprehensiveConfig {
            enable_dow_theory: true,
            enable_volume_profile: true,
            enable_supply_demand: true,
            enable_fvg: true,
            enable_fibonacci: true,
            weight_dow_theory: 0.25,
            weight_volume_profile: 0.2,
            weight_supply_demand: 0.2,
            weight_fvg: 0.15,
            weight_fibonacci: 0.2,
            min_confidence: 60.0,
            min_risk_reward: 1.5,
            max_signals: 6,
        }
    }
}

impl ComprehensiveConfig {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            self.weight_dow_theory,
            self.weight_volume_profile,
            self.weight_supply_demand,
            self.weight_fvg,
            self.weight_fibonacci,
        ];
        if weights.iter().any(|w| *w < 0.0) {
            return Err("분석기 가중치는 음수일 수 없습니다".to_string());
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err("분석기 가중치 합은 양수여야 합니다".to_string());
        }
        if self.max_signals == 0 {
            return Err("max_signals는 0일 수 없습니다".to_string());
        }
        if self.min_risk_reward <= 0.0 {
            return Err("min_risk_reward는 양수여야 합니다".to_string());
        }
        Ok(())
    }
}

/// 신호를 만든 분석기
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerSource {
    DowTheory,
    VolumeProfile,
    SupplyDemand,
    Fvg,
    Fibonacci,
}

impl Display for AnalyzerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AnalyzerSource::DowTheory => "dow_theory",
            AnalyzerSource::VolumeProfile => "volume_profile",
            AnalyzerSource::SupplyDemand => "supply_demand",
            AnalyzerSource::Fvg => "fvg",
            AnalyzerSource::Fibonacci => "fibonacci",
        };
        f.write_str(name)
    }
}

/// 통합 신호 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedSignalType {
    TrendFollowing,
    Reversal,
    Breakout,
    Support,
    Resistance,
    MeanReversion,
}

/// 신호 우선순위
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPriority {
    High,
    Medium,
    Low,
}

/// 신호 출처 한 건
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSource {
    pub source: AnalyzerSource,
    pub weight: f64,
    pub confidence: f64,
    pub details: String,
}

/// 융합 후 통합 신호
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedSignal {
    pub id: String,
    pub signal_type: UnifiedSignalType,
    pub action: SignalAction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward: f64,
    /// 가중 평균 + 다중 출처 가점 [0,100]
    pub confidence: f64,
    pub strength: f64,
    pub sources: Vec<SignalSource>,
    pub description: String,
    pub timeframe: CandleInterval,
    pub priority: SignalPriority,
    pub timestamp: i64,
}

/// 관건 가격 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLevelType {
    Support,
    Resistance,
    Poc,
    Vah,
    Val,
}

/// 관건 가격의 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLevelSource {
    SupplyZone,
    DemandZone,
    VpPoc,
    VpVah,
    VpVal,
    BullishFvg,
    BearishFvg,
    FibGoldenPocket,
    FibRetracement,
    FibCluster,
}

/// 관건 가격
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyLevel {
    pub price: f64,
    pub level_type: KeyLevelType,
    pub strength: f64,
    pub source: KeyLevelSource,
    pub description: String,
}

/// 가치 영역 대비 현재 가격 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueAreaPosition {
    Above,
    Inside,
    Below,
}

/// 볼륨 프로파일 요약
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpSummary {
    pub poc: f64,
    pub vah: f64,
    pub val: f64,
    pub concentration: f64,
    pub current_position: ValueAreaPosition,
}

/// 시장 국면
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPhase {
    Accumulation,
    Markup,
    Distribution,
    Markdown,
    Sideways,
}

/// 시장 구조 요약
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStructure {
    pub trend_direction: TrendDirection,
    pub trend_strength: f64,
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
    pub key_levels: Vec<KeyLevel>,
    pub volume_profile: Option<VpSummary>,
    pub market_phase: MarketPhase,
    /// 100 - 추세 일치도
    pub volatility: f64,
}

/// 권장 보유 기간
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    Short,
    Medium,
    Long,
}

/// 리스크 평가
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub trend_risk: RiskLevel,
    pub volatility_risk: RiskLevel,
    pub liquidity_risk: RiskLevel,
    /// 권장 계좌 리스크 비율 [0,1]
    pub recommended_risk: f64,
    /// 최대 포지션 비율 [0,1]
    pub max_position_fraction: f64,
    pub suggested_timeframe: TimeHorizon,
    pub risk_factors: Vec<String>,
}

/// 트레이딩 권고
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingAdvice {
    pub overall_action: SignalAction,
    pub confidence: f64,
    pub reasoning_points: Vec<String>,
    pub entry_strategy: String,
    pub exit_strategy: String,
    pub risk_management: String,
    pub alternative_scenarios: Vec<String>,
    pub time_horizon: TimeHorizon,
}

/// 종합 분석 결과 번들
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveResult {
    pub symbol: String,
    pub timestamp: i64,
    pub current_price: f64,
    pub dow_theory: Option<DowTheoryData>,
    pub channel_analysis: Option<ChannelData>,
    pub volume_profile: Option<VolumeProfile>,
    pub supply_demand: Option<SupplyDemandData>,
    pub fair_value_gaps: Option<FvgData>,
    pub fibonacci: Option<FibonacciData>,
    pub unified_signals: Vec<UnifiedSignal>,
    pub market_structure: MarketStructure,
    pub risk_assessment: RiskAssessment,
    pub trading_advice: TradingAdvice,
}

/// 종합 분석기
///
/// 개별 분석기를 실행하고 분석기별 신호를 통합 신호로 융합한 뒤
/// 시장 구조 요약, 리스크 평가, 트레이딩 권고를 생성합니다.
pub struct ComprehensiveAnalyzer {
    dow_analyzer: DowAnalyzer,
    channel_analyzer: ChannelAnalyzer,
    vp_analyzer: VolumeProfileAnalyzer,
    sd_analyzer: SupplyDemandAnalyzer,
    fvg_analyzer: FvgAnalyzer,
    fibonacci_analyzer: FibonacciAnalyzer,
    config: ComprehensiveConfig,
}

impl ComprehensiveAnalyzer {
    pub fn new() -> ComprehensiveAnalyzer {
        ComprehensiveAnalyzer {
            dow_analyzer: DowAnalyzer::new(),
            channel_analyzer: ChannelAnalyzer::new(),
            vp_analyzer: VolumeProfileAnalyzer::new(),
            sd_analyzer: SupplyDemandAnalyzer::new(),
            fvg_analyzer: FvgAnalyzer::new(),
            fibonacci_analyzer: FibonacciAnalyzer::new(),
            config: ComprehensiveConfig::default(),
        }
    }

    /// 개별 분석기와 융합 설정을 모두 지정해 생성합니다.
    pub fn with_analyzers(
        dow_analyzer: DowAnalyzer,
        channel_analyzer: ChannelAnalyzer,
        vp_analyzer: VolumeProfileAnalyzer,
        sd_analyzer: SupplyDemandAnalyzer,
        fvg_analyzer: FvgAnalyzer,
        fibonacci_analyzer: FibonacciAnalyzer,
        config: ComprehensiveConfig,
    ) -> ComprehensiveAnalyzer {
        ComprehensiveAnalyzer {
            dow_analyzer,
            channel_analyzer,
            vp_analyzer,
            sd_analyzer,
            fvg_analyzer,
            fibonacci_analyzer,
            config,
        }
    }

    pub fn with_config(config: ComprehensiveConfig) -> ComprehensiveAnalyzer {
        ComprehensiveAnalyzer {
            config,
            ..ComprehensiveAnalyzer::new()
        }
    }

    pub fn config(&self) -> &ComprehensiveConfig {
        &self.config
    }

    /// 새 설정으로 교체합니다 (유효성 검사 후 원자적 대체).
    pub fn set_config(&mut self, config: ComprehensiveConfig) -> Result<()> {
        if let Err(message) = config.validate() {
            bail!("설정 유효성 검사 실패: {}", message);
        }
        self.config = config;
        Ok(())
    }

    /// 심볼 하나에 대한 종합 분석을 수행합니다.
    ///
    /// # Arguments
    /// * `symbol` - 심볼
    /// * `short` - 단기 윈도우 (기본 3m)
    /// * `long` - 장기 윈도우 (기본 4h)
    /// * `interval` - 장기 윈도우의 주기 (신호 타임프레임 표기)
    pub fn analyze<C: Candle>(
        &self,
        symbol: &str,
        short: &[C],
        long: &[C],
        interval: CandleInterval,
    ) -> Result<ComprehensiveResult> {
        if short.is_empty() && long.is_empty() {
            bail!("{} 캔들 데이터가 없습니다", symbol);
        }

        let (current_price, timestamp) = long
            .last()
            .or_else(|| short.last())
            .map(|c| (c.close_price(), c.close_time()))
            .unwrap_or((0.0, 0));

        let dow_theory = if self.config.enable_dow_theory && long.len() > 20 {
            Some(self.dow_analyzer.analyze(short, long, current_price))
        } else {
            None
        };
        let channel_analysis = if self.config.enable_dow_theory && long.len() > 20 {
            Some(self.channel_analyzer.analyze(long, current_price))
        } else {
            None
        };
        let volume_profile = if self.config.enable_volume_profile && long.len() > 10 {
            self.vp_analyzer.analyze(long)
        } else {
            None
        };
        let supply_demand = if self.config.enable_supply_demand && long.len() > 15 {
            Some(self.sd_analyzer.analyze(long))
        } else {
            None
        };
        let fair_value_gaps = if self.config.enable_fvg && long.len() > 10 {
            self.fvg_analyzer.analyze(long)
        } else {
            None
        };
        let fibonacci = if self.config.enable_fibonacci && long.len() > 15 {
            Some(self.fibonacci_analyzer.analyze(long))
        } else {
            None
        };

        let mut result = ComprehensiveResult {
            symbol: symbol.to_string(),
            timestamp,
            current_price,
            dow_theory,
            channel_analysis,
            volume_profile,
            supply_demand,
            fair_value_gaps,
            fibonacci,
            unified_signals: Vec::new(),
            market_structure: MarketStructure {
                trend_direction: TrendDirection::Flat,
                trend_strength: 0.0,
                support_levels: Vec::new(),
                resistance_levels: Vec::new(),
                key_levels: Vec::new(),
                volume_profile: None,
                market_phase: MarketPhase::Sideways,
                volatility: 0.0,
            },
            risk_assessment: RiskAssessment {
                overall_risk: RiskLevel::High,
                trend_risk: RiskLevel::High,
                volatility_risk: RiskLevel::High,
                liquidity_risk: RiskLevel::High,
                recommended_risk: 0.01,
                max_position_fraction: 0.02,
                suggested_timeframe: TimeHorizon::Short,
                risk_factors: Vec::new(),
            },
            trading_advice: TradingAdvice {
                overall_action: SignalAction::Hold,
                confidence: 0.0,
                reasoning_points: Vec::new(),
                entry_strategy: String::new(),
                exit_strategy: String::new(),
                risk_management: String::new(),
                alternative_scenarios: Vec::new(),
                time_horizon: TimeHorizon::Short,
            },
        };

        result.unified_signals = self.generate_unified_signals(&result, current_price, interval);
        result.market_structure = self.analyze_market_structure(&result);
        result.risk_assessment = self.assess_risk(&result);
        result.trading_advice = self.generate_trading_advice(&result);

        Ok(result)
    }

    /// 분석기별 네이티브 신호를 수집해 융합/재평가/정렬합니다.
    fn generate_unified_signals(
        &self,
        result: &ComprehensiveResult,
        current_price: f64,
        interval: CandleInterval,
    ) -> Vec<UnifiedSignal> {
        let mut all_signals = Vec::new();

        all_signals.extend(self.collect_dow_signals(result.dow_theory.as_ref(), interval));
        all_signals.extend(self.collect_vp_signals(
            result.volume_profile.as_ref(),
            current_price,
            result.timestamp,
            interval,
        ));
        all_signals.extend(self.collect_sd_signals(
            result.supply_demand.as_ref(),
            current_price,
            result.timestamp,
            interval,
        ));
        all_signals.extend(self.collect_fvg_signals(
            result.fair_value_gaps.as_ref(),
            current_price,
            result.timestamp,
            interval,
        ));
        all_signals.extend(self.collect_fib_signals(
            result.fibonacci.as_ref(),
            current_price,
            result.timestamp,
            interval,
        ));

        let fused = self.fuse_signals(all_signals);

        let mut finals: Vec<UnifiedSignal> = fused
            .into_iter()
            .filter(|signal| self.accepts_final(signal))
            .collect();

        finals.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        finals.truncate(self.config.max_signals);
        finals
    }

    /// 최종 필터: 최소 신뢰도, 진입 신호는 보호선 순서와 최소 손익비까지 요구
    fn accepts_final(&self, signal: &UnifiedSignal) -> bool {
        if signal.confidence < self.config.min_confidence {
            return false;
        }
        if !signal.action.is_entry() {
            return true;
        }

        let ordered = match signal.action {
            SignalAction::Buy => {
                signal.stop_loss < signal.entry && signal.entry < signal.take_profit
            }
            SignalAction::Sell => {
                signal.take_profit < signal.entry && signal.entry < signal.stop_loss
            }
            _ => true,
        };

        ordered && signal.risk_reward >= self.config.min_risk_reward
    }

    fn collect_dow_signals(
        &self,
        dow: Option<&DowTheoryData>,
        interval: CandleInterval,
    ) -> Vec<UnifiedSignal> {
        let Some(signal) = dow.and_then(|d| d.trading_signal.as_ref()) else {
            return Vec::new();
        };

        let signal_type = match signal.kind {
            DowSignalKind::ChannelBounce => UnifiedSignalType::Support,
            DowSignalKind::ChannelBreakout => UnifiedSignalType::Breakout,
            DowSignalKind::TrendFollowing => UnifiedSignalType::TrendFollowing,
            DowSignalKind::Reversal => UnifiedSignalType::Reversal,
            DowSignalKind::Hold => UnifiedSignalType::MeanReversion,
        };

        vec![UnifiedSignal {
            id: format!("dow_{}", signal.timestamp),
            signal_type,
            action: signal.action,
            entry: signal.entry,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            risk_reward: signal.risk_reward,
            confidence: signal.confidence,
            strength: signal.confidence,
            sources: vec![SignalSource {
                source: AnalyzerSource::DowTheory,
                weight: self.config.weight_dow_theory,
                confidence: signal.confidence,
                details: signal.description.clone(),
            }],
            description: signal.description.clone(),
            timeframe: interval,
            priority: priority_for(signal.confidence),
            timestamp: signal.timestamp,
        }]
    }

    fn collect_vp_signals(
        &self,
        profile: Option<&VolumeProfile>,
        current_price: f64,
        now_ms: i64,
        interval: CandleInterval,
    ) -> Vec<UnifiedSignal> {
        let Some(profile) = profile else {
            return Vec::new();
        };

        self.vp_analyzer
            .generate_signals(profile, current_price, now_ms)
            .into_iter()
            .enumerate()
            .map(|(index, signal)| {
                let signal_type = match signal.kind {
                    VpSignalKind::PocTest => UnifiedSignalType::Support,
                    VpSignalKind::ValueAreaBreakout => UnifiedSignalType::Breakout,
                    VpSignalKind::ValueAreaReturn => UnifiedSignalType::MeanReversion,
                    VpSignalKind::HighVolume => UnifiedSignalType::Support,
                    VpSignalKind::LowVolume => UnifiedSignalType::MeanReversion,
                    VpSignalKind::Imbalance => UnifiedSignalType::TrendFollowing,
                };

                // 프로파일 신호는 레벨 기반이라 보호선이 없으므로
                // 진입가 기준 1% 손절 / 2% 익절을 부여해 손익비를 정의
                let (stop_loss, take_profit, risk_reward) =
                    synth_protective_stops(signal.action, current_price);

                UnifiedSignal {
                    id: format!("vp_{}_{}", now_ms, index),
                    signal_type,
                    action: signal.action,
                    entry: current_price,
                    stop_loss,
                    take_profit,
                    risk_reward,
                    confidence: signal.confidence,
                    strength: signal.strength,
                    sources: vec![SignalSource {
                        source: AnalyzerSource::VolumeProfile,
                        weight: self.config.weight_volume_profile,
                        confidence: signal.confidence,
                        details: signal.description.clone(),
                    }],
                    description: signal.description,
                    timeframe: interval,
                    priority: priority_for(signal.confidence),
                    timestamp: signal.timestamp,
                }
            })
            .collect()
    }

    fn collect_sd_signals(
        &self,
        data: Option<&SupplyDemandData>,
        current_price: f64,
        now_ms: i64,
        interval: CandleInterval,
    ) -> Vec<UnifiedSignal> {
        let Some(data) = data else {
            return Vec::new();
        };

        self.sd_analyzer
            .generate_signals(data, current_price, now_ms)
            .into_iter()
            .enumerate()
            .map(|(index, signal)| {
                let zone_type = data.zone_by_id(&signal.zone_id).map(|z| z.zone_type);
                let signal_type = match signal.kind {
                    SdSignalKind::ZoneBreakout => UnifiedSignalType::Breakout,
                    _ => match zone_type {
                        Some(ZoneType::Supply) => UnifiedSignalType::Resistance,
                        _ => UnifiedSignalType::Support,
                    },
                };

                UnifiedSignal {
                    id: format!("sd_{}_{}", now_ms, index),
                    signal_type,
                    action: signal.action,
                    entry: signal.entry,
                    stop_loss: signal.stop_loss,
                    take_profit: signal.take_profit,
                    risk_reward: signal.risk_reward,
                    confidence: signal.confidence,
                    strength: signal.strength,
                    sources: vec![SignalSource {
                        source: AnalyzerSource::SupplyDemand,
                        weight: self.config.weight_supply_demand,
                        confidence: signal.confidence,
                        details: signal.description.clone(),
                    }],
                    description: signal.description,
                    timeframe: interval,
                    priority: priority_for(signal.confidence),
                    timestamp: signal.timestamp,
                }
            })
            .collect()
    }

    fn collect_fvg_signals(
        &self,
        data: Option<&FvgData>,
        current_price: f64,
        now_ms: i64,
        interval: CandleInterval,
    ) -> Vec<UnifiedSignal> {
        let Some(data) = data else {
            return Vec::new();
        };

        self.fvg_analyzer
            .generate_signals(data, current_price, now_ms)
            .into_iter()
            .enumerate()
            .map(|(index, signal)| {
                let signal_type = match signal.kind {
                    FvgSignalKind::Reaction | FvgSignalKind::Rejection => {
                        if signal.fvg_type == FvgType::Bullish {
                            UnifiedSignalType::Support
                        } else {
                            UnifiedSignalType::Resistance
                        }
                    }
                    FvgSignalKind::FillEntry => UnifiedSignalType::MeanReversion,
                    FvgSignalKind::Breakthrough => UnifiedSignalType::Breakout,
                };

                UnifiedSignal {
                    id: format!("fvg_{}_{}", now_ms, index),
                    signal_type,
                    action: signal.action,
                    entry: signal.entry,
                    stop_loss: signal.stop_loss,
                    take_profit: signal.take_profit,
                    risk_reward: signal.risk_reward,
                    confidence: signal.confidence,
                    strength: signal.strength,
                    sources: vec![SignalSource {
                        source: AnalyzerSource::Fvg,
                        weight: self.config.weight_fvg,
                        confidence: signal.confidence,
                        details: signal.description.clone(),
                    }],
                    description: signal.description,
                    timeframe: interval,
                    priority: priority_for(signal.confidence),
                    timestamp: signal.timestamp,
                }
            })
            .collect()
    }

    fn collect_fib_signals(
        &self,
        data: Option<&FibonacciData>,
        current_price: f64,
        now_ms: i64,
        interval: CandleInterval,
    ) -> Vec<UnifiedSignal> {
        let Some(data) = data else {
            return Vec::new();
        };

        self.fibonacci_analyzer
            .generate_signals(data, current_price, now_ms)
            .into_iter()
            .enumerate()
            .map(|(index, signal)| {
                let signal_type = match signal.kind {
                    FibSignalKind::GoldenPocket | FibSignalKind::Bounce => {
                        if signal.action == SignalAction::Buy {
                            UnifiedSignalType::Support
                        } else {
                            UnifiedSignalType::Resistance
                        }
                    }
                    FibSignalKind::Cluster => UnifiedSignalType::Support,
                };

                // 골든 포켓 신호는 낮은 기준으로도 상위 우선순위
                let priority = if signal.kind == FibSignalKind::GoldenPocket {
                    if signal.confidence >= 70.0 {
                        SignalPriority::High
                    } else {
                        SignalPriority::Medium
                    }
                } else {
                    priority_for(signal.confidence)
                };

                UnifiedSignal {
                    id: format!("fib_{}_{}", now_ms, index),
                    signal_type,
                    action: signal.action,
                    entry: signal.entry_price,
                    stop_loss: signal.stop_loss,
                    take_profit: signal.take_profit.first().copied().unwrap_or(0.0),
                    risk_reward: signal.risk_reward,
                    confidence: signal.confidence,
                    strength: signal.strength,
                    sources: vec![SignalSource {
                        source: AnalyzerSource::Fibonacci,
                        weight: self.config.weight_fibonacci,
                        confidence: signal.confidence,
                        details: signal.context.clone(),
                    }],
                    description: signal.context,
                    timeframe: interval,
                    priority,
                    timestamp: signal.timestamp,
                }
            })
            .collect()
    }

    /// 동작이 같고 진입가 5% 이내, 시간 1시간 이내인 신호를 병합합니다.
    fn fuse_signals(&self, signals: Vec<UnifiedSignal>) -> Vec<UnifiedSignal> {
        if signals.len() <= 1 {
            return signals;
        }

        let mut fused: Vec<UnifiedSignal> = Vec::new();
        let mut processed = vec![false; signals.len()];

        for i in 0..signals.len() {
            if processed[i] {
                continue;
            }
            processed[i] = true;

            let mut target = signals[i].clone();

            // 출처별 진입가를 가중 평균하기 위한 누산기
            let target_weight: f64 = target.sources.iter().map(|s| s.weight).sum();
            let mut weight_sum = target_weight;
            let mut entry_sum = target.entry * target_weight;

            for (j, other) in signals.iter().enumerate().skip(i + 1) {
                if processed[j] || !can_fuse(&target, other) {
                    continue;
                }
                processed[j] = true;

                let other_weight: f64 = other.sources.iter().map(|s| s.weight).sum();
                weight_sum += other_weight;
                entry_sum += other.entry * other_weight;

                target.sources.extend(other.sources.iter().cloned());

                // 손익비가 더 좋은 쪽의 보호선을 채택
                if other.risk_reward > target.risk_reward {
                    target.stop_loss = other.stop_loss;
                    target.take_profit = other.take_profit;
                    target.risk_reward = other.risk_reward;
                }

                target.strength = target.strength.max(other.strength);
                target.description = format!("{}; {}", target.description, other.description);
            }

            if weight_sum > 0.0 {
                target.entry = entry_sum / weight_sum;
            }

            // 진입가가 이동했으므로 손익비를 최종 진입가 기준으로 재계산
            if target.action.is_entry() && target.stop_loss > 0.0 && target.take_profit > 0.0 {
                let risk = (target.entry - target.stop_loss).abs();
                if risk > 0.0 {
                    target.risk_reward = (target.take_profit - target.entry).abs() / risk;
                }
            }

            self.rescore_confidence(&mut target);
            fused.push(target);
        }

        fused
    }

    /// 가중 평균 신뢰도에 출처당 +5 가점을 더하되,
    /// 병합이 입력 최대 신뢰도보다 낮아지지 않게 합니다.
    fn rescore_confidence(&self, signal: &mut UnifiedSignal) {
        if signal.sources.is_empty() {
            return;
        }

        let mut weight_sum = 0.0;
        let mut weighted_confidence = 0.0;
        let mut max_confidence: f64 = 0.0;

        for source in &signal.sources {
            weight_sum += source.weight;
            weighted_confidence += source.confidence * source.weight;
            max_confidence = max_confidence.max(source.confidence);
        }

        let mut confidence = if weight_sum > 0.0 {
            weighted_confidence / weight_sum
        } else {
            signal.confidence
        };
        confidence = confidence.max(max_confidence);

        if signal.sources.len() > 1 {
            confidence += (signal.sources.len() - 1) as f64 * 5.0;
        }

        signal.confidence = confidence.min(100.0);
        signal.priority = priority_for(signal.confidence);
    }

    /// 분석기 출력에서 시장 구조 요약을 구성합니다.
    fn analyze_market_structure(&self, result: &ComprehensiveResult) -> MarketStructure {
        let mut structure = MarketStructure {
            trend_direction: TrendDirection::Flat,
            trend_strength: 0.0,
            support_levels: Vec::new(),
            resistance_levels: Vec::new(),
            key_levels: Vec::new(),
            volume_profile: None,
            market_phase: MarketPhase::Sideways,
            volatility: 0.0,
        };

        if let Some(strength) = result
            .dow_theory
            .as_ref()
            .and_then(|d| d.trend_strength.as_ref())
        {
            structure.trend_direction = strength.direction;
            structure.trend_strength = strength.overall;
            structure.volatility = 100.0 - strength.consistency;
        }

        if let Some(sd) = &result.supply_demand {
            for zone in &sd.active_zones {
                match zone.zone_type {
                    ZoneType::Supply => {
                        structure.resistance_levels.push(zone.center_price);
                        structure.key_levels.push(KeyLevel {
                            price: zone.center_price,
                            level_type: KeyLevelType::Resistance,
                            strength: zone.strength,
                            source: KeyLevelSource::SupplyZone,
                            description: format!(
                                "supply zone {:.2}-{:.2}",
                                zone.lower_bound, zone.upper_bound
                            ),
                        });
                    }
                    ZoneType::Demand => {
                        structure.support_levels.push(zone.center_price);
                        structure.key_levels.push(KeyLevel {
                            price: zone.center_price,
                            level_type: KeyLevelType::Support,
                            strength: zone.strength,
                            source: KeyLevelSource::DemandZone,
                            description: format!(
                                "demand zone {:.2}-{:.2}",
                                zone.lower_bound, zone.upper_bound
                            ),
                        });
                    }
                }
            }
        }

        if let Some(profile) = &result.volume_profile {
            if let Some(poc) = &profile.poc {
                structure.key_levels.push(KeyLevel {
                    price: poc.price,
                    level_type: KeyLevelType::Poc,
                    strength: poc.volume_percent,
                    source: KeyLevelSource::VpPoc,
                    description: format!("POC ({:.1}% volume)", poc.volume_percent),
                });
            }
            structure.key_levels.push(KeyLevel {
                price: profile.vah,
                level_type: KeyLevelType::Vah,
                strength: 70.0,
                source: KeyLevelSource::VpVah,
                description: "value area high".to_string(),
            });
            structure.key_levels.push(KeyLevel {
                price: profile.val,
                level_type: KeyLevelType::Val,
                strength: 70.0,
                source: KeyLevelSource::VpVal,
                description: "value area low".to_string(),
            });

            let current_position = if result.current_price > profile.vah {
                ValueAreaPosition::Above
            } else if result.current_price < profile.val {
                ValueAreaPosition::Below
            } else {
                ValueAreaPosition::Inside
            };

            structure.volume_profile = Some(VpSummary {
                poc: profile.poc.as_ref().map(|p| p.price).unwrap_or(0.0),
                vah: profile.vah,
                val: profile.val,
                concentration: profile.value_area.concentration,
                current_position,
            });
        }

        if let Some(fvg_data) = &result.fair_value_gaps {
            for gap in &fvg_data.active_fvgs {
                match gap.fvg_type {
                    FvgType::Bullish => {
                        structure.support_levels.push(gap.center_price);
                        structure.key_levels.push(KeyLevel {
                            price: gap.center_price,
                            level_type: KeyLevelType::Support,
                            strength: gap.strength,
                            source: KeyLevelSource::BullishFvg,
                            description: format!(
                                "bullish FVG {:.2}-{:.2}",
                                gap.lower_bound, gap.upper_bound
                            ),
                        });
                    }
                    FvgType::Bearish => {
                        structure.resistance_levels.push(gap.center_price);
                        structure.key_levels.push(KeyLevel {
                            price: gap.center_price,
                            level_type: KeyLevelType::Resistance,
                            strength: gap.strength,
                            source: KeyLevelSource::BearishFvg,
                            description: format!(
                                "bearish FVG {:.2}-{:.2}",
                                gap.lower_bound, gap.upper_bound
                            ),
                        });
                    }
                }
            }
        }

        if let Some(fib) = &result.fibonacci {
            if let Some(pocket) = &fib.golden_pocket {
                if pocket.active {
                    let (level_type, side_levels) = if pocket.trend_context == TrendDirection::Up {
                        (KeyLevelType::Support, &mut structure.support_levels)
                    } else {
                        (KeyLevelType::Resistance, &mut structure.resistance_levels)
                    };
                    side_levels.push(pocket.center_price);
                    structure.key_levels.push(KeyLevel {
                        price: pocket.center_price,
                        level_type,
                        strength: pocket.strength,
                        source: KeyLevelSource::FibGoldenPocket,
                        description: format!("golden pocket 0.618 (strength {:.1})", pocket.strength),
                    });
                }
            }

            for retracement in &fib.retracements {
                if !retracement.active || retracement.quality != FibQuality::High {
                    continue;
                }
                for level in &retracement.levels {
                    if level.importance < 0.8 {
                        continue;
                    }

                    let level_type = if retracement.trend == TrendDirection::Up {
                        structure.support_levels.push(level.price);
                        KeyLevelType::Support
                    } else {
                        structure.resistance_levels.push(level.price);
                        KeyLevelType::Resistance
                    };

                    let mut description =
                        format!("fib {:.1}% retracement", level.ratio * 100.0);
                    if level.is_golden_ratio {
                        description.push_str(" (golden ratio)");
                    }

                    structure.key_levels.push(KeyLevel {
                        price: level.price,
                        level_type,
                        strength: level.importance * 100.0,
                        source: KeyLevelSource::FibRetracement,
                        description,
                    });
                }
            }

            for cluster in &fib.clusters {
                if cluster.importance < 70.0 {
                    continue;
                }
                structure.key_levels.push(KeyLevel {
                    price: cluster.center_price,
                    level_type: KeyLevelType::Support,
                    strength: cluster.importance,
                    source: KeyLevelSource::FibCluster,
                    description: format!(
                        "fib cluster ({} levels, density {:.2})",
                        cluster.level_count, cluster.density
                    ),
                });
            }
        }

        structure.market_phase = self.determine_market_phase(result, &structure);
        structure
    }

    /// 추세 강도와 거래량 집중도로 시장 국면을 판별합니다.
    fn determine_market_phase(
        &self,
        result: &ComprehensiveResult,
        structure: &MarketStructure,
    ) -> MarketPhase {
        let strength = structure.trend_strength;
        let direction = structure.trend_direction;

        if strength > 70.0 {
            match direction {
                TrendDirection::Up => return MarketPhase::Markup,
                TrendDirection::Down => return MarketPhase::Markdown,
                TrendDirection::Flat => {}
            }
        } else if strength < 30.0 {
            if let Some(profile) = &result.volume_profile {
                return if profile.value_area.concentration > 2.0 {
                    MarketPhase::Accumulation
                } else {
                    MarketPhase::Distribution
                };
            }
        }

        MarketPhase::Sideways
    }

    /// 추세/변동성/유동성 리스크를 평균해 종합 등급을 냅니다.
    fn assess_risk(&self, result: &ComprehensiveResult) -> RiskAssessment {
        let mut risk_factors = Vec::new();
        let mut risk_score = 0.0;
        let mut components = 0usize;

        let (trend_risk, trend_points) = match result
            .dow_theory
            .as_ref()
            .and_then(|d| d.trend_strength.as_ref())
        {
            Some(strength) if strength.overall > 70.0 && strength.consistency > 70.0 => {
                (RiskLevel::Low, 1.0)
            }
            Some(strength) if strength.overall > 50.0 => (RiskLevel::Medium, 2.0),
            _ => {
                risk_factors.push("trend direction unclear".to_string());
                (RiskLevel::High, 3.0)
            }
        };
        risk_score += trend_points;
        components += 1;

        let volatility = result.market_structure.volatility;
        let (volatility_risk, vol_points) = if volatility < 20.0 {
            (RiskLevel::Low, 1.0)
        } else if volatility < 50.0 {
            (RiskLevel::Medium, 2.0)
        } else {
            risk_factors.push("high volatility".to_string());
            (RiskLevel::High, 3.0)
        };
        risk_score += vol_points;
        components += 1;

        let (liquidity_risk, liq_points) = match &result.volume_profile {
            Some(profile) if profile.value_area.concentration > 2.0 => (RiskLevel::Low, 1.0),
            Some(profile) if profile.value_area.concentration > 1.2 => (RiskLevel::Medium, 2.0),
            Some(_) => {
                risk_factors.push("dispersed volume profile".to_string());
                (RiskLevel::High, 3.0)
            }
            None => (RiskLevel::Medium, 2.0),
        };
        risk_score += liq_points;
        components += 1;

        if let Some(sd) = &result.supply_demand {
            if sd.statistics.success_rate < 50.0 && sd.statistics.total_supply_zones
                + sd.statistics.total_demand_zones
                > 0
            {
                risk_score += 1.0;
                risk_factors.push("low supply/demand zone success rate".to_string());
            }
        }

        let avg_risk = risk_score / components as f64;
        let (overall_risk, recommended_risk, max_position_fraction, suggested_timeframe) =
            if avg_risk <= 1.5 {
                (RiskLevel::Low, 0.02, 0.1, TimeHorizon::Long)
            } else if avg_risk <= 2.5 {
                (RiskLevel::Medium, 0.015, 0.05, TimeHorizon::Medium)
            } else {
                if risk_factors.is_empty() {
                    risk_factors.push("overall risk elevated".to_string());
                }
                (RiskLevel::High, 0.01, 0.02, TimeHorizon::Short)
            };

        RiskAssessment {
            overall_risk,
            trend_risk,
            volatility_risk,
            liquidity_risk,
            recommended_risk,
            max_position_fraction,
            suggested_timeframe,
            risk_factors,
        }
    }

    /// 최상위 통합 신호를 중심으로 트레이딩 권고를 구성합니다.
    fn generate_trading_advice(&self, result: &ComprehensiveResult) -> TradingAdvice {
        let mut advice = TradingAdvice {
            overall_action: SignalAction::Hold,
            confidence: 30.0,
            reasoning_points: Vec::new(),
            entry_strategy: "wait for a clear signal".to_string(),
            exit_strategy: "stay flat".to_string(),
            risk_management: "avoid new positions".to_string(),
            alternative_scenarios: Vec::new(),
            time_horizon: result.risk_assessment.suggested_timeframe,
        };

        let Some(primary) = result.unified_signals.first() else {
            advice
                .reasoning_points
                .push("no qualifying trade signal".to_string());
            return advice;
        };

        advice.overall_action = primary.action;
        advice.confidence = primary.confidence;
        advice.reasoning_points.push(format!(
            "primary signal: {:?} (confidence {:.1}%)",
            primary.signal_type, primary.confidence
        ));

        // 같은 방향을 지지하는 출처 집계
        let mut source_support: HashMap<AnalyzerSource, usize> = HashMap::new();
        for signal in &result.unified_signals {
            if signal.action == primary.action {
                for source in &signal.sources {
                    *source_support.entry(source.source).or_insert(0) += 1;
                }
            }
        }
        if source_support.len() > 1 {
            advice
                .reasoning_points
                .push("confirmed by multiple analyzers".to_string());
        }

        let trend = result.market_structure.trend_direction;
        if trend == TrendDirection::Up && primary.action == SignalAction::Buy {
            advice
                .reasoning_points
                .push("aligned with the prevailing uptrend".to_string());
        } else if trend == TrendDirection::Down && primary.action == SignalAction::Sell {
            advice
                .reasoning_points
                .push("aligned with the prevailing downtrend".to_string());
        } else if primary.action.is_entry() {
            advice
                .reasoning_points
                .push("counter-trend trade, elevated risk".to_string());
            advice.confidence *= 0.8;
        }

        advice.entry_strategy = match primary.action {
            SignalAction::Buy => format!(
                "scale in near {:.2}, add above {:.2}",
                primary.entry,
                primary.entry * 1.01
            ),
            SignalAction::Sell => format!(
                "scale in near {:.2}, add below {:.2}",
                primary.entry,
                primary.entry * 0.99
            ),
            _ => "hold and wait for confirmation".to_string(),
        };

        advice.exit_strategy = if primary.stop_loss > 0.0 && primary.take_profit > 0.0 {
            format!(
                "stop {:.2}, target {:.2} (R/R 1:{:.1})",
                primary.stop_loss, primary.take_profit, primary.risk_reward
            )
        } else {
            "manage exits off key structure levels".to_string()
        };

        advice.risk_management = format!(
            "risk at most {:.1}% of equity, position size under {:.1}%",
            result.risk_assessment.recommended_risk * 100.0,
            result.risk_assessment.max_position_fraction * 100.0
        );

        if let Some(secondary) = result.unified_signals.get(1) {
            if secondary.action != primary.action {
                advice.alternative_scenarios.push(format!(
                    "alternative: {} (confidence {:.1}%)",
                    secondary.action, secondary.confidence
                ));
            }
        }
        if result.risk_assessment.overall_risk == RiskLevel::High {
            advice
                .alternative_scenarios
                .push("in high-risk conditions reduce size or stand aside".to_string());
        }

        advice
    }
}

impl Default for ComprehensiveAnalyzer {
    fn default() -> ComprehensiveAnalyzer {
        ComprehensiveAnalyzer::new()
    }
}

/// 융합 가능 조건: 동작 일치, 진입가 5% 이내, 시간 1시간 이내
fn can_fuse(signal1: &UnifiedSignal, signal2: &UnifiedSignal) -> bool {
    if signal1.action != signal2.action {
        return false;
    }
    if signal1.entry <= 0.0 || signal2.entry <= 0.0 {
        return false;
    }

    let price_diff = (signal1.entry - signal2.entry).abs() / signal1.entry;
    if price_diff > 0.05 {
        return false;
    }

    let time_diff = (signal1.timestamp - signal2.timestamp).abs();
    time_diff <= 3600 * 1000
}

fn priority_for(confidence: f64) -> SignalPriority {
    if confidence >= 80.0 {
        SignalPriority::High
    } else if confidence >= 60.0 {
        SignalPriority::Medium
    } else {
        SignalPriority::Low
    }
}

/// 레벨형 신호에 진입가 기준 1% 손절 / 2% 익절을 부여합니다.
fn synth_protective_stops(action: SignalAction, entry: f64) -> (f64, f64, f64) {
    match action {
        SignalAction::Buy => (entry * 0.99, entry * 1.02, 2.0),
        SignalAction::Sell => (entry * 1.01, entry * 0.98, 2.0),
        _ => (0.0, 0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(
        id: &str,
        source: AnalyzerSource,
        weight: f64,
        confidence: f64,
        entry: f64,
        timestamp: i64,
    ) -> UnifiedSignal {
        UnifiedSignal {
            id: id.to_string(),
            signal_type: UnifiedSignalType::Support,
            action: SignalAction::Buy,
            entry,
            stop_loss: entry * 0.98,
            take_profit: entry * 1.04,
            risk_reward: 2.0,
            confidence,
            strength: confidence,
            sources: vec![SignalSource {
                source,
                weight,
                confidence,
                details: id.to_string(),
            }],
            description: id.to_string(),
            timeframe: CandleInterval::Hour4,
            priority: priority_for(confidence),
            timestamp,
        }
    }

    #[test]
    fn test_fuse_same_price_and_time() {
        // 같은 가격/시각의 다우 매수(70, 0.25)와 공급수요 매수(80, 0.2)
        let analyzer = ComprehensiveAnalyzer::new();
        let fused = analyzer.fuse_signals(vec![
            signal("dow", AnalyzerSource::DowTheory, 0.25, 70.0, 100.0, 1_000),
            signal("sd", AnalyzerSource::SupplyDemand, 0.2, 80.0, 100.0, 1_000),
        ]);

        assert_eq!(fused.len(), 1);
        let merged = &fused[0];
        assert_eq!(merged.sources.len(), 2);
        // 진입가가 동일하므로 가중 평균도 동일
        assert!((merged.entry - 100.0).abs() < 1e-9);
        // 다중 출처 가점 후 입력 최대 신뢰도 이상
        assert!(merged.confidence >= 80.0);
        assert_eq!(merged.priority, SignalPriority::High);
    }

    #[test]
    fn test_fusion_confidence_not_below_max_input() {
        let analyzer = ComprehensiveAnalyzer::new();
        let fused = analyzer.fuse_signals(vec![
            signal("strong", AnalyzerSource::DowTheory, 0.25, 90.0, 100.0, 0),
            signal("weak", AnalyzerSource::VolumeProfile, 0.2, 40.0, 100.5, 0),
        ]);

        assert_eq!(fused.len(), 1);
        assert!(fused[0].confidence >= 90.0);
    }

    #[test]
    fn test_no_fusion_across_actions_or_distance() {
        let analyzer = ComprehensiveAnalyzer::new();

        let mut sell = signal("sell", AnalyzerSource::Fvg, 0.15, 70.0, 100.0, 0);
        sell.action = SignalAction::Sell;
        let fused = analyzer.fuse_signals(vec![
            signal("buy", AnalyzerSource::DowTheory, 0.25, 70.0, 100.0, 0),
            sell,
        ]);
        assert_eq!(fused.len(), 2);

        // 5% 이상 가격 차이는 병합 금지
        let fused = analyzer.fuse_signals(vec![
            signal("a", AnalyzerSource::DowTheory, 0.25, 70.0, 100.0, 0),
            signal("b", AnalyzerSource::SupplyDemand, 0.2, 70.0, 110.0, 0),
        ]);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_no_fusion_when_time_apart() {
        let analyzer = ComprehensiveAnalyzer::new();
        let fused = analyzer.fuse_signals(vec![
            signal("a", AnalyzerSource::DowTheory, 0.25, 70.0, 100.0, 0),
            signal("b", AnalyzerSource::SupplyDemand, 0.2, 70.0, 100.0, 2 * 3600 * 1000),
        ]);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_weighted_entry_stays_in_hull() {
        let analyzer = ComprehensiveAnalyzer::new();
        let fused = analyzer.fuse_signals(vec![
            signal("a", AnalyzerSource::DowTheory, 0.25, 70.0, 100.0, 0),
            signal("b", AnalyzerSource::Fibonacci, 0.2, 75.0, 103.0, 0),
        ]);

        assert_eq!(fused.len(), 1);
        let entry = fused[0].entry;
        assert!(entry >= 100.0 && entry <= 103.0, "entry={}", entry);
    }

    #[test]
    fn test_config_validation_rejects_zero_weights() {
        let mut config = ComprehensiveConfig::default();
        config.weight_dow_theory = 0.0;
        config.weight_volume_profile = 0.0;
        config.weight_supply_demand = 0.0;
        config.weight_fvg = 0.0;
        config.weight_fibonacci = 0.0;
        assert!(config.validate().is_err());

        let mut analyzer = ComprehensiveAnalyzer::new();
        assert!(analyzer.set_config(config).is_err());
    }
}
