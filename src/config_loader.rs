use crate::analyzer::channel_analyzer::ChannelAnalysisConfig;
use crate::analyzer::comprehensive_analyzer::ComprehensiveConfig;
use crate::analyzer::dow_analyzer::DowConfig;
use crate::analyzer::fibonacci_analyzer::FibonacciConfig;
use crate::analyzer::fvg_analyzer::FvgConfig;
use crate::analyzer::supply_demand_analyzer::SdConfig;
use crate::analyzer::volume_profile_analyzer::VpConfig;
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// 설정 로드 오류
#[derive(Debug)]
pub enum ConfigError {
    /// 파일 오류
    FileError(String),
    /// 파싱 오류
    ParseError(String),
    /// 유효성 검사 오류
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileError(msg) => write!(f, "설정 파일 오류: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "설정 파싱 오류: {}", msg),
            ConfigError::ValidationError(msg) => write!(f, "설정 유효성 검사 오류: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// 설정 로드 결과
pub type ConfigResult<T> = Result<T, ConfigError>;

/// 설정 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON 형식
    Json,
    /// TOML 형식
    Toml,
    /// 자동 감지 (파일 확장자로부터)
    Auto,
}

/// 설정 유효성 검사 트레이트
pub trait ConfigValidation {
    /// 설정 유효성 검사
    fn validate(&self) -> ConfigResult<()>;
}

/// 설정 파일 로더
#[derive(Debug)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// 파일에서 설정 로드
    ///
    /// # Arguments
    /// * `path` - 설정 파일 경로
    /// * `format` - 설정 파일 형식 (기본값: Auto)
    ///
    /// # Returns
    /// * `ConfigResult<T>` - 설정 객체 또는 오류
    pub fn load_from_file<T>(path: &Path, format: ConfigFormat) -> ConfigResult<T>
    where
        T: DeserializeOwned + ConfigValidation,
    {
        debug!("설정 파일 로드 시작: {}", path.display());

        let format = if format == ConfigFormat::Auto {
            Self::detect_format(path)?
        } else {
            format
        };

        let mut file = File::open(path).map_err(|e| {
            error!("설정 파일 열기 실패: {} - {}", path.display(), e);
            ConfigError::FileError(format!("파일 열기 실패: {}", e))
        })?;

        let mut content = String::new();
        file.read_to_string(&mut content).map_err(|e| {
            error!("설정 파일 읽기 실패: {} - {}", path.display(), e);
            ConfigError::FileError(format!("파일 읽기 실패: {}", e))
        })?;

        let config: T = match format {
            ConfigFormat::Json => Self::parse_json(&content)?,
            ConfigFormat::Toml => Self::parse_toml(&content)?,
            ConfigFormat::Auto => unreachable!("형식은 위에서 결정됨"),
        };

        config.validate()?;
        debug!("설정 로드 완료: {}", path.display());
        Ok(config)
    }

    /// 확장자로 설정 형식을 감지합니다.
    fn detect_format(path: &Path) -> ConfigResult<ConfigFormat> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(ConfigFormat::Json),
            Some("toml") => Ok(ConfigFormat::Toml),
            other => Err(ConfigError::FileError(format!(
                "지원하지 않는 설정 확장자: {:?}",
                other
            ))),
        }
    }

    fn parse_json<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn parse_toml<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// 전체 분석기 설정 묶음
///
/// 프로세스 전역 설정은 이 값 하나로 관리하며, 변경은 새 값을 만들어
/// `SettingsHandle::replace`로 원자적으로 교체합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub dow: DowConfig,
    pub channel: ChannelAnalysisConfig,
    pub volume_profile: VpConfig,
    pub supply_demand: SdConfig,
    pub fvg: FvgConfig,
    pub fibonacci: FibonacciConfig,
    pub comprehensive: ComprehensiveConfig,
}

impl ConfigValidation for AnalysisSettings {
    fn validate(&self) -> ConfigResult<()> {
        self.dow
            .validate()
            .and_then(|_| self.channel.validate())
            .and_then(|_| self.volume_profile.validate())
            .and_then(|_| self.supply_demand.validate())
            .and_then(|_| self.fvg.validate())
            .and_then(|_| self.fibonacci.validate())
            .and_then(|_| self.comprehensive.validate())
            .map_err(ConfigError::ValidationError)
    }
}

/// 활성 설정 핸들
///
/// 읽기는 현재 포인터를 복제하고, 교체는 검증을 통과한 새 설정으로
/// 포인터를 바꿉니다. 진행 중인 분석 호출은 생성 시 주입받은 설정을
/// 계속 사용합니다.
#[derive(Debug)]
pub struct SettingsHandle {
    active: RwLock<Arc<AnalysisSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: AnalysisSettings) -> ConfigResult<SettingsHandle> {
        settings.validate()?;
        Ok(SettingsHandle {
            active: RwLock::new(Arc::new(settings)),
        })
    }

    /// 현재 활성 설정
    pub fn current(&self) -> Arc<AnalysisSettings> {
        self.active
            .read()
            .map(|guard| Arc::clone(&*guard))
            .unwrap_or_default()
    }

    /// 검증 후 활성 설정 교체
    pub fn replace(&self, settings: AnalysisSettings) -> ConfigResult<()> {
        settings.validate()?;
        if let Ok(mut guard) = self.active.write() {
            *guard = Arc::new(settings);
        }
        Ok(())
    }
}

impl Default for SettingsHandle {
    fn default() -> SettingsHandle {
        SettingsHandle {
            active: RwLock::new(Arc::new(AnalysisSettings::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(AnalysisSettings::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_ranges() {
        let mut settings = AnalysisSettings::default();
        settings.dow.swing.lookback_period = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut settings = AnalysisSettings::default();
        settings.volume_profile.tick_size = -1.0;
        assert!(settings.validate().is_err());

        let mut settings = AnalysisSettings::default();
        settings.fibonacci.ratios.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_json_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        write!(
            file,
            r#"{{ "comprehensive": {{
                "enable_dow_theory": true,
                "enable_volume_profile": true,
                "enable_supply_demand": true,
                "enable_fvg": false,
                "enable_fibonacci": true,
                "weight_dow_theory": 0.3,
                "weight_volume_profile": 0.2,
                "weight_supply_demand": 0.2,
                "weight_fvg": 0.1,
                "weight_fibonacci": 0.2,
                "min_confidence": 55.0,
                "min_risk_reward": 1.2,
                "max_signals": 4
            }} }}"#
        )
        .unwrap();

        let settings: AnalysisSettings =
            ConfigLoader::load_from_file(file.path(), ConfigFormat::Auto).unwrap();
        assert!(!settings.comprehensive.enable_fvg);
        assert_eq!(settings.comprehensive.max_signals, 4);
        // 명시하지 않은 부분은 기본값 유지
        assert_eq!(settings.volume_profile.max_levels, 200);
    }

    #[test]
    fn test_settings_handle_replace() {
        let handle = SettingsHandle::default();
        let mut settings = AnalysisSettings::default();
        settings.comprehensive.max_signals = 3;
        handle.replace(settings).unwrap();
        assert_eq!(handle.current().comprehensive.max_signals, 3);

        let mut invalid = AnalysisSettings::default();
        invalid.comprehensive.max_signals = 0;
        assert!(handle.replace(invalid).is_err());
        // 실패한 교체는 활성 설정을 건드리지 않음
        assert_eq!(handle.current().comprehensive.max_signals, 3);
    }
}
