use std::env;
use std::path::PathBuf;

use anyhow::Context;

use crate::error::{Error, Result};
use crate::evidence::RiskLevel;

/// ELA 检测参数
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// 重压缩质量，顺序只影响平分时的取舍
    pub qualities: Vec<u8>,
    /// 差值放大倍数
    pub amplification: u8,
    /// 综合分严格大于该值判为 TAMPERED
    pub tamper_threshold: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            qualities: vec![85, 75, 95],
            amplification: 15,
            tamper_threshold: 8.0,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.qualities.is_empty() {
            return Err(Error::Config("至少需要一个重压缩质量".into()));
        }
        if let Some(q) = self.qualities.iter().find(|q| !(1..=100).contains(*q)) {
            return Err(Error::Config(format!("JPEG 质量必须在 1..=100 之间: {}", q)));
        }
        if self.amplification == 0 {
            return Err(Error::Config("放大倍数不能为 0".into()));
        }
        if !self.tamper_threshold.is_finite() || self.tamper_threshold < 0.0 {
            return Err(Error::Config(format!("篡改阈值非法: {}", self.tamper_threshold)));
        }
        Ok(())
    }
}

/// 可疑区域提取参数
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// 自适应阈值的下限
    pub threshold_floor: f64,
    /// 阈值 = 均值 + sigma * 标准差
    pub sigma: f64,
    /// 结构元半径，2 即 5x5 方块
    pub kernel_radius: u8,
    /// 宽、高都必须严格大于它
    pub min_side: u32,
    /// severity 必须严格大于它
    pub min_severity: f64,
    pub max_regions: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            threshold_floor: 25.0,
            sigma: 2.0,
            kernel_radius: 2,
            min_side: 20,
            min_severity: 15.0,
            max_regions: 5,
        }
    }
}

/// 产物文件命名策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactNaming {
    /// `<base>_noise` / `<base>_tampered`
    Original,
    /// 在 base 后追加图片 SHA256 前缀，同名并发请求互不覆盖
    Digest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Jpeg,
    Png,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Jpeg => "jpg",
            ArtifactFormat::Png => "png",
        }
    }
}

/// 标注图上每档风险框的文字
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskLabels {
    pub high: String,
    pub medium: String,
    pub low: String,
}

impl Default for RiskLabels {
    fn default() -> Self {
        Self {
            high: "HIGH RISK".to_string(),
            medium: "MEDIUM RISK".to_string(),
            low: "LOW RISK".to_string(),
        }
    }
}

impl RiskLabels {
    pub fn for_risk(&self, risk: RiskLevel) -> &str {
        match risk {
            RiskLevel::High => &self.high,
            RiskLevel::Medium => &self.medium,
            RiskLevel::Low | RiskLevel::Unknown => &self.low,
        }
    }

    /// "HIGH RISK,MEDIUM RISK,LOW RISK" -> 三档文字
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        match parts.as_slice() {
            [high, medium, low] => Ok(Self {
                high: high.to_string(),
                medium: medium.to_string(),
                low: low.to_string(),
            }),
            _ => Err(Error::Config(format!("风险标签需要 high,medium,low 三项: {}", raw))),
        }
    }
}

/// 可视化产物参数
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub scratch_dir: PathBuf,
    pub naming: ArtifactNaming,
    pub format: ArtifactFormat,
    pub error_map_suffix: String,
    pub marked_suffix: String,
    pub risk_labels: RiskLabels,
    /// TTF/OTF 字体；未配置时标注图只画框不写字
    pub label_font: Option<PathBuf>,
    /// 文字像素高度
    pub label_scale: f32,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            scratch_dir: env::temp_dir().join("certverify"),
            naming: ArtifactNaming::Digest,
            format: ArtifactFormat::Jpeg,
            error_map_suffix: "noise".to_string(),
            marked_suffix: "tampered".to_string(),
            risk_labels: RiskLabels::default(),
            label_font: None,
            label_scale: 20.0,
        }
    }
}

/// 服务配置，全部来自环境变量
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub key_path: String,
    pub records_path: PathBuf,
    /// /verify 只读取这个目录下的图片
    pub upload_dir: PathBuf,
    pub detector: DetectorConfig,
    pub regions: RegionConfig,
    pub artifacts: ArtifactConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut detector = DetectorConfig::default();
        if let Ok(raw) = env::var("ELA_QUALITIES") {
            detector.qualities = parse_qualities(&raw)?;
        }
        if let Ok(raw) = env::var("ELA_AMPLIFICATION") {
            detector.amplification = raw.trim().parse().context("ELA_AMPLIFICATION must be 1..=255")?;
        }
        if let Ok(raw) = env::var("ELA_THRESHOLD") {
            detector.tamper_threshold = raw.trim().parse().context("ELA_THRESHOLD must be a number")?;
        }
        detector.validate()?;

        let mut artifacts = ArtifactConfig::default();
        if let Ok(dir) = env::var("SCRATCH_DIR") {
            artifacts.scratch_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = env::var("ARTIFACT_NAMING") {
            artifacts.naming = match raw.trim() {
                "original" => ArtifactNaming::Original,
                "digest" => ArtifactNaming::Digest,
                other => anyhow::bail!("ARTIFACT_NAMING 只支持 original|digest, 实际: {}", other),
            };
        }
        if let Ok(raw) = env::var("ARTIFACT_FORMAT") {
            artifacts.format = match raw.trim() {
                "jpeg" | "jpg" => ArtifactFormat::Jpeg,
                "png" => ArtifactFormat::Png,
                other => anyhow::bail!("ARTIFACT_FORMAT 只支持 jpeg|png, 实际: {}", other),
            };
        }

        if let Ok(raw) = env::var("ARTIFACT_LABELS") {
            artifacts.risk_labels = RiskLabels::parse(&raw)?;
        }
        if let Ok(path) = env::var("ARTIFACT_LABEL_FONT") {
            artifacts.label_font = Some(PathBuf::from(path));
        }

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a number")?,
            key_path: env::var("KEY_PATH").unwrap_or_else(|_| "certverify.key".to_string()),
            records_path: PathBuf::from(
                env::var("RECORDS_PATH").unwrap_or_else(|_| "data/true_data.json".to_string()),
            ),
            upload_dir: PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| "data/uploads".to_string())),
            detector,
            regions: RegionConfig::default(),
            artifacts,
        })
    }
}

/// "85,75,95" -> [85, 75, 95]
pub fn parse_qualities(raw: &str) -> Result<Vec<u8>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u8>()
                .map_err(|_| Error::Config(format!("无法解析 JPEG 质量: {}", s)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quality_list() {
        assert_eq!(parse_qualities("85, 75,95").unwrap(), vec![85, 75, 95]);
        assert!(parse_qualities("85,abc").is_err());
    }

    #[test]
    fn rejects_bad_detector_configs() {
        assert!(DetectorConfig::default().validate().is_ok());

        let empty = DetectorConfig { qualities: vec![], ..DetectorConfig::default() };
        assert!(empty.validate().is_err());

        let out_of_range = DetectorConfig { qualities: vec![85, 0], ..DetectorConfig::default() };
        assert!(out_of_range.validate().is_err());

        let silent = DetectorConfig { amplification: 0, ..DetectorConfig::default() };
        assert!(silent.validate().is_err());
    }

    #[test]
    fn parses_risk_labels() {
        let labels = RiskLabels::parse("高风险, 中风险 ,低风险").unwrap();
        assert_eq!(labels.for_risk(RiskLevel::High), "高风险");
        assert_eq!(labels.for_risk(RiskLevel::Medium), "中风险");
        assert_eq!(labels.for_risk(RiskLevel::Unknown), "低风险");
        assert!(RiskLabels::parse("HIGH,LOW").is_err());
        assert_eq!(RiskLabels::default().for_risk(RiskLevel::High), "HIGH RISK");
    }
}
