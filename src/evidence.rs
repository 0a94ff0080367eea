use std::fmt;

use serde::{Deserialize, Serialize}; // 所有结论都要能序列化成 JSON 交给 API 层

// ==========================================
// 1. 像素取证结论 (ELA)
// ==========================================

/// ELA 判决
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TamperVerdict {
    Genuine,
    Tampered,
    /// 图片无法解码，其余字段全部为零值
    Error,
}

impl fmt::Display for TamperVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TamperVerdict::Genuine => "GENUINE",
            TamperVerdict::Tampered => "TAMPERED",
            TamperVerdict::Error => "ERROR",
        })
    }
}

/// 风险等级
///
/// 同一套分档既用于整图判决的严重度，也用于单个可疑区域的标注颜色，
/// 但两者的阈值不同，见 [`RiskLevel::for_report`] / [`RiskLevel::for_region`]。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    /// 整图风险：只有判定为 TAMPERED 时才分档，GENUINE 一律 LOW
    pub fn for_report(verdict: TamperVerdict, score: f64) -> Self {
        match verdict {
            TamperVerdict::Error => RiskLevel::Unknown,
            TamperVerdict::Genuine => RiskLevel::Low,
            TamperVerdict::Tampered if score > 25.0 => RiskLevel::High,
            TamperVerdict::Tampered if score > 15.0 => RiskLevel::Medium,
            TamperVerdict::Tampered => RiskLevel::Low,
        }
    }

    /// 区域风险：只决定标注颜色，不参与整体判决
    pub fn for_region(severity: f64) -> Self {
        if severity > 50.0 {
            RiskLevel::High
        } else if severity > 25.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// 可疑区域：原图像素坐标系下的轴对齐矩形
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// 区域内误差强度的 均值 + 标准差
    pub severity_score: f64,
    pub risk: RiskLevel,
}

/// ELA 报告，一经生成不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TamperReport {
    pub verdict: TamperVerdict,
    pub score: f64,
    pub risk_level: RiskLevel,
    /// 按 severity 降序，最多 5 个
    pub regions: Vec<SuspiciousRegion>,
    /// 胜出的 JPEG 重压缩质量；解码失败时为 0
    pub quality_used: u8,
}

impl TamperReport {
    /// 解码失败时的兜底报告
    pub fn error() -> Self {
        Self {
            verdict: TamperVerdict::Error,
            score: 0.0,
            risk_level: RiskLevel::Unknown,
            regions: Vec::new(),
            quality_used: 0,
        }
    }

    pub fn is_genuine(&self) -> bool {
        self.verdict == TamperVerdict::Genuine
    }
}

// ==========================================
// 2. 最终裁决
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    DatabaseVerified,
    DatabaseInvalid,
    ElaOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationVerdict {
    pub verified: bool,
    pub method: VerificationMethod,
    pub confidence: Confidence,
    /// 给人看的判决说明
    pub note: String,
}

// ==========================================
// 3. 存证回执 (写入 MMR 账本的叶子)
// ==========================================

/// 一次核验的可审计摘要
///
/// 只存指纹和结论，不存图片本身；序列化后签名并追加进账本。
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VerdictReceipt {
    // 原图字节的 SHA256 (Hex)，用来防止“调包”
    pub image_sha256: String,

    // === 像素取证 ===
    pub tamper_verdict: TamperVerdict,
    pub tamper_score: f64,
    pub quality_used: u8,

    // === 数据库核验 ===
    pub matched_record_id: Option<u64>,
    pub accuracy: f64,

    // === 裁决 ===
    pub verified: bool,
    pub method: VerificationMethod,
    pub confidence: Confidence,

    // Unix 时间戳（秒）
    pub timestamp: i64,
}
