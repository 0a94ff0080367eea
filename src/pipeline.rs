use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::arbiter::VerdictArbiter;
use crate::artifacts::{ArtifactPaths, ArtifactWriter};
use crate::ela::TamperingDetector;
use crate::error::Result;
use crate::evidence::{TamperReport, VerdictReceipt, VerificationVerdict};
use crate::fingerprint;
use crate::matcher;
use crate::record::{ExtractedFields, ValidationResult, ValidationStatus};
use crate::record_store::RecordSource;

/// 一次完整核验的全部产出
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub image_sha256: String,
    pub extracted_fields: ExtractedFields,
    pub tamper: TamperReport,
    pub validation: ValidationResult,
    pub verdict: VerificationVerdict,
    pub artifacts: ArtifactPaths,
}

impl VerificationOutcome {
    /// 提炼成可签名、可入账的回执
    pub fn receipt(&self, timestamp: i64) -> VerdictReceipt {
        VerdictReceipt {
            image_sha256: self.image_sha256.clone(),
            tamper_verdict: self.tamper.verdict,
            tamper_score: self.tamper.score,
            quality_used: self.tamper.quality_used,
            matched_record_id: self.validation.matched_record.as_ref().map(|r| r.id),
            accuracy: self.validation.accuracy,
            verified: self.verdict.verified,
            method: self.verdict.method,
            confidence: self.verdict.confidence,
            timestamp,
        }
    }
}

/// 核验流水线：解码 -> ELA -> 区域 -> 找记录 -> 比字段 -> 仲裁
///
/// 全程同步执行，所有中间缓冲都是调用局部的；共享的只有记录源和产物目录。
pub struct CertificateVerifier {
    detector: TamperingDetector,
    records: Arc<dyn RecordSource>,
    artifacts: Option<ArtifactWriter>,
}

impl CertificateVerifier {
    pub fn new(
        detector: TamperingDetector,
        records: Arc<dyn RecordSource>,
        artifacts: Option<ArtifactWriter>,
    ) -> Self {
        Self { detector, records, artifacts }
    }

    pub fn detector(&self) -> &TamperingDetector {
        &self.detector
    }

    /// 记录源当前条数；不可用时返回 None
    pub fn record_count(&self) -> Option<usize> {
        self.records.records().ok().map(|r| r.len())
    }

    /// 只做数据库核验；记录源故障降级为 `error` 状态
    pub fn validate(&self, fields: &ExtractedFields) -> ValidationResult {
        match self.records.records() {
            Ok(records) => matcher::validate(fields, &records),
            Err(e) => {
                warn!("❌ 记录源不可用: {}", e);
                ValidationResult::unmatched(ValidationStatus::Error, e.to_string())
            }
        }
    }

    /// `name` 是调用方给的文件名，只用于产物命名
    pub fn verify(&self, image: &[u8], name: &str, fields: &ExtractedFields) -> Result<VerificationOutcome> {
        let image_sha256 = fingerprint::image_sha256(image);

        let inspection = self.detector.inspect(image);
        info!(
            "🔬 ELA: {} (score={:.2}, quality={}, regions={})",
            inspection.report.verdict,
            inspection.report.score,
            inspection.report.quality_used,
            inspection.report.regions.len()
        );

        let validation = self.validate(fields);
        info!("🗄️ 数据库: {:?} (accuracy={:.1}%)", validation.status, validation.accuracy);

        let verdict = VerdictArbiter::decide(&validation, &inspection.report);
        info!(
            "⚖️ 裁决: verified={}, method={:?}, confidence={:?}",
            verdict.verified, verdict.method, verdict.confidence
        );

        let artifacts = match &self.artifacts {
            Some(writer) => writer.write(&writer.base_name(name, &image_sha256), &inspection)?,
            None => ArtifactPaths::default(),
        };

        Ok(VerificationOutcome {
            image_sha256,
            extracted_fields: fields.clone(),
            tamper: inspection.report,
            validation,
            verdict,
            artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, RegionConfig};
    use crate::error::Error;
    use crate::evidence::{TamperVerdict, VerificationMethod};
    use crate::record::TrustedRecord;

    struct BrokenSource;

    impl RecordSource for BrokenSource {
        fn records(&self) -> Result<Vec<TrustedRecord>> {
            Err(Error::RecordSource("connection refused".into()))
        }
    }

    fn verifier(records: Arc<dyn RecordSource>) -> CertificateVerifier {
        let detector = TamperingDetector::new(DetectorConfig::default(), RegionConfig::default()).unwrap();
        CertificateVerifier::new(detector, records, None)
    }

    #[test]
    fn record_source_failure_degrades_to_error_status() {
        let v = verifier(Arc::new(BrokenSource));
        let result = v.validate(&ExtractedFields::default());
        assert_eq!(result.status, ValidationStatus::Error);
        assert_eq!(result.accuracy, 0.0);
        assert!(!result.is_valid);
    }

    #[test]
    fn undecodable_image_still_produces_a_verdict() {
        let v = verifier(Arc::new(Vec::<TrustedRecord>::new()));
        let outcome = v.verify(b"garbage", "x.jpg", &ExtractedFields::default()).unwrap();
        assert_eq!(outcome.tamper.verdict, TamperVerdict::Error);
        assert_eq!(outcome.validation.status, ValidationStatus::NoDatabase);
        assert!(!outcome.verdict.verified);
        assert_eq!(outcome.verdict.method, VerificationMethod::ElaOnly);
        assert_eq!(outcome.artifacts, ArtifactPaths::default());

        let receipt = outcome.receipt(42);
        assert_eq!(receipt.timestamp, 42);
        assert_eq!(receipt.image_sha256, fingerprint::image_sha256(b"garbage"));
    }
}
