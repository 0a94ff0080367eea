use crate::evidence::{Confidence, TamperReport, TamperVerdict, VerificationMethod, VerificationVerdict};
use crate::record::ValidationResult;

/// 判决仲裁：无状态
///
/// 只要库里找到了记录，就以数据库为准；像素取证只在没有命中时才有发言权。
/// 数据库记录的是签发事实，ELA 只是启发式信号。
pub struct VerdictArbiter;

impl VerdictArbiter {
    pub fn decide(validation: &ValidationResult, tamper: &TamperReport) -> VerificationVerdict {
        if validation.is_found() && validation.is_valid {
            let mut note = format!(
                "Certificate verified through database (Accuracy: {:.1}%)",
                validation.accuracy
            );
            if tamper.verdict != TamperVerdict::Genuine {
                note.push_str(&format!(
                    ". Note: ELA reported {} (Score: {:.2}), but database verification takes priority.",
                    tamper.verdict, tamper.score
                ));
            }
            return VerificationVerdict {
                verified: true,
                method: VerificationMethod::DatabaseVerified,
                confidence: if validation.accuracy >= 90.0 { Confidence::High } else { Confidence::Medium },
                note,
            };
        }

        if validation.is_found() {
            return VerificationVerdict {
                verified: false,
                method: VerificationMethod::DatabaseInvalid,
                confidence: Confidence::High,
                note: format!(
                    "Certificate found in database but marked as invalid (Accuracy: {:.1}%)",
                    validation.accuracy
                ),
            };
        }

        let genuine = tamper.is_genuine();
        VerificationVerdict {
            verified: genuine,
            method: VerificationMethod::ElaOnly,
            confidence: if genuine { Confidence::Medium } else { Confidence::Low },
            note: format!(
                "No database match found. Verification based on ELA analysis: {} (Score: {:.2})",
                tamper.verdict, tamper.score
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::RiskLevel;
    use crate::record::ValidationStatus;

    fn report(verdict: TamperVerdict, score: f64) -> TamperReport {
        TamperReport {
            verdict,
            score,
            risk_level: RiskLevel::for_report(verdict, score),
            regions: Vec::new(),
            quality_used: 85,
        }
    }

    fn found(accuracy: f64, is_valid: bool) -> ValidationResult {
        ValidationResult {
            status: ValidationStatus::Found,
            accuracy,
            is_valid,
            is_verified: is_valid,
            matched_record: None,
            field_comparisons: Vec::new(),
            message: String::new(),
        }
    }

    #[test]
    fn database_beats_tampered_ela() {
        let verdict = VerdictArbiter::decide(&found(100.0, true), &report(TamperVerdict::Tampered, 30.0));
        assert!(verdict.verified);
        assert_eq!(verdict.method, VerificationMethod::DatabaseVerified);
        assert_eq!(verdict.confidence, Confidence::High);
        assert!(verdict.note.contains("database verification takes priority"));
    }

    #[test]
    fn moderate_accuracy_gives_medium_confidence() {
        let verdict = VerdictArbiter::decide(&found(85.0, true), &report(TamperVerdict::Genuine, 2.0));
        assert_eq!(verdict.confidence, Confidence::Medium);
        assert!(!verdict.note.contains("priority"));
    }

    #[test]
    fn invalid_record_is_rejected_with_high_confidence() {
        let verdict = VerdictArbiter::decide(&found(100.0, false), &report(TamperVerdict::Genuine, 1.0));
        assert!(!verdict.verified);
        assert_eq!(verdict.method, VerificationMethod::DatabaseInvalid);
        assert_eq!(verdict.confidence, Confidence::High);
    }

    #[test]
    fn fallback_to_ela() {
        let miss = ValidationResult::unmatched(ValidationStatus::NotFound, "miss");

        let genuine = VerdictArbiter::decide(&miss, &report(TamperVerdict::Genuine, 5.0));
        assert!(genuine.verified);
        assert_eq!(genuine.method, VerificationMethod::ElaOnly);
        assert_eq!(genuine.confidence, Confidence::Medium);

        let tampered = VerdictArbiter::decide(&miss, &report(TamperVerdict::Tampered, 12.0));
        assert!(!tampered.verified);
        assert_eq!(tampered.confidence, Confidence::Low);

        let broken = VerdictArbiter::decide(
            &ValidationResult::unmatched(ValidationStatus::Error, "io"),
            &TamperReport::error(),
        );
        assert!(!broken.verified);
        assert_eq!(broken.method, VerificationMethod::ElaOnly);
        assert_eq!(broken.confidence, Confidence::Low);
    }
}
