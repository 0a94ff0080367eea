//! 结构化字段核验：先找记录，再逐字段打分

use tracing::debug;

use crate::record::{
    ExtractedFields, Field, FieldComparison, FieldValue, TrustedRecord, ValidationResult,
    ValidationStatus,
};

/// 判定有效所需的最低准确率（含）
pub const VALID_ACCURACY: f64 = 70.0;
/// 子串包含时的部分得分
pub const PARTIAL_SCORE: f64 = 0.7;
/// cgpa 允许的绝对误差（不含）
pub const CGPA_TOLERANCE: f64 = 0.1;

/// 在可信记录里找出与抽取字段对应的那一条
pub struct RecordResolver;

impl RecordResolver {
    /// 先按学号精确匹配（区分大小写），再按姓名互相包含匹配；取第一个命中
    pub fn resolve<'a>(fields: &ExtractedFields, records: &'a [TrustedRecord]) -> Option<&'a TrustedRecord> {
        if let Some(roll) = fields.roll_number.as_ref() {
            let roll = roll.to_string();
            if let Some(hit) = records
                .iter()
                .find(|r| r.roll_number.as_deref() == Some(roll.as_str()))
            {
                return Some(hit);
            }
        }

        // 纯子串包含：空名字（任一侧）会命中第一条记录
        let name = fields.student_name.as_ref()?.normalized();
        records.iter().find(|r| {
            let db_name = r
                .student_name
                .as_deref()
                .map(|n| n.trim().to_lowercase())
                .unwrap_or_default();
            db_name.contains(&name) || name.contains(&db_name)
        })
    }
}

/// 逐字段比对并给出总体准确率
pub struct FieldMatcher;

impl FieldMatcher {
    pub fn compare(fields: &ExtractedFields, record: &TrustedRecord) -> (Vec<FieldComparison>, f64) {
        let comparisons: Vec<FieldComparison> = Field::ALL
            .iter()
            .filter_map(|&field| {
                let extracted = fields.get(field)?.clone();
                let stored = record.get(field)?;
                let score = Self::score(field, &extracted, &stored);
                debug!("  {}: '{}' vs '{}' -> {:.1}", field.label(), extracted, stored, score);
                Some(FieldComparison {
                    field,
                    extracted_value: extracted,
                    record_value: stored,
                    is_match: score >= 1.0,
                    score,
                })
            })
            .collect();

        let accuracy = if comparisons.is_empty() {
            0.0
        } else {
            let total: f64 = comparisons.iter().map(|c| c.score).sum();
            100.0 * total / comparisons.len() as f64
        };
        (comparisons, accuracy)
    }

    pub fn score(field: Field, extracted: &FieldValue, stored: &FieldValue) -> f64 {
        if field.is_numeric() {
            return match (extracted.as_number(), stored.as_number()) {
                (Some(a), Some(b)) if (a - b).abs() < CGPA_TOLERANCE => 1.0,
                _ => 0.0,
            };
        }

        let a = extracted.normalized();
        let b = stored.normalized();
        if a == b {
            1.0
        } else if a.contains(&b) || b.contains(&a) {
            PARTIAL_SCORE
        } else {
            0.0
        }
    }

    /// 准确率达标且库里标记为已核验
    pub fn passes(accuracy: f64, verified_status: bool) -> bool {
        accuracy >= VALID_ACCURACY && verified_status
    }
}

/// 完整的数据库核验：空库 -> no_database，未命中 -> not_found
pub fn validate(fields: &ExtractedFields, records: &[TrustedRecord]) -> ValidationResult {
    if records.is_empty() {
        return ValidationResult::unmatched(ValidationStatus::NoDatabase, "No validation database provided");
    }

    let Some(record) = RecordResolver::resolve(fields, records) else {
        return ValidationResult::unmatched(ValidationStatus::NotFound, "No matching record found in database");
    };

    let (field_comparisons, accuracy) = FieldMatcher::compare(fields, record);
    let is_valid = FieldMatcher::passes(accuracy, record.verified_status);
    debug!(
        "记录 #{} 命中: accuracy={:.1}%, verified={}, valid={}",
        record.id, accuracy, record.verified_status, is_valid
    );

    ValidationResult {
        status: ValidationStatus::Found,
        accuracy,
        is_valid,
        is_verified: record.verified_status,
        matched_record: Some(record.clone()),
        field_comparisons,
        message: format!("Matched record {}", record.id),
    }
}
