use std::fmt;

use serde::{Deserialize, Serialize};

/// 字段取值：OCR 侧可能给字符串也可能给数字（cgpa）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// 数值视图；字符串会尝试解析，失败返回 None
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// 比较用的规范化文本：小写 + 去首尾空白
    pub fn normalized(&self) -> String {
        self.to_string().trim().to_lowercase()
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

/// 参与比对的五个标准字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    StudentName,
    RollNumber,
    InstitutionName,
    Course,
    Cgpa,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::StudentName,
        Field::RollNumber,
        Field::InstitutionName,
        Field::Course,
        Field::Cgpa,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::StudentName => "Student Name",
            Field::RollNumber => "Roll Number",
            Field::InstitutionName => "Institution Name",
            Field::Course => "Course",
            Field::Cgpa => "CGPA",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Field::Cgpa)
    }
}

/// 外部 OCR/NER 抽取出的字段，只有成功抽取的键才会出现
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution_name: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cgpa: Option<FieldValue>,
}

impl ExtractedFields {
    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        match field {
            Field::StudentName => self.student_name.as_ref(),
            Field::RollNumber => self.roll_number.as_ref(),
            Field::InstitutionName => self.institution_name.as_ref(),
            Field::Course => self.course.as_ref(),
            Field::Cgpa => self.cgpa.as_ref(),
        }
    }

    pub fn with(mut self, field: Field, value: impl Into<FieldValue>) -> Self {
        let value = Some(value.into());
        match field {
            Field::StudentName => self.student_name = value,
            Field::RollNumber => self.roll_number = value,
            Field::InstitutionName => self.institution_name = value,
            Field::Course => self.course = value,
            Field::Cgpa => self.cgpa = value,
        }
        self
    }

    pub fn len(&self) -> usize {
        Field::ALL.iter().filter(|f| self.get(**f).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 可信库里的一条证书记录（外部拥有，只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedRecord {
    pub id: u64,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub roll_number: Option<String>,
    #[serde(default)]
    pub institution_name: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub cgpa: Option<FieldValue>,
    #[serde(default)]
    pub verified_status: bool,
}

impl TrustedRecord {
    pub fn get(&self, field: Field) -> Option<FieldValue> {
        let text = |v: &Option<String>| v.as_deref().map(FieldValue::from);
        match field {
            Field::StudentName => text(&self.student_name),
            Field::RollNumber => text(&self.roll_number),
            Field::InstitutionName => text(&self.institution_name),
            Field::Course => text(&self.course),
            Field::Cgpa => self.cgpa.clone(),
        }
    }
}

/// 单字段比对结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldComparison {
    pub field: Field,
    pub extracted_value: FieldValue,
    pub record_value: FieldValue,
    pub is_match: bool,
    /// 0 / 0.7 / 1.0
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Found,
    NotFound,
    NoDatabase,
    Error,
}

/// 数据库核验结论
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub status: ValidationStatus,
    /// [0, 100]；没有可比字段时为 0
    pub accuracy: f64,
    pub is_valid: bool,
    pub is_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_record: Option<TrustedRecord>,
    #[serde(default)]
    pub field_comparisons: Vec<FieldComparison>,
    pub message: String,
}

impl ValidationResult {
    /// 没找到记录 / 没有库 / 记录源出错：一律零分、无效
    pub fn unmatched(status: ValidationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            accuracy: 0.0,
            is_valid: false,
            is_verified: false,
            matched_record: None,
            field_comparisons: Vec::new(),
            message: message.into(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.status == ValidationStatus::Found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracted_fields_accept_mixed_json() {
        let json = r#"{"studentName":"Rahul Sharma","rollNumber":"IITD2021001","cgpa":8.7}"#;
        let fields: ExtractedFields = serde_json::from_str(json).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get(Field::Cgpa), Some(&FieldValue::Number(8.7)));
        assert!(fields.course.is_none());

        let as_text: ExtractedFields = serde_json::from_str(r#"{"cgpa":"8.7"}"#).unwrap();
        assert_eq!(as_text.get(Field::Cgpa).and_then(FieldValue::as_number), Some(8.7));
    }

    #[test]
    fn record_defaults_missing_fields() {
        let json = r#"{"id":7,"studentName":"Asha","verifiedStatus":true}"#;
        let record: TrustedRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.get(Field::StudentName), Some(FieldValue::from("Asha")));
        assert_eq!(record.get(Field::Course), None);
        assert!(record.verified_status);
    }

    #[test]
    fn unparsable_number_is_none() {
        assert_eq!(FieldValue::from("eight point five").as_number(), None);
        assert_eq!(FieldValue::from(" 9.1 ").as_number(), Some(9.1));
    }
}
