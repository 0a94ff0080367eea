use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::record::TrustedRecord;

/// 可信记录来源
///
/// 持久化方式不归核心管，核心只拿一份只读快照。实现必须可以被多个请求并发调用。
pub trait RecordSource: Send + Sync {
    fn records(&self) -> Result<Vec<TrustedRecord>>;
}

/// 内存里现成的一批记录（测试、基准、嵌入式调用）
impl RecordSource for Vec<TrustedRecord> {
    fn records(&self) -> Result<Vec<TrustedRecord>> {
        Ok(self.clone())
    }
}

/// JSON 数组文件：`[{"id":1,"studentName":...,"verifiedStatus":true}, ...]`
///
/// 每次调用都重新读文件，外部更新记录后无需重启服务。
/// 文件不存在视为空库（上层据此给出 `no_database`），格式错误则返回 Err。
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for JsonRecordStore {
    fn records(&self) -> Result<Vec<TrustedRecord>> {
        if !self.path.exists() {
            warn!("⚠️ 记录文件不存在，按空库处理: {}", self.path.display());
            return Ok(Vec::new());
        }
        let raw = fs::read(&self.path)
            .map_err(|e| Error::RecordSource(format!("{}: {}", self.path.display(), e)))?;
        let records: Vec<TrustedRecord> = serde_json::from_slice(&raw)?;
        info!("📚 记录库加载完成 ({} 条)", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRecordStore::new(dir.path().join("absent.json"));
        assert!(store.records().unwrap().is_empty());
    }

    #[test]
    fn loads_record_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id":1,"studentName":"Rahul Sharma","rollNumber":"IITD2021001","cgpa":8.7,"verifiedStatus":true}}]"#
        )
        .unwrap();

        let records = JsonRecordStore::new(file.path()).records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].roll_number.as_deref(), Some("IITD2021001"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            JsonRecordStore::new(file.path()).records(),
            Err(Error::Json(_))
        ));
    }
}
