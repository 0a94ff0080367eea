use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::record::ExtractedFields;

/// OCR + NER 协作方的接口
///
/// 文字识别和实体抽取都在核心之外完成；核心只通过这个能力拿结果，
/// 凭据、超时之类的事情都属于实现方。
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, image_path: &Path) -> Result<ExtractedFields>;
}

/// 读取外部识别服务写在图片旁边的 `<image>.fields.json`
///
/// 没有 sidecar 文件时返回空字段（后续核验会落到 not_found）。
#[derive(Debug, Clone, Default)]
pub struct SidecarExtractor;

impl SidecarExtractor {
    pub fn sidecar_path(image_path: &Path) -> PathBuf {
        let mut name = image_path.as_os_str().to_owned();
        name.push(".fields.json");
        PathBuf::from(name)
    }
}

impl FieldExtractor for SidecarExtractor {
    fn extract(&self, image_path: &Path) -> Result<ExtractedFields> {
        let sidecar = Self::sidecar_path(image_path);
        if !sidecar.exists() {
            debug!("没有字段 sidecar: {}", sidecar.display());
            return Ok(ExtractedFields::default());
        }
        let fields = serde_json::from_slice(&fs::read(&sidecar)?)?;
        Ok(fields)
    }
}
