use thiserror::Error;

/// 核心库统一的结果类型
pub type Result<T> = std::result::Result<T, Error>;

/// 核心引擎错误
///
/// 注意：图片解码失败 **不会** 走这里，检测器会把它折叠成 `ERROR` 判决。
/// 这里只覆盖真正需要调用方处理的情况（配置、记录源、产物落盘、账本）。
#[derive(Error, Debug)]
pub enum Error {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("图片编解码失败: {0}")]
    Image(#[from] image::ImageError),

    #[error("记录源不可用: {0}")]
    RecordSource(String),

    #[error("JSON 解析/序列化失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("产物写入失败: {0}")]
    Artifact(String),

    #[error("账本错误: {0}")]
    Ledger(String),
}
