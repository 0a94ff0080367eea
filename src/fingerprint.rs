use image::RgbImage;
use sha2::{Digest, Sha256}; // 引入 SHA2 算法和 Digest 特性(方法集)

use crate::error::Result;

/// 原始字节的 SHA256 (小写 Hex)
///
/// 哪怕只改了一个字节，这个值都会雪崩式变化；用于回执防“调包”，
/// 也用于给同名请求生成互不冲突的产物文件名。
pub fn image_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// 解码任意常见栅格格式，并统一成 RGB8
///
/// 带 alpha 的 PNG 直接丢弃透明通道，灰度图复制成三通道。
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}
