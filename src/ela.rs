//! 误差等级分析 (Error Level Analysis)
//!
//! 原理：一张“只压缩过一次”的图，再按同一质量压一遍，各处误差大致均匀；
//! 被局部改过的区域压缩历史不同，误差会明显偏高。
//! 这里对多个质量各做一次重压缩，取综合分最高的那一档作为证据。

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, GrayImage, ImageFormat, Luma, RgbImage};
use tracing::{debug, warn};

use crate::config::{DetectorConfig, RegionConfig};
use crate::error::{Error, Result};
use crate::evidence::{RiskLevel, TamperReport, TamperVerdict};
use crate::fingerprint;
use crate::regions::RegionExtractor;

/// 单通道误差图，尺寸与原图一致
pub type ErrorMap = GrayImage;

/// 一组强度值的均值 / 总体标准差 / 最大值
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntensityStats {
    pub mean: f64,
    pub std_dev: f64,
    pub max: u8,
}

/// 两遍扫描：先求均值，再求方差。空输入全部为 0。
pub fn intensity_stats<I>(values: I) -> IntensityStats
where
    I: IntoIterator<Item = u8>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let (count, sum, max) = iter
        .clone()
        .fold((0u64, 0u64, 0u8), |(n, s, m), v| (n + 1, s + v as u64, m.max(v)));
    if count == 0 {
        return IntensityStats::default();
    }
    let mean = sum as f64 / count as f64;
    let var = iter.map(|v| (v as f64 - mean).powi(2)).sum::<f64>() / count as f64;
    IntensityStats { mean, std_dev: var.sqrt(), max }
}

/// 误差图的五项统计量
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ErrorLevelStats {
    pub std_dev: f64,
    pub mean: f64,
    pub max: u8,
    /// 强度 > 30 的像素占比
    pub frac_above_30: f64,
    /// 强度 > 100 的像素占比
    pub frac_above_100: f64,
}

impl ErrorLevelStats {
    pub fn measure(map: &ErrorMap) -> Self {
        let raw = map.as_raw();
        let base = intensity_stats(raw.iter().copied());
        let total = raw.len().max(1) as f64;
        let above = |t: u8| raw.iter().filter(|&&v| v > t).count() as f64 / total;
        Self {
            std_dev: base.std_dev,
            mean: base.mean,
            max: base.max,
            frac_above_30: above(30),
            frac_above_100: above(100),
        }
    }

    /// 综合分 = 0.4·σ + 0.3·μ + 0.1·max + 100·P(>30) + 200·P(>100)
    pub fn composite(&self) -> f64 {
        0.4 * self.std_dev
            + 0.3 * self.mean
            + 0.1 * self.max as f64
            + 100.0 * self.frac_above_30
            + 200.0 * self.frac_above_100
    }
}

/// 某一个质量档位的探测结果
#[derive(Debug, Clone)]
pub struct QualityProbe {
    pub quality: u8,
    pub stats: ErrorLevelStats,
    pub score: f64,
    pub error_map: ErrorMap,
}

/// 一次完整取证的产出：报告 + 可视化所需的中间图
#[derive(Debug, Clone)]
pub struct Inspection {
    pub report: TamperReport,
    /// 胜出档位的误差图；解码失败时为 None
    pub error_map: Option<ErrorMap>,
    /// 解码后的原图，用来画标注框
    pub image: Option<RgbImage>,
}

/// 篡改检测器
///
/// 无内部可变状态，可以在多个请求间共享 (`Arc`)，每次调用的缓冲区都是局部的。
#[derive(Debug, Clone)]
pub struct TamperingDetector {
    config: DetectorConfig,
    extractor: RegionExtractor,
}

impl TamperingDetector {
    pub fn new(config: DetectorConfig, regions: RegionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            extractor: RegionExtractor::new(regions),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// 从原始字节开始的完整流程，任何失败都折叠为 ERROR 报告
    pub fn inspect(&self, bytes: &[u8]) -> Inspection {
        match fingerprint::decode_rgb(bytes) {
            Ok(image) => self.inspect_image(image),
            Err(e) => {
                warn!("❌ 图片无法解码: {}", e);
                Inspection { report: TamperReport::error(), error_map: None, image: None }
            }
        }
    }

    pub fn inspect_image(&self, image: RgbImage) -> Inspection {
        let best = match self.analyze(&image) {
            Ok(best) => best,
            Err(e) => {
                warn!("❌ ELA 重压缩失败: {}", e);
                return Inspection { report: TamperReport::error(), error_map: None, image: Some(image) };
            }
        };

        let regions = self.extractor.extract(&best.error_map);
        let verdict = self.classify(best.score);
        debug!(
            "ELA 完成: quality={}, score={:.2}, verdict={:?}, regions={}",
            best.quality,
            best.score,
            verdict,
            regions.len()
        );

        let report = TamperReport {
            verdict,
            score: best.score,
            risk_level: RiskLevel::for_report(verdict, best.score),
            regions,
            quality_used: best.quality,
        };
        Inspection { report, error_map: Some(best.error_map), image: Some(image) }
    }

    /// 严格大于阈值才算篡改：8.0 -> GENUINE, 8.01 -> TAMPERED
    pub fn classify(&self, score: f64) -> TamperVerdict {
        if score > self.config.tamper_threshold {
            TamperVerdict::Tampered
        } else {
            TamperVerdict::Genuine
        }
    }

    /// 对所有质量档位做纯折叠，返回综合分最高的一档。
    /// 平分时保留先出现的档位。
    pub fn analyze(&self, image: &RgbImage) -> Result<QualityProbe> {
        let mut probes = self.config.qualities.iter().map(|&q| self.probe(image, q));
        let first = probes
            .next()
            .ok_or_else(|| Error::Config("没有可用的重压缩质量".into()))??;
        probes.try_fold(first, |best, next| {
            let next = next?;
            Ok(if next.score > best.score { next } else { best })
        })
    }

    /// 单个质量档位：重压缩 -> 差值 -> 放大 -> 灰度 -> 统计
    pub fn probe(&self, image: &RgbImage, quality: u8) -> Result<QualityProbe> {
        let recompressed = recompress(image, quality)?;
        let error_map = amplified_difference(image, &recompressed, self.config.amplification);
        let stats = ErrorLevelStats::measure(&error_map);
        let score = stats.composite();
        debug!("  quality={} score={:.3}", quality, score);
        Ok(QualityProbe { quality, stats, score, error_map })
    }
}

/// 内存里 JPEG 编码再解码回像素，不落盘
pub fn recompress(image: &RgbImage, quality: u8) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode(
        image.as_raw(),
        width,
        height,
        ColorType::Rgb8,
    )?;
    let decoded = image::load_from_memory_with_format(&buf, ImageFormat::Jpeg)?.to_rgb8();

    if decoded.dimensions() != (width, height) {
        return Ok(imageops::resize(&decoded, width, height, FilterType::Triangle));
    }
    Ok(decoded)
}

/// |a - b| * amp (饱和到 255)，再转单通道亮度
pub fn amplified_difference(original: &RgbImage, other: &RgbImage, amplification: u8) -> ErrorMap {
    let (width, height) = original.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let a = original.get_pixel(x, y).0;
        let b = other.get_pixel(x, y).0;
        let amp = |c: usize| (a[c] as i16 - b[c] as i16).unsigned_abs().min(255) as u8;
        let boosted = |c: usize| amp(c).saturating_mul(amplification);
        Luma([luma(boosted(0), boosted(1), boosted(2))])
    })
}

/// BT.601 定点亮度，14 位精度并四舍五入
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + 8192) >> 14;
    y.min(255) as u8
}
