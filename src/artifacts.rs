use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::config::{ArtifactConfig, ArtifactFormat, ArtifactNaming, RiskLabels};
use crate::ela::Inspection;
use crate::error::{Error, Result};
use crate::evidence::{RiskLevel, SuspiciousRegion};

/// 生成的可视化产物路径，交给外部文件服务
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPaths {
    pub error_map: Option<PathBuf>,
    pub marked: Option<PathBuf>,
}

/// 把误差图和标注图写进 scratch 目录
///
/// 先写同目录临时文件再原子改名，并发请求看不到写了一半的文件。
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    config: ArtifactConfig,
    labeler: Option<RegionLabeler>,
}

impl ArtifactWriter {
    pub fn new(config: ArtifactConfig) -> Result<Self> {
        fs::create_dir_all(&config.scratch_dir)?;
        let labeler = match &config.label_font {
            Some(path) => Some(RegionLabeler::load(path, config.risk_labels.clone(), config.label_scale)?),
            None => None,
        };
        Ok(Self { config, labeler })
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.config.scratch_dir
    }

    /// 由调用方给的名字（通常是上传文件名）和图片摘要得到产物前缀
    pub fn base_name(&self, requested: &str, image_sha256: &str) -> String {
        let stem = Path::new(requested)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let mut base: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if base.is_empty() {
            base.push_str("upload");
        }

        match self.config.naming {
            ArtifactNaming::Original => base,
            ArtifactNaming::Digest => {
                let prefix = &image_sha256[..image_sha256.len().min(12)];
                format!("{}_{}", base, prefix)
            }
        }
    }

    pub fn write(&self, base: &str, inspection: &Inspection) -> Result<ArtifactPaths> {
        let ext = self.config.format.extension();
        let mut paths = ArtifactPaths::default();

        if let Some(map) = &inspection.error_map {
            let name = format!("{}_{}.{}", base, self.config.error_map_suffix, ext);
            paths.error_map = Some(self.persist(&name, &DynamicImage::ImageLuma8(map.clone()))?);
        }
        if let Some(image) = &inspection.image {
            let marked = render_marked(image, &inspection.report.regions, self.labeler.as_ref());
            let name = format!("{}_{}.{}", base, self.config.marked_suffix, ext);
            paths.marked = Some(self.persist(&name, &DynamicImage::ImageRgb8(marked))?);
        }

        info!("🖼️ 产物已生成: {:?} / {:?}", paths.error_map, paths.marked);
        Ok(paths)
    }

    fn persist(&self, file_name: &str, image: &DynamicImage) -> Result<PathBuf> {
        let dir = &self.config.scratch_dir;
        let mut tmp = NamedTempFile::new_in(dir)?;
        let format = match self.config.format {
            ArtifactFormat::Jpeg => ImageOutputFormat::Jpeg(90),
            ArtifactFormat::Png => ImageOutputFormat::Png,
        };
        image.write_to(&mut tmp, format)?;

        let target = dir.join(file_name);
        tmp.persist(&target)
            .map_err(|e| Error::Artifact(format!("{}: {}", target.display(), e)))?;
        Ok(target)
    }
}

/// 区域颜色与线宽：红 / 橙 / 黄
pub fn tier_style(risk: RiskLevel) -> (Rgb<u8>, i32) {
    match risk {
        RiskLevel::High => (Rgb([255, 0, 0]), 3),
        RiskLevel::Medium => (Rgb([255, 165, 0]), 2),
        RiskLevel::Low | RiskLevel::Unknown => (Rgb([255, 255, 0]), 2),
    }
}

/// 框上方的风险文字
#[derive(Debug, Clone)]
pub struct RegionLabeler {
    font: Font<'static>,
    labels: RiskLabels,
    scale: Scale,
}

impl RegionLabeler {
    pub fn new(font: Font<'static>, labels: RiskLabels, pixel_height: f32) -> Self {
        Self { font, labels, scale: Scale::uniform(pixel_height) }
    }

    pub fn load(path: &Path, labels: RiskLabels, pixel_height: f32) -> Result<Self> {
        let font = Font::try_from_vec(fs::read(path)?)
            .ok_or_else(|| Error::Config(format!("无法解析字体: {}", path.display())))?;
        info!("🔤 标注字体已加载: {}", path.display());
        Ok(Self::new(font, labels, pixel_height))
    }

    /// 文字基线落在框顶上方 10px，超出画布的部分直接裁掉
    pub fn draw(&self, canvas: &mut RgbImage, region: &SuspiciousRegion, color: Rgb<u8>) {
        let ascent = self.font.v_metrics(self.scale).ascent;
        let top = (region.y as f32 - 10.0 - ascent).max(0.0) as u32;
        let text = self.labels.for_risk(region.risk);
        draw_text_mut(canvas, color, region.x, top, self.scale, &self.font, text);
    }
}

/// 在原图副本上画出可疑区域框；给了 labeler 时再写上风险档位
pub fn render_marked(image: &RgbImage, regions: &[SuspiciousRegion], labeler: Option<&RegionLabeler>) -> RgbImage {
    let mut canvas = image.clone();
    for region in regions {
        let (color, thickness) = tier_style(region.risk);
        for t in 0..thickness {
            let rect = Rect::at(region.x as i32 - t, region.y as i32 - t)
                .of_size(region.width + 2 * t as u32, region.height + 2 * t as u32);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
        if let Some(labeler) = labeler {
            labeler.draw(&mut canvas, region, color);
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::TamperReport;
    use image::GrayImage;

    fn region(risk: RiskLevel) -> SuspiciousRegion {
        SuspiciousRegion { x: 10, y: 10, width: 30, height: 25, severity_score: 60.0, risk }
    }

    fn writer(dir: &Path, naming: ArtifactNaming) -> ArtifactWriter {
        ArtifactWriter::new(ArtifactConfig {
            scratch_dir: dir.to_path_buf(),
            naming,
            format: ArtifactFormat::Png,
            ..ArtifactConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn marks_region_border_in_tier_colour() {
        let image = RgbImage::new(64, 64);
        let marked = render_marked(&image, &[region(RiskLevel::High)], None);
        assert_eq!(*marked.get_pixel(10, 10), Rgb([255, 0, 0]));
        // 线宽 3：向外扩两圈
        assert_eq!(*marked.get_pixel(8, 20), Rgb([255, 0, 0]));
        // 框内部保持原样
        assert_eq!(*marked.get_pixel(20, 20), Rgb([0, 0, 0]));
        // 原图不被修改
        assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    const SYSTEM_FONTS: [&str; 3] = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/Library/Fonts/Arial Unicode.ttf",
    ];

    fn system_font() -> Option<&'static Path> {
        SYSTEM_FONTS.iter().map(Path::new).find(|p| p.exists())
    }

    // 框上方 30px 的条带里有没有被画过的像素
    fn band_above_is_touched(image: &RgbImage, region: &SuspiciousRegion) -> bool {
        (region.y - 30..region.y - 3)
            .flat_map(|y| (region.x..region.x + 80).map(move |x| (x, y)))
            .any(|(x, y)| *image.get_pixel(x, y) != Rgb([0, 0, 0]))
    }

    #[test]
    fn labels_are_drawn_above_regions_when_font_configured() {
        let Some(font) = system_font() else {
            eprintln!("⚠️  no system TTF found, skipping label rendering check");
            return;
        };
        let labeler = RegionLabeler::load(font, RiskLabels::default(), 20.0).unwrap();
        let image = RgbImage::new(160, 120);
        let target = SuspiciousRegion { x: 20, y: 60, width: 60, height: 40, severity_score: 60.0, risk: RiskLevel::High };

        let plain = render_marked(&image, &[target.clone()], None);
        assert!(!band_above_is_touched(&plain, &target));

        let labelled = render_marked(&image, &[target.clone()], Some(&labeler));
        assert!(band_above_is_touched(&labelled, &target));
        // 文字用档位颜色：红色通道有值，绿/蓝保持 0
        let text_pixel = (target.y - 30..target.y - 3)
            .flat_map(|y| (target.x..target.x + 80).map(move |x| (x, y)))
            .map(|(x, y)| *labelled.get_pixel(x, y))
            .find(|p| *p != Rgb([0, 0, 0]))
            .unwrap();
        assert!(text_pixel[0] > 0 && text_pixel[1] == 0 && text_pixel[2] == 0);
    }

    #[test]
    fn region_at_top_edge_is_labelled_without_panicking() {
        let Some(font) = system_font() else { return };
        let labeler = RegionLabeler::load(font, RiskLabels::default(), 20.0).unwrap();
        let image = RgbImage::new(64, 64);
        render_marked(&image, &[region(RiskLevel::Low)], Some(&labeler));
    }

    #[test]
    fn unreadable_font_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.ttf");
        fs::write(&bogus, b"not a font").unwrap();
        let result = ArtifactWriter::new(ArtifactConfig {
            scratch_dir: dir.path().to_path_buf(),
            label_font: Some(bogus),
            ..ArtifactConfig::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn base_names_follow_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let digest = "0123456789abcdef0123";

        let original = writer(dir.path(), ArtifactNaming::Original);
        assert_eq!(original.base_name("scan 01.jpg", digest), "scan_01");
        assert_eq!(original.base_name("", digest), "upload");

        let hashed = writer(dir.path(), ArtifactNaming::Digest);
        assert_eq!(hashed.base_name("scan.jpg", digest), "scan_0123456789ab");
    }

    #[test]
    fn writes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let inspection = Inspection {
            report: TamperReport::error(),
            error_map: Some(GrayImage::new(16, 16)),
            image: Some(RgbImage::new(16, 16)),
        };

        let paths = writer(dir.path(), ArtifactNaming::Original).write("cert", &inspection).unwrap();
        let error_map = paths.error_map.unwrap();
        let marked = paths.marked.unwrap();
        assert_eq!(error_map, dir.path().join("cert_noise.png"));
        assert_eq!(marked, dir.path().join("cert_tampered.png"));
        assert!(error_map.exists() && marked.exists());
        assert_eq!(image::open(&error_map).unwrap().to_luma8().dimensions(), (16, 16));
    }

    #[test]
    fn nothing_written_without_decoded_image() {
        let dir = tempfile::tempdir().unwrap();
        let inspection = Inspection { report: TamperReport::error(), error_map: None, image: None };
        let paths = writer(dir.path(), ArtifactNaming::Digest).write("cert", &inspection).unwrap();
        assert_eq!(paths, ArtifactPaths::default());
    }
}
