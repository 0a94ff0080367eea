use std::collections::VecDeque;

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::config::RegionConfig;
use crate::ela::{intensity_stats, ErrorMap};
use crate::evidence::{RiskLevel, SuspiciousRegion};

const ON: u8 = 255;

/// 从误差图里圈出可疑区域
///
/// 流程：自适应二值化 -> 闭运算 -> 开运算 -> 外轮廓外接矩形 -> 尺寸/强度过滤 -> 排序截断。
#[derive(Debug, Clone)]
pub struct RegionExtractor {
    config: RegionConfig,
}

impl RegionExtractor {
    pub fn new(config: RegionConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, map: &ErrorMap) -> Vec<SuspiciousRegion> {
        let mask = self.clean(&self.binarize(map));
        let filled = fill_holes(&mask);

        let mut regions: Vec<SuspiciousRegion> = bounding_boxes(&filled)
            .into_iter()
            .filter(|b| b.width > self.config.min_side && b.height > self.config.min_side)
            .filter_map(|b| {
                let severity = severity(map, &b);
                (severity > self.config.min_severity).then(|| SuspiciousRegion {
                    x: b.x,
                    y: b.y,
                    width: b.width,
                    height: b.height,
                    severity_score: severity,
                    risk: RiskLevel::for_region(severity),
                })
            })
            .collect();

        // 稳定排序：同分时保留扫描顺序
        regions.sort_by(|a, b| b.severity_score.total_cmp(&a.severity_score));
        regions.truncate(self.config.max_regions);
        regions
    }

    /// max(下限, trunc(μ + kσ))
    pub fn threshold(&self, map: &ErrorMap) -> f64 {
        let stats = intensity_stats(map.as_raw().iter().copied());
        (stats.mean + self.config.sigma * stats.std_dev)
            .trunc()
            .max(self.config.threshold_floor)
    }

    pub fn binarize(&self, map: &ErrorMap) -> GrayImage {
        let threshold = self.threshold(map);
        GrayImage::from_fn(map.width(), map.height(), |x, y| {
            if map.get_pixel(x, y)[0] as f64 > threshold {
                Luma([ON])
            } else {
                Luma([0])
            }
        })
    }

    /// 先闭后开：合并相邻可疑点，再抹掉孤立噪点
    pub fn clean(&self, mask: &GrayImage) -> GrayImage {
        let k = self.config.kernel_radius;
        let closed = morphology::close(mask, Norm::LInf, k);
        morphology::open(&closed, Norm::LInf, k)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundingBox {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// 把被前景包围的背景（洞）填平。
///
/// 只保留外轮廓：洞里的小连通块并入外层区域，不单独成框。
/// 前景按 8 邻接，所以背景按 4 邻接从边界泛洪。
fn fill_holes(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let idx = |x: u32, y: u32| (y * width + x) as usize;
    let mut outside = vec![false; (width * height) as usize];
    let mut queue = VecDeque::new();

    let seed = |x: u32, y: u32, outside: &mut Vec<bool>, queue: &mut VecDeque<(u32, u32)>| {
        if mask.get_pixel(x, y)[0] == 0 && !outside[idx(x, y)] {
            outside[idx(x, y)] = true;
            queue.push_back((x, y));
        }
    };

    for x in 0..width {
        seed(x, 0, &mut outside, &mut queue);
        seed(x, height.saturating_sub(1), &mut outside, &mut queue);
    }
    for y in 0..height {
        seed(0, y, &mut outside, &mut queue);
        seed(width.saturating_sub(1), y, &mut outside, &mut queue);
    }

    while let Some((x, y)) = queue.pop_front() {
        if x > 0 {
            seed(x - 1, y, &mut outside, &mut queue);
        }
        if x + 1 < width {
            seed(x + 1, y, &mut outside, &mut queue);
        }
        if y > 0 {
            seed(x, y - 1, &mut outside, &mut queue);
        }
        if y + 1 < height {
            seed(x, y + 1, &mut outside, &mut queue);
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        if outside[idx(x, y)] {
            Luma([0])
        } else {
            Luma([ON])
        }
    })
}

/// 8 邻接连通块的外接矩形，按标签（首像素的光栅顺序）排列
fn bounding_boxes(mask: &GrayImage) -> Vec<BoundingBox> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let mut extents: Vec<Option<(u32, u32, u32, u32)>> = Vec::new();

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if extents.len() < label {
            extents.resize(label, None);
        }
        let slot = &mut extents[label - 1];
        *slot = Some(match *slot {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    extents
        .into_iter()
        .flatten()
        .map(|(x0, y0, x1, y1)| BoundingBox {
            x: x0,
            y: y0,
            width: x1 - x0 + 1,
            height: y1 - y0 + 1,
        })
        .collect()
}

/// 矩形内误差强度的 均值 + 标准差
fn severity(map: &ErrorMap, b: &BoundingBox) -> f64 {
    let values: Vec<u8> = (b.y..b.y + b.height)
        .flat_map(|y| (b.x..b.x + b.width).map(move |x| map.get_pixel(x, y)[0]))
        .collect();
    let stats = intensity_stats(values);
    stats.mean + stats.std_dev
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paint(map: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, value: u8) {
        for yy in y..y + h {
            for xx in x..x + w {
                map.put_pixel(xx, yy, Luma([value]));
            }
        }
    }

    fn extractor() -> RegionExtractor {
        RegionExtractor::new(RegionConfig::default())
    }

    #[test]
    fn single_block_becomes_one_region() {
        let mut map = GrayImage::new(100, 100);
        paint(&mut map, 30, 30, 40, 40, 200);

        let regions = extractor().extract(&map);
        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!((r.x, r.y, r.width, r.height), (30, 30, 40, 40));
        assert_eq!(r.severity_score, 200.0);
        assert_eq!(r.risk, RiskLevel::High);
    }

    #[test]
    fn small_blocks_are_discarded() {
        let mut map = GrayImage::new(100, 100);
        paint(&mut map, 10, 10, 15, 15, 200);
        assert!(extractor().extract(&map).is_empty());
    }

    #[test]
    fn threshold_has_a_floor() {
        let map = GrayImage::from_pixel(50, 50, Luma([20]));
        assert_eq!(extractor().threshold(&map), 25.0);
        assert!(extractor().extract(&map).is_empty());
    }

    #[test]
    fn nested_blob_merges_into_outer_contour() {
        let mut map = GrayImage::new(100, 100);
        // 6 像素宽的方环，中间再放一个独立方块
        paint(&mut map, 10, 10, 60, 60, 200);
        paint(&mut map, 16, 16, 48, 48, 0);
        paint(&mut map, 30, 30, 22, 22, 200);

        let regions = extractor().extract(&map);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].x, regions[0].y), (10, 10));
        assert_eq!((regions[0].width, regions[0].height), (60, 60));
    }

    #[test]
    fn regions_sorted_and_capped() {
        let mut map = GrayImage::new(200, 200);
        let values = [190u8, 250, 210, 230, 200, 240, 220];
        for (i, &v) in values.iter().enumerate() {
            let col = (i % 4) as u32;
            let row = (i / 4) as u32;
            paint(&mut map, 10 + 45 * col, 10 + 80 * row, 25, 25, v);
        }

        let regions = extractor().extract(&map);
        assert_eq!(regions.len(), 5);
        let scores: Vec<f64> = regions.iter().map(|r| r.severity_score).collect();
        assert_eq!(scores, vec![250.0, 240.0, 230.0, 220.0, 210.0]);
        assert!(regions.windows(2).all(|w| w[0].severity_score >= w[1].severity_score));
    }

    #[test]
    fn close_bridges_small_gaps() {
        let mut map = GrayImage::new(200, 100);
        // 两块之间只隔 3 个像素，闭运算后应连成一片
        paint(&mut map, 10, 10, 30, 30, 200);
        paint(&mut map, 43, 10, 30, 30, 200);

        let regions = extractor().extract(&map);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].x, regions[0].width), (10, 63));
    }
}
