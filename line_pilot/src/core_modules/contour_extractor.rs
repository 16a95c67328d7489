// THEORY:
// The `ContourExtractor` is the simpler and more forgiving of the two line
// detectors. It does not care whether the paint is straight; it only looks for
// the biggest patch of it.
//
// Algorithm steps:
// 1.  **Region Growing**: Every unvisited foreground cell seeds a flood fill
//     over its 8 neighbors. Each fill yields one connected region with its
//     pixel count and coordinate sums.
// 2.  **Area Filtering**: Regions smaller than `min_line_area` are discarded.
//     These are reflections, debris, or the far end of the line disappearing
//     into perspective.
// 3.  **Selection**: The largest surviving region is the line. If two regions
//     are exactly as large, the one whose centroid is closer to the frame's
//     vertical centre line wins, since that is the one the vehicle is already
//     over.
// 4.  **Stateless Utility**: One mask in, at most one `Blob` out. No memory of
//     earlier frames.

use crate::core_modules::line_candidate::{LineCandidate, LineExtractor, Point};
use crate::core_modules::mask::Mask;

pub mod contour_extractor {
    use super::*;

    /// One connected region of foreground pixels.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Region {
        pub area: usize,
        pub centroid: Point,
    }

    /// Finds every 8-connected foreground region, in raster order of their
    /// first pixel.
    pub fn find_regions(mask: &Mask) -> Vec<Region> {
        let width = mask.width() as usize;
        let height = mask.height() as usize;
        let mut visited = vec![false; width * height];
        let mut regions = Vec::new();

        for (x, y) in mask.foreground() {
            let seed = y as usize * width + x as usize;
            if visited[seed] {
                continue;
            }
            regions.push(grow_region(mask, x, y, &mut visited));
        }

        regions
    }

    /// Depth-first flood fill from `(x, y)`, accumulating area and centroid.
    fn grow_region(mask: &Mask, x: u32, y: u32, visited: &mut [bool]) -> Region {
        let width = mask.width() as usize;
        let mut stack = vec![(x, y)];
        visited[y as usize * width + x as usize] = true;

        let mut area = 0usize;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;

        while let Some((cx, cy)) = stack.pop() {
            area += 1;
            sum_x += cx as f64;
            sum_y += cy as f64;

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = cx as i64 + dx;
                    let ny = cy as i64 + dy;
                    if mask.get_signed(nx, ny) != Some(true) {
                        continue;
                    }
                    let index = ny as usize * width + nx as usize;
                    if !visited[index] {
                        visited[index] = true;
                        stack.push((nx as u32, ny as u32));
                    }
                }
            }
        }

        Region {
            area,
            centroid: Point::new(sum_x / area as f64, sum_y / area as f64),
        }
    }

    /// Picks the line out of a set of regions. See the module notes for the rules.
    pub fn select_line(regions: &[Region], min_area: usize, frame_width: u32) -> Option<Region> {
        let center_x = frame_width as f64 / 2.0;
        let mut best: Option<Region> = None;

        for region in regions.iter().filter(|r| r.area >= min_area) {
            best = match best {
                None => Some(*region),
                Some(current) if region.area > current.area => Some(*region),
                Some(current)
                    if region.area == current.area
                        && (region.centroid.x - center_x).abs()
                            < (current.centroid.x - center_x).abs() =>
                {
                    Some(*region)
                }
                keep => keep,
            };
        }

        best
    }
}

/// Contour strategy: largest blob's centroid and area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourExtractor {
    /// Smallest region, in pixels, accepted as the line.
    pub min_line_area: usize,
}

impl ContourExtractor {
    pub fn new(min_line_area: usize) -> Self {
        Self { min_line_area }
    }
}

impl LineExtractor for ContourExtractor {
    fn extract(&self, mask: &Mask) -> Option<LineCandidate> {
        let regions = contour_extractor::find_regions(mask);
        let line = contour_extractor::select_line(&regions, self.min_line_area, mask.width())?;
        Some(LineCandidate::Blob {
            centroid: line.centroid,
            area: line.area,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::contour_extractor::*;
    use super::*;
    use approx::assert_relative_eq;

    fn rect(mask: &mut Mask, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.set(x, y, true);
            }
        }
    }

    #[test]
    fn empty_mask_is_no_detection() {
        let extractor = ContourExtractor::new(10);
        assert_eq!(extractor.extract(&Mask::new(40, 30)), None);
    }

    #[test]
    fn largest_region_wins() {
        let mut mask = Mask::new(100, 50);
        rect(&mut mask, 5, 5, 10, 10);
        rect(&mut mask, 60, 10, 20, 20);

        let candidate = ContourExtractor::new(50).extract(&mask).expect("line found");
        match candidate {
            LineCandidate::Blob { centroid, area } => {
                assert_eq!(area, 400);
                assert_relative_eq!(centroid.x, 69.5);
                assert_relative_eq!(centroid.y, 19.5);
            }
            other => panic!("expected a blob, got {other:?}"),
        }
    }

    #[test]
    fn regions_below_the_minimum_are_ignored() {
        let mut mask = Mask::new(50, 50);
        rect(&mut mask, 10, 10, 5, 5);
        assert_eq!(ContourExtractor::new(26).extract(&mask), None);
        assert!(ContourExtractor::new(25).extract(&mask).is_some());
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let mut mask = Mask::new(10, 10);
        for i in 0..6 {
            mask.set(i, i, true);
        }
        let regions = find_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 6);
    }

    #[test]
    fn equal_areas_prefer_the_region_nearest_the_centre() {
        let mut mask = Mask::new(100, 40);
        rect(&mut mask, 2, 2, 6, 6);
        rect(&mut mask, 55, 20, 6, 6);

        let regions = find_regions(&mask);
        let line = select_line(&regions, 1, mask.width()).expect("line found");
        assert_relative_eq!(line.centroid.x, 57.5);
    }
}
