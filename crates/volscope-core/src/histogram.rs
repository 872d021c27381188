//! Intensity histograms and the transfer-function generators built on them.
//!
//! A [`Histogram`] is computed once per channel from its raw 8-bit voxels. Each
//! `lut_*` method derives a [`Lut`] from it. None of them fail: degenerate input
//! falls back to a full-range ramp or clamps.

use crate::colors::color_by_index;
use crate::lut::{lerp, to_byte, ControlPoint, Lut, LUT_ENTRIES};

/// Number of histogram bins, one per 8-bit intensity.
pub const HISTOGRAM_BINS: usize = 256;

/// Percentile window applied to new channels.
pub const DEFAULT_PERCENTILE_MIN: f32 = 0.5;
/// Upper end of the default percentile window.
pub const DEFAULT_PERCENTILE_MAX: f32 = 0.983;

const AUTO_THRESHOLD: f64 = 5000.0;

/// A 256-bin intensity histogram with derived statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bins: [u32; HISTOGRAM_BINS],
    data_min: usize,
    data_max: usize,
    max_bin: usize,
    nonzero_pixel_count: usize,
}

impl Histogram {
    /// Builds a histogram from 8-bit single channel data.
    #[must_use]
    pub fn new(data: &[u8]) -> Self {
        let mut bins = [0u32; HISTOGRAM_BINS];
        for &v in data {
            bins[usize::from(v)] += 1;
        }

        // first and last populated bins, ignoring zero intensity
        let data_min = (1..HISTOGRAM_BINS).find(|&i| bins[i] > 0).unwrap_or(255);
        let data_max = (1..HISTOGRAM_BINS).rev().find(|&i| bins[i] > 0).unwrap_or(0);

        let nonzero_pixel_count = data.len() - bins[0] as usize;

        let mut max_bin = 1;
        for i in 1..HISTOGRAM_BINS {
            if bins[i] > bins[max_bin] {
                max_bin = i;
            }
        }

        Self {
            bins,
            data_min,
            data_max,
            max_bin,
            nonzero_pixel_count,
        }
    }

    /// Returns the raw bin counts.
    #[must_use]
    pub fn bins(&self) -> &[u32; HISTOGRAM_BINS] {
        &self.bins
    }

    /// Returns the lowest nonzero intensity present, or 255 if none.
    #[must_use]
    pub fn data_min(&self) -> usize {
        self.data_min
    }

    /// Returns the highest nonzero intensity present, or 0 if none.
    #[must_use]
    pub fn data_max(&self) -> usize {
        self.data_max
    }

    /// Returns the most frequent nonzero intensity.
    #[must_use]
    pub fn max_bin(&self) -> usize {
        self.max_bin
    }

    /// Returns the number of voxels with nonzero intensity.
    #[must_use]
    pub fn nonzero_pixel_count(&self) -> usize {
        self.nonzero_pixel_count
    }

    /// Returns the total number of voxels, zeros included.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.nonzero_pixel_count + self.bins[0] as usize
    }

    /// Returns the first bin at which the cumulative count exceeds `pct` of all voxels.
    ///
    /// Returns 256 when the threshold is never exceeded (`pct >= 1`).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn find_bin_of_percentile(&self, pct: f32) -> usize {
        let limit = self.pixel_count() as f64 * f64::from(pct);
        let mut count = 0u64;
        for (i, &n) in self.bins.iter().enumerate() {
            count += u64::from(n);
            if count as f64 > limit {
                return i;
            }
        }
        HISTOGRAM_BINS
    }

    /// Window/level ramp; `wnd` and `lvl` are in `0..=1`.
    #[must_use]
    pub fn lut_window_level(&self, wnd: f32, lvl: f32) -> Lut {
        let b = lvl - wnd * 0.5;
        let e = lvl + wnd * 0.5;
        self.lut_min_max(b * 255.0, e * 255.0)
    }

    /// Linear alpha ramp from 0 at `b` to 255 at `e`.
    ///
    /// The bounds are swapped when `e < b`. When `e == b` the ramp degenerates to a
    /// step: 0 up to and including `b`, 255 above it.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::unused_self)]
    pub fn lut_min_max(&self, b: f32, e: f32) -> Lut {
        let (b, e) = if e < b { (e, b) } else { (b, e) };

        let mut lut = Lut::default();
        for x in 0..LUT_ENTRIES {
            let xf = x as f32;
            let alpha = if xf > e {
                255
            } else if xf <= b {
                0
            } else {
                to_byte(lerp(0.0, 255.0, (xf - b) / (e - b)))
            };
            lut.set(x, [255, 255, 255, alpha]);
        }

        lut.control_points = min_max_control_points(b, e);
        lut
    }

    /// Identity ramp: alpha equals intensity.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::unused_self)]
    pub fn lut_full_range(&self) -> Lut {
        let mut lut = Lut::default();
        for x in 0..LUT_ENTRIES {
            lut.set(x, [255, 255, 255, x as u8]);
        }
        lut.control_points = vec![ControlPoint::white(0.0, 0.0), ControlPoint::white(255.0, 1.0)];
        lut
    }

    /// Ramp over the populated intensity range.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lut_data_range(&self) -> Lut {
        self.lut_min_max(self.data_min as f32, self.data_max as f32)
    }

    /// One categorical color per populated intensity, for label volumes.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    pub fn lut_label_colors(&self) -> Lut {
        let mut lut = Lut::default();
        let mut control_points = vec![ControlPoint::new(0.0, 0.0, [0, 0, 0])];

        let mut last = ([0u8; 3], 0.0f32);
        for i in 1..HISTOGRAM_BINS {
            let current = if self.bins[i] > 0 {
                let rgb = color_by_index(i);
                lut.set(i, [rgb[0], rgb[1], rgb[2], 255]);
                (rgb, 1.0)
            } else {
                ([0, 0, 0], 0.0)
            };

            if current != last {
                if last.1 == 0.0 {
                    control_points.push(ControlPoint::new(i as f32 - 0.5, last.1, last.0));
                }
                control_points.push(ControlPoint::new(i as f32, current.1, current.0));
                last = current;
            }
        }

        lut.control_points = control_points;
        lut
    }

    /// Ramp between two cumulative percentiles, e.g. `0.5` and `0.983`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lut_percentiles(&self, pmin: f32, pmax: f32) -> Lut {
        let hmin = self.find_bin_of_percentile(pmin);
        let hmax = self.find_bin_of_percentile(pmax);
        self.lut_min_max(hmin as f32, hmax as f32)
    }

    /// Ramp between the 10% cumulative thresholds taken from each end, ignoring zeros.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lut_best_fit(&self) -> Lut {
        let limit = self.nonzero_pixel_count as f64 / 10.0;

        let mut count = 0u64;
        let mut hmin = HISTOGRAM_BINS;
        for i in 1..HISTOGRAM_BINS {
            count += u64::from(self.bins[i]);
            if count as f64 > limit {
                hmin = i;
                break;
            }
        }

        count = 0;
        let mut hmax = 0;
        for i in (1..HISTOGRAM_BINS).rev() {
            count += u64::from(self.bins[i]);
            if count as f64 > limit {
                hmax = i;
                break;
            }
        }

        self.lut_min_max(hmin as f32, hmax as f32)
    }

    /// ImageJ-style auto contrast.
    ///
    /// Picks the first and last bins whose count lies in
    /// `(nonzero / 5000, nonzero / 10]`. Falls back to [`Self::lut_full_range`] when
    /// no such bins bracket a valid range.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lut_auto2(&self) -> Lut {
        let pixcount = self.nonzero_pixel_count as f64;
        let limit = pixcount / 10.0;
        let threshold = pixcount / AUTO_THRESHOLD;
        let in_band = |n: u32| f64::from(n) > threshold && f64::from(n) <= limit;

        let hmin = (1..HISTOGRAM_BINS)
            .find(|&i| in_band(self.bins[i]))
            .unwrap_or(HISTOGRAM_BINS - 1);
        let hmax = (1..HISTOGRAM_BINS)
            .rev()
            .find(|&i| in_band(self.bins[i]))
            .unwrap_or(1);

        if hmax < hmin {
            self.lut_full_range()
        } else {
            self.lut_min_max(hmin as f32, hmax as f32)
        }
    }

    /// Ramp between the first and last bins holding more than 10% of the modal count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lut_auto(&self) -> Lut {
        let th = self.bins[self.max_bin] / 10;
        let b = (1..HISTOGRAM_BINS).find(|&x| self.bins[x] > th).unwrap_or(0);
        let e = (1..HISTOGRAM_BINS)
            .rev()
            .find(|&x| self.bins[x] > th)
            .unwrap_or(HISTOGRAM_BINS - 1);
        self.lut_min_max(b as f32, e as f32)
    }

    /// Histogram equalization: the normalized cumulative count is the alpha ramp.
    ///
    /// Control points are emitted only where the slope changes. A histogram whose
    /// mass sits in a single bin has no cumulative range and falls back to
    /// [`Self::lut_full_range`].
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn lut_equalize(&self) -> Lut {
        let mut map = [0u64; HISTOGRAM_BINS];
        map[0] = u64::from(self.bins[0]);
        for i in 1..HISTOGRAM_BINS {
            map[i] = map[i - 1] + u64::from(self.bins[i]);
        }

        let div = map[HISTOGRAM_BINS - 1] - map[0];
        let occupied = self.bins.iter().filter(|&&n| n > 0).count();
        if div == 0 || occupied <= 1 {
            return self.lut_full_range();
        }

        let mut lut = Lut::default();
        let mut control_points = vec![ControlPoint::white(0.0, 0.0)];
        lut.set(0, [255, 255, 255, 0]);

        let mut last_slope = 0i32;
        let mut opacity = 0i32;
        for i in 1..HISTOGRAM_BINS {
            let last_opacity = opacity;
            let normalized = (map[i] - map[0]) as f64 / div as f64;
            opacity = (255.0 * normalized).round().clamp(0.0, 255.0) as i32;
            lut.set(i, [255, 255, 255, opacity as u8]);

            let slope = opacity - last_opacity;
            if slope != last_slope {
                control_points.push(ControlPoint::white(
                    (i - 1) as f32,
                    last_opacity as f32 / 255.0,
                ));
                last_slope = slope;
            }
        }
        control_points.push(ControlPoint::white(255.0, 1.0));

        lut.control_points = control_points;
        lut
    }
}

/// Two to four control points reproducing a `min_max` ramp, given `b <= e`.
fn min_max_control_points(b: f32, e: f32) -> Vec<ControlPoint> {
    if b < 0.0 && e < 0.0 {
        return vec![ControlPoint::white(0.0, 1.0), ControlPoint::white(255.0, 1.0)];
    }
    if b >= 255.0 && e >= 255.0 {
        return vec![ControlPoint::white(0.0, 0.0), ControlPoint::white(255.0, 0.0)];
    }

    let mut points = Vec::with_capacity(4);

    let start = if b < 0.0 { -b / (e - b) } else { 0.0 };
    points.push(ControlPoint::white(0.0, start));

    if b > 0.0 {
        points.push(ControlPoint::white(b, 0.0));
    }

    if e < 255.0 {
        #[allow(clippy::float_cmp)]
        let x = if e == b { b + 0.5 } else { e };
        points.push(ControlPoint::white(x, 1.0));
    }

    let end = if e > 255.0 { (255.0 - b) / (e - b) } else { 1.0 };
    points.push(ControlPoint::white(255.0, end));

    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(n: usize) -> (Vec<u8>, usize) {
        let mut data = vec![0u8; n * n * n];
        let c = (n as f32 - 1.0) * 0.5;
        let r = n as f32 * 0.35;
        let mut inside = 0;
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2) + (z as f32 - c).powi(2)).sqrt();
                    if d <= r {
                        data[(z * n + y) * n + x] = 255;
                        inside += 1;
                    }
                }
            }
        }
        (data, inside)
    }

    #[test]
    fn test_all_zero_channel() {
        let h = Histogram::new(&[0u8; 64]);
        assert_eq!(h.data_min(), 255);
        assert_eq!(h.data_max(), 0);
        assert_eq!(h.nonzero_pixel_count(), 0);

        let lut = h.lut_full_range();
        assert_eq!(
            lut.control_points,
            vec![ControlPoint::white(0.0, 0.0), ControlPoint::white(255.0, 1.0)]
        );
        assert_eq!(lut.alpha(77), 77);
    }

    #[test]
    fn test_sphere_data_range_is_step() {
        let (data, inside) = sphere(32);
        let h = Histogram::new(&data);
        assert_eq!(h.nonzero_pixel_count(), inside);
        assert_eq!(h.data_min(), 255);
        assert_eq!(h.data_max(), 255);
        assert_eq!(h.max_bin(), 255);
        assert_eq!(h.lut_data_range(), h.lut_min_max(255.0, 255.0));
    }

    #[test]
    fn test_min_max_swaps_bounds() {
        let h = Histogram::new(&[1, 2, 3]);
        assert_eq!(h.lut_min_max(200.0, 20.0), h.lut_min_max(20.0, 200.0));
    }

    #[test]
    fn test_min_max_step() {
        let h = Histogram::new(&[]);
        let lut = h.lut_min_max(100.0, 100.0);
        for x in 0..=255u8 {
            let expected = if x <= 100 { 0 } else { 255 };
            assert_eq!(lut.alpha(x), expected, "x = {x}");
            assert_eq!(&lut.rgba(x)[..3], &[255, 255, 255]);
        }
        let xs: Vec<f32> = lut.control_points.iter().map(|c| c.x).collect();
        assert_eq!(xs, vec![0.0, 100.0, 100.5, 255.0]);
    }

    #[test]
    fn test_min_max_out_of_range_control_points() {
        let h = Histogram::new(&[]);
        let below = h.lut_min_max(-20.0, -10.0);
        assert_eq!(below.control_points.len(), 2);
        assert!(below.control_points.iter().all(|c| c.opacity == 1.0));

        let above = h.lut_min_max(300.0, 255.0);
        assert!(above.control_points.iter().all(|c| c.opacity == 0.0));
    }

    #[test]
    fn test_min_max_partial_ranges() {
        let h = Histogram::new(&[]);
        let lut = h.lut_min_max(-255.0, 255.0);
        assert_eq!(lut.control_points.len(), 2);
        assert!((lut.control_points[0].opacity - 0.5).abs() < 1e-6);
        assert_eq!(lut.control_points[1].opacity, 1.0);

        let lut = h.lut_min_max(0.0, 510.0);
        assert_eq!(lut.control_points.len(), 2);
        assert!((lut.control_points[1].opacity - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_window_level_matches_min_max() {
        let h = Histogram::new(&[]);
        assert_eq!(h.lut_window_level(0.5, 0.5), h.lut_min_max(63.75, 191.25));
    }

    #[test]
    fn test_equalize_single_bin_falls_back() {
        let h = Histogram::new(&[42u8; 100]);
        assert_eq!(h.lut_equalize(), h.lut_full_range());

        let h = Histogram::new(&[0u8; 100]);
        assert_eq!(h.lut_equalize(), h.lut_full_range());
    }

    #[test]
    fn test_equalize_ramp_spans_range() {
        let data: Vec<u8> = (0..=255u8).collect();
        let lut = Histogram::new(&data).lut_equalize();
        assert_eq!(lut.alpha(0), 0);
        assert_eq!(lut.alpha(255), 255);
        for x in 1..=255u8 {
            assert!(lut.alpha(x) >= lut.alpha(x - 1));
        }
        assert_eq!(lut.control_points.last(), Some(&ControlPoint::white(255.0, 1.0)));
    }

    #[test]
    fn test_percentile_bounds() {
        let data: Vec<u8> = (0..100u8).collect();
        let h = Histogram::new(&data);
        assert_eq!(h.find_bin_of_percentile(0.0), 0);
        assert_eq!(h.find_bin_of_percentile(0.5), 50);
        assert_eq!(h.find_bin_of_percentile(1.0), HISTOGRAM_BINS);
    }

    #[test]
    fn test_label_colors_marks_populated_bins() {
        let h = Histogram::new(&[0, 3, 3, 7]);
        let lut = h.lut_label_colors();
        assert_eq!(lut.alpha(3), 255);
        assert_eq!(lut.alpha(7), 255);
        assert_eq!(lut.alpha(4), 0);
        assert_eq!(&lut.rgba(3)[..3], &color_by_index(3));
        // one leading point, then a half-step and a full point per run start
        let xs: Vec<f32> = lut.control_points.iter().map(|c| c.x).collect();
        assert_eq!(xs, vec![0.0, 2.5, 3.0, 4.0, 6.5, 7.0, 8.0]);
    }

    #[test]
    fn test_auto_uses_modal_threshold() {
        let mut data = vec![10u8; 1000];
        data.extend(std::iter::repeat(200u8).take(500));
        data.extend(std::iter::repeat(250u8).take(5));
        let h = Histogram::new(&data);
        assert_eq!(h.max_bin(), 10);
        assert_eq!(h.lut_auto(), h.lut_min_max(10.0, 200.0));
    }

    #[test]
    fn test_auto2_falls_back_when_empty() {
        let h = Histogram::new(&[0u8; 32]);
        assert_eq!(h.lut_auto2(), h.lut_full_range());
    }

    #[test]
    fn test_best_fit_range() {
        let data: Vec<u8> = (1..=100u8).collect();
        let h = Histogram::new(&data);
        assert_eq!(h.lut_best_fit(), h.lut_min_max(11.0, 90.0));
    }
}
