use nalgebra::DMatrix;
use statrs::distribution::{Continuous, Normal};

use crate::models::Location;

/// StatsBomb pitch extent.
pub const PITCH_X_RANGE: (f64, f64) = (0.0, 120.0);
pub const PITCH_Y_RANGE: (f64, f64) = (0.0, 80.0);

/// Kernel half-width, in standard deviations.
const KERNEL_TRUNCATE: f64 = 4.0;

fn bin_index(value: f64, (lo, hi): (f64, f64), bins: usize) -> usize {
    let scaled = (value - lo) / (hi - lo) * bins as f64;
    // points on or past the far edge land in the last bin
    (scaled.floor().max(0.0) as usize).min(bins - 1)
}

/// Count points per cell of an `x_bins` × `y_bins` grid. Rows are y bins, columns x bins.
/// Points outside the ranges are clamped into the edge cells so no count is lost.
pub fn bin_counts(
    points: &[Location],
    (x_bins, y_bins): (usize, usize),
    x_range: (f64, f64),
    y_range: (f64, f64),
) -> DMatrix<f64> {
    let mut counts = DMatrix::zeros(y_bins, x_bins);
    if x_bins == 0 || y_bins == 0 {
        return counts;
    }

    let mut clamped = 0usize;
    for point in points {
        if point.x < x_range.0
            || point.x > x_range.1
            || point.y < y_range.0
            || point.y > y_range.1
        {
            clamped += 1;
        }
        let col = bin_index(point.x, x_range, x_bins);
        let row = bin_index(point.y, y_range, y_bins);
        counts[(row, col)] += 1.0;
    }

    if clamped > 0 {
        tracing::warn!("{} locations fell outside the pitch and were clamped to the edge", clamped);
    }
    counts
}

/// Normalised 1-D Gaussian weights from `-radius..=radius`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let normal = match Normal::new(0.0, sigma) {
        Ok(normal) if sigma > 0.0 => normal,
        _ => return vec![1.0],
    };
    let radius = (KERNEL_TRUNCATE * sigma + 0.5) as i64;
    let weights: Vec<f64> = (-radius..=radius).map(|i| normal.pdf(i as f64)).collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Half-sample symmetric reflection: `d c b a | a b c d | d c b a`.
fn reflect(index: i64, len: usize) -> usize {
    let len = len as i64;
    let period = 2 * len;
    let k = index.rem_euclid(period);
    (if k >= len { period - 1 - k } else { k }) as usize
}

fn convolve_axis(grid: &DMatrix<f64>, kernel: &[f64], along_rows: bool) -> DMatrix<f64> {
    let (nrows, ncols) = grid.shape();
    let radius = (kernel.len() / 2) as i64;
    DMatrix::from_fn(nrows, ncols, |r, c| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| {
                let offset = k as i64 - radius;
                let value = if along_rows {
                    grid[(reflect(r as i64 + offset, nrows), c)]
                } else {
                    grid[(r, reflect(c as i64 + offset, ncols))]
                };
                w * value
            })
            .sum()
    })
}

/// Separable Gaussian blur with reflective edges. Total mass is preserved.
pub fn gaussian_filter(grid: &DMatrix<f64>, sigma: f64) -> DMatrix<f64> {
    if grid.is_empty() {
        return grid.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let vertical = convolve_axis(grid, &kernel, true);
    convolve_axis(&vertical, &kernel, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_counts_places_points() {
        let points = vec![
            Location::new(0.0, 0.0),
            Location::new(119.9, 79.9),
            Location::new(120.0, 80.0),
            Location::new(60.0, 40.0),
        ];
        let counts = bin_counts(&points, (25, 25), PITCH_X_RANGE, PITCH_Y_RANGE);
        assert_eq!(counts.shape(), (25, 25));
        assert_eq!(counts[(0, 0)], 1.0);
        assert_eq!(counts[(24, 24)], 2.0);
        assert_eq!(counts[(12, 12)], 1.0);
        assert_eq!(counts.sum(), 4.0);
    }

    #[test]
    fn test_out_of_bounds_points_are_kept() {
        let points = vec![Location::new(-3.0, 40.0), Location::new(125.0, 90.0)];
        let counts = bin_counts(&points, (25, 25), PITCH_X_RANGE, PITCH_Y_RANGE);
        assert_eq!(counts[(12, 0)], 1.0);
        assert_eq!(counts[(24, 24)], 1.0);
    }

    #[test]
    fn test_gaussian_kernel_shape() {
        let kernel = gaussian_kernel(1.0);
        assert_eq!(kernel.len(), 9);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(kernel[4] > kernel[3] && (kernel[3] - kernel[5]).abs() < 1e-15);
        assert_eq!(gaussian_kernel(0.0), vec![1.0]);
    }

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(-2, 5), 1);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(6, 5), 3);
        assert_eq!(reflect(2, 5), 2);
    }

    #[test]
    fn test_gaussian_filter_conserves_mass() {
        let mut grid = DMatrix::zeros(25, 25);
        grid[(0, 0)] = 3.0;
        grid[(12, 7)] = 5.0;
        grid[(24, 20)] = 1.0;
        let smoothed = gaussian_filter(&grid, 1.0);
        assert!((smoothed.sum() - 9.0).abs() < 1e-9);
        // spread stays local: cells beyond the kernel radius are untouched
        assert_eq!(smoothed[(12, 18)], 0.0);
        assert!(smoothed[(12, 7)] < 5.0 && smoothed[(12, 8)] > 0.0);
    }

    #[test]
    fn test_gaussian_filter_flat_grid_unchanged() {
        let grid = DMatrix::from_element(6, 4, 2.0);
        let smoothed = gaussian_filter(&grid, 1.0);
        for value in smoothed.iter() {
            assert!((value - 2.0).abs() < 1e-12);
        }
    }
}
