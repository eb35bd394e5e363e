//! Affine pixel <-> map transforms.

use crate::bbox::BoundingBox;

/// Six-coefficient affine transform mapping pixel (col, row) to map (x, y):
///
/// ```text
/// x = a * col + b * row + c
/// y = d * col + e * row + f
/// ```
///
/// North-up rasters have `b = d = 0` and a negative `e`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    /// Build from all six coefficients.
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform whose top-left pixel corner sits at (`west`, `north`).
    ///
    /// `x_res` and `y_res` are positive pixel sizes.
    pub fn from_origin(west: f64, north: f64, x_res: f64, y_res: f64) -> Self {
        Self::new(x_res, 0.0, west, 0.0, -y_res, north)
    }

    /// Map coordinates of a fractional pixel position.
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Fractional pixel position of a map coordinate.
    ///
    /// Returns `None` if the transform is degenerate.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.a * self.e - self.b * self.d;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.c;
        let dy = y - self.f;
        let col = (self.e * dx - self.b * dy) / det;
        let row = (self.a * dy - self.d * dx) / det;
        Some((col, row))
    }

    /// Transform of a sub-window whose top-left pixel is (`col_off`, `row_off`).
    pub fn window_transform(&self, col_off: usize, row_off: usize) -> Self {
        let (c, f) = self.pixel_to_geo(col_off as f64, row_off as f64);
        Self { c, f, ..*self }
    }

    /// Pixel width in map units.
    pub fn x_res(&self) -> f64 {
        self.a.hypot(self.d)
    }

    /// Pixel height in map units (positive).
    pub fn y_res(&self) -> f64 {
        self.b.hypot(self.e)
    }

    /// Map extent covered by a `width` x `height` grid.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.pixel_to_geo(0.0, 0.0),
            self.pixel_to_geo(w, 0.0),
            self.pixel_to_geo(0.0, h),
            self.pixel_to_geo(w, h),
        ];
        let mut bbox = BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        for (x, y) in corners {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_origin() {
        let t = GeoTransform::from_origin(10.0, 10.0, 1.0, 1.0);
        assert_eq!(t.pixel_to_geo(0.0, 0.0), (10.0, 10.0));
        assert_eq!(t.pixel_to_geo(2.0, 2.0), (12.0, 8.0));
        assert_eq!(t.x_res(), 1.0);
        assert_eq!(t.y_res(), 1.0);
    }

    #[test]
    fn test_geo_to_pixel_inverts() {
        let t = GeoTransform::from_origin(-500.0, 900.0, 2.5, 4.0);
        let (x, y) = t.pixel_to_geo(3.25, 7.5);
        let (col, row) = t.geo_to_pixel(x, y).unwrap();
        assert_relative_eq!(col, 3.25, epsilon = 1e-12);
        assert_relative_eq!(row, 7.5, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_has_no_inverse() {
        let t = GeoTransform::new(0.0, 0.0, 1.0, 0.0, 0.0, 1.0);
        assert!(t.geo_to_pixel(0.0, 0.0).is_none());
    }

    #[test]
    fn test_window_transform() {
        let t = GeoTransform::from_origin(10.0, 10.0, 1.0, 1.0);
        let w = t.window_transform(2, 1);
        assert_eq!(w.pixel_to_geo(0.0, 0.0), (12.0, 9.0));
        assert_eq!(w.a, t.a);
        assert_eq!(w.e, t.e);
    }

    #[test]
    fn test_bounds() {
        let t = GeoTransform::from_origin(10.0, 10.0, 1.0, 1.0);
        let b = t.bounds(4, 2);
        assert_eq!(b, BoundingBox::new(10.0, 8.0, 14.0, 10.0));
    }
}
