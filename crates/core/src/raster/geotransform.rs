//! Affine geotransform attached to a raster grid

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// The engine never reprojects; the transform is carried from inputs to
/// outputs and its pixel size feeds distance-based algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform with no rotation
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Create from the GDAL coefficient order
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to the GDAL coefficient order
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Pixel size used for distances (absolute pixel width)
    pub fn pixel_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Geographic coordinates of the centre of pixel (row, col)
    pub fn pixel_to_geo(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        (
            self.origin_x + c * self.pixel_width + r * self.row_rotation,
            self.origin_y + c * self.col_rotation + r * self.pixel_height,
        )
    }

    /// Fractional (row, col) of a geographic coordinate
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < f64::EPSILON {
            return (f64::NAN, f64::NAN);
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        (row, col)
    }

    /// Whether two transforms describe the same pixel grid, within `tol`
    pub fn same_grid(&self, other: &GeoTransform, tol: f64) -> bool {
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gdal_roundtrip_order() {
        let gt = GeoTransform::from_gdal([100.0, 30.0, 0.0, 500.0, 0.0, -30.0]);
        assert_eq!(gt.origin_x, 100.0);
        assert_eq!(gt.pixel_height, -30.0);
        assert_eq!(gt.to_gdal(), [100.0, 30.0, 0.0, 500.0, 0.0, -30.0]);
        assert_eq!(gt.pixel_size(), 30.0);
    }

    #[test]
    fn test_geo_to_pixel_inverts_pixel_to_geo() {
        let gt = GeoTransform::new(1000.0, 2000.0, 10.0, -10.0);
        let (x, y) = gt.pixel_to_geo(3, 7);
        let (row, col) = gt.geo_to_pixel(x, y);
        assert!((row - 3.5).abs() < 1e-10);
        assert!((col - 7.5).abs() < 1e-10);
    }

    #[test]
    fn test_same_grid() {
        let a = GeoTransform::new(0.0, 10.0, 1.0, -1.0);
        let mut b = a;
        assert!(a.same_grid(&b, 1e-9));
        b.origin_x = 0.5;
        assert!(!a.same_grid(&b, 1e-9));
    }
}
