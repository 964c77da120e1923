//! Structuring element definitions for morphological operations
//!
//! A structuring element defines the neighbourhood shape used in
//! erosion, dilation, and derived transforms.

use imgcalc_core::{Error, Result};

/// Shape of a structuring element for morphological operations
#[derive(Debug, Clone, PartialEq)]
pub enum StructuringElement {
    /// Square element of given radius (side = 2*radius + 1)
    Square(usize),
    /// Cross (plus-shaped) element of given radius
    Cross(usize),
    /// Disk element of given radius
    Disk(usize),
    /// User-provided boolean mask (must be odd-sized and square)
    Custom(Vec<Vec<bool>>),
}

impl Default for StructuringElement {
    fn default() -> Self {
        StructuringElement::Square(1)
    }
}

impl StructuringElement {
    /// Parse `square:R`, `cross:R` or `disk:R`
    pub fn parse(text: &str) -> Result<Self> {
        let (shape, radius) = text.split_once(':').unwrap_or((text, "1"));
        let radius = radius
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::invalid_param("element", text, "radius must be a non-negative integer"))?;
        let element = match shape.trim().to_ascii_lowercase().as_str() {
            "square" => StructuringElement::Square(radius),
            "cross" => StructuringElement::Cross(radius),
            "disk" => StructuringElement::Disk(radius),
            _ => return Err(Error::invalid_param("element", text, "expected square, cross or disk")),
        };
        element.validate()?;
        Ok(element)
    }

    /// Validate the structuring element, returning an error for invalid configurations
    pub fn validate(&self) -> Result<()> {
        match self {
            StructuringElement::Square(r) | StructuringElement::Cross(r) | StructuringElement::Disk(r) => {
                if *r == 0 {
                    return Err(Error::invalid_param(
                        "radius",
                        0,
                        "structuring element radius must be at least 1",
                    ));
                }
                Ok(())
            }
            StructuringElement::Custom(mask) => {
                if mask.is_empty() {
                    return Err(Error::invalid_param("custom_mask", "empty", "custom mask must not be empty"));
                }
                let size = mask.len();
                if size % 2 == 0 {
                    return Err(Error::invalid_param(
                        "custom_mask",
                        format!("{}x{}", size, size),
                        "custom mask size must be odd",
                    ));
                }
                if let Some(row) = mask.iter().find(|row| row.len() != size) {
                    return Err(Error::invalid_param(
                        "custom_mask",
                        format!("row length {}", row.len()),
                        format!("custom mask must be square (expected {})", size),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the radius of the structuring element
    pub fn radius(&self) -> usize {
        match self {
            StructuringElement::Square(r) | StructuringElement::Cross(r) | StructuringElement::Disk(r) => *r,
            StructuringElement::Custom(mask) => mask.len() / 2,
        }
    }

    /// Window size the element needs
    pub fn window_size(&self) -> usize {
        2 * self.radius() + 1
    }

    /// Compute (dr, dc) offsets relative to center for all active cells
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        let mut offsets = Vec::new();
        match self {
            StructuringElement::Square(_) => {
                for dr in -r..=r {
                    for dc in -r..=r {
                        offsets.push((dr, dc));
                    }
                }
            }
            StructuringElement::Disk(_) => {
                let r_sq = r * r;
                for dr in -r..=r {
                    for dc in -r..=r {
                        if dr * dr + dc * dc <= r_sq {
                            offsets.push((dr, dc));
                        }
                    }
                }
            }
            StructuringElement::Cross(_) => {
                for d in -r..=r {
                    offsets.push((d, 0));
                    if d != 0 {
                        offsets.push((0, d));
                    }
                }
            }
            StructuringElement::Custom(mask) => {
                for (row, cells) in mask.iter().enumerate() {
                    for (col, &active) in cells.iter().enumerate() {
                        if active {
                            offsets.push((row as isize - r, col as isize - r));
                        }
                    }
                }
            }
        }
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_offsets() {
        let offsets = StructuringElement::Square(1).offsets();
        assert_eq!(offsets.len(), 9);
        assert!(offsets.contains(&(0, 0)));
        assert!(offsets.contains(&(-1, -1)));
        assert!(offsets.contains(&(1, 1)));
    }

    #[test]
    fn test_cross_offsets() {
        let offsets = StructuringElement::Cross(1).offsets();
        // Plus shape: center + 4 arms
        assert_eq!(offsets.len(), 5);
        assert!(offsets.contains(&(0, 0)));
        assert!(offsets.contains(&(0, -1)));
        assert!(!offsets.contains(&(-1, -1)));
    }

    #[test]
    fn test_disk_offsets() {
        // Disk(1): diagonals are sqrt(2) > 1
        assert_eq!(StructuringElement::Disk(1).offsets().len(), 5);
        assert_eq!(StructuringElement::Disk(2).offsets().len(), 13);
    }

    #[test]
    fn test_custom_offsets() {
        // L-shaped custom element
        let mask = vec![
            vec![true, false, false],
            vec![true, false, false],
            vec![true, true, true],
        ];
        let offsets = StructuringElement::Custom(mask).offsets();
        assert_eq!(offsets.len(), 5);
        assert!(offsets.contains(&(-1, -1)));
        assert!(offsets.contains(&(1, 1)));
    }

    #[test]
    fn test_validate() {
        assert!(StructuringElement::Square(0).validate().is_err());
        assert!(StructuringElement::Disk(0).validate().is_err());
        let even = vec![vec![true, false], vec![false, true]];
        assert!(StructuringElement::Custom(even).validate().is_err());
    }

    #[test]
    fn test_parse() {
        assert_eq!(StructuringElement::parse("disk:2").unwrap(), StructuringElement::Disk(2));
        assert_eq!(StructuringElement::parse("cross").unwrap(), StructuringElement::Cross(1));
        assert!(StructuringElement::parse("hexagon:1").is_err());
        assert!(StructuringElement::parse("square:0").is_err());
    }

    #[test]
    fn test_default() {
        let se = StructuringElement::default();
        assert_eq!(se, StructuringElement::Square(1));
        assert_eq!(se.window_size(), 3);
    }
}
