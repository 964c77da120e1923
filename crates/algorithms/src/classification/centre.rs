//! Cluster centres and their matrix file form.
//!
//! Saved centres are a matrix with one row per cluster and one column per
//! dimension, so they can be reloaded for classification.

use imgcalc_core::io::{read_matrix, write_matrix};
use imgcalc_core::{Error, Result};
use ndarray::Array2;
use std::path::Path;

/// A named cluster mean
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCentre {
    pub id: usize,
    pub name: String,
    pub values: Vec<f64>,
}

impl ClusterCentre {
    pub fn new(id: usize, values: Vec<f64>) -> Self {
        Self {
            id,
            name: format!("class_{}", id + 1),
            values,
        }
    }

    /// Dimensionality of the centre
    pub fn num_vals(&self) -> usize {
        self.values.len()
    }
}

impl AsRef<[f64]> for ClusterCentre {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

/// ISODATA centre: the mean plus the spread of its members
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCentreIso {
    pub id: usize,
    pub name: String,
    pub values: Vec<f64>,
    /// Per-dimension standard deviation of the members
    pub std_dev: Vec<f64>,
    /// Set when the centre came out of a split in the last iteration
    pub split: bool,
    /// Mean distance of the members to the centre
    pub avg_distance: f64,
    pub num_members: usize,
}

impl ClusterCentreIso {
    pub fn num_vals(&self) -> usize {
        self.values.len()
    }

    pub fn to_centre(&self) -> ClusterCentre {
        ClusterCentre {
            id: self.id,
            name: self.name.clone(),
            values: self.values.clone(),
        }
    }
}

impl From<ClusterCentre> for ClusterCentreIso {
    fn from(centre: ClusterCentre) -> Self {
        let n = centre.values.len();
        Self {
            id: centre.id,
            name: centre.name,
            values: centre.values,
            std_dev: vec![0.0; n],
            split: false,
            avg_distance: 0.0,
            num_members: 0,
        }
    }
}

impl AsRef<[f64]> for ClusterCentreIso {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

/// Centres as a clusters x dimensions matrix
pub fn centres_to_matrix<T: AsRef<[f64]>>(centres: &[T]) -> Result<Array2<f64>> {
    let dims = centres.first().map(|c| c.as_ref().len()).unwrap_or(0);
    if centres.is_empty() || dims == 0 {
        return Err(Error::invalid_param("centres", centres.len(), "no centres to write"));
    }
    let mut matrix = Array2::zeros((centres.len(), dims));
    for (row, centre) in centres.iter().enumerate() {
        let values = centre.as_ref();
        if values.len() != dims {
            return Err(Error::invalid_param(
                "centres",
                values.len(),
                format!("every centre must have {} values", dims),
            ));
        }
        for (col, v) in values.iter().enumerate() {
            matrix[(row, col)] = *v;
        }
    }
    Ok(matrix)
}

/// One centre per matrix row, ids in row order
pub fn centres_from_matrix(matrix: &Array2<f64>) -> Vec<ClusterCentre> {
    matrix
        .rows()
        .into_iter()
        .enumerate()
        .map(|(id, row)| ClusterCentre::new(id, row.to_vec()))
        .collect()
}

pub fn save_centres<P: AsRef<Path>, T: AsRef<[f64]>>(path: P, centres: &[T]) -> Result<()> {
    write_matrix(path, &centres_to_matrix(centres)?)
}

pub fn load_centres<P: AsRef<Path>>(path: P) -> Result<Vec<ClusterCentre>> {
    let matrix = read_matrix(path)?;
    if matrix.nrows() == 0 {
        return Err(Error::invalid_param("centres", 0, "centre file holds no rows"));
    }
    Ok(centres_from_matrix(&matrix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("centres.mtxt");
        let centres = vec![
            ClusterCentre::new(0, vec![1.0, 2.0, 3.0]),
            ClusterCentre::new(1, vec![-4.5, 0.25, 8.0]),
        ];
        save_centres(&path, &centres).unwrap();
        let loaded = load_centres(&path).unwrap();
        assert_eq!(loaded, centres);
        assert_eq!(loaded[1].name, "class_2");
    }

    #[test]
    fn test_ragged_centres_rejected() {
        let centres = vec![ClusterCentre::new(0, vec![1.0, 2.0]), ClusterCentre::new(1, vec![1.0])];
        assert!(centres_to_matrix(&centres).is_err());
        assert!(centres_to_matrix::<ClusterCentre>(&[]).is_err());
    }

    #[test]
    fn test_iso_conversion() {
        let iso = ClusterCentreIso::from(ClusterCentre::new(3, vec![5.0, 6.0]));
        assert_eq!(iso.std_dev, vec![0.0, 0.0]);
        assert_eq!(iso.to_centre().values, vec![5.0, 6.0]);
        assert_eq!(iso.num_vals(), 2);
    }
}
