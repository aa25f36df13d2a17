//! Distance functions over feature rows.

use crate::errors::Result;
use crate::pipeline::params::ParameterSet;
use crate::pipeline::traits::{Described, DistanceFunction};

macro_rules! distance_function {
    ($ty:ident, $name:expr, $desc:expr) => {
        pub struct $ty {
            params: ParameterSet,
        }

        impl Default for $ty {
            fn default() -> Self {
                Self {
                    params: ParameterSet::empty($name),
                }
            }
        }

        impl Described for $ty {
            const NAME: &'static str = $name;
            const DESCRIPTION: &'static str = $desc;
        }

        impl_module!($ty);
    };
}

distance_function!(
    EuclideanDistance,
    "EuclideanDistance",
    "Square root of the summed squared differences (histogram distance)."
);

impl DistanceFunction for EuclideanDistance {
    fn pair(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        Ok(a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt())
    }
}

distance_function!(
    CosineDistance,
    "CosineDistance",
    "One minus the cosine similarity of the two vectors."
);

impl DistanceFunction for CosineDistance {
    fn pair(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
        // a zero vector is equally dissimilar to everything
        if na == 0.0 || nb == 0.0 {
            return Ok(1.0);
        }
        Ok(1.0 - dot / (na * nb))
    }
}

distance_function!(
    ManhattanDistance,
    "ManhattanDistance",
    "Sum of absolute differences (L1 distance)."
);

impl DistanceFunction for ManhattanDistance {
    fn pair(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        Ok(a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Matrix;

    #[test]
    fn test_euclidean() {
        let d = EuclideanDistance::default();
        assert_eq!(d.pair(&[0.0, 0.0], &[3.0, 4.0]).unwrap(), 5.0);
    }

    #[test]
    fn test_cosine() {
        let d = CosineDistance::default();
        assert!(d.pair(&[1.0, 0.0], &[2.0, 0.0]).unwrap().abs() < 1e-12);
        assert!((d.pair(&[1.0, 0.0], &[0.0, 1.0]).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(d.pair(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_manhattan_matrix() {
        let d = ManhattanDistance::default();
        let u = Matrix::from_rows(vec![vec![1.0, 1.0]]).unwrap();
        let k = Matrix::from_rows(vec![vec![0.0, 0.0], vec![1.0, 3.0]]).unwrap();
        let out = d.distance(&u, &k).unwrap();
        assert_eq!(out.row(0), &[2.0, 2.0]);
    }
}
