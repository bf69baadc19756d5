//! Cholesky factorization of the sampler's precision matrices through faer,
//! exposed as an extension trait on `ndarray` storage.

use faer::linalg::solvers::{self, Solve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix2};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("Cholesky factorization requires a square matrix, but got {rows}x{cols}.")]
    NotSquare { rows: usize, cols: usize },
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
    #[error("Right-hand side has length {found}, but the factor has dimension {expected}.")]
    DimensionMismatch { found: usize, expected: usize },
}

fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

/// Factor `A = L L^T` of a symmetric positive definite matrix.
pub struct CholeskyFactor {
    factor: solvers::Llt<f64>,
    lower: Array2<f64>,
}

impl CholeskyFactor {
    pub fn dim(&self) -> usize {
        self.lower.nrows()
    }

    /// The lower-triangular factor `L`.
    pub fn lower(&self) -> &Array2<f64> {
        &self.lower
    }

    /// Solves `A x = rhs`.
    pub fn solve_vec(&self, rhs: ArrayView1<f64>) -> Result<Array1<f64>, LinalgError> {
        self.check_len(rhs.len())?;
        let rhs_mat = Mat::from_fn(rhs.len(), 1, |i, _| rhs[i]);
        let sol = self.factor.solve(rhs_mat.as_ref());
        Ok(Array1::from_shape_fn(rhs.len(), |i| sol[(i, 0)]))
    }

    /// Computes `L z`.
    pub fn lower_mul(&self, z: ArrayView1<f64>) -> Result<Array1<f64>, LinalgError> {
        self.check_len(z.len())?;
        Ok(self.lower.dot(&z))
    }

    fn check_len(&self, found: usize) -> Result<(), LinalgError> {
        if found != self.dim() {
            return Err(LinalgError::DimensionMismatch {
                found,
                expected: self.dim(),
            });
        }
        Ok(())
    }
}

pub trait Cholesky {
    fn cholesky_lower(&self) -> Result<CholeskyFactor, LinalgError>;
}

impl<S: Data<Elem = f64>> Cholesky for ArrayBase<S, Ix2> {
    fn cholesky_lower(&self) -> Result<CholeskyFactor, LinalgError> {
        let (rows, cols) = self.dim();
        if rows != cols {
            return Err(LinalgError::NotSquare { rows, cols });
        }
        let mat = Mat::from_fn(rows, cols, |i, j| self[(i, j)]);
        let factor = mat.as_ref().llt(Side::Lower).map_err(LinalgError::Cholesky)?;
        let lower = mat_to_array(factor.L());
        Ok(CholeskyFactor { factor, lower })
    }
}
