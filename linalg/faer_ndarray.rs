//! Bridges between ndarray arrays and faer's dense decompositions.
//!
//! Arrays in standard (row-major) or Fortran layout are handed to faer without
//! copying; any other layout is gathered into an owned faer matrix first.

use dyn_stack::{MemBuffer, MemStack};
use faer::diag::{Diag, DiagRef};
use faer::linalg::solvers::{self, Solve};
use faer::linalg::svd::{self, ComputeSvdVectors};
use faer::{Mat, MatRef, Side, get_global_parallelism};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("SVD failed to converge")]
    SvdNoConvergence,
    #[error("Self-adjoint eigendecomposition failed: {0:?}")]
    SelfAdjointEigen(solvers::EvdError),
    #[error("Cholesky factorization failed: {0:?}")]
    Cholesky(solvers::LltError),
}

enum Backing<'a> {
    Borrowed(MatRef<'a, f64>),
    Gathered(Mat<f64>),
}

/// A faer matrix reference over ndarray data, borrowed whenever the layout allows.
pub struct FaerView<'a> {
    backing: Backing<'a>,
}

impl<'a> FaerView<'a> {
    pub fn matrix<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let borrowed = array.as_slice_memory_order().and_then(|slice| {
            if array.is_standard_layout() {
                Some(MatRef::from_row_major_slice(slice, rows, cols))
            } else if array.t().is_standard_layout() {
                Some(MatRef::from_column_major_slice(slice, rows, cols))
            } else {
                None
            }
        });
        let backing = match borrowed {
            Some(view) => Backing::Borrowed(view),
            None => Backing::Gathered(Mat::from_fn(rows, cols, |i, j| array[(i, j)])),
        };
        Self { backing }
    }

    /// A vector as a single-column matrix.
    pub fn column<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix1>) -> Self {
        let len = array.len();
        let backing = match array.as_slice() {
            Some(slice) => Backing::Borrowed(MatRef::from_column_major_slice(slice, len, 1)),
            None => Backing::Gathered(Mat::from_fn(len, 1, |i, _| array[i])),
        };
        Self { backing }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        match &self.backing {
            Backing::Borrowed(view) => *view,
            Backing::Gathered(mat) => mat.as_ref(),
        }
    }
}

fn to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}

fn to_array_transposed(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.ncols(), mat.nrows()), |(i, j)| mat[(j, i)])
}

fn diagonal(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let values = diag.column_vector().as_mat();
    Array1::from_shape_fn(values.nrows(), |i| values[(i, 0)])
}

fn requested(vectors: bool) -> ComputeSvdVectors {
    if vectors {
        ComputeSvdVectors::Thin
    } else {
        ComputeSvdVectors::No
    }
}

/// Runs faer's SVD, producing the thin `U` and `V` factors only when asked.
fn decompose(
    matrix: MatRef<'_, f64>,
    vectors: bool,
) -> Result<(Diag<f64>, Option<(Mat<f64>, Mat<f64>)>), FaerLinalgError> {
    let (rows, cols) = matrix.shape();
    let rank = rows.min(cols);
    let par = get_global_parallelism();
    let mut mem = MemBuffer::new(svd::svd_scratch::<f64>(
        rows,
        cols,
        requested(vectors),
        requested(vectors),
        par,
        Default::default(),
    ));
    let mut stack = MemStack::new(&mut mem);

    let mut singular = Diag::<f64>::zeros(rank);
    let mut factors = if vectors {
        Some((Mat::<f64>::zeros(rows, rank), Mat::<f64>::zeros(cols, rank)))
    } else {
        None
    };
    let (u, v) = match factors.as_mut() {
        Some((u, v)) => (Some(u.as_mut()), Some(v.as_mut())),
        None => (None, None),
    };
    svd::svd(
        matrix,
        singular.as_mut(),
        u,
        v,
        par,
        &mut stack,
        Default::default(),
    )
    .map_err(|_| FaerLinalgError::SvdNoConvergence)?;
    Ok((singular, factors))
}

/// Singular value decomposition returning `(U, S, Vᵗ)`.
pub trait FaerSvd {
    /// Economy decomposition: `U` is `(rows, r)`, `Vᵗ` is `(r, cols)` with `r = min(rows, cols)`.
    fn thin_svd(&self) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>), FaerLinalgError>;

    /// Singular values only, in descending order.
    fn singular_values(&self) -> Result<Array1<f64>, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerSvd for ArrayBase<S, Ix2> {
    fn thin_svd(&self) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>), FaerLinalgError> {
        let view = FaerView::matrix(self);
        let (singular, factors) = decompose(view.as_ref(), true)?;
        let (u, v) = factors.ok_or(FaerLinalgError::SvdNoConvergence)?;
        Ok((
            to_array(u.as_ref()),
            diagonal(singular.as_ref()),
            to_array_transposed(v.as_ref()),
        ))
    }

    fn singular_values(&self) -> Result<Array1<f64>, FaerLinalgError> {
        let view = FaerView::matrix(self);
        let (singular, _) = decompose(view.as_ref(), false)?;
        Ok(diagonal(singular.as_ref()))
    }
}

pub trait FaerEigh {
    /// Symmetric eigendecomposition; eigenvalues come back in ascending order.
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerEigh for ArrayBase<S, Ix2> {
    fn eigh(&self, side: Side) -> Result<(Array1<f64>, Array2<f64>), FaerLinalgError> {
        let view = FaerView::matrix(self);
        let eigen = view
            .as_ref()
            .self_adjoint_eigen(side)
            .map_err(FaerLinalgError::SelfAdjointEigen)?;
        Ok((diagonal(eigen.S()), to_array(eigen.U())))
    }
}

/// An `L Lᵗ` factorization kept around for repeated solves.
pub struct CholeskyFactor {
    llt: solvers::Llt<f64>,
}

impl CholeskyFactor {
    pub fn solve_vec(&self, rhs: &Array1<f64>) -> Array1<f64> {
        let view = FaerView::column(rhs);
        let solution = self.llt.solve(view.as_ref());
        Array1::from_shape_fn(rhs.len(), |i| solution[(i, 0)])
    }
}

pub trait FaerCholesky {
    fn cholesky(&self, side: Side) -> Result<CholeskyFactor, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerCholesky for ArrayBase<S, Ix2> {
    fn cholesky(&self, side: Side) -> Result<CholeskyFactor, FaerLinalgError> {
        let view = FaerView::matrix(self);
        let llt = view.as_ref().llt(side).map_err(FaerLinalgError::Cholesky)?;
        Ok(CholeskyFactor { llt })
    }
}
