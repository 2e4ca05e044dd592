//! Block-sparse storage shared by the Y-bus, the solvers and the LU
//! factorisation. Matrices are kept in CSR form over tensor blocks; the
//! column pattern is sorted, contains every diagonal and is frozen after
//! construction (fill-in entries included), so the numerical factorisation
//! never allocates.

pub mod lu;

pub use lu::{SparseLuError, SparseLuSolver};

use nalgebra::{Matrix2, Matrix3, Matrix6, Vector2, Vector3, Vector6};
use num_complex::Complex64;

/// Right-hand-side element matching one block row.
pub trait LuRhs:
    Copy
    + std::fmt::Debug
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::AddAssign
    + std::ops::SubAssign
    + Send
    + Sync
    + 'static
{
    fn rhs_zero() -> Self;
    fn rhs_scale(self, s: f64) -> Self;
    fn rhs_is_nan(self) -> bool;
}

/// A square tensor block the LU factorisation can eliminate.
pub trait LuBlock:
    Copy
    + std::fmt::Debug
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + std::ops::Mul<Output = Self>
    + std::ops::AddAssign
    + std::ops::SubAssign
    + Send
    + Sync
    + 'static
{
    type Rhs: LuRhs;

    fn zero_block() -> Self;
    fn identity_block() -> Self;
    fn scale_block(self, s: f64) -> Self;
    /// Conjugate (hermitian) transpose; plain transpose for real blocks.
    fn h_transpose(self) -> Self;
    /// Inverse, or `None` when the block is numerically singular.
    fn inv_block(self) -> Option<Self>;
    fn mv_block(self, v: Self::Rhs) -> Self::Rhs;
    fn is_nan_block(self) -> bool;
}

impl LuRhs for Complex64 {
    fn rhs_zero() -> Self {
        Complex64::new(0.0, 0.0)
    }
    fn rhs_scale(self, s: f64) -> Self {
        self * s
    }
    fn rhs_is_nan(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }
}

impl LuRhs for Vector3<Complex64> {
    fn rhs_zero() -> Self {
        Vector3::from_element(Complex64::new(0.0, 0.0))
    }
    fn rhs_scale(self, s: f64) -> Self {
        self * Complex64::new(s, 0.0)
    }
    fn rhs_is_nan(self) -> bool {
        self.iter().any(|c| c.re.is_nan() || c.im.is_nan())
    }
}

impl LuRhs for Vector2<f64> {
    fn rhs_zero() -> Self {
        Vector2::zeros()
    }
    fn rhs_scale(self, s: f64) -> Self {
        self * s
    }
    fn rhs_is_nan(self) -> bool {
        self.iter().any(|x| x.is_nan())
    }
}

impl LuRhs for Vector6<f64> {
    fn rhs_zero() -> Self {
        Vector6::zeros()
    }
    fn rhs_scale(self, s: f64) -> Self {
        self * s
    }
    fn rhs_is_nan(self) -> bool {
        self.iter().any(|x| x.is_nan())
    }
}

impl LuBlock for Complex64 {
    type Rhs = Complex64;

    fn zero_block() -> Self {
        Complex64::new(0.0, 0.0)
    }
    fn identity_block() -> Self {
        Complex64::new(1.0, 0.0)
    }
    fn scale_block(self, s: f64) -> Self {
        self * s
    }
    fn h_transpose(self) -> Self {
        self.conj()
    }
    fn inv_block(self) -> Option<Self> {
        let n = self.norm();
        if n.is_finite() && n > 1e-30 {
            Some(1.0 / self)
        } else {
            None
        }
    }
    fn mv_block(self, v: Complex64) -> Complex64 {
        self * v
    }
    fn is_nan_block(self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }
}

impl LuBlock for Matrix3<Complex64> {
    type Rhs = Vector3<Complex64>;

    fn zero_block() -> Self {
        Matrix3::zeros()
    }
    fn identity_block() -> Self {
        Matrix3::identity()
    }
    fn scale_block(self, s: f64) -> Self {
        self * Complex64::new(s, 0.0)
    }
    fn h_transpose(self) -> Self {
        self.adjoint()
    }
    fn inv_block(self) -> Option<Self> {
        let det = self.determinant();
        if !det.norm().is_finite() || det.norm() < 1e-30 {
            return None;
        }
        self.try_inverse()
    }
    fn mv_block(self, v: Vector3<Complex64>) -> Vector3<Complex64> {
        self * v
    }
    fn is_nan_block(self) -> bool {
        self.iter().any(|c| c.re.is_nan() || c.im.is_nan())
    }
}

impl LuBlock for Matrix2<f64> {
    type Rhs = Vector2<f64>;

    fn zero_block() -> Self {
        Matrix2::zeros()
    }
    fn identity_block() -> Self {
        Matrix2::identity()
    }
    fn scale_block(self, s: f64) -> Self {
        self * s
    }
    fn h_transpose(self) -> Self {
        self.transpose()
    }
    fn inv_block(self) -> Option<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < 1e-30 {
            return None;
        }
        self.try_inverse()
    }
    fn mv_block(self, v: Vector2<f64>) -> Vector2<f64> {
        self * v
    }
    fn is_nan_block(self) -> bool {
        self.iter().any(|x| x.is_nan())
    }
}

impl LuBlock for Matrix6<f64> {
    type Rhs = Vector6<f64>;

    fn zero_block() -> Self {
        Matrix6::zeros()
    }
    fn identity_block() -> Self {
        Matrix6::identity()
    }
    fn scale_block(self, s: f64) -> Self {
        self * s
    }
    fn h_transpose(self) -> Self {
        self.transpose()
    }
    fn inv_block(self) -> Option<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < 1e-30 {
            return None;
        }
        self.try_inverse()
    }
    fn mv_block(self, v: Vector6<f64>) -> Vector6<f64> {
        self * v
    }
    fn is_nan_block(self) -> bool {
        self.iter().any(|x| x.is_nan())
    }
}

/// Frozen block CSR pattern. Column indices are sorted per row, every
/// diagonal entry exists, and LU fill-in entries are already present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockPattern {
    pub n: usize,
    pub row_indptr: Vec<usize>,
    pub col_indices: Vec<usize>,
    /// Position of the diagonal entry of each row.
    pub diag_entry: Vec<usize>,
}

impl BlockPattern {
    /// Builds the pattern from per-row sorted column sets. Fill-in entries
    /// predicted by symbolic elimination in natural order are inserted so
    /// that the numerical factorisation finds every update target.
    pub fn from_rows(mut rows: Vec<std::collections::BTreeSet<usize>>) -> Self {
        let n = rows.len();
        for (i, row) in rows.iter_mut().enumerate() {
            row.insert(i);
        }
        // symbolic elimination: entries (i, k) appear for every pair of
        // off-pivot entries of the pivot row
        for p in 0..n {
            let upper: Vec<usize> = rows[p].iter().copied().filter(|&k| k > p).collect();
            for &i in &upper {
                for &k in &upper {
                    if i != k {
                        rows[i].insert(k);
                    }
                }
            }
        }
        let mut row_indptr = Vec::with_capacity(n + 1);
        let mut col_indices = Vec::new();
        let mut diag_entry = Vec::with_capacity(n);
        row_indptr.push(0);
        for (i, row) in rows.iter().enumerate() {
            for &c in row.iter() {
                if c == i {
                    diag_entry.push(col_indices.len());
                }
                col_indices.push(c);
            }
            row_indptr.push(col_indices.len());
        }
        Self {
            n,
            row_indptr,
            col_indices,
            diag_entry,
        }
    }

    pub fn nnz(&self) -> usize {
        self.col_indices.len()
    }

    #[inline]
    pub fn row(&self, i: usize) -> std::ops::Range<usize> {
        self.row_indptr[i]..self.row_indptr[i + 1]
    }

    /// Position of entry `(i, j)`, if present.
    #[inline]
    pub fn find(&self, i: usize, j: usize) -> Option<usize> {
        let range = self.row(i);
        let cols = &self.col_indices[range.clone()];
        cols.binary_search(&j).ok().map(|p| range.start + p)
    }
}

/// `y = A·x` over the block pattern.
pub fn block_mat_vec<B: LuBlock>(pattern: &BlockPattern, blocks: &[B], x: &[B::Rhs]) -> Vec<B::Rhs> {
    let mut y = vec![B::Rhs::rhs_zero(); pattern.n];
    for i in 0..pattern.n {
        for p in pattern.row(i) {
            y[i] += blocks[p].mv_block(x[pattern.col_indices[p]]);
        }
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_pattern_diagonal_always_present() {
        let rows = vec![BTreeSet::new(), BTreeSet::new(), BTreeSet::new()];
        let pattern = BlockPattern::from_rows(rows);
        assert_eq!(pattern.nnz(), 3);
        for i in 0..3 {
            assert_eq!(pattern.find(i, i), Some(pattern.diag_entry[i]));
        }
    }

    #[test]
    fn test_pattern_fill_in() {
        // star topology around bus 0: eliminating bus 0 couples all leaves
        let mut rows = vec![BTreeSet::new(); 4];
        for leaf in 1..4 {
            rows[0].insert(leaf);
            rows[leaf].insert(0);
        }
        let pattern = BlockPattern::from_rows(rows);
        // fills between every pair of leaves
        for i in 1..4 {
            for j in 1..4 {
                assert!(pattern.find(i, j).is_some(), "missing fill ({i},{j})");
            }
        }
    }

    #[test]
    fn test_block_mat_vec() {
        let mut rows = vec![BTreeSet::new(); 2];
        rows[0].insert(1);
        rows[1].insert(0);
        let pattern = BlockPattern::from_rows(rows);
        let blocks: Vec<Complex64> = pattern
            .col_indices
            .iter()
            .zip(0..)
            .map(|(_, k)| Complex64::new(k as f64 + 1.0, 0.0))
            .collect();
        let x = vec![Complex64::new(1.0, 0.0); 2];
        let y = block_mat_vec(&pattern, &blocks, &x);
        // row sums of the dense equivalent
        assert!((y[0] - Complex64::new(3.0, 0.0)).norm() < 1e-12);
        assert!((y[1] - Complex64::new(7.0, 0.0)).norm() < 1e-12);
    }
}
