//! Block LDU factorisation with a fixed elimination order.
//!
//! The pattern is expected to carry the fill-in entries predicted at
//! structure-build time, so the factorisation updates values strictly in
//! place. The pivot is always the diagonal block of the current row; a
//! numerically singular pivot is the only failure mode.

use thiserror::Error;

use super::{BlockPattern, LuBlock};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SparseLuError {
    #[error("singular pivot block at row {0}")]
    SingularPivot(usize),
    #[error("solve called before prefactorize")]
    NotFactorized,
}

/// Sparse LU solver with cached factors, reusable across right-hand sides.
#[derive(Debug)]
pub struct SparseLuSolver<B: LuBlock> {
    lu: Vec<B>,
    d_inv: Vec<B>,
    factorized: bool,
}

impl<B: LuBlock> SparseLuSolver<B> {
    pub fn new() -> Self {
        Self {
            lu: Vec::new(),
            d_inv: Vec::new(),
            factorized: false,
        }
    }

    /// Drops the cached factors; the next solve must re-factorize.
    pub fn reset(&mut self) {
        self.factorized = false;
    }

    /// Performs the block LDU factorisation in natural order `0, 1, … n-1`.
    ///
    /// Row `i` is combined with every already-eliminated row `j < i` present
    /// in its pattern: `L_ij = A_ij · U_jj⁻¹`, then `A_ik -= L_ij · U_jk` for
    /// the upper entries `k` of row `j`. The fill-complete pattern guarantees
    /// `(i, k)` exists.
    pub fn prefactorize(
        &mut self,
        pattern: &BlockPattern,
        blocks: &[B],
    ) -> Result<(), SparseLuError> {
        debug_assert_eq!(blocks.len(), pattern.nnz());
        self.lu.clear();
        self.lu.extend_from_slice(blocks);
        self.d_inv.clear();
        self.d_inv.resize(pattern.n, B::zero_block());
        self.factorized = false;

        for i in 0..pattern.n {
            let row_i = pattern.row(i);
            for p_ij in row_i.clone() {
                let j = pattern.col_indices[p_ij];
                if j >= i {
                    break;
                }
                let l_ij = self.lu[p_ij] * self.d_inv[j];
                self.lu[p_ij] = l_ij;
                for p_jk in pattern.row(j) {
                    let k = pattern.col_indices[p_jk];
                    if k <= j {
                        continue;
                    }
                    let p_ik = pattern
                        .find(i, k)
                        .expect("fill-in entry missing from frozen pattern");
                    let update = l_ij * self.lu[p_jk];
                    self.lu[p_ik] -= update;
                }
            }
            let d = self.lu[pattern.diag_entry[i]];
            self.d_inv[i] = d.inv_block().ok_or(SparseLuError::SingularPivot(i))?;
        }
        self.factorized = true;
        Ok(())
    }

    /// Forward substitution, diagonal inversion, back substitution.
    pub fn solve(&self, pattern: &BlockPattern, x: &mut [B::Rhs]) -> Result<(), SparseLuError> {
        if !self.factorized {
            return Err(SparseLuError::NotFactorized);
        }
        debug_assert_eq!(x.len(), pattern.n);
        for i in 0..pattern.n {
            for p in pattern.row(i) {
                let j = pattern.col_indices[p];
                if j >= i {
                    break;
                }
                let update = self.lu[p].mv_block(x[j]);
                x[i] -= update;
            }
        }
        for i in (0..pattern.n).rev() {
            for p in pattern.row(i).rev() {
                let k = pattern.col_indices[p];
                if k <= i {
                    break;
                }
                let update = self.lu[p].mv_block(x[k]);
                x[i] -= update;
            }
            x[i] = self.d_inv[i].mv_block(x[i]);
        }
        Ok(())
    }

    /// One-shot factorize + solve.
    pub fn factorize_and_solve(
        &mut self,
        pattern: &BlockPattern,
        blocks: &[B],
        x: &mut [B::Rhs],
    ) -> Result<(), SparseLuError> {
        self.prefactorize(pattern, blocks)?;
        self.solve(pattern, x)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{block_mat_vec, BlockPattern};
    use super::*;
    use nalgebra::{Matrix3, Vector3};
    use num_complex::Complex64;
    use std::collections::BTreeSet;

    fn dense_pattern(n: usize) -> BlockPattern {
        let rows = (0..n)
            .map(|_| (0..n).collect::<BTreeSet<usize>>())
            .collect();
        BlockPattern::from_rows(rows)
    }

    #[test]
    fn test_scalar_lu_roundtrip() {
        let pattern = dense_pattern(3);
        // diagonally dominant complex matrix
        let dense = [
            [(4.0, 1.0), (1.0, 0.0), (0.0, 0.5)],
            [(1.0, -1.0), (5.0, 0.0), (1.0, 0.0)],
            [(0.0, 0.0), (2.0, 0.5), (6.0, -1.0)],
        ];
        let blocks: Vec<Complex64> = pattern
            .col_indices
            .iter()
            .enumerate()
            .map(|(p, &c)| {
                let r = pattern.row_indptr.iter().rposition(|&s| s <= p).unwrap();
                let (re, im) = dense[r][c];
                Complex64::new(re, im)
            })
            .collect();
        let x_true = vec![
            Complex64::new(1.0, 2.0),
            Complex64::new(-0.5, 0.25),
            Complex64::new(0.0, -1.0),
        ];
        let mut b = block_mat_vec(&pattern, &blocks, &x_true);
        let mut solver = SparseLuSolver::new();
        solver.factorize_and_solve(&pattern, &blocks, &mut b).unwrap();
        for (got, want) in b.iter().zip(&x_true) {
            assert!((got - want).norm() < 1e-10, "{got} != {want}");
        }
    }

    #[test]
    fn test_block_lu_roundtrip() {
        // 2x2 grid of 3x3 blocks with an off-diagonal coupling
        let pattern = dense_pattern(2);
        let coupling = Matrix3::from_fn(|r, c| Complex64::new(0.1 * (r + c) as f64, 0.05));
        let diag = Matrix3::from_fn(|r, c| {
            if r == c {
                Complex64::new(3.0 + r as f64, -1.0)
            } else {
                Complex64::new(0.2, 0.1)
            }
        });
        let blocks: Vec<Matrix3<Complex64>> = pattern
            .col_indices
            .iter()
            .enumerate()
            .map(|(p, &c)| {
                let r = pattern.row_indptr.iter().rposition(|&s| s <= p).unwrap();
                if r == c {
                    diag
                } else {
                    coupling
                }
            })
            .collect();
        let x_true = vec![
            Vector3::new(
                Complex64::new(1.0, 0.0),
                Complex64::new(0.0, 1.0),
                Complex64::new(-1.0, 0.5),
            ),
            Vector3::from_element(Complex64::new(0.25, -0.75)),
        ];
        let mut b = block_mat_vec(&pattern, &blocks, &x_true);
        let mut solver = SparseLuSolver::new();
        solver.factorize_and_solve(&pattern, &blocks, &mut b).unwrap();
        for (got, want) in b.iter().zip(&x_true) {
            assert!((got - want).norm() < 1e-9);
        }
    }

    #[test]
    fn test_fill_in_solve() {
        // star pattern: bus 0 couples to all leaves; leaves only via fills
        let mut rows = vec![BTreeSet::new(); 4];
        for leaf in 1..4 {
            rows[0].insert(leaf);
            rows[leaf].insert(0);
        }
        let pattern = BlockPattern::from_rows(rows);
        let blocks: Vec<Complex64> = pattern
            .col_indices
            .iter()
            .enumerate()
            .map(|(p, &c)| {
                let r = pattern.row_indptr.iter().rposition(|&s| s <= p).unwrap();
                if r == c {
                    Complex64::new(4.0, 0.0)
                } else if r == 0 || c == 0 {
                    Complex64::new(-1.0, 0.0)
                } else {
                    // fill-in entries start numerically zero
                    Complex64::new(0.0, 0.0)
                }
            })
            .collect();
        let x_true = vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(2.0, 0.0),
            Complex64::new(3.0, 0.0),
            Complex64::new(4.0, 0.0),
        ];
        let mut b = block_mat_vec(&pattern, &blocks, &x_true);
        let mut solver = SparseLuSolver::new();
        solver.factorize_and_solve(&pattern, &blocks, &mut b).unwrap();
        for (got, want) in b.iter().zip(&x_true) {
            assert!((got - want).norm() < 1e-10);
        }
    }

    #[test]
    fn test_singular_pivot() {
        let pattern = dense_pattern(2);
        let blocks = vec![Complex64::new(0.0, 0.0); pattern.nnz()];
        let mut solver = SparseLuSolver::new();
        let err = solver.prefactorize(&pattern, &blocks).unwrap_err();
        assert_eq!(err, SparseLuError::SingularPivot(0));
    }

    #[test]
    fn test_solve_requires_factors() {
        let pattern = dense_pattern(1);
        let solver: SparseLuSolver<Complex64> = SparseLuSolver::new();
        let mut rhs = vec![Complex64::new(1.0, 0.0)];
        assert_eq!(
            solver.solve(&pattern, &mut rhs).unwrap_err(),
            SparseLuError::NotFactorized
        );
    }
}
