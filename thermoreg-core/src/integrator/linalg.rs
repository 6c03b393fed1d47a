//! Dense 4×4 LU and the bordered block-diagonal system the thermal Jacobian
//! reduces to: one 4×4 block per element, coupled only through the central
//! blood pool in the last row and column.

use crate::segment::N_COMPARTMENTS as B;
use itertools::izip;

pub type Block = [[f64; B]; B];
pub type BlockVec = [f64; B];

/// LU factors of one block with partial pivoting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lu4 {
    lu: Block,
    piv: [usize; B],
}

impl Lu4 {
    /// `None` when the block is numerically singular
    pub fn factor(mut a: Block) -> Option<Self> {
        let mut piv = [0, 1, 2, 3];
        for k in 0..B {
            let p = (k..B).max_by(|&i, &j| a[i][k].abs().total_cmp(&a[j][k].abs()))?;
            if !(a[p][k].abs() > f64::MIN_POSITIVE) || !a[p][k].is_finite() {
                return None;
            }
            if p != k {
                a.swap(p, k);
                piv.swap(p, k);
            }
            for i in k + 1..B {
                a[i][k] /= a[k][k];
                for j in k + 1..B {
                    a[i][j] -= a[i][k] * a[k][j];
                }
            }
        }
        Some(Self { lu: a, piv })
    }

    pub fn solve(&self, b: &BlockVec) -> BlockVec {
        let mut x = [0.0; B];
        for i in 0..B {
            x[i] = b[self.piv[i]];
            for j in 0..i {
                x[i] -= self.lu[i][j] * x[j];
            }
        }
        for i in (0..B).rev() {
            for j in i + 1..B {
                x[i] -= self.lu[i][j] * x[j];
            }
            x[i] /= self.lu[i][i];
        }
        x
    }
}

/// Matrix of size `B·n + 1` holding diagonal blocks, a border column, a
/// border row and the corner element
#[derive(Debug, Clone, PartialEq)]
pub struct BorderedBlockMatrix {
    pub blocks: Vec<Block>,
    /// derivative of each block's rows with respect to the last unknown
    pub column: Vec<BlockVec>,
    /// derivative of the last row with respect to each block's unknowns
    pub row: Vec<BlockVec>,
    pub corner: f64,
}

impl BorderedBlockMatrix {
    pub fn zeros(n_blocks: usize) -> Self {
        Self {
            blocks: vec![[[0.0; B]; B]; n_blocks],
            column: vec![[0.0; B]; n_blocks],
            row: vec![[0.0; B]; n_blocks],
            corner: 0.0,
        }
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn dim(&self) -> usize {
        B * self.n_blocks() + 1
    }

    /// `I - gamma·self`, the iteration matrix of an implicit step
    pub fn iteration_matrix(&self, gamma: f64) -> Self {
        let mut m = Self {
            blocks: self.blocks.clone(),
            column: self.column.clone(),
            row: self.row.clone(),
            corner: 1.0 - gamma * self.corner,
        };
        for block in m.blocks.iter_mut() {
            for (i, r) in block.iter_mut().enumerate() {
                for (j, v) in r.iter_mut().enumerate() {
                    *v = (if i == j { 1.0 } else { 0.0 }) - gamma * *v;
                }
            }
        }
        for v in m.column.iter_mut().chain(m.row.iter_mut()).flatten() {
            *v *= -gamma;
        }
        m
    }

    /// Factors the matrix by block LU and the Schur complement of the corner
    pub fn factor(&self) -> Option<BorderedLu> {
        let mut lus = Vec::with_capacity(self.n_blocks());
        let mut z = Vec::with_capacity(self.n_blocks());
        let mut schur = self.corner;
        for (block, col, row) in izip!(&self.blocks, &self.column, &self.row) {
            let lu = Lu4::factor(*block)?;
            let ze = lu.solve(col);
            schur -= dot(row, &ze);
            lus.push(lu);
            z.push(ze);
        }
        if !(schur.abs() > f64::MIN_POSITIVE) || !schur.is_finite() {
            return None;
        }
        Some(BorderedLu {
            lus,
            z,
            row: self.row.clone(),
            schur,
        })
    }

    /// Product with a flat vector, for tests and diagnostics
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        let n = self.n_blocks();
        let last = x[B * n];
        let mut y = vec![0.0; B * n + 1];
        for e in 0..n {
            for i in 0..B {
                y[B * e + i] = (0..B).map(|j| self.blocks[e][i][j] * x[B * e + j]).sum::<f64>()
                    + self.column[e][i] * last;
            }
            y[B * n] += (0..B).map(|j| self.row[e][j] * x[B * e + j]).sum::<f64>();
        }
        y[B * n] += self.corner * last;
        y
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BorderedLu {
    lus: Vec<Lu4>,
    z: Vec<BlockVec>,
    row: Vec<BlockVec>,
    schur: f64,
}

impl BorderedLu {
    /// Solves in place; `rhs` is laid out like the state vector
    pub fn solve_in_place(&self, rhs: &mut [f64]) {
        let n = self.lus.len();
        let mut w = Vec::with_capacity(n);
        let mut last = rhs[B * n];
        for (e, lu) in self.lus.iter().enumerate() {
            let mut b = [0.0; B];
            b.copy_from_slice(&rhs[B * e..B * (e + 1)]);
            let we = lu.solve(&b);
            last -= dot(&self.row[e], &we);
            w.push(we);
        }
        last /= self.schur;
        for (e, we) in w.iter().enumerate() {
            for i in 0..B {
                rhs[B * e + i] = we[i] - self.z[e][i] * last;
            }
        }
        rhs[B * n] = last;
    }
}

fn dot(a: &BlockVec, b: &BlockVec) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ApproxEq;

    #[test]
    fn test_lu4_solves_with_pivoting() {
        let a = [
            [0.0, 2.0, 0.0, 1.0],
            [3.0, 0.0, 1.0, 0.0],
            [0.0, 1.0, 4.0, 0.0],
            [1.0, 0.0, 0.0, 5.0],
        ];
        let x = [1.0, -2.0, 0.5, 3.0];
        let b: BlockVec = std::array::from_fn(|i| (0..4).map(|j| a[i][j] * x[j]).sum());
        let solved = Lu4::factor(a).unwrap().solve(&b);
        assert!(solved.approx_eq(&x, 1e-12));
    }

    #[test]
    fn test_singular_block_is_reported() {
        assert!(Lu4::factor([[1.0; 4]; 4]).is_none());
    }

    #[test]
    fn test_bordered_solve_matches_product() {
        let mut m = BorderedBlockMatrix::zeros(3);
        for e in 0..3 {
            for i in 0..B {
                m.blocks[e][i][i] = 4.0 + e as f64;
                if i + 1 < B {
                    m.blocks[e][i][i + 1] = -1.0;
                    m.blocks[e][i + 1][i] = 0.5;
                }
                m.column[e][i] = 0.3 * (i as f64 + 1.0);
                m.row[e][i] = -0.2;
            }
        }
        m.corner = 2.0;
        let x: Vec<f64> = (0..m.dim()).map(|k| (k as f64 * 0.7).sin()).collect();
        let mut rhs = m.mul_vec(&x);
        m.factor().unwrap().solve_in_place(&mut rhs);
        assert!(rhs.approx_eq(&x, 1e-10));
    }

    #[test]
    fn test_iteration_matrix_of_zero_jacobian_is_identity() {
        let m = BorderedBlockMatrix::zeros(2).iteration_matrix(0.5);
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        assert_eq!(m.mul_vec(&x), x);
    }
}
