//! Square walk-count matrices
//!
//! Products of 0/1 adjacency templates count the distinct k-length walks
//! between two nodes. Dimensions never exceed [`MAX_NODES`], so every
//! matrix lives in a fixed array.

use core::fmt;

use crate::types::*;

/// Square matrix of walk counts, `dim x dim`, `dim <= MAX_NODES`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HopMatrix {
    dim: usize,
    cells: [[u32; MAX_NODES]; MAX_NODES],
}

impl HopMatrix {
    /// All-zero matrix
    pub fn zeros(dim: usize) -> Result<Self> {
        if dim > MAX_NODES {
            return Err(Error::InvalidArg);
        }
        Ok(Self {
            dim,
            cells: [[0; MAX_NODES]; MAX_NODES],
        })
    }

    /// Build from row slices; every row must be `rows.len()` long
    pub fn from_rows<R: AsRef<[u32]>>(rows: &[R]) -> Result<Self> {
        let mut m = Self::zeros(rows.len())?;
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != m.dim {
                return Err(Error::InvalidArg);
            }
            m.cells[i][..m.dim].copy_from_slice(row);
        }
        Ok(m)
    }

    /// Matrix dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Cell value, 0 outside the matrix
    pub fn get(&self, i: usize, j: usize) -> u32 {
        if i < self.dim && j < self.dim {
            self.cells[i][j]
        } else {
            0
        }
    }

    /// Set a cell
    pub fn set(&mut self, i: usize, j: usize, value: u32) -> Result<()> {
        if i >= self.dim || j >= self.dim {
            return Err(Error::InvalidArg);
        }
        self.cells[i][j] = value;
        Ok(())
    }

    /// Row `i` as a slice of `dim` values
    pub fn row(&self, i: usize) -> &[u32] {
        if i < self.dim {
            &self.cells[i][..self.dim]
        } else {
            &[]
        }
    }

    /// Matrix product, saturating on overflow
    pub fn multiply(&self, other: &HopMatrix) -> Result<HopMatrix> {
        if self.dim != other.dim {
            return Err(Error::InvalidArg);
        }
        let mut out = Self::zeros(self.dim)?;
        for i in 0..self.dim {
            for j in 0..self.dim {
                let mut acc: u32 = 0;
                for k in 0..self.dim {
                    acc = acc.saturating_add(self.cells[i][k].saturating_mul(other.cells[k][j]));
                }
                out.cells[i][j] = acc;
            }
        }
        Ok(out)
    }
}

impl fmt::Debug for HopMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries((0..self.dim).map(|i| self.row(i)))
            .finish()
    }
}

/// `a * b`; both operands must share a dimension
pub fn multiply(a: &HopMatrix, b: &HopMatrix) -> Result<HopMatrix> {
    a.multiply(b)
}

/// Walk counts of exactly `k` hops: `template^k`
///
/// `k == 0` has no meaning for reachability and yields `None`.
pub fn k_hop_reachability(template: &HopMatrix, k: u8) -> Option<HopMatrix> {
    if k == 0 {
        return None;
    }
    let mut m = *template;
    for _ in 1..k {
        // dimensions always agree here
        m = m.multiply(template).ok()?;
    }
    Some(m)
}
