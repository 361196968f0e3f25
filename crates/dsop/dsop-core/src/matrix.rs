use crate::error::DsopError;

/// A row-major, densely packed N x M matrix of doubles.
///
/// `Matrix` owns its backing storage exclusively; `get`/`get_mut` are
/// bounds-checked, so out-of-range access panics rather than reading
/// adjacent memory. Equality is bitwise over the full buffer plus
/// dimensions — there is no tolerance at this layer, only at the harness's
/// validation path.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn from_rows<I, R>(rows: usize, cols: usize, rows_iter: I) -> Result<Self, DsopError>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[f64]>,
    {
        let mut data = Vec::with_capacity(rows * cols);
        let mut seen_rows = 0;
        for row in rows_iter {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(DsopError::DimensionMismatch {
                    expected: format!("row of length {cols}"),
                    actual: format!("row of length {}", row.len()),
                });
            }
            data.extend_from_slice(row);
            seen_rows += 1;
        }
        if seen_rows != rows {
            return Err(DsopError::DimensionMismatch {
                expected: format!("{rows} rows"),
                actual: format!("{seen_rows} rows"),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    #[inline]
    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut f64 {
        &mut self.data[i * self.cols + j]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn fill_zero(&mut self) {
        self.data.iter_mut().for_each(|x| *x = 0.0);
    }

    pub fn add_in_place(&mut self, other: &Matrix) {
        assert_eq!(self.rows, other.rows, "row count mismatch in add_in_place");
        assert_eq!(self.cols, other.cols, "col count mismatch in add_in_place");
        for (dst, src) in self.data.iter_mut().zip(other.data.iter()) {
            *dst += src;
        }
    }

    /// a (x) b as a fresh matrix of shape a.len() x b.len().
    pub fn outer(a: &[f64], b: &[f64]) -> Matrix {
        let mut m = Matrix::zeros(a.len(), b.len());
        m.set_outer(a, b);
        m
    }

    pub fn set_outer(&mut self, a: &[f64], b: &[f64]) {
        self.set_submatrix_outer(0, 0, a, b);
    }

    pub fn add_outer(&mut self, a: &[f64], b: &[f64]) {
        self.add_submatrix_outer(0, 0, a, b);
    }

    pub fn set_submatrix_outer(&mut self, r0: usize, c0: usize, a: &[f64], b: &[f64]) {
        self.check_submatrix_bounds(r0, c0, a.len(), b.len());
        for (i, &ai) in a.iter().enumerate() {
            for (j, &bj) in b.iter().enumerate() {
                *self.get_mut(r0 + i, c0 + j) = ai * bj;
            }
        }
    }

    pub fn add_submatrix_outer(&mut self, r0: usize, c0: usize, a: &[f64], b: &[f64]) {
        self.check_submatrix_bounds(r0, c0, a.len(), b.len());
        for (i, &ai) in a.iter().enumerate() {
            for (j, &bj) in b.iter().enumerate() {
                *self.get_mut(r0 + i, c0 + j) += ai * bj;
            }
        }
    }

    /// Copies a raw row-major block into `[r0, r0+rows) x [c0, c0+cols)`,
    /// no arithmetic involved. Used to assemble a result matrix from
    /// independently-computed disjoint sub-blocks (`rabenseifner_scatter`'s
    /// butterfly sub-block exchange), where each block is already the
    /// final value rather than a contribution to add.
    pub fn set_submatrix(&mut self, r0: usize, c0: usize, rows: usize, cols: usize, data: &[f64]) {
        self.check_submatrix_bounds(r0, c0, rows, cols);
        assert_eq!(data.len(), rows * cols, "block data length must match rows*cols");
        for i in 0..rows {
            let dst_start = (r0 + i) * self.cols + c0;
            self.data[dst_start..dst_start + cols].copy_from_slice(&data[i * cols..(i + 1) * cols]);
        }
    }

    fn check_submatrix_bounds(&self, r0: usize, c0: usize, a_len: usize, b_len: usize) {
        assert!(
            r0 + a_len <= self.rows && c0 + b_len <= self.cols,
            "sub-block outer product out of bounds: r0={r0} a_len={a_len} rows={} c0={c0} b_len={b_len} cols={}",
            self.rows,
            self.cols
        );
    }

    /// Frobenius^2 distance to `other`; NaN propagates to +infinity so a
    /// diverged run never compares as "close enough".
    pub fn frobenius_sq_diff(&self, other: &Matrix) -> f64 {
        assert_eq!(self.rows, other.rows);
        assert_eq!(self.cols, other.cols);
        let sum: f64 = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum();
        if sum.is_nan() { f64::INFINITY } else { sum }
    }
}
