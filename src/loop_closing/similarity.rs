//! Place-vs-place similarity matrix.

use std::fmt::Write as _;
use std::path::Path;

use nalgebra::DMatrix;

use crate::error::{Error, Result};

/// Square matrix of accumulated vote weights, one row and column per place.
///
/// Row `i` holds the vote of place `i` against every place created before
/// it, so the useful content sits below the diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    data: DMatrix<f64>,
}

impl Default for SimilarityMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityMatrix {
    pub fn new() -> Self {
        Self {
            data: DMatrix::zeros(0, 0),
        }
    }

    /// Wrap an existing square matrix.
    pub fn from_matrix(data: DMatrix<f64>) -> Result<Self> {
        if data.nrows() != data.ncols() {
            return Err(Error::MalformedInput(format!(
                "similarity matrix must be square, got {}x{}",
                data.nrows(),
                data.ncols()
            )));
        }
        Ok(Self { data })
    }

    pub fn size(&self) -> usize {
        self.data.nrows()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[(i, j)] = value;
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Grow by one place and store its vote as the new row.
    ///
    /// A shorter vote is zero-padded; the diagonal cell is always zero.
    pub fn append_row(&mut self, vote: &[f64]) -> Result<()> {
        let n = self.size() + 1;
        if vote.len() > n {
            return Err(Error::MalformedInput(format!(
                "vote of length {} does not fit a {}x{} matrix",
                vote.len(),
                n,
                n
            )));
        }
        self.data.resize_mut(n, n, 0.0);
        for (j, &v) in vote.iter().enumerate() {
            self.data[(n - 1, j)] = v;
        }
        self.data[(n - 1, n - 1)] = 0.0;
        Ok(())
    }

    /// Lower-triangular fold: cell `(i, j)` with `j < i` becomes
    /// `max(m[i][j], m[j][i])`; the diagonal and upper triangle are zero.
    pub fn fold(&self) -> Self {
        let n = self.size();
        let data = DMatrix::from_fn(n, n, |i, j| {
            if j < i {
                self.data[(i, j)].max(self.data[(j, i)])
            } else {
                0.0
            }
        });
        Self { data }
    }

    /// Zero every cell closer than `width` to the diagonal.
    pub fn zero_diagonal_band(&mut self, width: usize) {
        let n = self.size();
        for i in 0..n {
            for j in 0..n {
                if i.abs_diff(j) < width {
                    self.data[(i, j)] = 0.0;
                }
            }
        }
    }

    /// Carry the matrix over to a new id space.
    ///
    /// `id_map[i]` is the new index of old place `i`, or `None` if it is
    /// gone. Cells landing on the same target keep their maximum.
    pub fn remap(&self, id_map: &[Option<usize>], size: usize) -> Self {
        let mut data = DMatrix::zeros(size, size);
        let n = self.size().min(id_map.len());
        for i in 0..n {
            let Some(a) = id_map[i].filter(|&a| a < size) else {
                continue;
            };
            for j in 0..n {
                let Some(b) = id_map[j].filter(|&b| b < size) else {
                    continue;
                };
                if a != b {
                    data[(a, b)] = f64::max(data[(a, b)], self.data[(i, j)]);
                }
            }
        }
        Self { data }
    }

    /// Read a whitespace-separated row-major text file.
    ///
    /// The size is inferred as `round(sqrt(count))`; a count that is not a
    /// perfect square is rejected.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let values = text
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|_| Error::MalformedInput(format!("not a number: {:?}", tok)))
            })
            .collect::<Result<Vec<f64>>>()?;

        let n = (values.len() as f64).sqrt().round() as usize;
        if n * n != values.len() {
            return Err(Error::MalformedInput(format!(
                "{} values do not form a square matrix",
                values.len()
            )));
        }
        Ok(Self {
            data: DMatrix::from_row_slice(n, n, &values),
        })
    }

    /// Write as text, one row per line.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_text())?;
        Ok(())
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for row in self.data.row_iter() {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            let _ = writeln!(out, "{}", line.join(" "));
        }
        out
    }
}
