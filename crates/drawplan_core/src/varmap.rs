//! Variable block indexing and extraction for the LP decision vector.
//!
//! Each decision-variable family (b, d, e, f, g, m, s, w, x, zm, ...)
//! lives in a contiguous slice of the flat solution vector. [`VarBlock`]
//! records the start offset and shape of one family; [`VarMap`]
//! accumulates blocks in declaration order with a cursor tracking the
//! running offset. All continuous blocks must be added before
//! `mark_binary_start()`; binary blocks come after.

use rustc_hash::FxHashMap;

/// One contiguous family of LP decision variables inside the flat vector.
#[derive(Debug, Clone)]
pub struct VarBlock {
    name: &'static str,
    start: usize,
    shape: Vec<usize>,
    size: usize,
}

impl VarBlock {
    fn new(name: &'static str, start: usize, shape: &[usize]) -> Self {
        let size = shape.iter().product();
        VarBlock {
            name,
            start,
            shape: shape.to_vec(),
            size,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last flat index (exclusive upper bound for slicing).
    pub fn end(&self) -> usize {
        self.start + self.size
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flat index for the given multi-dimensional indices (row-major).
    ///
    /// A rank mismatch is a programmer error and panics; out-of-range
    /// single indices are caught by the solver's total variable count
    /// check rather than here, to avoid per-call cost.
    pub fn idx(&self, indices: &[usize]) -> usize {
        assert_eq!(
            indices.len(),
            self.shape.len(),
            "VarBlock '{}': expected {} index/indices, got {}",
            self.name,
            self.shape.len(),
            indices.len()
        );
        let mut flat = 0;
        let mut stride = 1;
        for ax in (0..self.shape.len()).rev() {
            flat += indices[ax] * stride;
            stride *= self.shape[ax];
        }
        self.start + flat
    }

    pub fn idx1(&self, i: usize) -> usize {
        self.idx(&[i])
    }

    pub fn idx2(&self, i: usize, j: usize) -> usize {
        self.idx(&[i, j])
    }

    pub fn idx3(&self, i: usize, j: usize, k: usize) -> usize {
        self.idx(&[i, j, k])
    }

    /// Copy this block's slice out of a solution vector, keeping the
    /// declared shape alongside the data.
    pub fn extract(&self, x: &[f64]) -> Shaped {
        Shaped {
            shape: self.shape.clone(),
            data: x[self.start..self.end()].to_vec(),
        }
    }
}

/// A block extracted from the solution vector: flat data plus its
/// declared row-major shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Shaped {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Shaped {
    pub fn zeros(shape: &[usize]) -> Self {
        Shaped {
            shape: shape.to_vec(),
            data: vec![0.0; shape.iter().product()],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn at(&self, indices: &[usize]) -> f64 {
        self.data[self.flat(indices)]
    }

    pub fn at1(&self, i: usize) -> f64 {
        self.at(&[i])
    }

    pub fn at2(&self, i: usize, j: usize) -> f64 {
        self.at(&[i, j])
    }

    pub fn at3(&self, i: usize, j: usize, k: usize) -> f64 {
        self.at(&[i, j, k])
    }

    /// Sum along the first axis, returning a series over the last axis
    /// for rank-2 data (used for per-year totals over individuals).
    pub fn sum_axis0(&self) -> Vec<f64> {
        assert_eq!(self.shape.len(), 2, "sum_axis0 requires rank-2 data");
        let (rows, cols) = (self.shape[0], self.shape[1]);
        let mut out = vec![0.0; cols];
        for r in 0..rows {
            for c in 0..cols {
                out[c] += self.data[r * cols + c];
            }
        }
        out
    }

    fn flat(&self, indices: &[usize]) -> usize {
        assert_eq!(
            indices.len(),
            self.shape.len(),
            "Shaped: expected {} index/indices, got {}",
            self.shape.len(),
            indices.len()
        );
        let mut flat = 0;
        let mut stride = 1;
        for ax in (0..self.shape.len()).rev() {
            flat += indices[ax] * stride;
            stride *= self.shape[ax];
        }
        flat
    }
}

/// Accumulates [`VarBlock`]s in declaration order, tracking a cursor
/// that advances by each block's size.
#[derive(Debug, Clone, Default)]
pub struct VarMap {
    blocks: Vec<VarBlock>,
    by_name: FxHashMap<&'static str, usize>,
    cursor: usize,
    bin_start: Option<usize>,
}

impl VarMap {
    pub fn new() -> Self {
        VarMap::default()
    }

    /// Add a variable block with the given dimensions.
    pub fn add(&mut self, name: &'static str, dims: &[usize]) {
        assert!(
            !self.by_name.contains_key(name),
            "VarMap: duplicate block '{}'",
            name
        );
        let block = VarBlock::new(name, self.cursor, dims);
        self.cursor += block.size;
        self.by_name.insert(name, self.blocks.len());
        self.blocks.push(block);
    }

    /// Add a block only when `cond` is true; the cursor does not advance
    /// otherwise. Callers guard access with [`VarMap::contains`].
    pub fn add_if(&mut self, cond: bool, name: &'static str, dims: &[usize]) {
        if cond {
            self.add(name, dims);
        }
    }

    /// Record the boundary between continuous and binary variables.
    /// Call exactly once, immediately before the first binary block.
    pub fn mark_binary_start(&mut self) {
        assert!(
            self.bin_start.is_none(),
            "VarMap: mark_binary_start called twice"
        );
        self.bin_start = Some(self.cursor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&VarBlock> {
        self.by_name.get(name).map(|&i| &self.blocks[i])
    }

    /// Look up a block by name; panics with a descriptive message on an
    /// unknown name (programmer error inside the builder).
    pub fn block(&self, name: &str) -> &VarBlock {
        self.get(name)
            .unwrap_or_else(|| panic!("VarMap: no block named '{}'", name))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &VarBlock> {
        self.blocks.iter()
    }

    /// Total number of decision variables (continuous + binary).
    pub fn nvars(&self) -> usize {
        self.cursor
    }

    /// Number of continuous variables (= start of the first binary block).
    pub fn nconts(&self) -> usize {
        self.bin_start.unwrap_or(self.cursor)
    }

    /// Number of binary variables.
    pub fn nbins(&self) -> usize {
        self.cursor - self.nconts()
    }

    /// Size of the balance block specifically (used by the aggregator).
    pub fn nbals(&self) -> usize {
        self.block("b").size()
    }
}
