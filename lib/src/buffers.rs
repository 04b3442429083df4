//! Capacity-tracking working buffers
//!
//! The engine keeps its per-trace and per-frequency arrays in flat,
//! row-major grids. Resizing only reallocates when the requested size
//! exceeds the current capacity; shrinking or re-requesting the same shape
//! reuses the existing storage.

use std::ops::{Index, IndexMut};

/// Row-major 2D buffer
#[derive(Debug, Clone, Default)]
pub struct Grid<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Clone + Default> Grid<T> {
    /// Create an empty grid without storage
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            cols: 0,
        }
    }

    /// Reshape the grid and reset every element to `T::default()`.
    ///
    /// Returns `true` when new storage had to be allocated.
    pub fn resize(&mut self, rows: usize, cols: usize) -> bool {
        let needed = rows * cols;
        let reallocated = needed > self.data.capacity();
        if reallocated {
            self.data = vec![T::default(); needed];
        } else {
            self.data.clear();
            self.data.resize(needed, T::default());
        }
        self.rows = rows;
        self.cols = cols;
        reallocated
    }

    /// Drop the storage entirely
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.rows = 0;
        self.cols = 0;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }
}

impl<T> Index<(usize, usize)> for Grid<T> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.data[row * self.cols + col]
    }
}

impl<T> IndexMut<(usize, usize)> for Grid<T> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        &mut self.data[row * self.cols + col]
    }
}

/// Resize a vector to `len` default elements, reallocating only when needed.
///
/// Returns `true` when new storage had to be allocated.
pub fn resize_vec<T: Clone + Default>(buffer: &mut Vec<T>, len: usize) -> bool {
    let reallocated = len > buffer.capacity();
    if reallocated {
        *buffer = vec![T::default(); len];
    } else {
        buffer.clear();
        buffer.resize(len, T::default());
    }
    reallocated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(grid: &Grid<f64>, value: f64) -> bool {
        (0..grid.rows()).all(|r| grid.row(r).iter().all(|&v| v == value))
    }

    #[test]
    fn test_grid_indexing() {
        let mut grid: Grid<f64> = Grid::new();
        grid.resize(2, 3);
        grid[(1, 2)] = 5.0;
        grid.row_mut(0)[1] = 2.0;
        assert_eq!(grid.row(1), &[0.0, 0.0, 5.0]);
        assert_eq!(grid[(0, 1)], 2.0);
        assert_eq!((grid.rows(), grid.cols()), (2, 3));
    }

    #[test]
    fn test_grid_resize_reuses_capacity() {
        let mut grid: Grid<f64> = Grid::new();
        assert!(grid.resize(4, 4));
        for r in 0..4 {
            grid.row_mut(r).fill(1.0);
        }

        // Same or smaller shape: no reallocation, contents reset
        assert!(!grid.resize(4, 4));
        assert!(all(&grid, 0.0));
        assert!(!grid.resize(2, 3));
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 3);

        // Larger: reallocates
        assert!(grid.resize(5, 5));
        assert_eq!(grid.row(4).len(), 5);
    }

    #[test]
    fn test_grid_release() {
        let mut grid: Grid<u8> = Grid::new();
        grid.resize(3, 3);
        grid.release();
        assert_eq!((grid.rows(), grid.cols()), (0, 0));
        // Storage is gone, so the same shape allocates again
        assert!(grid.resize(3, 3));
    }

    #[test]
    fn test_resize_vec() {
        let mut v: Vec<usize> = Vec::new();
        assert!(resize_vec(&mut v, 8));
        v[3] = 7;
        assert!(!resize_vec(&mut v, 8));
        assert_eq!(v[3], 0);
        assert!(!resize_vec(&mut v, 2));
        assert_eq!(v.len(), 2);
    }
}
