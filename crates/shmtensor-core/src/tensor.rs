//! Dense 2-D tensors and strided views
//!
//! [`Tensor`] owns its storage on the heap; [`TensorView`] overlays a raw
//! region (usually a mapped segment) without owning it. Both carry explicit
//! element strides so block copies between mismatched layouts stay
//! element-wise correct. The layout conditional is resolved once, into the
//! strides, never inside the copy loops.

use std::marker::PhantomData;

use crate::dtype::Element;

/// In-memory element order of a tensor segment.
///
/// The wire code (0 column-major, 1 row-major) follows the conventional
/// library encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemLayout {
    ColMajor,
    RowMajor,
}

impl MemLayout {
    pub const fn code(&self) -> i32 {
        match self {
            MemLayout::ColMajor => 0,
            MemLayout::RowMajor => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(MemLayout::ColMajor),
            1 => Some(MemLayout::RowMajor),
            _ => None,
        }
    }

    /// Element strides (row_stride, col_stride) for a `(n_rows, n_cols)` shape
    pub(crate) fn strides(&self, n_rows: usize, n_cols: usize) -> (usize, usize) {
        match self {
            MemLayout::RowMajor => (n_cols, 1),
            MemLayout::ColMajor => (1, n_rows),
        }
    }
}

/// Heap-owned dense 2-D tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T: Element> {
    data: Vec<T>,
    n_rows: usize,
    n_cols: usize,
    layout: MemLayout,
}

impl<T: Element> Tensor<T> {
    /// Zero-initialized tensor (`T::default()` per cell)
    pub fn zeros(n_rows: usize, n_cols: usize, layout: MemLayout) -> Self {
        Tensor {
            data: vec![T::default(); n_rows * n_cols],
            n_rows,
            n_cols,
            layout,
        }
    }

    /// Build from row slices.
    ///
    /// # Panics
    /// Panics if the rows are ragged.
    pub fn from_rows(rows: &[&[T]], layout: MemLayout) -> Self {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |r| r.len());
        let mut t = Tensor::zeros(n_rows, n_cols, layout);
        for (r, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), n_cols, "ragged rows");
            for (c, v) in row.iter().enumerate() {
                t.set(r, c, *v);
            }
        }
        t
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn layout(&self) -> MemLayout {
        self.layout
    }

    #[inline]
    fn offset(&self, row: usize, col: usize) -> usize {
        let (rs, cs) = self.layout.strides(self.n_rows, self.n_cols);
        row * rs + col * cs
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[self.offset(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        let idx = self.offset(row, col);
        self.data[idx] = value;
    }

    /// Reset every cell to `T::default()`
    pub fn fill_default(&mut self) {
        self.data.fill(T::default());
    }

    /// Borrow the whole tensor as a read view
    pub fn view(&self) -> TensorView<'_, T> {
        self.view_block(0, 0, self.n_rows, self.n_cols)
    }

    /// Borrow a rectangular block as a read view.
    ///
    /// # Panics
    /// Panics if the block exceeds the tensor shape.
    pub fn view_block(&self, row: usize, col: usize, n_rows: usize, n_cols: usize) -> TensorView<'_, T> {
        assert!(row + n_rows <= self.n_rows && col + n_cols <= self.n_cols);
        let (rs, cs) = self.layout.strides(self.n_rows, self.n_cols);
        let base = self.offset(row, col);
        // A zero-sized block may sit one past the end, keep the pointer in range.
        let ptr = if self.data.is_empty() {
            std::ptr::NonNull::dangling().as_ptr()
        } else {
            unsafe { self.data.as_ptr().add(base) as *mut T }
        };
        unsafe { TensorView::from_raw(ptr, n_rows, n_cols, rs, cs) }
    }

    /// Borrow a rectangular block as a write view.
    ///
    /// # Panics
    /// Panics if the block exceeds the tensor shape.
    pub fn view_block_mut(
        &mut self,
        row: usize,
        col: usize,
        n_rows: usize,
        n_cols: usize,
    ) -> TensorView<'_, T> {
        assert!(row + n_rows <= self.n_rows && col + n_cols <= self.n_cols);
        let (rs, cs) = self.layout.strides(self.n_rows, self.n_cols);
        let base = self.offset(row, col);
        let ptr = if self.data.is_empty() {
            std::ptr::NonNull::dangling().as_ptr()
        } else {
            unsafe { self.data.as_mut_ptr().add(base) }
        };
        unsafe { TensorView::from_raw(ptr, n_rows, n_cols, rs, cs) }
    }
}

/// Non-owning strided 2-D overlay.
///
/// The region behind `ptr` must stay mapped and correctly typed for the
/// lifetime `'a`; constructors on [`Tensor`] and the segment wrapper uphold
/// this.
pub struct TensorView<'a, T: Element> {
    ptr: *mut T,
    n_rows: usize,
    n_cols: usize,
    row_stride: usize,
    col_stride: usize,
    _marker: PhantomData<&'a mut T>,
}

impl<'a, T: Element> TensorView<'a, T> {
    /// # Safety
    /// `ptr` must point to a region holding at least
    /// `(n_rows-1)*row_stride + (n_cols-1)*col_stride + 1` elements of `T`,
    /// valid for reads and writes for `'a`.
    pub unsafe fn from_raw(
        ptr: *mut T,
        n_rows: usize,
        n_cols: usize,
        row_stride: usize,
        col_stride: usize,
    ) -> Self {
        TensorView {
            ptr,
            n_rows,
            n_cols,
            row_stride,
            col_stride,
            _marker: PhantomData,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    #[inline]
    fn offset(&self, row: usize, col: usize) -> usize {
        row * self.row_stride + col * self.col_stride
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> T {
        debug_assert!(row < self.n_rows && col < self.n_cols);
        unsafe { std::ptr::read_volatile(self.ptr.add(self.offset(row, col))) }
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        debug_assert!(row < self.n_rows && col < self.n_cols);
        unsafe { std::ptr::write_volatile(self.ptr.add(self.offset(row, col)), value) }
    }

    /// Re-borrow a rectangular sub-block
    pub fn block(&mut self, row: usize, col: usize, n_rows: usize, n_cols: usize) -> TensorView<'_, T> {
        assert!(row + n_rows <= self.n_rows && col + n_cols <= self.n_cols);
        let base = self.offset(row, col);
        unsafe {
            TensorView::from_raw(
                self.ptr.add(base),
                n_rows,
                n_cols,
                self.row_stride,
                self.col_stride,
            )
        }
    }

    /// Copy this view into an owned tensor of the same shape
    pub fn to_tensor(&self, layout: MemLayout) -> Tensor<T> {
        let mut out = Tensor::zeros(self.n_rows, self.n_cols, layout);
        for r in 0..self.n_rows {
            for c in 0..self.n_cols {
                out.set(r, c, self.get(r, c));
            }
        }
        out
    }
}

/// Copy `src` into `dst` at offset `(row, col)`.
///
/// Returns `false` without touching `dst` when the block does not fit.
pub fn write_block<T: Element>(
    src: &TensorView<'_, T>,
    dst: &mut TensorView<'_, T>,
    row: usize,
    col: usize,
) -> bool {
    if row + src.n_rows > dst.n_rows || col + src.n_cols > dst.n_cols {
        return false;
    }
    for r in 0..src.n_rows {
        for c in 0..src.n_cols {
            dst.set(row + r, col + c, src.get(r, c));
        }
    }
    true
}

/// Copy the block of `src` at offset `(row, col)` shaped like `dst` into `dst`.
///
/// Returns `false` without touching `dst` when the block does not fit.
pub fn read_block<T: Element>(
    src: &TensorView<'_, T>,
    row: usize,
    col: usize,
    dst: &mut TensorView<'_, T>,
) -> bool {
    if row + dst.n_rows > src.n_rows || col + dst.n_cols > src.n_cols {
        return false;
    }
    for r in 0..dst.n_rows {
        for c in 0..dst.n_cols {
            dst.set(r, c, src.get(row + r, col + c));
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_codes_round_trip() {
        for layout in [MemLayout::ColMajor, MemLayout::RowMajor] {
            assert_eq!(MemLayout::from_code(layout.code()), Some(layout));
        }
        assert_eq!(MemLayout::from_code(7), None);
    }

    #[test]
    fn from_rows_matches_get() {
        for layout in [MemLayout::ColMajor, MemLayout::RowMajor] {
            let t = Tensor::from_rows(&[&[1i32, 2, 3], &[4, 5, 6]], layout);
            assert_eq!(t.get(0, 2), 3);
            assert_eq!(t.get(1, 0), 4);
        }
    }

    #[test]
    fn write_block_rejects_overflow() {
        let src = Tensor::from_rows(&[&[9i32, 9], &[9, 9]], MemLayout::RowMajor);
        let mut dst = Tensor::<i32>::zeros(3, 3, MemLayout::RowMajor);
        let ok = write_block(&src.view(), &mut dst.view_block_mut(0, 0, 3, 3), 2, 2);
        assert!(!ok);
        for r in 0..3 {
            for c in 0..3 {
                assert_eq!(dst.get(r, c), 0);
            }
        }
    }

    #[test]
    fn write_block_partial_leaves_rest_untouched() {
        // mixed layouts: row-major source into col-major destination
        let src = Tensor::from_rows(&[&[9i32, 9], &[9, 9]], MemLayout::RowMajor);
        let mut dst = Tensor::<i32>::zeros(5, 5, MemLayout::ColMajor);
        let ok = write_block(&src.view(), &mut dst.view_block_mut(0, 0, 5, 5), 1, 2);
        assert!(ok);
        for r in 0..5 {
            for c in 0..5 {
                let expected = if (1..=2).contains(&r) && (2..=3).contains(&c) {
                    9
                } else {
                    0
                };
                assert_eq!(dst.get(r, c), expected, "cell ({r}, {c})");
            }
        }
    }

    #[test]
    fn read_block_extracts_interior() {
        let mut src = Tensor::<f64>::zeros(4, 4, MemLayout::ColMajor);
        src.set(2, 1, 3.5);
        src.set(2, 2, -1.0);
        let mut dst = Tensor::<f64>::zeros(1, 2, MemLayout::RowMajor);
        let ok = read_block(&src.view(), 2, 1, &mut dst.view_block_mut(0, 0, 1, 2));
        assert!(ok);
        assert_eq!(dst.get(0, 0), 3.5);
        assert_eq!(dst.get(0, 1), -1.0);
    }

    #[test]
    fn read_block_rejects_overflow() {
        let src = Tensor::<i32>::zeros(2, 2, MemLayout::RowMajor);
        let mut dst = Tensor::<i32>::zeros(2, 2, MemLayout::RowMajor);
        assert!(!read_block(&src.view(), 1, 1, &mut dst.view_block_mut(0, 0, 2, 2)));
    }
}
