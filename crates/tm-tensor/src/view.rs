use std::marker::PhantomData;

use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;

/// Borrowed tensor storage, either plain f32 or raw quantized blocks.
#[derive(Debug, Clone, Copy)]
pub enum TensorData<'a> {
    /// 32-bit floating point elements.
    F32(&'a [f32]),
    /// Raw bytes of a quantized block format.
    Quantized(&'a [u8]),
}

/// A read-only 2D tensor descriptor.
///
/// Wraps an element type tag, a shape, and borrowed storage owned by the
/// graph/tensor layer. Construction is the upstream validation point: the
/// storage length must match the shape exactly, and quantized rows must be
/// whole blocks. The kernel itself never re-validates.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    dtype: DType,
    rows: usize,
    cols: usize,
    data: TensorData<'a>,
}

impl<'a> TensorView<'a> {
    /// Create an f32 descriptor of shape `[rows, cols]`.
    pub fn f32(shape: &Shape, data: &'a [f32]) -> Result<Self> {
        let (rows, cols) = two_dims(shape)?;
        if data.len() != rows * cols {
            return Err(TensorError::StorageSize {
                dims: shape.dims().to_vec(),
                expected: rows * cols * 4,
                got: data.len() * 4,
            });
        }
        Ok(TensorView {
            dtype: DType::F32,
            rows,
            cols,
            data: TensorData::F32(data),
        })
    }

    /// Create a quantized descriptor of shape `[rows, cols]` over raw block
    /// bytes.
    pub fn quantized(dtype: DType, shape: &Shape, data: &'a [u8]) -> Result<Self> {
        if !dtype.is_quantized() {
            return Err(TensorError::UnsupportedDType(format!(
                "{} is not a quantized format",
                dtype
            )));
        }
        let (rows, cols) = two_dims(shape)?;
        if cols % dtype.block_size() != 0 {
            return Err(TensorError::PartialBlock {
                dtype: dtype.to_string(),
                k: cols,
                block: dtype.block_size(),
            });
        }
        let expected = rows * dtype.row_size_in_bytes(cols);
        if data.len() != expected {
            return Err(TensorError::StorageSize {
                dims: shape.dims().to_vec(),
                expected,
                got: data.len(),
            });
        }
        Ok(TensorView {
            dtype,
            rows,
            cols,
            data: TensorData::Quantized(data),
        })
    }

    /// Returns the element type tag.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (elements per row).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the storage as an f32 slice.
    ///
    /// # Errors
    /// Returns an error if the storage is quantized.
    pub fn as_f32(&self) -> Result<&'a [f32]> {
        match self.data {
            TensorData::F32(v) => Ok(v),
            TensorData::Quantized(_) => Err(TensorError::DTypeMismatch {
                expected: "f32".to_string(),
                got: self.dtype.to_string(),
            }),
        }
    }

    /// Returns one f32 row.
    ///
    /// # Panics
    /// Panics if the storage is quantized or `r >= rows()`.
    pub fn f32_row(&self, r: usize) -> &'a [f32] {
        let data = self.as_f32().expect("f32_row on quantized storage");
        &data[r * self.cols..(r + 1) * self.cols]
    }

    /// Returns the raw bytes of one quantized row.
    ///
    /// # Panics
    /// Panics if the storage is not quantized or `r >= rows()`.
    pub fn quantized_row(&self, r: usize) -> &'a [u8] {
        match self.data {
            TensorData::Quantized(bytes) => {
                let row_bytes = self.dtype.row_size_in_bytes(self.cols);
                &bytes[r * row_bytes..(r + 1) * row_bytes]
            }
            TensorData::F32(_) => panic!("quantized_row on f32 storage"),
        }
    }
}

/// A row-major f32 output tensor written concurrently by worker threads.
///
/// Each thread claims disjoint row blocks and writes them through
/// [`OutputView::row_block_mut`]; no two threads ever touch overlapping rows,
/// which is the entire soundness argument for the `Send + Sync` impls below.
#[derive(Debug, Clone, Copy)]
pub struct OutputView<'a> {
    ptr: *mut f32,
    rows: usize,
    cols: usize,
    _marker: PhantomData<&'a mut [f32]>,
}

// Safety: writes go through `row_block_mut`, whose contract requires callers
// to hold disjoint row ranges. The borrow of the underlying slice outlives
// every view copy.
unsafe impl Send for OutputView<'_> {}
unsafe impl Sync for OutputView<'_> {}

impl<'a> OutputView<'a> {
    /// Create an output view of shape `[rows, cols]` over a mutable slice.
    ///
    /// # Panics
    /// Panics if `data.len() != rows * cols`.
    pub fn new(data: &'a mut [f32], rows: usize, cols: usize) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "output storage length {} does not match {}x{}",
            data.len(),
            rows,
            cols
        );
        OutputView {
            ptr: data.as_mut_ptr(),
            rows,
            cols,
            _marker: PhantomData,
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the mutable storage for rows `[r0, r1)`.
    ///
    /// # Safety
    /// The caller must guarantee that no other thread accesses any row in
    /// `[r0, r1)` while the returned slice is live. The work-distribution
    /// protocol's chunk claiming provides exactly this guarantee.
    ///
    /// # Panics
    /// Panics if `r0 > r1` or `r1 > rows()`.
    pub unsafe fn row_block_mut(&self, r0: usize, r1: usize) -> &mut [f32] {
        assert!(r0 <= r1 && r1 <= self.rows, "row block out of range");
        std::slice::from_raw_parts_mut(self.ptr.add(r0 * self.cols), (r1 - r0) * self.cols)
    }
}

fn two_dims(shape: &Shape) -> Result<(usize, usize)> {
    if shape.ndim() != 2 {
        return Err(TensorError::NotTwoDimensional { ndim: shape.ndim() });
    }
    Ok((shape.dim(0), shape.dim(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_view() {
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let v = TensorView::f32(&Shape::new(vec![2, 3]), &data).unwrap();
        assert_eq!(v.dtype(), DType::F32);
        assert_eq!(v.rows(), 2);
        assert_eq!(v.cols(), 3);
        assert_eq!(v.f32_row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_f32_view_length_mismatch() {
        let data = vec![0.0f32; 5];
        assert!(TensorView::f32(&Shape::new(vec![2, 3]), &data).is_err());
    }

    #[test]
    fn test_f32_view_requires_2d() {
        let data = vec![0.0f32; 6];
        assert!(TensorView::f32(&Shape::new(vec![6]), &data).is_err());
    }

    #[test]
    fn test_quantized_view() {
        // 2 rows x 32 cols of Q8_0: one 34-byte block per row.
        let data = vec![0u8; 2 * 34];
        let v = TensorView::quantized(DType::Q8_0, &Shape::new(vec![2, 32]), &data).unwrap();
        assert_eq!(v.quantized_row(0).len(), 34);
        assert_eq!(v.quantized_row(1).len(), 34);
        assert!(v.as_f32().is_err());
    }

    #[test]
    fn test_quantized_view_partial_block() {
        let data = vec![0u8; 34];
        let err = TensorView::quantized(DType::Q8_0, &Shape::new(vec![1, 33]), &data);
        assert!(err.is_err());
    }

    #[test]
    fn test_quantized_view_rejects_f32_tag() {
        let data = vec![0u8; 8];
        assert!(TensorView::quantized(DType::F32, &Shape::new(vec![1, 2]), &data).is_err());
    }

    #[test]
    fn test_output_view_disjoint_rows() {
        let mut data = vec![0.0f32; 4 * 2];
        let out = OutputView::new(&mut data, 4, 2);

        std::thread::scope(|s| {
            let a = out;
            let b = out;
            s.spawn(move || {
                let rows = unsafe { a.row_block_mut(0, 2) };
                rows.fill(1.0);
            });
            s.spawn(move || {
                let rows = unsafe { b.row_block_mut(2, 4) };
                rows.fill(2.0);
            });
        });

        assert_eq!(data, vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    #[should_panic]
    fn test_output_view_range_check() {
        let mut data = vec![0.0f32; 4];
        let out = OutputView::new(&mut data, 2, 2);
        unsafe {
            out.row_block_mut(1, 3);
        }
    }
}
