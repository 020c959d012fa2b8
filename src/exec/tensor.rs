/*!
 * Tensor Model
 * Dense host tensors exchanged with compiled artifacts
 */

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a dense tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F64,
    I32,
    I64,
    U8,
}

impl DType {
    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
            DType::U8 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
        };
        write!(f, "{}", name)
    }
}

/// Shape and element type of a tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorMetadata {
    pub dtype: DType,
    pub shape: Vec<usize>,
}

impl TensorMetadata {
    pub fn new(dtype: DType, shape: Vec<usize>) -> Self {
        Self { dtype, shape }
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn byte_size(&self) -> usize {
        self.num_elements() * self.dtype.size_bytes()
    }

    /// Row-major strides in elements.
    pub fn row_major_strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        for i in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }
        strides
    }
}

/// A dense row-major host tensor.
///
/// Storage is reference-counted, so cloning a tensor never copies element
/// data. The byte length is validated against the metadata at operand
/// conversion time, not at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    metadata: TensorMetadata,
    data: Bytes,
}

impl Tensor {
    pub fn new(metadata: TensorMetadata, data: Bytes) -> Self {
        Self { metadata, data }
    }

    pub fn from_i32(shape: Vec<usize>, values: &[i32]) -> Self {
        let metadata = TensorMetadata::new(DType::I32, shape);
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::new(metadata, Bytes::from(data))
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Self {
        let metadata = TensorMetadata::new(DType::F32, shape);
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::new(metadata, Bytes::from(data))
    }

    pub fn metadata(&self) -> &TensorMetadata {
        &self.metadata
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn to_i32_vec(&self) -> Option<Vec<i32>> {
        if self.metadata.dtype != DType::I32 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }

    pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
        if self.metadata.dtype != DType::F32 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}
