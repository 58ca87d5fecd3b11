//! Multi-vector representations of pages and queries.

/// An ordered set of fixed-dimension vectors stored contiguously.
///
/// Vector `i` occupies `data[i * dimension..(i + 1) * dimension]`. The same
/// layout serves page embeddings (one vector per visual patch) and query
/// vector sets (one vector per query token).
#[derive(Debug, Clone, PartialEq)]
pub struct MultiVector {
    data: Vec<f32>,
    dimension: usize,
}

/// The per-page multi-vector embedding held by an index.
pub type PageEmbedding = MultiVector;

/// The vectors produced from one query string.
pub type QueryVectors = MultiVector;

impl MultiVector {
    /// Wrap contiguous data. Returns `None` if `dimension` is zero or the
    /// data length is not a multiple of it.
    pub fn new(data: Vec<f32>, dimension: usize) -> Option<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return None;
        }
        Some(Self { data, dimension })
    }

    /// Build from individual vectors. Returns `None` if the set is empty or the
    /// vectors disagree on length.
    pub fn from_vectors<V: AsRef<[f32]>>(vectors: &[V]) -> Option<Self> {
        let dimension = vectors.first()?.as_ref().len();
        if dimension == 0 {
            return None;
        }

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for vector in vectors {
            let vector = vector.as_ref();
            if vector.len() != dimension {
                return None;
            }
            data.extend_from_slice(vector);
        }
        Some(Self { data, dimension })
    }

    /// Length of every vector in the set.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors in the set.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Whether the set holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The flattened row-major data.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Get vector `index`.
    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Iterate over the vectors in order.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dimension)
    }

    /// Consume into the flattened data.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Check the invariants a stored or scored vector set must satisfy:
    /// at least one vector, the expected dimension and finite values.
    ///
    /// Returns a description of the first violation; callers wrap it in the
    /// error kind that fits their context.
    pub fn check(&self, expected_dimension: usize) -> std::result::Result<(), String> {
        if self.dimension != expected_dimension {
            return Err(format!(
                "vector dimension {} does not match expected dimension {expected_dimension}",
                self.dimension
            ));
        }
        if self.is_empty() {
            return Err("vector set is empty".to_string());
        }
        if let Some(pos) = self.data.iter().position(|x| !x.is_finite()) {
            return Err(format!(
                "vector {} contains a non-finite value",
                pos / self.dimension
            ));
        }
        Ok(())
    }

    /// Approximate heap size in bytes.
    pub fn memory_usage(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}
