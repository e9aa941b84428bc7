//! Exact, ID-mapped flat L2 vector index.
//!
//! Vectors are stored contiguously in insertion order together with the
//! caller-supplied integer ID of each row. Search is a brute-force scan
//! computing squared Euclidean distance to every row, returning the `k`
//! nearest by ascending distance (ties broken by ascending ID).
//!
//! The dimension is fixed when the index is created; adding or searching
//! with a vector of any other length fails with
//! [`IndexError::DimensionMismatch`].
//!
//! # Native binary form
//!
//! ```text
//! magic    4 bytes   "WRFL"
//! version  u32 LE    1
//! dims     u32 LE
//! count    u64 LE
//! ids      count × i64 LE
//! vectors  count × dims × f32 LE
//! ```

use std::cmp::Ordering;
use std::collections::HashSet;
use std::io::{Read, Write};

use thiserror::Error;

use crate::embedding::{blob_to_vec, l2_squared, vec_to_blob};

/// Sentinel ID meaning "no match". Never accepted as a real ID.
pub const NO_MATCH: i64 = -1;

const MAGIC: &[u8; 4] = b"WRFL";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("dimension mismatch: index holds {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("vector dimension must be greater than zero")]
    ZeroDimension,
    #[error("{ids} ids supplied for {vectors} vectors")]
    LengthMismatch { ids: usize, vectors: usize },
    #[error("id {0} is negative or reserved")]
    InvalidId(i64),
    #[error("id {0} is already present")]
    DuplicateId(i64),
    #[error("corrupt index blob: {0}")]
    Corrupt(String),
}

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: i64,
    /// Squared L2 distance to the query.
    pub distance: f32,
}

impl Neighbor {
    /// False for the [`NO_MATCH`] sentinel.
    pub fn is_match(&self) -> bool {
        self.id != NO_MATCH
    }
}

/// Exact flat L2 index keyed by caller-supplied IDs.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dims: usize,
    ids: Vec<i64>,
    data: Vec<f32>,
    id_set: HashSet<i64>,
}

impl FlatL2Index {
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        if dims == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dims,
            ids: Vec::new(),
            data: Vec::new(),
            id_set: HashSet::new(),
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// IDs in insertion order.
    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn contains(&self, id: i64) -> bool {
        self.id_set.contains(&id)
    }

    /// Add vectors under the given IDs.
    ///
    /// The whole batch is validated before anything is inserted, so a
    /// failed call leaves the index unchanged.
    pub fn add(&mut self, ids: &[i64], vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if ids.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
            });
        }

        let mut batch = HashSet::with_capacity(ids.len());
        for (&id, vector) in ids.iter().zip(vectors) {
            if id < 0 {
                return Err(IndexError::InvalidId(id));
            }
            if self.id_set.contains(&id) || !batch.insert(id) {
                return Err(IndexError::DuplicateId(id));
            }
            self.check_dims(vector.len())?;
        }

        self.ids.reserve(ids.len());
        self.data.reserve(ids.len() * self.dims);
        for (&id, vector) in ids.iter().zip(vectors) {
            self.ids.push(id);
            self.data.extend_from_slice(vector);
        }
        self.id_set.extend(batch);
        Ok(())
    }

    /// The `k` nearest stored vectors to `query`, nearest first.
    ///
    /// Returns fewer than `k` hits when the index holds fewer vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dims(query.len())?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .ids
            .iter()
            .zip(self.data.chunks_exact(self.dims))
            .map(|(&id, row)| Neighbor {
                id,
                distance: l2_squared(query, row),
            })
            .collect();

        let by_distance = |a: &Neighbor, b: &Neighbor| -> Ordering {
            a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k, by_distance);
            scored.truncate(k);
        }
        scored.sort_by(by_distance);
        Ok(scored)
    }

    /// Serialize to the native binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.ids.len() * 8 + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dims as u32).to_le_bytes());
        out.extend_from_slice(&(self.ids.len() as u64).to_le_bytes());
        for id in &self.ids {
            out.extend_from_slice(&id.to_le_bytes());
        }
        out.extend_from_slice(&vec_to_blob(&self.data));
        out
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()
    }

    /// Parse the native binary form, rejecting truncated or padded input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexError::Corrupt(format!(
                "{} bytes is shorter than the header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }
        let version = u32::from_le_bytes(le_array(&bytes[4..8]));
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!("unsupported version {}", version)));
        }
        let dims = u32::from_le_bytes(le_array(&bytes[8..12])) as usize;
        let count = u64::from_le_bytes(le_array(&bytes[12..20])) as usize;

        let expected = count
            .checked_mul(8 + dims * 4)
            .and_then(|body| body.checked_add(HEADER_LEN))
            .ok_or_else(|| IndexError::Corrupt("size overflow".to_string()))?;
        if bytes.len() != expected {
            return Err(IndexError::Corrupt(format!(
                "expected {} bytes for {} vectors of {} dims, found {}",
                expected,
                count,
                dims,
                bytes.len()
            )));
        }

        let ids_end = HEADER_LEN + count * 8;
        let ids: Vec<i64> = bytes[HEADER_LEN..ids_end]
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes(le_array(c)))
            .collect();
        let data = blob_to_vec(&bytes[ids_end..]);
        let vectors: Vec<Vec<f32>> = data
            .chunks_exact(dims.max(1))
            .map(<[f32]>::to_vec)
            .collect();

        let mut index = Self::new(dims).map_err(|e| IndexError::Corrupt(e.to_string()))?;
        index
            .add(&ids, &vectors)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        Ok(index)
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, IndexError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| IndexError::Corrupt(format!("read failed: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    fn check_dims(&self, actual: usize) -> Result<(), IndexError> {
        if actual != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual,
            });
        }
        Ok(())
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatL2Index {
        let mut index = FlatL2Index::new(2).unwrap();
        index
            .add(
                &[0, 1, 2, 3],
                &[
                    vec![0.0, 0.0],
                    vec![1.0, 0.0],
                    vec![0.0, 3.0],
                    vec![10.0, 10.0],
                ],
            )
            .unwrap();
        index
    }

    #[test]
    fn test_zero_dims_rejected() {
        assert_eq!(FlatL2Index::new(0), Err(IndexError::ZeroDimension));
    }

    #[test]
    fn test_exact_vector_found_first() {
        let index = sample();
        let hits = index.search(&[0.0, 3.0], 2).unwrap();
        assert_eq!(hits[0].id, 2);
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[1].id, 0);
        assert!((hits[1].distance - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_results_ascending() {
        let index = sample();
        let hits = index.search(&[0.4, 0.1], 4).unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_fewer_than_k() {
        let index = sample();
        let hits = index.search(&[0.0, 0.0], 50).unwrap();
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(Neighbor::is_match));
    }

    #[test]
    fn test_k_zero_and_empty_index() {
        assert!(sample().search(&[0.0, 0.0], 0).unwrap().is_empty());
        let empty = FlatL2Index::new(3).unwrap();
        assert!(empty.search(&[0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_ties_break_by_id() {
        let mut index = FlatL2Index::new(1).unwrap();
        index
            .add(&[7, 3, 5], &[vec![1.0], vec![1.0], vec![-1.0]])
            .unwrap();
        let ids: Vec<i64> = index
            .search(&[0.0], 3)
            .unwrap()
            .iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(ids, vec![3, 5, 7]);
    }

    #[test]
    fn test_dimension_mismatch_on_add_and_search() {
        let mut index = sample();
        assert_eq!(
            index.add(&[9], &[vec![1.0, 2.0, 3.0]]),
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(
            index.search(&[1.0], 1),
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_failed_add_leaves_index_unchanged() {
        let mut index = sample();
        let before = index.clone();
        let err = index
            .add(&[4, 5], &[vec![1.0, 1.0], vec![1.0]])
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
        assert_eq!(index, before);
    }

    #[test]
    fn test_rejects_bad_ids() {
        let mut index = sample();
        assert_eq!(index.add(&[NO_MATCH], &[vec![0.0, 0.0]]), Err(IndexError::InvalidId(-1)));
        assert_eq!(index.add(&[2], &[vec![0.0, 0.0]]), Err(IndexError::DuplicateId(2)));
        assert_eq!(
            index.add(&[8, 8], &[vec![0.0, 0.0], vec![1.0, 1.0]]),
            Err(IndexError::DuplicateId(8))
        );
        assert_eq!(
            index.add(&[8], &[]),
            Err(IndexError::LengthMismatch { ids: 1, vectors: 0 })
        );
    }

    #[test]
    fn test_binary_form_preserves_search() {
        let index = sample();
        let mut buf = Vec::new();
        index.write_to(&mut buf).unwrap();
        let restored = FlatL2Index::read_from(buf.as_slice()).unwrap();

        assert_eq!(restored, index);
        for probe in [[0.0, 0.0], [5.0, 5.0], [-1.0, 2.5]] {
            assert_eq!(restored.search(&probe, 3).unwrap(), index.search(&probe, 3).unwrap());
        }
    }

    #[test]
    fn test_corrupt_blobs_rejected() {
        let bytes = sample().to_bytes();

        let truncated = &bytes[..bytes.len() - 3];
        assert!(matches!(FlatL2Index::from_bytes(truncated), Err(IndexError::Corrupt(_))));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(FlatL2Index::from_bytes(&bad_magic), Err(IndexError::Corrupt(_))));

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(matches!(FlatL2Index::from_bytes(&padded), Err(IndexError::Corrupt(_))));

        assert!(matches!(FlatL2Index::from_bytes(b"WR"), Err(IndexError::Corrupt(_))));
    }
}
