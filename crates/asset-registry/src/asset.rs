use {
    chrono::{DateTime, Utc},
    sha2::{Digest as _, Sha256},
    thiserror::Error,
};

/// Identifier the registry assigns at registration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u64);

impl From<u64> for AssetId {
    fn from(inner: u64) -> Self {
        Self(inner)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The seller account owning an asset.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SellerId(pub String);

impl From<&str> for SellerId {
    fn from(inner: &str) -> Self {
        Self(inner.to_string())
    }
}

/// Buyer tasks and assets are matched by task type; pricing policies are
/// configured per task type as well.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskType(pub String);

impl From<&str> for TaskType {
    fn from(inner: &str) -> Self {
        Self(inner.to_string())
    }
}

/// SHA-256 over an asset's raw column data. Identifies the upload content;
/// two byte-identical uploads share a digest but still get distinct ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 32]);

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Feature columns a seller contributes to prediction tasks.
///
/// All columns have the same length, which must match the sample count of any
/// task the asset is valued against.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetData {
    columns: Vec<Vec<f64>>,
}

impl AssetData {
    pub fn new(columns: Vec<Vec<f64>>) -> Result<Self, InvalidData> {
        let Some(first) = columns.first() else {
            return Err(InvalidData::Empty);
        };
        if first.is_empty() {
            return Err(InvalidData::Empty);
        }
        let samples = first.len();
        for (index, column) in columns.iter().enumerate() {
            if column.len() != samples {
                return Err(InvalidData::RaggedColumns {
                    column: index,
                    len: column.len(),
                    expected: samples,
                });
            }
            if column.iter().any(|value| !value.is_finite()) {
                return Err(InvalidData::NonFinite { column: index });
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Length of every column.
    pub fn samples(&self) -> usize {
        self.columns[0].len()
    }

    pub fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update((self.columns.len() as u64).to_le_bytes());
        hasher.update((self.samples() as u64).to_le_bytes());
        for column in &self.columns {
            for value in column {
                hasher.update(value.to_le_bytes());
            }
        }
        Digest(hasher.finalize().into())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvalidData {
    #[error("asset data must contain at least one non-empty column")]
    Empty,
    #[error("column {column} has {len} samples, expected {expected}")]
    RaggedColumns {
        column: usize,
        len: usize,
        expected: usize,
    },
    #[error("column {column} contains a non-finite value")]
    NonFinite { column: usize },
}

/// A registered seller asset. Immutable once registered.
#[derive(Clone, Debug, PartialEq)]
pub struct Asset {
    pub id: AssetId,
    pub seller: SellerId,
    pub task_type: TaskType,
    pub data: AssetData,
    pub digest: Digest,
    pub registered_at: DateTime<Utc>,
    /// Registry version at which this asset first appeared.
    pub registration_version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_columns() {
        let result = AssetData::new(vec![vec![1.0, 2.0], vec![3.0]]);
        assert_eq!(
            result.unwrap_err(),
            InvalidData::RaggedColumns {
                column: 1,
                len: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn rejects_non_finite_values() {
        let result = AssetData::new(vec![vec![1.0, f64::NAN]]);
        assert_eq!(result.unwrap_err(), InvalidData::NonFinite { column: 0 });
    }

    #[test]
    fn rejects_empty_data() {
        assert_eq!(AssetData::new(vec![]).unwrap_err(), InvalidData::Empty);
        assert_eq!(AssetData::new(vec![vec![]]).unwrap_err(), InvalidData::Empty);
    }

    #[test]
    fn digest_depends_on_content_and_shape() {
        let a = AssetData::new(vec![vec![1.0, 2.0, 3.0, 4.0]]).unwrap();
        let b = AssetData::new(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let c = AssetData::new(vec![vec![1.0, 2.0, 3.0, 4.0]]).unwrap();

        // Same flattened values, different shape.
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), c.digest());
    }
}
