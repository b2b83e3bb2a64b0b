//! Keyword databases and deterministic sharding.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// One database row: an arbitrary non-empty keyword and its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordValuePair {
	/// The lookup keyword; globally unique within a database.
	pub keyword: Vec<u8>,
	/// The stored value.
	pub value: Vec<u8>,
}

impl KeywordValuePair {
	/// Creates a row.
	pub fn new(keyword: Vec<u8>, value: Vec<u8>) -> Self {
		Self { keyword, value }
	}
}

/// The truncated keyword hash used by sharding, cuckoo indexing, and
/// bucket slots: the first 8 bytes of SHA-256, little-endian.
pub fn keyword_hash(keyword: &[u8]) -> u64 {
	let digest = Sha256::digest(keyword);
	u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// How keywords map to shards. Both variants are bit-exact protocol
/// surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardingFunction {
	/// `shard = keyword_hash mod shard_count`.
	Sha256,
	/// `shard = (keyword_hash mod other_shard_count) mod shard_count`,
	/// for aligning shards with a second deployment.
	DoubleMod {
		/// The protocol-agreed secondary modulus.
		other_shard_count: usize,
	},
}

impl ShardingFunction {
	/// The shard a keyword belongs to. Deterministic: depends only on the
	/// keyword and the function identity.
	pub fn shard_index(&self, keyword: &[u8], shard_count: usize) -> usize {
		let hash = keyword_hash(keyword);
		match self {
			Self::Sha256 => (hash % shard_count as u64) as usize,
			Self::DoubleMod { other_shard_count } => {
				((hash % *other_shard_count as u64) % shard_count as u64) as usize
			}
		}
	}
}

/// A keyword database split into shards.
#[derive(Debug, Clone)]
pub struct KeywordDatabase {
	/// Rows grouped by shard index.
	pub shards: Vec<Vec<KeywordValuePair>>,
}

impl KeywordDatabase {
	/// Shards the rows, validating that keywords are non-empty and
	/// unique.
	pub fn new(
		rows: Vec<KeywordValuePair>,
		sharding: ShardingFunction,
		shard_count: usize,
	) -> Result<Self> {
		if shard_count == 0 {
			return Err(Error::invalid("shard count must be positive"));
		}
		let mut seen = HashSet::with_capacity(rows.len());
		let mut shards = vec![Vec::new(); shard_count];
		for row in rows {
			if row.keyword.is_empty() {
				return Err(Error::invalid("keywords must be non-empty"));
			}
			if !seen.insert(row.keyword.clone()) {
				return Err(Error::invalid(format!(
					"duplicate keyword {:02x?}",
					&row.keyword
				)));
			}
			let shard = sharding.shard_index(&row.keyword, shard_count);
			shards[shard].push(row);
		}
		Ok(Self { shards })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sharding_known_answers() {
		assert_eq!(ShardingFunction::Sha256.shard_index(&[0, 0, 0, 0], 41), 2);
		assert_eq!(
			ShardingFunction::Sha256.shard_index(&[0, 0, 0, 0], 1001),
			635
		);
		let double = ShardingFunction::DoubleMod {
			other_shard_count: 2000,
		};
		assert_eq!(double.shard_index(&[0, 0, 0, 0], 41), 32);
		assert_eq!(double.shard_index(&[1, 2, 3], 1001), 922);
	}

	#[test]
	fn sharding_is_stable() {
		let keyword = b"stable keyword";
		let first = ShardingFunction::Sha256.shard_index(keyword, 17);
		for _ in 0..10 {
			assert_eq!(ShardingFunction::Sha256.shard_index(keyword, 17), first);
		}
	}

	#[test]
	fn database_rejects_duplicates_and_empty_keywords() {
		let rows = vec![
			KeywordValuePair::new(b"a".to_vec(), vec![1]),
			KeywordValuePair::new(b"a".to_vec(), vec![2]),
		];
		assert!(KeywordDatabase::new(rows, ShardingFunction::Sha256, 4).is_err());
		let rows = vec![KeywordValuePair::new(vec![], vec![1])];
		assert!(KeywordDatabase::new(rows, ShardingFunction::Sha256, 4).is_err());
	}

	#[test]
	fn every_row_lands_in_its_shard() {
		let rows: Vec<KeywordValuePair> = (0u32..100)
			.map(|i| KeywordValuePair::new(i.to_le_bytes().to_vec(), vec![i as u8]))
			.collect();
		let db = KeywordDatabase::new(rows, ShardingFunction::Sha256, 7).unwrap();
		assert_eq!(db.shards.len(), 7);
		assert_eq!(db.shards.iter().map(Vec::len).sum::<usize>(), 100);
		for (index, shard) in db.shards.iter().enumerate() {
			for row in shard {
				assert_eq!(
					ShardingFunction::Sha256.shard_index(&row.keyword, 7),
					index
				);
			}
		}
	}
}
