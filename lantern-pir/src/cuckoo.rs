//! D-choice cuckoo hashing with bounded eviction, mapping keywords onto
//! fixed-size buckets.

use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::database::{keyword_hash, KeywordValuePair};
use crate::error::{Error, Result};
use crate::wire::{HashBucket, HashBucketEntry};

/// Upper bound on build restarts before the table gives up.
const MAX_EXPANSION_ROUNDS: usize = 32;

/// How the bucket count is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BucketCountConfig {
	/// Start from the target load factor and grow on failure.
	AllowExpansion {
		/// Multiplier applied to the per-table bucket count on failure;
		/// must exceed 1.
		expansion_factor: f64,
		/// Fraction of buckets expected to be occupied; in (0, 1].
		target_load_factor: f64,
	},
	/// A fixed total bucket count; insertion failure is an error.
	FixedSize {
		/// Total bucket count across all sub-tables.
		bucket_count: usize,
	},
}

/// Cuckoo table configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuckooTableConfig {
	/// Number of hash functions (sub-tables), 1 through 3.
	pub hash_function_count: usize,
	/// Bound on the eviction chain before a build attempt fails.
	pub max_eviction_count: usize,
	/// Bound on the serialized byte size of any bucket.
	pub max_serialized_bucket_size: usize,
	/// Bucket sizing policy.
	pub bucket_count: BucketCountConfig,
	/// Optional cap on slots per bucket.
	pub slot_count: Option<usize>,
}

impl CuckooTableConfig {
	fn validate(&self) -> Result<()> {
		if !(1..=3).contains(&self.hash_function_count) {
			return Err(Error::invalid("hash function count must be 1..=3"));
		}
		if self.max_eviction_count == 0 {
			return Err(Error::invalid("max eviction count must be positive"));
		}
		match self.bucket_count {
			BucketCountConfig::AllowExpansion {
				expansion_factor,
				target_load_factor,
			} => {
				if expansion_factor <= 1.0 {
					return Err(Error::invalid("expansion factor must exceed 1"));
				}
				if !(0.0..=1.0).contains(&target_load_factor) || target_load_factor == 0.0 {
					return Err(Error::invalid("target load factor must be in (0, 1]"));
				}
			}
			BucketCountConfig::FixedSize { bucket_count } => {
				if bucket_count < self.hash_function_count {
					return Err(Error::invalid("bucket count below hash function count"));
				}
			}
		}
		Ok(())
	}
}

/// Candidate bucket positions for a keyword: SHA-256 of the keyword read
/// as 8-byte little-endian chunks (the digest is re-hashed when more
/// chunks are needed), one index in `[0, bucket_count)` per sub-table.
///
/// This exact derivation is a protocol surface; clients and servers must
/// agree on it byte for byte.
pub fn hash_indices(keyword: &[u8], bucket_count: usize, hash_function_count: usize) -> Vec<usize> {
	let mut indices = Vec::with_capacity(hash_function_count);
	let mut digest = Sha256::digest(keyword);
	'outer: loop {
		for chunk in digest.chunks_exact(8) {
			if indices.len() == hash_function_count {
				break 'outer;
			}
			let value = u64::from_le_bytes(chunk.try_into().expect("8-byte chunk"));
			indices.push((value % bucket_count as u64) as usize);
		}
		digest = Sha256::digest(digest);
	}
	indices
}

#[derive(Debug, Clone)]
struct PendingEntry {
	entry: HashBucketEntry,
	keyword: Vec<u8>,
}

#[derive(Debug)]
struct TableBuilder {
	config: CuckooTableConfig,
	per_table_bucket_count: usize,
	slots: Vec<Vec<PendingEntry>>,
}

impl TableBuilder {
	fn bucket_size(&self, index: usize) -> usize {
		self.slots[index]
			.iter()
			.map(|pending| HashBucket::entry_size(&pending.entry))
			.sum()
	}

	fn fits(&self, index: usize, entry: &HashBucketEntry) -> bool {
		if let Some(cap) = self.config.slot_count {
			if self.slots[index].len() >= cap {
				return false;
			}
		}
		self.bucket_size(index) + HashBucket::entry_size(entry)
			<= self.config.max_serialized_bucket_size
	}

	fn global_indices(&self, keyword: &[u8]) -> Vec<usize> {
		hash_indices(
			keyword,
			self.per_table_bucket_count,
			self.config.hash_function_count,
		)
		.into_iter()
		.enumerate()
		.map(|(table, local)| table * self.per_table_bucket_count + local)
		.collect()
	}

	fn insert<R: RngCore + CryptoRng>(
		&mut self,
		mut pending: PendingEntry,
		rng: &mut R,
	) -> Result<()> {
		for _ in 0..=self.config.max_eviction_count {
			let indices = self.global_indices(&pending.keyword);
			// Any sub-table with room takes the entry directly.
			if let Some(&target) = indices
				.iter()
				.find(|&&index| self.fits(index, &pending.entry))
			{
				self.slots[target].push(pending);
				return Ok(());
			}
			// Evict a random occupant of a random candidate bucket.
			let bucket_index = indices[rng.gen_range(0..indices.len())];
			if self.slots[bucket_index].is_empty() {
				// The entry alone exceeds the bucket budget.
				return Err(Error::ExpansionExceeded {
					bucket_count: self.slots.len(),
				});
			}
			let victim_slot = rng.gen_range(0..self.slots[bucket_index].len());
			let victim = self.slots[bucket_index].swap_remove(victim_slot);
			if !self.fits(bucket_index, &pending.entry) {
				// Even one eviction is not enough; restore and give up.
				self.slots[bucket_index].push(victim);
				return Err(Error::ExpansionExceeded {
					bucket_count: self.slots.len(),
				});
			}
			self.slots[bucket_index].push(pending);
			pending = victim;
		}
		Err(Error::ExpansionExceeded {
			bucket_count: self.slots.len(),
		})
	}
}

/// A built cuckoo table: `hash_function_count` sub-tables of
/// `per_table_bucket_count` buckets each.
///
/// Built once per database, then queried read-only.
#[derive(Debug, Clone)]
pub struct CuckooTable {
	config: CuckooTableConfig,
	per_table_bucket_count: usize,
	buckets: Vec<HashBucket>,
}

impl CuckooTable {
	/// Builds a table over the given rows.
	pub fn new<R: RngCore + CryptoRng>(
		rows: &[KeywordValuePair],
		config: CuckooTableConfig,
		rng: &mut R,
	) -> Result<Self> {
		config.validate()?;
		let h = config.hash_function_count;
		let mut per_table = match config.bucket_count {
			BucketCountConfig::FixedSize { bucket_count } => bucket_count / h,
			BucketCountConfig::AllowExpansion {
				target_load_factor, ..
			} => {
				let needed = (rows.len() as f64 / target_load_factor).ceil() as usize;
				needed.div_ceil(h).max(1)
			}
		};

		for round in 0..MAX_EXPANSION_ROUNDS {
			match Self::try_build(rows, &config, per_table, rng) {
				Ok(table) => {
					debug!(
						rows = rows.len(),
						buckets = table.buckets.len(),
						round,
						"cuckoo table built"
					);
					return Ok(table);
				}
				Err(error) => match config.bucket_count {
					BucketCountConfig::FixedSize { .. } => return Err(error),
					BucketCountConfig::AllowExpansion {
						expansion_factor, ..
					} => {
						if !matches!(error, Error::ExpansionExceeded { .. }) {
							return Err(error);
						}
						let grown = (per_table as f64 * expansion_factor).ceil() as usize;
						per_table = grown.max(per_table + 1);
						debug!(per_table, round, "expanding cuckoo table");
					}
				},
			}
		}
		Err(Error::EvictionExceeded {
			expansions: MAX_EXPANSION_ROUNDS,
		})
	}

	fn try_build<R: RngCore + CryptoRng>(
		rows: &[KeywordValuePair],
		config: &CuckooTableConfig,
		per_table: usize,
		rng: &mut R,
	) -> Result<CuckooTable> {
		let mut builder = TableBuilder {
			config: config.clone(),
			per_table_bucket_count: per_table,
			slots: vec![Vec::new(); per_table * config.hash_function_count],
		};
		for row in rows {
			let entry = HashBucketEntry {
				keyword_hash: keyword_hash(&row.keyword),
				value: row.value.clone(),
			};
			if HashBucket::entry_size(&entry) > config.max_serialized_bucket_size {
				return Err(Error::InvalidHashBucketEntryValueSize(row.value.len()));
			}
			builder.insert(
				PendingEntry {
					entry,
					keyword: row.keyword.clone(),
				},
				rng,
			)?;
		}
		Ok(CuckooTable {
			config: config.clone(),
			per_table_bucket_count: per_table,
			buckets: builder
				.slots
				.into_iter()
				.map(|slots| HashBucket {
					entries: slots.into_iter().map(|pending| pending.entry).collect(),
				})
				.collect(),
		})
	}

	fn global_indices(&self, keyword: &[u8]) -> Vec<usize> {
		hash_indices(
			keyword,
			self.per_table_bucket_count,
			self.config.hash_function_count,
		)
		.into_iter()
		.enumerate()
		.map(|(table, local)| table * self.per_table_bucket_count + local)
		.collect()
	}

	/// Looks up a keyword; `None` when absent.
	pub fn find(&self, keyword: &[u8]) -> Option<&[u8]> {
		let hash = keyword_hash(keyword);
		self.global_indices(keyword)
			.into_iter()
			.find_map(|index| self.buckets[index].find(hash))
	}

	/// Buckets per sub-table.
	pub fn per_table_bucket_count(&self) -> usize {
		self.per_table_bucket_count
	}

	/// Total bucket count across sub-tables.
	pub fn bucket_count(&self) -> usize {
		self.buckets.len()
	}

	/// The buckets, sub-table by sub-table.
	pub fn buckets(&self) -> &[HashBucket] {
		&self.buckets
	}

	/// Serializes every bucket; each stays within the configured bound.
	pub fn serialize_buckets(&self) -> Result<Vec<Vec<u8>>> {
		self.buckets.iter().map(HashBucket::serialize).collect()
	}

	/// The configuration with the achieved size frozen to `FixedSize`,
	/// for reproducing the layout at a client.
	pub fn freeze_config(&self) -> CuckooTableConfig {
		CuckooTableConfig {
			bucket_count: BucketCountConfig::FixedSize {
				bucket_count: self.buckets.len(),
			},
			..self.config.clone()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	fn config() -> CuckooTableConfig {
		CuckooTableConfig {
			hash_function_count: 2,
			max_eviction_count: 100,
			max_serialized_bucket_size: 256,
			bucket_count: BucketCountConfig::AllowExpansion {
				expansion_factor: 1.3,
				target_load_factor: 0.7,
			},
			slot_count: None,
		}
	}

	fn rows(count: u32) -> Vec<KeywordValuePair> {
		(0..count)
			.map(|i| {
				KeywordValuePair::new(
					format!("keyword-{i}").into_bytes(),
					format!("value-{i:04}").into_bytes(),
				)
			})
			.collect()
	}

	#[test]
	fn hash_indices_known_answers() {
		// SHA-256([0,1,2,3]) = 054edec1...; little-endian 8-byte chunks,
		// chained through a second digest for the fifth index.
		let keyword = [0u8, 1, 2, 3];
		assert_eq!(hash_indices(&keyword, 8, 3), vec![5, 7, 3]);
		assert_eq!(
			hash_indices(&keyword, 2048, 5),
			vec![1541, 1359, 1547, 197, 1015]
		);
	}

	#[test]
	fn hash_indices_are_deterministic_and_in_range() {
		let first = hash_indices(b"kw", 100, 3);
		assert_eq!(first, hash_indices(b"kw", 100, 3));
		assert!(first.iter().all(|&i| i < 100));
	}

	#[test]
	fn build_and_find_every_row() {
		let rows = rows(500);
		let mut rng = StdRng::from_seed([41u8; 32]);
		let table = CuckooTable::new(&rows, config(), &mut rng).unwrap();
		for row in &rows {
			assert_eq!(table.find(&row.keyword), Some(row.value.as_slice()));
		}
		assert_eq!(table.find(b"not a keyword"), None);
		assert_eq!(table.bucket_count() % 2, 0);
	}

	#[test]
	fn serialized_buckets_respect_the_bound() {
		let rows = rows(200);
		let mut rng = StdRng::from_seed([42u8; 32]);
		let table = CuckooTable::new(&rows, config(), &mut rng).unwrap();
		for bytes in table.serialize_buckets().unwrap() {
			assert!(bytes.len() <= 256);
		}
	}

	#[test]
	fn frozen_config_rebuilds_identically() {
		let rows = rows(120);
		let mut rng = StdRng::from_seed([43u8; 32]);
		let table = CuckooTable::new(&rows, config(), &mut rng).unwrap();
		let frozen = table.freeze_config();
		assert!(matches!(
			frozen.bucket_count,
			BucketCountConfig::FixedSize { .. }
		));
		let mut rng = StdRng::from_seed([44u8; 32]);
		let rebuilt = CuckooTable::new(&rows, frozen, &mut rng).unwrap();
		assert_eq!(rebuilt.bucket_count(), table.bucket_count());
		for row in &rows {
			assert_eq!(rebuilt.find(&row.keyword), Some(row.value.as_slice()));
		}
	}

	#[test]
	fn fixed_size_overflow_is_an_error() {
		let rows = rows(100);
		let config = CuckooTableConfig {
			bucket_count: BucketCountConfig::FixedSize { bucket_count: 4 },
			..config()
		};
		let mut rng = StdRng::from_seed([45u8; 32]);
		assert!(matches!(
			CuckooTable::new(&rows, config, &mut rng),
			Err(Error::ExpansionExceeded { .. })
		));
	}

	#[test]
	fn slot_count_caps_bucket_occupancy() {
		let rows = rows(64);
		let config = CuckooTableConfig {
			slot_count: Some(2),
			..config()
		};
		let mut rng = StdRng::from_seed([46u8; 32]);
		let table = CuckooTable::new(&rows, config, &mut rng).unwrap();
		for bucket in table.buckets() {
			assert!(bucket.entries.len() <= 2);
		}
	}
}
