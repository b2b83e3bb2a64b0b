//! Keyword PIR: cuckoo-hashed buckets retrieved through MulPIR.

use std::sync::Arc;

use lantern_he::{
	BfvContext, EvaluationKey, KeyCompressionStrategy, SecretKey, SerializedCiphertext, Word,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cuckoo::{hash_indices, CuckooTable, CuckooTableConfig};
use crate::database::{keyword_hash, KeywordDatabase, KeywordValuePair, ShardingFunction};
use crate::error::{Error, Result};
use crate::index_pir::{generate_parameter, IndexPirConfig, IndexPirParameter, MulPirClient, MulPirServer};
use crate::wire::HashBucket;

/// Configuration of a keyword-PIR deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordPirConfig {
	/// Cuckoo table shape.
	pub cuckoo: CuckooTableConfig,
	/// Index-PIR grid dimensionality (1 or 2).
	pub dimension_count: usize,
	/// Prefer the uneven grid factoring.
	pub uneven_dimensions: bool,
	/// Evaluation-key compression strategy.
	pub key_compression: KeyCompressionStrategy,
	/// Number of database shards.
	pub shard_count: usize,
	/// How keywords map onto shards.
	pub sharding_function: ShardingFunction,
}

/// Frozen per-shard layout the client reproduces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardParameter {
	/// Buckets per cuckoo sub-table.
	pub per_table_bucket_count: usize,
	/// Cuckoo hash function count.
	pub hash_function_count: usize,
	/// The shard's index-PIR parameter.
	pub index_parameter: IndexPirParameter,
}

/// Everything a client needs to query a processed database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordPirParameter {
	/// How keywords map onto shards.
	pub sharding_function: ShardingFunction,
	/// Number of shards.
	pub shard_count: usize,
	/// Per-shard layout, one entry per shard.
	pub shards: Vec<ShardParameter>,
}

/// The server side: processed shards ready to answer queries.
pub struct KeywordPirServer<T: Word> {
	parameter: KeywordPirParameter,
	shards: Vec<MulPirServer<T>>,
}

impl<T: Word> KeywordPirServer<T> {
	/// Shards the rows, builds a cuckoo table per shard, and packs the
	/// serialized buckets into index-PIR databases.
	pub fn process<R: RngCore + CryptoRng>(
		context: &Arc<BfvContext<T>>,
		rows: Vec<KeywordValuePair>,
		config: &KeywordPirConfig,
		rng: &mut R,
	) -> Result<Self> {
		let row_count = rows.len();
		let database = KeywordDatabase::new(rows, config.sharding_function, config.shard_count)?;
		let entry_size = config.cuckoo.max_serialized_bucket_size;
		let mut shards = Vec::with_capacity(config.shard_count);
		let mut shard_parameters = Vec::with_capacity(config.shard_count);
		for shard_rows in &database.shards {
			let table = CuckooTable::new(shard_rows, config.cuckoo.clone(), rng)?;
			let entries: Vec<Vec<u8>> = table
				.serialize_buckets()?
				.into_iter()
				.map(|mut bytes| {
					bytes.resize(entry_size, 0);
					bytes
				})
				.collect();
			let index_config = IndexPirConfig {
				entry_count: entries.len(),
				entry_size,
				dimension_count: config.dimension_count,
				batch_size: config.cuckoo.hash_function_count,
				uneven_dimensions: config.uneven_dimensions,
				key_compression: config.key_compression,
			};
			let index_parameter = generate_parameter(&index_config, context)?;
			shard_parameters.push(ShardParameter {
				per_table_bucket_count: table.per_table_bucket_count(),
				hash_function_count: config.cuckoo.hash_function_count,
				index_parameter: index_parameter.clone(),
			});
			shards.push(MulPirServer::process(context, index_parameter, &entries)?);
		}
		info!(
			rows = row_count,
			shards = shards.len(),
			"keyword pir database processed"
		);
		Ok(Self {
			parameter: KeywordPirParameter {
				sharding_function: config.sharding_function,
				shard_count: config.shard_count,
				shards: shard_parameters,
			},
			shards,
		})
	}

	/// The parameter to share with clients.
	pub fn parameter(&self) -> &KeywordPirParameter {
		&self.parameter
	}

	/// Answers a query against one shard.
	pub fn respond(
		&self,
		shard_index: usize,
		query: &[SerializedCiphertext],
		evaluation_key: &EvaluationKey<T>,
	) -> Result<Vec<SerializedCiphertext>> {
		let shard = self
			.shards
			.get(shard_index)
			.ok_or_else(|| Error::invalid(format!("no shard {shard_index}")))?;
		shard.respond(query, evaluation_key)
	}
}

/// The client side: builds queries for keywords and extracts values from
/// responses.
pub struct KeywordPirClient<T: Word> {
	parameter: KeywordPirParameter,
	clients: Vec<MulPirClient<T>>,
}

impl<T: Word> KeywordPirClient<T> {
	/// Creates a client from the server's parameter and the client's
	/// secret key.
	pub fn new(
		context: &Arc<BfvContext<T>>,
		parameter: KeywordPirParameter,
		secret_key: &Arc<SecretKey<T>>,
	) -> Self {
		let clients = parameter
			.shards
			.iter()
			.map(|shard| MulPirClient::new(context, shard.index_parameter.clone(), secret_key))
			.collect();
		Self { parameter, clients }
	}

	/// The shard a keyword lives in.
	pub fn shard_of(&self, keyword: &[u8]) -> usize {
		self.parameter
			.sharding_function
			.shard_index(keyword, self.parameter.shard_count)
	}

	/// The candidate bucket indices of a keyword within its shard.
	fn candidate_buckets(&self, keyword: &[u8], shard_index: usize) -> Vec<usize> {
		let shard = &self.parameter.shards[shard_index];
		hash_indices(
			keyword,
			shard.per_table_bucket_count,
			shard.hash_function_count,
		)
		.into_iter()
		.enumerate()
		.map(|(table, local)| table * shard.per_table_bucket_count + local)
		.collect()
	}

	/// Builds the batched query for a keyword, returning the target shard
	/// and the query ciphertexts.
	pub fn generate_query<R: RngCore + CryptoRng>(
		&self,
		keyword: &[u8],
		rng: &mut R,
	) -> Result<(usize, Vec<SerializedCiphertext>)> {
		let shard_index = self.shard_of(keyword);
		let shard = &self.parameter.shards[shard_index];
		let cells: Vec<usize> = self
			.candidate_buckets(keyword, shard_index)
			.into_iter()
			.map(|bucket| shard.index_parameter.entry_location(bucket).0)
			.collect();
		let query = self.clients[shard_index].generate_query(&cells, rng)?;
		Ok((shard_index, query))
	}

	/// Decrypts the responses and searches the candidate buckets for the
	/// keyword. `None` when the keyword is absent.
	pub fn decrypt_response(
		&self,
		keyword: &[u8],
		shard_index: usize,
		responses: &[SerializedCiphertext],
	) -> Result<Option<Vec<u8>>> {
		let hash = keyword_hash(keyword);
		let buckets = self.candidate_buckets(keyword, shard_index);
		for (response, bucket_index) in responses.iter().zip(buckets) {
			let bytes = self.clients[shard_index].decrypt_response(response, bucket_index)?;
			let bucket = HashBucket::deserialize(&bytes)?;
			if let Some(value) = bucket.find(hash) {
				return Ok(Some(value.to_vec()));
			}
		}
		Ok(None)
	}
}
