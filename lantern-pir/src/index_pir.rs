//! MulPIR: index private information retrieval through homomorphic
//! multiplication.

use std::sync::Arc;

use lantern_he::{
	conservative_skip_lsbs, deserialize_ciphertext, expand_ciphertext, serialize_ciphertext,
	serialize_with_skip_lsbs, BfvContext, BfvEncoder, BfvEvaluator, Ciphertext, Decryptor,
	EncodingFormat, Encryptor, EvalPlaintext, EvaluationKey, EvaluationKeyConfig,
	KeyCompressionStrategy, SecretKey, SerializedCiphertext, Word,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Requested shape of an index-PIR deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPirConfig {
	/// Number of database entries.
	pub entry_count: usize,
	/// Size of each entry in bytes.
	pub entry_size: usize,
	/// Grid dimensionality: 1 or 2.
	pub dimension_count: usize,
	/// Queries served per expansion; at least 1.
	pub batch_size: usize,
	/// Prefer an uneven `d1 >= d2` factoring that shrinks the Galois key
	/// set.
	pub uneven_dimensions: bool,
	/// Evaluation-key compression strategy.
	pub key_compression: KeyCompressionStrategy,
}

/// Derived PIR shape shared between server and client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPirParameter {
	/// Number of database entries.
	pub entry_count: usize,
	/// Size of each entry in bytes.
	pub entry_size: usize,
	/// Grid dimensions; their product covers every plaintext-packed cell.
	pub dimensions: Vec<usize>,
	/// Queries served per expansion.
	pub batch_size: usize,
	/// The evaluation key the server-side expansion requires.
	pub evaluation_key_config: EvaluationKeyConfig,
	/// Entries packed into each plaintext cell.
	pub entries_per_plaintext: usize,
	/// Queries packed into each query ciphertext.
	pub queries_per_ciphertext: usize,
}

impl IndexPirParameter {
	/// Indicator coefficients one query occupies.
	pub fn indicator_count(&self) -> usize {
		self.dimensions.iter().sum()
	}

	/// Query ciphertexts a batch needs.
	pub fn query_ciphertext_count(&self) -> usize {
		self.batch_size.div_ceil(self.queries_per_ciphertext)
	}

	/// The plaintext cell and intra-cell offset of an entry.
	pub fn entry_location(&self, entry_index: usize) -> (usize, usize) {
		(
			entry_index / self.entries_per_plaintext,
			entry_index % self.entries_per_plaintext,
		)
	}
}

/// Bits each plaintext coefficient can carry.
fn bits_per_coefficient<T: Word>(context: &Arc<BfvContext<T>>) -> usize {
	context.plain_modulus().significant_bits() as usize - 1
}

/// Bytes one plaintext can carry.
pub fn bytes_per_plaintext<T: Word>(context: &Arc<BfvContext<T>>) -> usize {
	context.degree() * bits_per_coefficient(context) / 8
}

/// Factors the database into dimensions and derives the evaluation-key
/// configuration.
pub fn generate_parameter<T: Word>(
	config: &IndexPirConfig,
	context: &Arc<BfvContext<T>>,
) -> Result<IndexPirParameter> {
	if config.entry_count == 0 || config.entry_size == 0 {
		return Err(Error::invalid("entry count and size must be positive"));
	}
	if !(1..=2).contains(&config.dimension_count) {
		return Err(Error::invalid("dimension count must be 1 or 2"));
	}
	if config.batch_size == 0 {
		return Err(Error::invalid("batch size must be at least 1"));
	}
	let plaintext_bytes = bytes_per_plaintext(context);
	if config.entry_size > plaintext_bytes {
		return Err(Error::invalid(format!(
			"entry size {} exceeds the {plaintext_bytes}-byte plaintext capacity",
			config.entry_size
		)));
	}
	let entries_per_plaintext = plaintext_bytes / config.entry_size;
	let cell_count = config.entry_count.div_ceil(entries_per_plaintext);

	let dimensions = if config.dimension_count == 1 {
		vec![cell_count]
	} else if config.uneven_dimensions {
		// d1 = smallest power of two at least sqrt(2 * cells / batch).
		let target = (2.0 * cell_count as f64 / config.batch_size as f64).sqrt();
		let d1 = (target.ceil() as usize).next_power_of_two().max(1);
		let d2 = cell_count.div_ceil(d1).max(1);
		vec![d1.max(d2), d2.min(d1)]
	} else {
		let side = (cell_count as f64).sqrt().ceil() as usize;
		vec![side.max(1), side.max(1)]
	};
	debug_assert!(dimensions.iter().product::<usize>() >= cell_count);

	let degree = context.degree();
	let indicator_count: usize = dimensions.iter().sum();
	if indicator_count > degree {
		return Err(Error::invalid(format!(
			"{indicator_count} indicator slots exceed the degree {degree}"
		)));
	}
	let queries_per_ciphertext = degree / indicator_count;
	let per_ciphertext = queries_per_ciphertext.min(config.batch_size) * indicator_count;
	let mut evaluation_key_config =
		EvaluationKeyConfig::for_expansion(degree, per_ciphertext, config.key_compression);
	if config.dimension_count == 2 {
		evaluation_key_config = evaluation_key_config.with_relinearization();
	}
	Ok(IndexPirParameter {
		entry_count: config.entry_count,
		entry_size: config.entry_size,
		dimensions,
		batch_size: config.batch_size,
		evaluation_key_config,
		entries_per_plaintext,
		queries_per_ciphertext,
	})
}

/// Packs bytes into plaintext coefficients, least-significant bit first.
pub(crate) fn bytes_to_coefficients<T: Word>(bytes: &[u8], bits_per_coeff: usize, degree: usize) -> Vec<T> {
	let mut out = vec![T::ZERO; degree];
	let mut bit_position = 0usize;
	for (index, slot) in out.iter_mut().enumerate() {
		let mut value = 0u64;
		for bit in 0..bits_per_coeff {
			let absolute = bit_position + bit;
			let byte = absolute / 8;
			if byte >= bytes.len() {
				break;
			}
			value |= u64::from(bytes[byte] >> (absolute % 8) & 1) << bit;
		}
		*slot = T::from_u64(value);
		bit_position += bits_per_coeff;
		if bit_position >= bytes.len() * 8 && index > 0 {
			break;
		}
	}
	out
}

/// Inverse of `bytes_to_coefficients`.
pub(crate) fn coefficients_to_bytes<T: Word>(
	coefficients: &[T],
	bits_per_coeff: usize,
	byte_count: usize,
) -> Vec<u8> {
	let mut out = vec![0u8; byte_count];
	let mut bit_position = 0usize;
	for coefficient in coefficients {
		let value = coefficient.to_u64();
		for bit in 0..bits_per_coeff {
			let absolute = bit_position + bit;
			let byte = absolute / 8;
			if byte >= byte_count {
				return out;
			}
			out[byte] |= ((value >> bit & 1) as u8) << (absolute % 8);
		}
		bit_position += bits_per_coeff;
	}
	out
}

/// A database processed into Eval-form plaintexts on the PIR grid.
pub struct ProcessedDatabase<T: Word> {
	/// Row-major `d1 x d2` grid; empty trailing cells are `None`.
	cells: Vec<Option<EvalPlaintext<T>>>,
}

/// The server side of MulPIR: holds the processed database and computes
/// responses.
pub struct MulPirServer<T: Word> {
	context: Arc<BfvContext<T>>,
	parameter: IndexPirParameter,
	database: ProcessedDatabase<T>,
	evaluator: BfvEvaluator<T>,
}

impl<T: Word> MulPirServer<T> {
	/// Packs raw entries into the PIR grid.
	///
	/// Entries must all have the configured size; they fill plaintext
	/// cells `entries_per_plaintext` at a time, row-major.
	pub fn process(
		context: &Arc<BfvContext<T>>,
		parameter: IndexPirParameter,
		entries: &[Vec<u8>],
	) -> Result<Self> {
		if entries.len() != parameter.entry_count {
			return Err(Error::invalid(format!(
				"expected {} entries, got {}",
				parameter.entry_count,
				entries.len()
			)));
		}
		let encoder = BfvEncoder::new(context);
		let bits = bits_per_coefficient(context);
		let cell_total: usize = parameter.dimensions.iter().product();
		let mut cells = Vec::with_capacity(cell_total);
		for chunk in entries.chunks(parameter.entries_per_plaintext) {
			let mut bytes = Vec::with_capacity(parameter.entries_per_plaintext * parameter.entry_size);
			for entry in chunk {
				if entry.len() != parameter.entry_size {
					return Err(Error::invalid("entry size mismatch"));
				}
				bytes.extend_from_slice(entry);
			}
			let coefficients = bytes_to_coefficients::<T>(&bytes, bits, context.degree());
			let plaintext = encoder.encode(&coefficients, EncodingFormat::Coefficient)?;
			cells.push(Some(encoder.to_eval_plaintext(&plaintext, 0)?));
		}
		cells.resize_with(cell_total, || None);
		debug!(
			entries = entries.len(),
			cells = cells.iter().filter(|c| c.is_some()).count(),
			dimensions = ?parameter.dimensions,
			"pir database processed"
		);
		Ok(Self {
			context: context.clone(),
			evaluator: BfvEvaluator::new(context),
			parameter,
			database: ProcessedDatabase { cells },
		})
	}

	/// The shared parameter.
	pub fn parameter(&self) -> &IndexPirParameter {
		&self.parameter
	}

	/// Computes one response ciphertext per batched query.
	pub fn respond(
		&self,
		query: &[SerializedCiphertext],
		evaluation_key: &EvaluationKey<T>,
	) -> Result<Vec<SerializedCiphertext>> {
		let parameter = &self.parameter;
		let indicator_count = parameter.indicator_count();
		if query.len() != parameter.query_ciphertext_count() {
			return Err(Error::invalid(format!(
				"expected {} query ciphertexts, got {}",
				parameter.query_ciphertext_count(),
				query.len()
			)));
		}
		let top = self.context.context_at(0)?;

		// Expand each packed ciphertext into its indicator slots.
		let mut indicators: Vec<Ciphertext<T>> = Vec::new();
		for (index, serialized) in query.iter().enumerate() {
			let ciphertext = deserialize_ciphertext(top, serialized)?;
			let queries_here = parameter
				.queries_per_ciphertext
				.min(parameter.batch_size - index * parameter.queries_per_ciphertext);
			let expanded = expand_ciphertext(
				&self.evaluator,
				&ciphertext,
				queries_here * indicator_count,
				evaluation_key,
			)?;
			for indicator in expanded {
				indicators.push(self.evaluator.to_eval_format(&indicator)?);
			}
		}

		let mut responses = Vec::with_capacity(parameter.batch_size);
		for q in 0..parameter.batch_size {
			let segment = &indicators[q * indicator_count..(q + 1) * indicator_count];
			responses.push(self.respond_single(segment, evaluation_key)?);
		}
		Ok(responses)
	}

	fn respond_single(
		&self,
		indicators: &[Ciphertext<T>],
		evaluation_key: &EvaluationKey<T>,
	) -> Result<SerializedCiphertext> {
		let parameter = &self.parameter;
		let d1 = parameter.dimensions[0];
		let d2 = parameter.dimensions.get(1).copied().unwrap_or(1);
		let along_first = &indicators[..d1];

		// Dimension 1: inner product with each plaintext column.
		let mut columns: Vec<Option<Ciphertext<T>>> = Vec::with_capacity(d2);
		for column in 0..d2 {
			let mut acc: Option<Ciphertext<T>> = None;
			for (row, indicator) in along_first.iter().enumerate() {
				let Some(cell) = &self.database.cells[row * d2 + column] else {
					continue;
				};
				let term = self.evaluator.multiply_plain(indicator, cell)?;
				acc = Some(match acc {
					Some(sum) => self.evaluator.add(&sum, &term)?,
					None => term,
				});
			}
			columns.push(acc);
		}

		let collapsed = if parameter.dimensions.len() == 1 {
			columns
				.pop()
				.flatten()
				.ok_or_else(|| Error::invalid("empty database column"))?
		} else {
			// Dimension 2: ciphertext-ciphertext inner product, one
			// relinearization after the sum.
			let along_second = &indicators[d1..d1 + d2];
			let mut acc: Option<Ciphertext<T>> = None;
			for (column, indicator) in columns.into_iter().zip(along_second) {
				let Some(column) = column else { continue };
				let product = self.evaluator.multiply(&column, indicator)?;
				acc = Some(match acc {
					Some(sum) => self.evaluator.add(&sum, &product)?,
					None => product,
				});
			}
			let summed = acc.ok_or_else(|| Error::invalid("empty database"))?;
			self.evaluator.relinearize(&summed, evaluation_key)?
		};

		// Shrink the response: drop RNS channels, then transmissible LSBs.
		// Bit skipping is only sound on Coeff-form polynomials.
		let switched = self
			.evaluator
			.to_coeff_format(&self.evaluator.mod_switch_down_to_single(&collapsed)?)?;
		let skips = conservative_skip_lsbs(
			switched.context(),
			self.context.plain_modulus().significant_bits(),
			switched.poly_count(),
		);
		Ok(serialize_with_skip_lsbs(&switched, &skips))
	}
}

/// The client side of MulPIR: builds queries and decrypts responses.
pub struct MulPirClient<T: Word> {
	context: Arc<BfvContext<T>>,
	parameter: IndexPirParameter,
	encoder: BfvEncoder<T>,
	encryptor: Encryptor<T>,
	decryptor: Decryptor<T>,
}

impl<T: Word> MulPirClient<T> {
	/// Creates a client from the shared parameter and its secret key.
	pub fn new(
		context: &Arc<BfvContext<T>>,
		parameter: IndexPirParameter,
		secret_key: &Arc<SecretKey<T>>,
	) -> Self {
		Self {
			encoder: BfvEncoder::new(context),
			encryptor: Encryptor::new(context, secret_key),
			decryptor: Decryptor::new(context, secret_key),
			context: context.clone(),
			parameter,
		}
	}

	/// The shared parameter.
	pub fn parameter(&self) -> &IndexPirParameter {
		&self.parameter
	}

	/// Builds the batched query for one plaintext cell index per batch
	/// slot.
	pub fn generate_query<R: RngCore + CryptoRng>(
		&self,
		cell_indices: &[usize],
		rng: &mut R,
	) -> Result<Vec<SerializedCiphertext>> {
		let parameter = &self.parameter;
		if cell_indices.len() != parameter.batch_size {
			return Err(Error::invalid(format!(
				"expected {} cell indices, got {}",
				parameter.batch_size,
				cell_indices.len()
			)));
		}
		let indicator_count = parameter.indicator_count();
		let d2 = parameter.dimensions.get(1).copied().unwrap_or(1);
		let degree = self.context.degree();

		let mut query = Vec::with_capacity(parameter.query_ciphertext_count());
		for chunk in cell_indices.chunks(parameter.queries_per_ciphertext) {
			let mut coefficients = vec![T::ZERO; degree];
			for (position, &cell) in chunk.iter().enumerate() {
				let offset = position * indicator_count;
				if parameter.dimensions.len() == 1 {
					coefficients[offset + cell] = T::ONE;
				} else {
					coefficients[offset + cell / d2] = T::ONE;
					coefficients[offset + parameter.dimensions[0] + cell % d2] = T::ONE;
				}
			}
			let plaintext = self
				.encoder
				.encode(&coefficients, EncodingFormat::Coefficient)?;
			let ciphertext = self.encryptor.encrypt(&plaintext, rng)?;
			query.push(serialize_ciphertext(&ciphertext));
		}
		Ok(query)
	}

	/// Decrypts a response and extracts the entry at the given index.
	pub fn decrypt_response(
		&self,
		response: &SerializedCiphertext,
		entry_index: usize,
	) -> Result<Vec<u8>> {
		let cell_bytes = self.decrypt_response_cell(response)?;
		let (_, offset) = self.parameter.entry_location(entry_index);
		let start = offset * self.parameter.entry_size;
		Ok(cell_bytes[start..start + self.parameter.entry_size].to_vec())
	}

	/// Decrypts a response into the full plaintext cell bytes.
	pub fn decrypt_response_cell(&self, response: &SerializedCiphertext) -> Result<Vec<u8>> {
		// Responses arrive mod-switched to the last level.
		let level = self.context.level_count() - 1;
		let bottom = self.context.context_at(level)?;
		let ciphertext = deserialize_ciphertext(bottom, response)?;
		let plaintext = self.decryptor.decrypt(&ciphertext)?;
		let coefficients = self
			.encoder
			.decode(&plaintext, EncodingFormat::Coefficient)?;
		Ok(coefficients_to_bytes(
			&coefficients,
			bits_per_coefficient(&self.context),
			bytes_per_plaintext(&self.context),
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use lantern_he::{BfvEncryptionParametersBuilder, CoefficientModulus, SecurityLevel};
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	fn context() -> Arc<BfvContext<u64>> {
		let params = BfvEncryptionParametersBuilder::new()
			.set_poly_degree(64)
			.set_plain_modulus(12289) // 14 bits, 1 mod 128
			.set_coefficient_moduli(CoefficientModulus::generate(64, &[50, 50, 50]).unwrap())
			.set_security_level(SecurityLevel::Unchecked)
			.build()
			.unwrap();
		BfvContext::new(params).unwrap()
	}

	#[test]
	fn byte_packing_roundtrip() {
		let bytes: Vec<u8> = (0..=200u8).collect();
		let coefficients = bytes_to_coefficients::<u64>(&bytes, 13, 256);
		assert!(coefficients.iter().all(|&c| c < 1 << 13));
		let back = coefficients_to_bytes(&coefficients, 13, bytes.len());
		assert_eq!(back, bytes);
	}

	#[test]
	fn parameter_factoring() {
		let context = context();
		// 13 bits/coeff * 64 coeffs = 104 bytes per plaintext.
		assert_eq!(bytes_per_plaintext(&context), 104);
		let config = IndexPirConfig {
			entry_count: 500,
			entry_size: 26,
			dimension_count: 2,
			batch_size: 2,
			uneven_dimensions: true,
			key_compression: KeyCompressionStrategy::Hybrid,
		};
		let parameter = generate_parameter(&config, &context).unwrap();
		assert_eq!(parameter.entries_per_plaintext, 4);
		// 125 cells; d1 = next_pow2(ceil(sqrt(125))) = 16, d2 = ceil(125/16) = 8.
		assert_eq!(parameter.dimensions, vec![16, 8]);
		assert!(parameter.dimensions[0] >= parameter.dimensions[1]);
		assert!(parameter.evaluation_key_config.relinearization);
		assert_eq!(parameter.queries_per_ciphertext, 64 / 24);

		let even = generate_parameter(
			&IndexPirConfig {
				uneven_dimensions: false,
				..config.clone()
			},
			&context,
		)
		.unwrap();
		assert_eq!(even.dimensions, vec![12, 12]);

		let flat = generate_parameter(
			&IndexPirConfig {
				dimension_count: 1,
				entry_count: 50,
				..config
			},
			&context,
		)
		.unwrap();
		assert_eq!(flat.dimensions, vec![13]);
		assert!(!flat.evaluation_key_config.relinearization);
	}

	#[test]
	fn oversized_entries_are_rejected() {
		let context = context();
		let config = IndexPirConfig {
			entry_count: 10,
			entry_size: 4096,
			dimension_count: 1,
			batch_size: 1,
			uneven_dimensions: false,
			key_compression: KeyCompressionStrategy::None,
		};
		assert!(matches!(
			generate_parameter(&config, &context),
			Err(Error::InvalidPirAlgorithm(_))
		));
	}

	#[test]
	fn index_pir_roundtrip_two_dimensions() {
		let context = context();
		let config = IndexPirConfig {
			entry_count: 40,
			entry_size: 26,
			dimension_count: 2,
			batch_size: 2,
			uneven_dimensions: true,
			key_compression: KeyCompressionStrategy::Hybrid,
		};
		let parameter = generate_parameter(&config, &context).unwrap();
		let entries: Vec<Vec<u8>> = (0..40u8).map(|i| vec![i; 26]).collect();
		let server = MulPirServer::process(&context, parameter.clone(), &entries).unwrap();

		let mut rng = StdRng::from_seed([51u8; 32]);
		let secret_key = Arc::new(SecretKey::random(&context, &mut rng).unwrap());
		let client = MulPirClient::new(&context, parameter.clone(), &secret_key);
		let keys = EvaluationKey::generate(
			&context,
			&parameter.evaluation_key_config,
			&secret_key,
			&mut rng,
		)
		.unwrap();

		let targets = [7usize, 33];
		let cells: Vec<usize> = targets
			.iter()
			.map(|&t| parameter.entry_location(t).0)
			.collect();
		let query = client.generate_query(&cells, &mut rng).unwrap();
		let responses = server.respond(&query, &keys).unwrap();
		assert_eq!(responses.len(), 2);
		for (response, &target) in responses.iter().zip(&targets) {
			let entry = client.decrypt_response(response, target).unwrap();
			assert_eq!(entry, entries[target]);
		}
	}

	#[test]
	fn index_pir_roundtrip_one_dimension() {
		let context = context();
		let config = IndexPirConfig {
			entry_count: 30,
			entry_size: 52,
			dimension_count: 1,
			batch_size: 1,
			uneven_dimensions: false,
			key_compression: KeyCompressionStrategy::None,
		};
		let parameter = generate_parameter(&config, &context).unwrap();
		let entries: Vec<Vec<u8>> = (0..30u8).map(|i| vec![0xa0 ^ i; 52]).collect();
		let server = MulPirServer::process(&context, parameter.clone(), &entries).unwrap();

		let mut rng = StdRng::from_seed([52u8; 32]);
		let secret_key = Arc::new(SecretKey::random(&context, &mut rng).unwrap());
		let client = MulPirClient::new(&context, parameter.clone(), &secret_key);
		let keys = EvaluationKey::generate(
			&context,
			&parameter.evaluation_key_config,
			&secret_key,
			&mut rng,
		)
		.unwrap();

		let target = 17usize;
		let (cell, _) = parameter.entry_location(target);
		let query = client.generate_query(&[cell], &mut rng).unwrap();
		let responses = server.respond(&query, &keys).unwrap();
		let entry = client.decrypt_response(&responses[0], target).unwrap();
		assert_eq!(entry, entries[target]);
	}
}
