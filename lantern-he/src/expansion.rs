//! Oblivious query expansion: one ciphertext into many indicator
//! ciphertexts through Galois automorphisms.

use crate::ciphertext::Ciphertext;
use crate::error::{Error, Result};
use crate::evaluator::BfvEvaluator;
use crate::keys::EvaluationKey;
use crate::zq::Word;

/// Expands one Coeff-form ciphertext encrypting `(b_0, .., b_{count-1},
/// 0, ..)` into `count` ciphertexts where the i-th encrypts `(b_i, 0, ..)`.
///
/// Level `j` applies `sigma_g` with `g = N/2^j + 1`; the odd branch is
/// shifted by `X^-(2^j)`. Each level doubles the plaintext scale, so the
/// outputs carry a correction factor of `2^ceil(log2 count)` which
/// decryption divides back out. Counts below a power of two prune the
/// tree.
pub fn expand_ciphertext<T: Word>(
	evaluator: &BfvEvaluator<T>,
	ciphertext: &Ciphertext<T>,
	count: usize,
	keys: &EvaluationKey<T>,
) -> Result<Vec<Ciphertext<T>>> {
	let degree = evaluator.context().degree();
	if count == 0 || count > degree {
		return Err(Error::unsupported(format!(
			"expansion count {count} outside 1..={degree}"
		)));
	}
	let levels = if count == 1 {
		0
	} else {
		count.next_power_of_two().ilog2() as usize
	};

	let mut layer = vec![evaluator.to_coeff_format(ciphertext)?];
	for j in 0..levels {
		let g = (degree >> j) + 1;
		let shift = 1usize << j;
		let mut plus = Vec::with_capacity(layer.len());
		let mut minus = Vec::with_capacity(layer.len());
		for ct in &layer {
			let permuted = evaluator.apply_galois(ct, g, keys)?;
			plus.push(evaluator.add(ct, &permuted)?);
			let mut odd = evaluator.sub(ct, &permuted)?;
			for poly in odd.polys.iter_mut() {
				poly.multiply_inverse_power_of_x(shift)?;
			}
			minus.push(odd);
		}
		plus.append(&mut minus);
		layer = plus;
	}
	layer.truncate(count);

	let t = evaluator.context().plain_modulus();
	let scale = t.pow_mod(T::from_u64(2), levels as u64);
	for ct in layer.iter_mut() {
		ct.correction_factor = t.multiply_mod(ct.correction_factor, scale);
	}
	Ok(layer)
}

/// Expands a sequence of packed ciphertexts into `total_count` indicator
/// ciphertexts; each input covers the next `degree` indicator slots.
pub fn expand_ciphertexts<T: Word>(
	evaluator: &BfvEvaluator<T>,
	ciphertexts: &[Ciphertext<T>],
	total_count: usize,
	keys: &EvaluationKey<T>,
) -> Result<Vec<Ciphertext<T>>> {
	let degree = evaluator.context().degree();
	if ciphertexts.len() != total_count.div_ceil(degree) {
		return Err(Error::unsupported(format!(
			"{} ciphertexts cannot expand into {total_count} outputs",
			ciphertexts.len()
		)));
	}
	let mut out = Vec::with_capacity(total_count);
	for (i, ciphertext) in ciphertexts.iter().enumerate() {
		let remaining = total_count - i * degree;
		let count = remaining.min(degree);
		out.extend(expand_ciphertext(evaluator, ciphertext, count, keys)?);
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::BfvContext;
	use crate::decryptor::Decryptor;
	use crate::encoder::{BfvEncoder, EncodingFormat};
	use crate::encryptor::Encryptor;
	use crate::keys::{EvaluationKeyConfig, KeyCompressionStrategy, SecretKey};
	use crate::parameters::{BfvEncryptionParametersBuilder, CoefficientModulus, SecurityLevel};
	use rand::rngs::StdRng;
	use rand::SeedableRng;
	use std::sync::Arc;

	#[test]
	fn expansion_isolates_each_coefficient() {
		let params = BfvEncryptionParametersBuilder::new()
			.set_poly_degree(16)
			.set_plain_modulus(97u64)
			.set_coefficient_moduli(CoefficientModulus::generate(16, &[40, 40]).unwrap())
			.set_security_level(SecurityLevel::Unchecked)
			.build()
			.unwrap();
		let context = BfvContext::new(params).unwrap();
		let mut rng = StdRng::from_seed([31u8; 32]);
		let secret_key = Arc::new(SecretKey::random(&context, &mut rng).unwrap());
		let encoder = BfvEncoder::new(&context);
		let encryptor = Encryptor::new(&context, &secret_key);
		let decryptor = Decryptor::new(&context, &secret_key);
		let evaluator = BfvEvaluator::new(&context);

		let packed = vec![5u64, 0, 7, 1, 96, 0];
		let count = packed.len();
		let pt = encoder.encode(&packed, EncodingFormat::Coefficient).unwrap();
		let ct = encryptor.encrypt(&pt, &mut rng).unwrap();

		for strategy in [
			KeyCompressionStrategy::None,
			KeyCompressionStrategy::Hybrid,
			KeyCompressionStrategy::Max,
		] {
			let config = EvaluationKeyConfig::for_expansion(16, count, strategy);
			let keys = EvaluationKey::generate(&context, &config, &secret_key, &mut rng).unwrap();
			let expanded = expand_ciphertext(&evaluator, &ct, count, &keys).unwrap();
			assert_eq!(expanded.len(), count);
			for (i, indicator) in expanded.iter().enumerate() {
				let decoded = encoder
					.decode(
						&decryptor.decrypt(indicator).unwrap(),
						EncodingFormat::Coefficient,
					)
					.unwrap();
				assert_eq!(decoded[0], packed[i], "leaf {i}");
				assert!(decoded[1..].iter().all(|&v| v == 0), "leaf {i} has garbage");
			}
		}
	}

	#[test]
	fn missing_expansion_key_is_reported() {
		let params = BfvEncryptionParametersBuilder::new()
			.set_poly_degree(16)
			.set_plain_modulus(97u64)
			.set_coefficient_moduli(CoefficientModulus::generate(16, &[40, 40]).unwrap())
			.set_security_level(SecurityLevel::Unchecked)
			.build()
			.unwrap();
		let context = BfvContext::new(params).unwrap();
		let mut rng = StdRng::from_seed([32u8; 32]);
		let secret_key = Arc::new(SecretKey::random(&context, &mut rng).unwrap());
		let encoder = BfvEncoder::new(&context);
		let encryptor = Encryptor::new(&context, &secret_key);
		let evaluator = BfvEvaluator::new(&context);

		let pt = encoder.encode(&[1u64, 2], EncodingFormat::Coefficient).unwrap();
		let ct = encryptor.encrypt(&pt, &mut rng).unwrap();
		let keys = EvaluationKey::generate(
			&context,
			&EvaluationKeyConfig::default(),
			&secret_key,
			&mut rng,
		)
		.unwrap();
		assert!(matches!(
			expand_ciphertext(&evaluator, &ct, 2, &keys),
			Err(Error::MissingGaloisElement(17))
		));
	}
}
