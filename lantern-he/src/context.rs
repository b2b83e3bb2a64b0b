//! The heavyweight BFV context: modulus-switching chain, multiplication
//! bases, plaintext tooling, and every precomputation the scheme shares.

use std::sync::Arc;

use num::BigUint;
use tracing::debug;

use crate::error::{Error, Result};
use crate::parameters::EncryptionParameters;
use crate::rq::convert::RnsBaseConverter;
use crate::rq::PolyContext;
use crate::zq::{generate_primes, Modulus, Word};

/// Per-level helpers for ciphertext-ciphertext multiplication.
#[derive(Debug)]
pub(crate) struct MulAux<T: Word> {
	/// Converts from the level base into the extension base.
	pub up: RnsBaseConverter<T>,
	/// The tensor base: level moduli followed by the extension primes.
	pub tensor_context: Arc<PolyContext<T>>,
	/// Scales tensor-base products by t/Q back into the level base.
	pub down: RnsBaseConverter<T>,
}

/// SIMD (batching) tooling, available when `t = 1 (mod 2N)`.
#[derive(Debug)]
pub(crate) struct SimdSupport {
	/// SEAL-style matrix representation index map (generator 3).
	pub index_map: Vec<usize>,
}

/// Validated parameters plus the shared precomputations.
///
/// Construction performs every costly setup step once: the context chain
/// obtained by repeatedly dropping the last coefficient modulus, the delta
/// residues and plaintext converters per level, the extended bases used by
/// multiplication, and the SIMD index map when the plaintext modulus
/// supports batching. Immutable and shared through `Arc`.
#[derive(Debug)]
pub struct BfvContext<T: Word> {
	params: EncryptionParameters<T>,
	contexts: Vec<Arc<PolyContext<T>>>,
	plain_context: Arc<PolyContext<T>>,
	plain_modulus: Modulus<T>,
	delta: Vec<Vec<T>>,
	delta_big: Vec<BigUint>,
	plain_converters: Vec<RnsBaseConverter<T>>,
	mul_aux: Vec<MulAux<T>>,
	simd: Option<SimdSupport>,
}

impl<T: Word> BfvContext<T> {
	/// Builds the context for a validated parameter set.
	pub fn new(params: EncryptionParameters<T>) -> Result<Arc<Self>> {
		let degree = params.poly_degree();
		let t = params.plain_modulus();
		let plain_modulus = Modulus::new(t)?;
		let moduli = params.coefficient_moduli().to_vec();

		let mut contexts = Vec::with_capacity(moduli.len());
		for level in 0..moduli.len() {
			contexts.push(PolyContext::new(&moduli[..moduli.len() - level], degree)?);
		}
		let plain_context = PolyContext::new(&[t], degree)?;

		let mut delta = Vec::with_capacity(contexts.len());
		let mut delta_big = Vec::with_capacity(contexts.len());
		let mut plain_converters = Vec::with_capacity(contexts.len());
		for context in &contexts {
			let delta_l = context.modulus() / t.to_u64();
			delta.push(
				context
					.moduli()
					.iter()
					.map(|q| T::from_biguint(&(&delta_l % q.value().to_u64())))
					.collect(),
			);
			delta_big.push(delta_l);
			plain_converters.push(RnsBaseConverter::new(context, &plain_context)?);
		}

		let mul_aux = Self::build_mul_aux(&contexts, &moduli, degree)?;

		let simd = if (t.to_u64() - 1) % (2 * degree as u64) == 0 {
			Some(SimdSupport {
				index_map: simd_index_map(degree),
			})
		} else {
			None
		};

		debug!(
			degree,
			moduli = moduli.len(),
			total_bits = contexts[0].total_bits(),
			batching = simd.is_some(),
			"bfv context ready"
		);
		Ok(Arc::new(Self {
			params,
			contexts,
			plain_context,
			plain_modulus,
			delta,
			delta_big,
			plain_converters,
			mul_aux,
			simd,
		}))
	}

	fn build_mul_aux(
		contexts: &[Arc<PolyContext<T>>],
		moduli: &[T],
		degree: usize,
	) -> Result<Vec<MulAux<T>>> {
		// The extension base must absorb N * (L*Q)^2 products plus the
		// t/Q scaling slack at the widest level.
		let ext_bits = (T::BITS - 2) as usize;
		let l = moduli.len();
		let needed_bits =
			contexts[0].total_bits() + degree.ilog2() as usize + 2 * (l + 1).ilog2() as usize + 16;
		let ext_count = needed_bits.div_ceil(ext_bits);

		// Over-generate, then drop collisions with the coefficient moduli.
		let candidates = generate_primes::<T>(&vec![ext_bits; ext_count + l], false, Some(degree))?;
		let extension: Vec<T> = candidates
			.into_iter()
			.filter(|p| !moduli.contains(p))
			.take(ext_count)
			.collect();
		if extension.len() < ext_count {
			return Err(Error::NotEnoughPrimes {
				bits: ext_bits,
				congruence: 2 * degree,
			});
		}
		let extension_context = PolyContext::new(&extension, degree)?;

		let mut aux = Vec::with_capacity(contexts.len());
		for context in contexts {
			let mut tensor_moduli: Vec<T> =
				context.moduli().iter().map(|m| m.value()).collect();
			tensor_moduli.extend_from_slice(&extension);
			let tensor_context = PolyContext::new(&tensor_moduli, degree)?;
			aux.push(MulAux {
				up: RnsBaseConverter::new(context, &extension_context)?,
				down: RnsBaseConverter::new(&tensor_context, context)?,
				tensor_context,
			});
		}
		Ok(aux)
	}

	/// The validated parameters.
	pub fn params(&self) -> &EncryptionParameters<T> {
		&self.params
	}

	/// The polynomial degree N.
	pub fn degree(&self) -> usize {
		self.params.poly_degree()
	}

	/// The plaintext modulus with its Barrett state.
	pub fn plain_modulus(&self) -> &Modulus<T> {
		&self.plain_modulus
	}

	/// The single-modulus plaintext polynomial context.
	pub fn plain_context(&self) -> &Arc<PolyContext<T>> {
		&self.plain_context
	}

	/// Number of levels in the modulus-switching chain.
	pub fn level_count(&self) -> usize {
		self.contexts.len()
	}

	/// The polynomial context at `level` (level 0 is the full chain).
	pub fn context_at(&self, level: usize) -> Result<&Arc<PolyContext<T>>> {
		self.contexts
			.get(level)
			.ok_or_else(|| Error::unsupported(format!("no context at level {level}")))
	}

	/// The level a polynomial context belongs to.
	pub fn level_of(&self, context: &Arc<PolyContext<T>>) -> Result<usize> {
		self.contexts
			.iter()
			.position(|c| c == context)
			.ok_or_else(|| Error::unsupported("context does not belong to this chain"))
	}

	/// `floor(Q_l / t) mod q_i` residues at `level`.
	pub(crate) fn delta_residues(&self, level: usize) -> &[T] {
		&self.delta[level]
	}

	/// `floor(Q_l / t)` at `level`.
	pub(crate) fn delta_big(&self, level: usize) -> &BigUint {
		&self.delta_big[level]
	}

	/// Converter from the `level` base onto the plaintext base.
	pub(crate) fn plain_converter(&self, level: usize) -> &RnsBaseConverter<T> {
		&self.plain_converters[level]
	}

	pub(crate) fn mul_aux(&self, level: usize) -> &MulAux<T> {
		&self.mul_aux[level]
	}

	/// The SIMD index map; fails when batching is unsupported.
	pub(crate) fn simd_index_map(&self) -> Result<&[usize]> {
		self.simd
			.as_ref()
			.map(|s| s.index_map.as_slice())
			.ok_or_else(|| {
				Error::unsupported_encoding(format!(
					"plaintext modulus {} is not 1 mod {}",
					self.params.plain_modulus(),
					2 * self.degree()
				))
			})
	}

	/// Whether SIMD encoding is available.
	pub fn supports_simd(&self) -> bool {
		self.simd.is_some()
	}
}

/// SEAL's matrix representation index map: slot `i` of the 2 x N/2 matrix
/// maps to a bit-reversed power of the generator 3 modulo 2N.
fn simd_index_map(degree: usize) -> Vec<usize> {
	let row_size = degree >> 1;
	let m = degree << 1;
	let log_degree = degree.ilog2();
	let mut map = vec![0usize; degree];
	let mut pos = 1usize;
	for i in 0..row_size {
		let index1 = (pos - 1) >> 1;
		let index2 = (m - pos - 1) >> 1;
		map[i] = index1.reverse_bits() >> (usize::BITS - log_degree);
		map[row_size | i] = index2.reverse_bits() >> (usize::BITS - log_degree);
		pos = pos * 3 & (m - 1);
	}
	map
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parameters::{BfvEncryptionParametersBuilder, CoefficientModulus, SecurityLevel};

	pub(crate) fn test_context() -> Arc<BfvContext<u64>> {
		let params = BfvEncryptionParametersBuilder::new()
			.set_poly_degree(16)
			.set_plain_modulus(97) // 97 = 1 mod 32: batching-capable
			.set_coefficient_moduli(CoefficientModulus::generate(16, &[40, 40]).unwrap())
			.set_security_level(SecurityLevel::Unchecked)
			.build()
			.unwrap();
		BfvContext::new(params).unwrap()
	}

	#[test]
	fn chain_has_one_context_per_modulus() {
		let ctx = test_context();
		assert_eq!(ctx.level_count(), 2);
		assert_eq!(ctx.context_at(0).unwrap().modulus_count(), 2);
		assert_eq!(ctx.context_at(1).unwrap().modulus_count(), 1);
		assert_eq!(ctx.level_of(ctx.context_at(1).unwrap()).unwrap(), 1);
	}

	#[test]
	fn delta_residues_match_big_delta() {
		let ctx = test_context();
		let level0 = ctx.context_at(0).unwrap();
		let delta = ctx.delta_big(0);
		for (i, q) in level0.moduli().iter().enumerate() {
			assert_eq!(
				ctx.delta_residues(0)[i],
				u64::from_biguint(&(delta % q.value())),
			);
		}
	}

	#[test]
	fn tensor_base_is_wider_than_squared_level() {
		let ctx = test_context();
		let aux = ctx.mul_aux(0);
		let level_bits = ctx.context_at(0).unwrap().total_bits();
		assert!(aux.tensor_context.total_bits() > 2 * level_bits + 4);
	}

	#[test]
	fn simd_support_follows_congruence() {
		let ctx = test_context();
		assert!(ctx.supports_simd());
		let map = ctx.simd_index_map().unwrap();
		assert_eq!(map.len(), 16);
		// The map is a permutation of 0..N.
		let mut seen = vec![false; 16];
		for &slot in map {
			assert!(!seen[slot]);
			seen[slot] = true;
		}
	}
}
