//! Secret keys, key-switching keys, and evaluation keys.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use itertools::izip;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::BfvContext;
use crate::error::{Error, Result};
use crate::galois::{apply_automorphism, row_swap_element, validate_element};
use crate::rq::{Format, PolyContext, PolyRq};
use crate::sampler::{sample_centered_binomial, sample_ternary};
use crate::zq::Word;

/// A ternary secret key in Eval form over the full modulus chain.
///
/// The underlying buffer is overwritten with zeros when the key is
/// dropped; the key is never serialized in a seeded form.
pub struct SecretKey<T: Word> {
	pub(crate) poly: PolyRq<T>,
}

impl<T: Word> SecretKey<T> {
	/// Samples a fresh ternary secret key.
	pub fn random<R: RngCore + CryptoRng>(
		context: &Arc<BfvContext<T>>,
		rng: &mut R,
	) -> Result<Self> {
		let top = context.context_at(0)?;
		let mut poly = sample_ternary(top, rng);
		poly.convert_to_eval()?;
		Ok(Self { poly })
	}

	/// The secret polynomial restricted to a truncated context. Eval-form
	/// channels are independent, so truncation just copies rows.
	pub(crate) fn restrict(&self, target: &Arc<PolyContext<T>>) -> Result<PolyRq<T>> {
		let own = self.poly.context();
		if target.modulus_count() > own.modulus_count()
			|| !izip!(target.moduli(), own.moduli()).all(|(a, b)| a.value() == b.value())
		{
			return Err(Error::unsupported("target context is not a chain prefix"));
		}
		let mut out = PolyRq::zero(target, Format::Eval);
		for i in 0..target.modulus_count() {
			out.row_mut(i).copy_from_slice(self.poly.row(i));
		}
		Ok(out)
	}
}

impl<T: Word> Drop for SecretKey<T> {
	fn drop(&mut self) {
		self.poly.zeroize_in_place();
	}
}

impl<T: Word> fmt::Debug for SecretKey<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SecretKey").field("poly", &"<ELIDED>").finish()
	}
}

/// A key-switching key from a source secret to the target secret.
///
/// One two-polynomial ciphertext per RNS channel, encrypting the source
/// secret times the CRT basis element of that channel (the single-base RNS
/// decomposition). Keys live at level 0; key switching therefore requires
/// full-level ciphertexts.
pub struct KeySwitchKey<T: Word> {
	keys: Vec<(PolyRq<T>, PolyRq<T>)>,
}

impl<T: Word> KeySwitchKey<T> {
	/// A key transforming ciphertexts under `from` into ciphertexts under
	/// `to`.
	pub fn from_secret_to_secret<R: RngCore + CryptoRng>(
		context: &Arc<BfvContext<T>>,
		from: &SecretKey<T>,
		to: &SecretKey<T>,
		rng: &mut R,
	) -> Result<Self> {
		Self::generate(context, &from.poly, to, rng)
	}

	/// Encrypts `source` (Eval, level 0) under `sk`.
	pub(crate) fn generate<R: RngCore + CryptoRng>(
		context: &Arc<BfvContext<T>>,
		source: &PolyRq<T>,
		secret_key: &SecretKey<T>,
		rng: &mut R,
	) -> Result<Self> {
		let top = context.context_at(0)?;
		if source.context() != top || source.format() != Format::Eval {
			return Err(Error::unsupported(
				"key-switch source must be Eval form at level 0",
			));
		}
		let mut keys = Vec::with_capacity(top.modulus_count());
		for i in 0..top.modulus_count() {
			let a = PolyRq::random_uniform(top, Format::Eval, rng);
			let mut e = sample_centered_binomial(top, rng);
			e.convert_to_eval()?;
			let mut b = a.clone();
			b.mul_assign(&secret_key.poly)?;
			b.add_assign(&e)?;
			b.neg_assign();
			// The CRT basis element is 1 mod q_i and 0 elsewhere, so the
			// source contributes to channel i only.
			let modulus = &top.moduli()[i];
			for (slot, &src) in izip!(b.row_mut(i), source.row(i)) {
				*slot = modulus.add_mod(*slot, src);
			}
			e.zeroize_in_place();
			keys.push((b, a));
		}
		Ok(Self { keys })
	}

	/// Decomposes `poly` (Coeff, level 0) and folds it through the key,
	/// returning the Eval-form update pair `(u0, u1)`.
	pub fn key_switch(&self, poly: &PolyRq<T>) -> Result<(PolyRq<T>, PolyRq<T>)> {
		let context = self.keys[0].0.context().clone();
		if poly.context() != &context {
			return Err(Error::unsupported(
				"key switching requires a full-level ciphertext",
			));
		}
		if poly.format() != Format::Coeff {
			return Err(Error::FormatMismatch);
		}
		let mut u0 = PolyRq::zero(&context, Format::Eval);
		let mut u1 = PolyRq::zero(&context, Format::Eval);
		for (i, (b_i, a_i)) in self.keys.iter().enumerate() {
			// Lift channel i of the decomposition across every channel.
			let mut lifted = PolyRq::zero(&context, Format::Coeff);
			let source = poly.row(i);
			for (j, modulus) in context.moduli().iter().enumerate() {
				for (slot, &value) in izip!(lifted.row_mut(j), source) {
					*slot = modulus.reduce(value);
				}
			}
			lifted.convert_to_eval()?;
			let mut term0 = lifted.clone();
			term0.mul_assign(b_i)?;
			u0.add_assign(&term0)?;
			let mut term1 = lifted;
			term1.mul_assign(a_i)?;
			u1.add_assign(&term1)?;
		}
		Ok((u0, u1))
	}
}

impl<T: Word> fmt::Debug for KeySwitchKey<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("KeySwitchKey")
			.field("keys", &self.keys.len())
			.finish()
	}
}

/// Strategies trading evaluation-key size against homomorphic work during
/// query expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyCompressionStrategy {
	/// Full ladder of expansion elements plus the row swap.
	None,
	/// Exactly the levels the configured expansion needs, plus the row
	/// swap.
	Hybrid,
	/// The needed expansion levels only.
	Max,
}

/// Which key-switching keys an evaluation key must contain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationKeyConfig {
	/// Galois elements to generate keys for.
	pub galois_elements: Vec<usize>,
	/// Whether to generate the relinearization key.
	pub relinearization: bool,
}

impl EvaluationKeyConfig {
	/// The configuration query expansion needs for `output_count` outputs
	/// at the given degree, under a key-compression strategy.
	pub fn for_expansion(
		degree: usize,
		output_count: usize,
		strategy: KeyCompressionStrategy,
	) -> Self {
		let log_n = degree.ilog2() as usize;
		let levels = if output_count <= 1 {
			0
		} else {
			(output_count.min(degree).next_power_of_two().ilog2() as usize).min(log_n)
		};
		let needed: Vec<usize> = (0..levels).map(|j| (degree >> j) + 1).collect();
		let mut galois_elements = match strategy {
			KeyCompressionStrategy::None => (1..=log_n).map(|j| (1usize << j) + 1).collect(),
			KeyCompressionStrategy::Hybrid | KeyCompressionStrategy::Max => needed,
		};
		if !matches!(strategy, KeyCompressionStrategy::Max) {
			galois_elements.push(row_swap_element(degree));
		}
		galois_elements.sort_unstable();
		galois_elements.dedup();
		Self {
			galois_elements,
			relinearization: false,
		}
	}

	/// Requests the relinearization key as well.
	pub fn with_relinearization(mut self) -> Self {
		self.relinearization = true;
		self
	}
}

/// Relinearization and Galois key-switching keys, generated up front and
/// shared by immutable reference.
pub struct EvaluationKey<T: Word> {
	relin: Option<KeySwitchKey<T>>,
	galois: BTreeMap<usize, KeySwitchKey<T>>,
}

impl<T: Word> EvaluationKey<T> {
	/// Generates the keys a configuration asks for.
	pub fn generate<R: RngCore + CryptoRng>(
		context: &Arc<BfvContext<T>>,
		config: &EvaluationKeyConfig,
		secret_key: &SecretKey<T>,
		rng: &mut R,
	) -> Result<Self> {
		let degree = context.degree();
		let relin = if config.relinearization {
			let mut squared = secret_key.poly.clone();
			squared.mul_assign(&secret_key.poly)?;
			let key = KeySwitchKey::generate(context, &squared, secret_key, rng)?;
			squared.zeroize_in_place();
			Some(key)
		} else {
			None
		};
		let mut galois = BTreeMap::new();
		for &g in &config.galois_elements {
			validate_element(g, degree)?;
			let mut permuted = apply_automorphism(&secret_key.poly.to_coeff()?, g)?;
			permuted.convert_to_eval()?;
			let key = KeySwitchKey::generate(context, &permuted, secret_key, rng)?;
			permuted.zeroize_in_place();
			galois.insert(g, key);
		}
		debug!(
			galois = galois.len(),
			relinearization = relin.is_some(),
			"evaluation key generated"
		);
		Ok(Self { relin, galois })
	}

	/// Whether the relinearization key is present.
	pub fn supports_relinearization(&self) -> bool {
		self.relin.is_some()
	}

	/// Whether a Galois element's key is present.
	pub fn supports_galois_element(&self, g: usize) -> bool {
		self.galois.contains_key(&g)
	}

	/// The Galois elements with keys, in ascending order.
	pub fn galois_elements(&self) -> Vec<usize> {
		self.galois.keys().copied().collect()
	}

	pub(crate) fn relin_key(&self) -> Result<&KeySwitchKey<T>> {
		self.relin
			.as_ref()
			.ok_or_else(|| Error::unsupported("evaluation key lacks relinearization"))
	}

	pub(crate) fn galois_key(&self, g: usize) -> Result<&KeySwitchKey<T>> {
		self.galois.get(&g).ok_or(Error::MissingGaloisElement(g))
	}
}

impl<T: Word> fmt::Debug for EvaluationKey<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EvaluationKey")
			.field("galois_elements", &self.galois_elements())
			.field("relinearization", &self.supports_relinearization())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parameters::{BfvEncryptionParametersBuilder, CoefficientModulus, SecurityLevel};
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	fn context() -> Arc<BfvContext<u64>> {
		let params = BfvEncryptionParametersBuilder::new()
			.set_poly_degree(16)
			.set_plain_modulus(97)
			.set_coefficient_moduli(CoefficientModulus::generate(16, &[40, 40]).unwrap())
			.set_security_level(SecurityLevel::Unchecked)
			.build()
			.unwrap();
		BfvContext::new(params).unwrap()
	}

	#[test]
	fn secret_key_is_ternary_in_coeff_form() {
		let ctx = context();
		let mut rng = StdRng::from_seed([5u8; 32]);
		let sk = SecretKey::random(&ctx, &mut rng).unwrap();
		let coeff = sk.poly.to_coeff().unwrap();
		let q0 = &ctx.context_at(0).unwrap().moduli()[0];
		for j in 0..16 {
			assert!((-1..=1).contains(&q0.to_centered(coeff.row(0)[j])));
		}
	}

	#[test]
	fn expansion_config_none_is_full_ladder() {
		let config =
			EvaluationKeyConfig::for_expansion(16, 8, KeyCompressionStrategy::None);
		assert_eq!(config.galois_elements, vec![3, 5, 9, 17, 31]);
	}

	#[test]
	fn expansion_config_hybrid_and_max() {
		let hybrid = EvaluationKeyConfig::for_expansion(16, 8, KeyCompressionStrategy::Hybrid);
		// 8 outputs need levels g = 17, 9, 5; hybrid adds the row swap 31.
		assert_eq!(hybrid.galois_elements, vec![5, 9, 17, 31]);
		let max = EvaluationKeyConfig::for_expansion(16, 8, KeyCompressionStrategy::Max);
		assert_eq!(max.galois_elements, vec![5, 9, 17]);
	}

	#[test]
	fn missing_galois_element_is_reported() {
		let ctx = context();
		let mut rng = StdRng::from_seed([6u8; 32]);
		let sk = SecretKey::random(&ctx, &mut rng).unwrap();
		let ek = EvaluationKey::generate(
			&ctx,
			&EvaluationKeyConfig {
				galois_elements: vec![3],
				relinearization: false,
			},
			&sk,
			&mut rng,
		)
		.unwrap();
		assert!(ek.supports_galois_element(3));
		assert_eq!(ek.galois_key(5).err(), Some(Error::MissingGaloisElement(5)));
		assert!(ek.relin_key().is_err());
	}
}
