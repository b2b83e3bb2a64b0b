//! Encoding between integer vectors and plaintext polynomials.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::BfvContext;
use crate::error::{Error, Result};
use crate::plaintext::{EvalPlaintext, Plaintext};
use crate::rq::{Format, PolyRq};
use crate::zq::Word;

/// How integer values map into a plaintext polynomial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodingFormat {
	/// Values become polynomial coefficients directly.
	Coefficient,
	/// Values fill SIMD slots through the inverse bit-reversed NTT over
	/// `Z_t`; requires `t = 1 (mod 2N)`.
	Simd,
}

/// Encodes and decodes vectors of integers modulo `t`.
///
/// Fewer than N values are zero-padded; decoding always returns N values.
/// Signed variants map the centered range `[-floor(t/2), floor((t-1)/2)]`
/// onto canonical residues and back.
pub struct BfvEncoder<T: Word> {
	context: Arc<BfvContext<T>>,
}

impl<T: Word> BfvEncoder<T> {
	/// Creates an encoder over the given context.
	pub fn new(context: &Arc<BfvContext<T>>) -> Self {
		Self {
			context: context.clone(),
		}
	}

	/// Number of values one plaintext holds.
	pub fn slot_count(&self) -> usize {
		self.context.degree()
	}

	/// Encodes unsigned values in `[0, t)`.
	pub fn encode(&self, values: &[T], format: EncodingFormat) -> Result<Plaintext<T>> {
		let degree = self.context.degree();
		let t = self.context.plain_modulus().value();
		if values.len() > degree {
			return Err(Error::unsupported_encoding(format!(
				"{} values exceed the {degree} available slots",
				values.len()
			)));
		}
		if values.iter().any(|v| *v >= t) {
			return Err(Error::EncodingOutOfBounds {
				low: 0,
				high: t.to_u64() as i64,
			});
		}
		match format {
			EncodingFormat::Coefficient => {
				let mut poly = PolyRq::zero(self.context.plain_context(), Format::Coeff);
				poly.row_mut(0)[..values.len()].copy_from_slice(values);
				Ok(Plaintext { poly })
			}
			EncodingFormat::Simd => {
				let map = self.context.simd_index_map()?;
				let mut slots = PolyRq::zero(self.context.plain_context(), Format::Eval);
				for (i, &value) in values.iter().enumerate() {
					slots.row_mut(0)[map[i]] = value;
				}
				Ok(Plaintext {
					poly: slots.to_coeff()?,
				})
			}
		}
	}

	/// Decodes a plaintext into N unsigned values.
	pub fn decode(&self, plaintext: &Plaintext<T>, format: EncodingFormat) -> Result<Vec<T>> {
		match format {
			EncodingFormat::Coefficient => Ok(plaintext.poly.row(0).to_vec()),
			EncodingFormat::Simd => {
				let map = self.context.simd_index_map()?;
				let slots = plaintext.poly.to_eval()?;
				Ok(map.iter().map(|&slot| slots.row(0)[slot]).collect())
			}
		}
	}

	/// Encodes signed values from the centered range.
	pub fn encode_signed(&self, values: &[i64], format: EncodingFormat) -> Result<Plaintext<T>> {
		let t = self.context.plain_modulus();
		let half = (t.value().to_u64() / 2) as i64;
		let low = -half;
		let high = (t.value().to_u64() as i64 - 1) / 2 + 1;
		if values.iter().any(|v| *v < low || *v >= high) {
			return Err(Error::EncodingOutOfBounds { low, high });
		}
		let unsigned: Vec<T> = values.iter().map(|&v| t.from_centered(v)).collect();
		self.encode(&unsigned, format)
	}

	/// Decodes a plaintext into N centered signed values.
	pub fn decode_signed(&self, plaintext: &Plaintext<T>, format: EncodingFormat) -> Result<Vec<i64>> {
		let t = self.context.plain_modulus();
		Ok(self
			.decode(plaintext, format)?
			.into_iter()
			.map(|v| t.to_centered(v))
			.collect())
	}

	/// Lifts a plaintext onto the ciphertext context at `level` and
	/// transforms it to Eval form for plaintext-ciphertext multiplication.
	pub fn to_eval_plaintext(&self, plaintext: &Plaintext<T>, level: usize) -> Result<EvalPlaintext<T>> {
		let target = self.context.context_at(level)?;
		let mut poly = PolyRq::zero(target, Format::Coeff);
		let coeffs = plaintext.poly.row(0);
		for i in 0..target.modulus_count() {
			// t is below every q_i, so residues copy over unchanged.
			poly.row_mut(i).copy_from_slice(coeffs);
		}
		poly.convert_to_eval()?;
		Ok(EvalPlaintext { poly, level })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parameters::{BfvEncryptionParametersBuilder, CoefficientModulus, SecurityLevel};

	fn encoder(plain_modulus: u64) -> BfvEncoder<u64> {
		let params = BfvEncryptionParametersBuilder::new()
			.set_poly_degree(16)
			.set_plain_modulus(plain_modulus)
			.set_coefficient_moduli(CoefficientModulus::generate(16, &[40, 40]).unwrap())
			.set_security_level(SecurityLevel::Unchecked)
			.build()
			.unwrap();
		BfvEncoder::new(&BfvContext::new(params).unwrap())
	}

	#[test]
	fn coefficient_roundtrip_with_padding() {
		let encoder = encoder(97);
		let values = vec![1u64, 2, 3, 96];
		let plaintext = encoder.encode(&values, EncodingFormat::Coefficient).unwrap();
		let decoded = encoder.decode(&plaintext, EncodingFormat::Coefficient).unwrap();
		assert_eq!(decoded.len(), 16);
		assert_eq!(&decoded[..4], &values[..]);
		assert!(decoded[4..].iter().all(|&v| v == 0));
	}

	#[test]
	fn simd_roundtrip() {
		let encoder = encoder(97); // 97 = 1 mod 32
		let values: Vec<u64> = (0..16).map(|i| i * 6 % 97).collect();
		let plaintext = encoder.encode(&values, EncodingFormat::Simd).unwrap();
		let decoded = encoder.decode(&plaintext, EncodingFormat::Simd).unwrap();
		assert_eq!(decoded, values);
	}

	#[test]
	fn simd_requires_congruent_plain_modulus() {
		let encoder = encoder(19); // 19 - 1 is not divisible by 32
		let err = encoder.encode(&[1], EncodingFormat::Simd).unwrap_err();
		assert!(matches!(err, Error::UnsupportedEncoding(_)));
	}

	#[test]
	fn signed_roundtrip_and_bounds() {
		let encoder = encoder(97);
		let values = vec![-48i64, -1, 0, 1, 48];
		let plaintext = encoder
			.encode_signed(&values, EncodingFormat::Coefficient)
			.unwrap();
		let decoded = encoder
			.decode_signed(&plaintext, EncodingFormat::Coefficient)
			.unwrap();
		assert_eq!(&decoded[..5], &values[..]);
		assert!(matches!(
			encoder.encode_signed(&[-49], EncodingFormat::Coefficient),
			Err(Error::EncodingOutOfBounds { .. })
		));
		assert!(matches!(
			encoder.encode(&[97], EncodingFormat::Coefficient),
			Err(Error::EncodingOutOfBounds { .. })
		));
	}

	#[test]
	fn too_many_values_rejected() {
		let encoder = encoder(97);
		let values = vec![0u64; 17];
		assert!(encoder.encode(&values, EncodingFormat::Coefficient).is_err());
	}
}
