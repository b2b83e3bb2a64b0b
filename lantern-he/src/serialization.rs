//! Compact ciphertext representations: seeded and full (with optional
//! per-channel LSB skipping).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ciphertext::Ciphertext;
use crate::error::{Error, Result};
use crate::rq::{Format, PolyContext, PolyRq};
use crate::sampler::{sample_uniform_seeded, Seed};
use crate::zq::Word;

/// A ciphertext prepared for transmission.
///
/// `Seeded` carries the first polynomial plus the 32-byte PRG seed the
/// last polynomial re-derives from; only fresh ciphertexts serialize this
/// way. `Full` carries every polynomial, with a per-polynomial,
/// per-channel count of least-significant bits that were zeroed before
/// transmission (the deserializer re-zeroes them before use).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializedCiphertext {
	/// First polynomial plus the seed for the second.
	Seeded {
		/// Channel-major residues of the first polynomial.
		poly: Vec<u64>,
		/// Format of the stored polynomial.
		format: Format,
		/// Correction factor.
		correction_factor: u64,
		/// PRG seed expanding the second polynomial in Eval form.
		seed: Seed,
	},
	/// Every polynomial, LSB-compressed.
	Full {
		/// Channel-major residues per polynomial.
		polys: Vec<Vec<u64>>,
		/// Format of the stored polynomials.
		format: Format,
		/// Per-polynomial, per-channel zeroed LSB counts.
		skip_lsbs: Vec<Vec<u32>>,
		/// Correction factor.
		correction_factor: u64,
	},
}

fn flatten<T: Word>(poly: &PolyRq<T>) -> Vec<u64> {
	let context = poly.context();
	let mut out = Vec::with_capacity(context.modulus_count() * context.degree());
	for i in 0..context.modulus_count() {
		out.extend(poly.row(i).iter().map(|v| v.to_u64()));
	}
	out
}

fn unflatten<T: Word>(
	context: &Arc<PolyContext<T>>,
	format: Format,
	data: &[u64],
	skip_lsbs: Option<&[u32]>,
) -> Result<PolyRq<T>> {
	let degree = context.degree();
	if data.len() != context.modulus_count() * degree {
		return Err(Error::serialization(format!(
			"expected {} residues, found {}",
			context.modulus_count() * degree,
			data.len()
		)));
	}
	let mut poly = PolyRq::zero(context, format);
	for (i, modulus) in context.moduli().iter().enumerate() {
		let skip = skip_lsbs.map_or(0, |s| s[i]).min(63);
		let mask = !((1u64 << skip) - 1);
		for (slot, &value) in poly.row_mut(i).iter_mut().zip(&data[i * degree..]) {
			*slot = modulus.reduce(T::from_u64(value & mask));
		}
	}
	Ok(poly)
}

/// Serializes a ciphertext, preferring the seeded form when available.
pub fn serialize_ciphertext<T: Word>(ciphertext: &Ciphertext<T>) -> SerializedCiphertext {
	if let (Some(seed), 2) = (ciphertext.seed(), ciphertext.poly_count()) {
		return SerializedCiphertext::Seeded {
			poly: flatten(&ciphertext.polys()[0]),
			format: ciphertext.format(),
			correction_factor: ciphertext.correction_factor().to_u64(),
			seed: *seed,
		};
	}
	serialize_with_skip_lsbs(
		ciphertext,
		&vec![
			vec![0; ciphertext.context().modulus_count()];
			ciphertext.poly_count()
		],
	)
}

/// Serializes in full form, zeroing the given per-polynomial, per-channel
/// LSB counts. Use `Decryptor::skip_lsbs_for_decryption` (or the
/// conservative bound) to pick safe counts for a receiver that will only
/// decrypt.
pub fn serialize_with_skip_lsbs<T: Word>(
	ciphertext: &Ciphertext<T>,
	skip_lsbs: &[Vec<u32>],
) -> SerializedCiphertext {
	let polys = ciphertext
		.polys()
		.iter()
		.zip(skip_lsbs)
		.map(|(poly, skips)| {
			let mut flat = flatten(poly);
			let degree = poly.context().degree();
			for (i, &skip) in skips.iter().enumerate() {
				let mask = !((1u64 << skip.min(63)) - 1);
				for value in flat[i * degree..(i + 1) * degree].iter_mut() {
					*value &= mask;
				}
			}
			flat
		})
		.collect();
	SerializedCiphertext::Full {
		polys,
		format: ciphertext.format(),
		skip_lsbs: skip_lsbs.to_vec(),
		correction_factor: ciphertext.correction_factor().to_u64(),
	}
}

/// Reconstructs a ciphertext over the given context.
///
/// Seeded forms re-derive the second polynomial from the seed exactly as
/// encryption produced it (Eval form, then converted to the stored
/// format).
pub fn deserialize_ciphertext<T: Word>(
	context: &Arc<PolyContext<T>>,
	serialized: &SerializedCiphertext,
) -> Result<Ciphertext<T>> {
	match serialized {
		SerializedCiphertext::Seeded {
			poly,
			format,
			correction_factor,
			seed,
		} => {
			let c0 = unflatten(context, *format, poly, None)?;
			let mut c1 = sample_uniform_seeded(context, Format::Eval, seed);
			if *format == Format::Coeff {
				c1.convert_to_coeff()?;
			}
			Ok(Ciphertext::new(
				vec![c0, c1],
				Some(*seed),
				T::from_u64(*correction_factor),
			))
		}
		SerializedCiphertext::Full {
			polys,
			format,
			skip_lsbs,
			correction_factor,
		} => {
			if polys.is_empty() || polys.len() != skip_lsbs.len() {
				return Err(Error::serialization("malformed full ciphertext"));
			}
			let polys = polys
				.iter()
				.zip(skip_lsbs)
				.map(|(data, skips)| unflatten(context, *format, data, Some(skips)))
				.collect::<Result<Vec<_>>>()?;
			Ok(Ciphertext::new(
				polys,
				None,
				T::from_u64(*correction_factor),
			))
		}
	}
}

/// Parameter-derived LSB skip counts safe for any Coeff-form ciphertext
/// with at least two bits of noise budget: meaningful only over a
/// single-modulus context, zeros otherwise.
pub fn conservative_skip_lsbs<T: Word>(
	context: &Arc<PolyContext<T>>,
	plain_bits: u32,
	poly_count: usize,
) -> Vec<Vec<u32>> {
	let channels = context.modulus_count();
	if channels != 1 {
		return vec![vec![0; channels]; poly_count];
	}
	let q_bits = context.moduli()[0].significant_bits();
	let log_n = context.degree().ilog2();
	let c0_skip = q_bits.saturating_sub(plain_bits + 4);
	let c1_skip = c0_skip.saturating_sub(log_n + 1);
	let mut out = vec![vec![c0_skip]];
	out.resize(poly_count, vec![c1_skip]);
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn masking_skips_low_bits() {
		let ctx = PolyContext::<u64>::new(&[0x1fff_ffff_ffff_d801], 4).unwrap();
		let mut poly = PolyRq::zero(&ctx, Format::Coeff);
		poly.row_mut(0).copy_from_slice(&[0b1011_1111, 0b100_0000, 1, 0]);
		let ct = Ciphertext::new(vec![poly.clone(), poly], None, 1u64);
		let serialized = serialize_with_skip_lsbs(&ct, &[vec![6], vec![0]]);
		let restored = deserialize_ciphertext(&ctx, &serialized).unwrap();
		assert_eq!(restored.polys()[0].row(0), &[0b1000_0000, 0b100_0000, 0, 0]);
		assert_eq!(restored.polys()[1].row(0), &[0b1011_1111, 0b100_0000, 1, 0]);
	}

	#[test]
	fn conservative_skips_need_single_channel() {
		let two = PolyContext::<u64>::new(&[0x1fff_ffff_ffff_d801, 12289], 16).unwrap();
		assert_eq!(conservative_skip_lsbs(&two, 14, 2), vec![vec![0, 0]; 2]);
		let one = PolyContext::<u64>::new(&[0x1fff_ffff_ffff_d801], 16).unwrap();
		let skips = conservative_skip_lsbs(&one, 14, 2);
		assert_eq!(skips[0][0], 61 - 18);
		assert_eq!(skips[1][0], 61 - 18 - 5);
	}
}
