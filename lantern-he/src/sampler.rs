//! Randomness: the seeded PRG behind compact ciphertexts, and the error,
//! ternary, and uniform polynomial samplers.

use std::sync::Arc;

use rand::{CryptoRng, Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use zeroize::Zeroize;

use crate::rq::{Format, PolyContext, PolyRq};
use crate::zq::Word;

/// Seed for the deterministic PRG carried by seeded ciphertexts.
pub type Seed = [u8; 32];

/// The deterministic PRG used to re-derive seeded polynomials.
pub type SeededRng = ChaCha8Rng;

/// A uniformly random polynomial expanded deterministically from a seed.
///
/// Encryption and seeded deserialization must agree on this exact
/// derivation: a fresh `SeededRng` sampling in Eval form.
pub fn sample_uniform_seeded<T: Word>(
	context: &Arc<PolyContext<T>>,
	format: Format,
	seed: &Seed,
) -> PolyRq<T> {
	let mut rng = SeededRng::from_seed(*seed);
	PolyRq::random_uniform(context, format, &mut rng)
}

/// Draws a fresh PRG seed from the caller's randomness.
pub fn random_seed<R: RngCore + CryptoRng>(rng: &mut R) -> Seed {
	rng.gen()
}

/// Error polynomial from a centered binomial distribution with variance 10
/// (20 bit pairs per coefficient), in Coeff form.
pub fn sample_centered_binomial<T: Word, R: RngCore + CryptoRng>(
	context: &Arc<PolyContext<T>>,
	rng: &mut R,
) -> PolyRq<T> {
	let degree = context.degree();
	let mut centered = vec![0i64; degree];
	for value in centered.iter_mut() {
		let bits = rng.next_u64();
		let a = (bits & 0xf_ffff).count_ones() as i64;
		let b = ((bits >> 20) & 0xf_ffff).count_ones() as i64;
		*value = a - b;
	}
	let poly = poly_from_centered(context, &centered);
	centered.zeroize();
	poly
}

/// Ternary polynomial with coefficients uniform over {-1, 0, 1}, Coeff form.
pub fn sample_ternary<T: Word, R: RngCore + CryptoRng>(
	context: &Arc<PolyContext<T>>,
	rng: &mut R,
) -> PolyRq<T> {
	let degree = context.degree();
	let mut centered = vec![0i64; degree];
	let mut pool = 0u64;
	let mut remaining = 0u32;
	for value in centered.iter_mut() {
		*value = loop {
			if remaining == 0 {
				pool = rng.next_u64();
				remaining = 32;
			}
			let draw = pool & 0b11;
			pool >>= 2;
			remaining -= 1;
			if draw != 0b11 {
				break draw as i64 - 1;
			}
		};
	}
	let poly = poly_from_centered(context, &centered);
	centered.zeroize();
	poly
}

fn poly_from_centered<T: Word>(context: &Arc<PolyContext<T>>, centered: &[i64]) -> PolyRq<T> {
	let mut poly = PolyRq::zero(context, Format::Coeff);
	for (i, modulus) in context.moduli().iter().enumerate() {
		for (slot, &value) in poly.row_mut(i).iter_mut().zip(centered) {
			*slot = modulus.from_centered(value);
		}
	}
	poly
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::StdRng;

	fn context() -> Arc<PolyContext<u64>> {
		PolyContext::new(&[0x1fff_ffff_ffff_d801, 12289], 64).unwrap()
	}

	#[test]
	fn seeded_sampling_is_deterministic() {
		let ctx = context();
		let seed = [9u8; 32];
		let a = sample_uniform_seeded(&ctx, Format::Eval, &seed);
		let b = sample_uniform_seeded(&ctx, Format::Eval, &seed);
		assert_eq!(a, b);
		let c = sample_uniform_seeded(&ctx, Format::Eval, &[10u8; 32]);
		assert_ne!(a, c);
	}

	#[test]
	fn centered_binomial_is_small_and_consistent() {
		let ctx = context();
		let mut rng = StdRng::from_seed([1u8; 32]);
		let poly = sample_centered_binomial(&ctx, &mut rng);
		let q0 = &ctx.moduli()[0];
		let q1 = &ctx.moduli()[1];
		for j in 0..ctx.degree() {
			let c = q0.to_centered(poly.row(0)[j]);
			assert!((-20..=20).contains(&c));
			// Same centered value in every channel.
			assert_eq!(q1.to_centered(poly.row(1)[j]), c);
		}
	}

	#[test]
	fn ternary_values_are_ternary() {
		let ctx = context();
		let mut rng = StdRng::from_seed([2u8; 32]);
		let poly = sample_ternary(&ctx, &mut rng);
		let q0 = &ctx.moduli()[0];
		let mut seen = [false; 3];
		for j in 0..ctx.degree() {
			let c = q0.to_centered(poly.row(0)[j]);
			assert!((-1..=1).contains(&c));
			seen[(c + 1) as usize] = true;
		}
		assert!(seen.iter().all(|&s| s), "all three values should appear");
	}
}
