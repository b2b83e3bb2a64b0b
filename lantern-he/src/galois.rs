//! Galois automorphisms `X -> X^g` on the negacyclic ring.

use crate::error::{Error, Result};
use crate::rq::{Format, PolyRq};
use crate::zq::Word;

/// Validates that `g` defines an automorphism: odd, in `(1, 2N)`.
pub(crate) fn validate_element(g: usize, degree: usize) -> Result<()> {
	if g % 2 == 0 || g <= 1 || g >= 2 * degree {
		return Err(Error::unsupported(format!(
			"{g} is not a Galois element for degree {degree}"
		)));
	}
	Ok(())
}

/// The Galois element realizing a column rotation by `steps` in the SIMD
/// layout (generator 3 convention).
pub fn column_rotation_element(degree: usize, steps: isize) -> usize {
	let order = (degree / 2) as isize;
	let steps = steps.rem_euclid(order) as u64;
	let m = 2 * degree;
	let mut g = 1usize;
	for _ in 0..steps {
		g = g * 3 % m;
	}
	g
}

/// The Galois element swapping the two SIMD rows.
pub fn row_swap_element(degree: usize) -> usize {
	2 * degree - 1
}

/// `g^-1 mod 2N`, the element undoing `g`.
pub fn inverse_element(g: usize, degree: usize) -> usize {
	let m = 2 * degree;
	// The unit group mod 2N has order N; g^(N-1) inverts g.
	let mut inv = 1usize;
	let mut base = g % m;
	let mut exp = degree - 1;
	while exp > 0 {
		if exp & 1 == 1 {
			inv = inv * base % m;
		}
		base = base * base % m;
		exp >>= 1;
	}
	inv
}

/// Applies `X -> X^g` to a Coeff-form polynomial: a signed permutation of
/// the coefficients.
pub(crate) fn apply_automorphism<T: Word>(poly: &PolyRq<T>, g: usize) -> Result<PolyRq<T>> {
	if poly.format() != Format::Coeff {
		return Err(Error::unsupported("automorphisms apply in Coeff form"));
	}
	let n = poly.context().degree();
	validate_element(g, n)?;
	let m = 2 * n;
	let context = poly.context().clone();
	let mut out = PolyRq::zero(&context, Format::Coeff);
	for (channel, modulus) in context.moduli().iter().enumerate() {
		let source = poly.row(channel);
		let target = out.row_mut(channel);
		for (i, &value) in source.iter().enumerate() {
			let e = i * g % m;
			if e < n {
				target[e] = value;
			} else {
				target[e - n] = modulus.neg_mod(value);
			}
		}
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::rq::PolyContext;

	#[test]
	fn automorphism_permutes_with_sign() {
		let ctx = PolyContext::<u64>::new(&[97], 4).unwrap();
		// a = X: sigma_3(X) = X^3; sigma_3(X^2) = X^6 = -X^2.
		let mut a = PolyRq::zero(&ctx, Format::Coeff);
		a.row_mut(0)[1] = 1;
		a.row_mut(0)[2] = 5;
		let out = apply_automorphism(&a, 3).unwrap();
		assert_eq!(out.row(0), &[0, 0, 92, 1]);
	}

	#[test]
	fn automorphism_composes_to_identity() {
		let ctx = PolyContext::<u64>::new(&[97], 8).unwrap();
		let mut a = PolyRq::zero(&ctx, Format::Coeff);
		for (i, slot) in a.row_mut(0).iter_mut().enumerate() {
			*slot = (i * i + 1) as u64 % 97;
		}
		let g = 3;
		let g_inv = inverse_element(g, 8);
		let roundtrip = apply_automorphism(&apply_automorphism(&a, g).unwrap(), g_inv).unwrap();
		assert_eq!(a, roundtrip);
	}

	#[test]
	fn rotation_elements() {
		assert_eq!(column_rotation_element(8, 0), 1);
		assert_eq!(column_rotation_element(8, 1), 3);
		assert_eq!(column_rotation_element(8, 2), 9);
		// steps wrap modulo N/2.
		assert_eq!(column_rotation_element(8, 4), 1);
		assert_eq!(column_rotation_element(8, -1), column_rotation_element(8, 3));
		assert_eq!(row_swap_element(8), 15);
	}

	#[test]
	fn rejects_even_elements() {
		let ctx = PolyContext::<u64>::new(&[97], 4).unwrap();
		let a = PolyRq::zero(&ctx, Format::Coeff);
		assert!(apply_automorphism(&a, 4).is_err());
		assert!(apply_automorphism(&a, 1).is_err());
		assert!(apply_automorphism(&a, 9).is_err());
	}
}
