//! Plaintext value types.

use crate::rq::PolyRq;
use crate::zq::Word;

/// A plaintext polynomial over the plaintext context, in Coeff form.
///
/// Carries no secret; freely copyable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plaintext<T: Word> {
	pub(crate) poly: PolyRq<T>,
}

impl<T: Word> Plaintext<T> {
	/// The wrapped polynomial.
	pub fn poly(&self) -> &PolyRq<T> {
		&self.poly
	}

	/// True when the plaintext encodes the zero polynomial.
	pub fn is_zero(&self) -> bool {
		self.poly.is_zero()
	}
}

/// A plaintext lifted onto a ciphertext context and transformed to Eval
/// form, ready for plaintext-ciphertext multiplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalPlaintext<T: Word> {
	pub(crate) poly: PolyRq<T>,
	pub(crate) level: usize,
}

impl<T: Word> EvalPlaintext<T> {
	/// The wrapped polynomial.
	pub fn poly(&self) -> &PolyRq<T> {
		&self.poly
	}

	/// The modulus-chain level the plaintext was lifted to.
	pub fn level(&self) -> usize {
		self.level
	}

	/// True when the plaintext encodes the zero polynomial.
	pub fn is_zero(&self) -> bool {
		self.poly.is_zero()
	}
}
