//! The ciphertext value type.

use std::sync::Arc;

use crate::rq::{Format, PolyContext, PolyRq};
use crate::sampler::Seed;
use crate::zq::Word;

/// A BFV ciphertext: an ordered sequence of polynomials over one context.
///
/// Two polynomials after encryption, three transiently after a
/// ciphertext-ciphertext multiplication. A fresh ciphertext additionally
/// carries the PRG seed its last polynomial was expanded from, letting
/// serialization transmit only the first polynomial; any homomorphic
/// operation invalidates the seed. The correction factor lives in `[1, t)`
/// and scales the encrypted plaintext; decryption divides it back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext<T: Word> {
	pub(crate) polys: Vec<PolyRq<T>>,
	pub(crate) seed: Option<Seed>,
	pub(crate) correction_factor: T,
}

impl<T: Word> Ciphertext<T> {
	pub(crate) fn new(polys: Vec<PolyRq<T>>, seed: Option<Seed>, correction_factor: T) -> Self {
		debug_assert!(!polys.is_empty());
		Self {
			polys,
			seed,
			correction_factor,
		}
	}

	/// The polynomial context all component polynomials share.
	pub fn context(&self) -> &Arc<PolyContext<T>> {
		self.polys[0].context()
	}

	/// The shared format of the component polynomials.
	pub fn format(&self) -> Format {
		self.polys[0].format()
	}

	/// Number of component polynomials (2, or 3 before relinearization).
	pub fn poly_count(&self) -> usize {
		self.polys.len()
	}

	/// The component polynomials.
	pub fn polys(&self) -> &[PolyRq<T>] {
		&self.polys
	}

	/// The PRG seed, present only while the ciphertext is fresh.
	pub fn seed(&self) -> Option<&Seed> {
		self.seed.as_ref()
	}

	/// The correction factor in `[1, t)`.
	pub fn correction_factor(&self) -> T {
		self.correction_factor
	}

	pub(crate) fn invalidate_seed(&mut self) {
		self.seed = None;
	}

	/// True when every polynomial past the first is zero. Such a
	/// ciphertext decrypts to a value deducible without the secret key.
	pub fn is_transparent(&self) -> bool {
		self.polys[1..].iter().all(PolyRq::is_zero)
	}
}
