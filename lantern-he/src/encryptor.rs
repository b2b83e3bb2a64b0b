//! Symmetric encryption of plaintexts.

use std::sync::Arc;

use rand::{CryptoRng, RngCore};

use crate::ciphertext::Ciphertext;
use crate::context::BfvContext;
use crate::error::Result;
use crate::keys::SecretKey;
use crate::plaintext::Plaintext;
use crate::rq::{Format, PolyRq};
use crate::sampler::{random_seed, sample_centered_binomial, sample_uniform_seeded};
use crate::zq::Word;

/// Encrypts plaintexts under a secret key.
///
/// Fresh ciphertexts are seeded: `c1` is expanded from a 32-byte PRG seed,
/// so transmitting the first polynomial plus the seed suffices until the
/// first homomorphic operation.
pub struct Encryptor<T: Word> {
	context: Arc<BfvContext<T>>,
	secret_key: Arc<SecretKey<T>>,
}

impl<T: Word> Encryptor<T> {
	/// Creates an encryptor from a context and secret key.
	pub fn new(context: &Arc<BfvContext<T>>, secret_key: &Arc<SecretKey<T>>) -> Self {
		Self {
			context: context.clone(),
			secret_key: secret_key.clone(),
		}
	}

	/// Encrypts a plaintext at level 0.
	///
	/// `c1 = a` drawn uniformly from the seed, `c0 = -(a*s + e) + delta*m`
	/// with `e` centered binomial. Both polynomials are in Eval form.
	pub fn encrypt<R: RngCore + CryptoRng>(
		&self,
		plaintext: &Plaintext<T>,
		rng: &mut R,
	) -> Result<Ciphertext<T>> {
		let top = self.context.context_at(0)?;
		let seed = random_seed(rng);
		let a = sample_uniform_seeded(top, Format::Eval, &seed);

		let mut e = sample_centered_binomial(top, rng);
		e.convert_to_eval()?;

		// c0 = -(a*s + e) + delta * m
		let mut c0 = a.clone();
		c0.mul_assign(&self.secret_key.poly)?;
		c0.add_assign(&e)?;
		c0.neg_assign();
		e.zeroize_in_place();

		let mut message = PolyRq::zero(top, Format::Coeff);
		let coeffs = plaintext.poly.row(0);
		for i in 0..top.modulus_count() {
			message.row_mut(i).copy_from_slice(coeffs);
		}
		message.multiply_by_residues(self.context.delta_residues(0))?;
		message.convert_to_eval()?;
		c0.add_assign(&message)?;

		Ok(Ciphertext::new(vec![c0, a], Some(seed), T::ONE))
	}
}
