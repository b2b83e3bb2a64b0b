//! Decryption, noise measurement, and transmission-side bit skipping.

use std::sync::Arc;

use num::BigUint;

use crate::ciphertext::Ciphertext;
use crate::context::BfvContext;
use crate::error::{Error, Result};
use crate::keys::SecretKey;
use crate::plaintext::Plaintext;
use crate::rq::{Format, PolyRq};
use crate::zq::Word;

/// The noise budget (in bits) below which decryption is no longer
/// guaranteed.
pub const MIN_NOISE_BUDGET: i64 = 1;

/// Decrypts ciphertexts under a secret key.
pub struct Decryptor<T: Word> {
	context: Arc<BfvContext<T>>,
	secret_key: Arc<SecretKey<T>>,
}

impl<T: Word> Decryptor<T> {
	/// Creates a decryptor from a context and secret key.
	pub fn new(context: &Arc<BfvContext<T>>, secret_key: &Arc<SecretKey<T>>) -> Self {
		Self {
			context: context.clone(),
			secret_key: secret_key.clone(),
		}
	}

	/// `c0 + c1*s + c2*s^2 + ...` in Coeff form over the ciphertext level.
	fn dot_with_secret(&self, ciphertext: &Ciphertext<T>) -> Result<PolyRq<T>> {
		let level_context = ciphertext.context();
		let mut secret = self.secret_key.restrict(level_context)?;
		let mut acc = ciphertext.polys[0].to_eval()?;
		let mut power = secret.clone();
		for (i, poly) in ciphertext.polys.iter().enumerate().skip(1) {
			if i > 1 {
				power.mul_assign(&secret)?;
			}
			let mut term = poly.to_eval()?;
			term.mul_assign(&power)?;
			acc.add_assign(&term)?;
			term.zeroize_in_place();
		}
		power.zeroize_in_place();
		secret.zeroize_in_place();
		acc.convert_to_coeff()?;
		Ok(acc)
	}

	/// Decrypts a ciphertext: `round(t * x / Q) mod t`, then the inverse
	/// correction factor.
	pub fn decrypt(&self, ciphertext: &Ciphertext<T>) -> Result<Plaintext<T>> {
		let level = self.context.level_of(ciphertext.context())?;
		let x = self.dot_with_secret(ciphertext)?;
		let t = self.context.plain_modulus();
		let converter = self.context.plain_converter(level);
		let num = t.value().to_biguint();
		let den = ciphertext.context().modulus().clone();
		let mut message = converter.scale(&x, &num, &den)?;

		let factor = ciphertext.correction_factor();
		if factor != T::ONE {
			let inverse = t.inverse_mod(factor)?;
			for value in message.row_mut(0) {
				*value = t.multiply_mod(*value, inverse);
			}
		}
		Ok(Plaintext { poly: message })
	}

	/// The noise budget in bits: the bit-length headroom between the
	/// residual error and `delta / 2`. Non-positive once decryption is at
	/// risk; decreases by about one bit per ciphertext addition.
	pub fn noise_budget(&self, ciphertext: &Ciphertext<T>) -> Result<i64> {
		let level = self.context.level_of(ciphertext.context())?;
		let x = self.dot_with_secret(ciphertext)?;
		let converter = self.context.plain_converter(level);
		let composed = converter.crt_compose(&x)?;

		// Re-derive the scaled message delta * m_hat and subtract it.
		let t = self.context.plain_modulus().value().to_biguint();
		let q = ciphertext.context().modulus();
		let half_q = q / 2u64;
		let delta = self.context.delta_big(level);
		let mut max_noise = BigUint::from(0u64);
		for value in composed {
			let m_hat = (&value * &t + &half_q) / q; // round(t*x/Q)
			let expected = delta * (m_hat % &t);
			let mut noise = if value >= expected {
				&value - &expected
			} else {
				&expected - &value
			};
			// Center modulo Q.
			if noise > half_q {
				noise = q - noise;
			}
			if noise > max_noise {
				max_noise = noise;
			}
		}
		let headroom = (delta / 2u64).bits() as i64;
		Ok(headroom - max_noise.bits() as i64)
	}

	/// Largest per-channel LSB counts that can be zeroed from each
	/// polynomial while keeping this ciphertext decryptable, given its
	/// actual noise. Meaningful for a Coeff-form ciphertext over a single
	/// modulus (zeroed Eval residues would be amplified by the secret's
	/// full-range NTT values); otherwise all zeros.
	pub fn skip_lsbs_for_decryption(&self, ciphertext: &Ciphertext<T>) -> Result<Vec<Vec<u32>>> {
		let channels = ciphertext.context().modulus_count();
		let polys = ciphertext.poly_count();
		if channels != 1 || ciphertext.format() != Format::Coeff {
			return Ok(vec![vec![0; channels]; polys]);
		}
		let budget = self.noise_budget(ciphertext)?;
		if budget < MIN_NOISE_BUDGET {
			return Err(Error::InsufficientNoiseBudget);
		}
		let log_n = ciphertext.context().degree().ilog2();
		// Zeroing l bits of c0 adds error < 2^l; of c1, < 2^l * N.
		let c0_skip = (budget - 2).max(0) as u32;
		let c1_skip = c0_skip.saturating_sub(log_n + 1);
		let mut out = vec![vec![c0_skip; 1]];
		for _ in 1..polys {
			out.push(vec![c1_skip; 1]);
		}
		Ok(out)
	}
}
