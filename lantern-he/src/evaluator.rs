//! Homomorphic operations on BFV ciphertexts.

use std::sync::Arc;

use crate::ciphertext::Ciphertext;
use crate::context::BfvContext;
use crate::error::{Error, Result};
use crate::galois::{apply_automorphism, column_rotation_element, row_swap_element};
use crate::keys::{EvaluationKey, KeySwitchKey};
use crate::plaintext::{EvalPlaintext, Plaintext};
use crate::rq::{Format, PolyRq};
use crate::zq::Word;

/// Evaluates homomorphic operations.
///
/// All operations are single-threaded and either return a fresh ciphertext
/// or mutate their target only after the full result is computed; a failed
/// operation leaves its inputs untouched. The `*_async` variants are
/// cooperative-scheduling wrappers with identical semantics — they insert
/// a suspension point at the operation boundary and never spawn threads.
pub struct BfvEvaluator<T: Word> {
	context: Arc<BfvContext<T>>,
}

impl<T: Word> BfvEvaluator<T> {
	/// Creates an evaluator over the given context.
	pub fn new(context: &Arc<BfvContext<T>>) -> Self {
		Self {
			context: context.clone(),
		}
	}

	/// The evaluator's context.
	pub fn context(&self) -> &Arc<BfvContext<T>> {
		&self.context
	}

	fn check_binary(&self, a: &Ciphertext<T>, b: &Ciphertext<T>) -> Result<()> {
		if a.context() != b.context() {
			return Err(Error::unsupported("ciphertexts are at different levels"));
		}
		if a.correction_factor() != b.correction_factor() {
			return Err(Error::unsupported(
				"ciphertexts carry different correction factors",
			));
		}
		Ok(())
	}

	/// Rhs polynomial `index`, converted to `format` if needed; zero
	/// when the rhs is shorter than the lhs.
	fn rhs_poly(b: &Ciphertext<T>, index: usize, format: Format) -> Result<PolyRq<T>> {
		match b.polys.get(index) {
			Some(poly) => match format {
				Format::Eval => poly.to_eval(),
				Format::Coeff => poly.to_coeff(),
			},
			None => Ok(PolyRq::zero(b.context(), format)),
		}
	}

	/// `a + b`.
	pub fn add(&self, a: &Ciphertext<T>, b: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		let mut out = a.clone();
		self.add_assign(&mut out, b)?;
		Ok(out)
	}

	/// `a += b`.
	pub fn add_assign(&self, a: &mut Ciphertext<T>, b: &Ciphertext<T>) -> Result<()> {
		self.check_binary(a, b)?;
		let format = a.format();
		let mut polys = a.polys.clone();
		while polys.len() < b.poly_count() {
			polys.push(PolyRq::zero(a.context(), format));
		}
		for (i, poly) in polys.iter_mut().enumerate() {
			poly.add_assign(&Self::rhs_poly(b, i, format)?)?;
		}
		a.polys = polys;
		a.invalidate_seed();
		Ok(())
	}

	/// Sums a non-empty slice of ciphertexts.
	pub fn add_many(&self, ciphertexts: &[Ciphertext<T>]) -> Result<Ciphertext<T>> {
		let (first, rest) = ciphertexts
			.split_first()
			.ok_or_else(|| Error::unsupported("cannot sum zero ciphertexts"))?;
		let mut acc = first.clone();
		for ct in rest {
			self.add_assign(&mut acc, ct)?;
		}
		Ok(acc)
	}

	/// `a - b`.
	pub fn sub(&self, a: &Ciphertext<T>, b: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		let mut out = a.clone();
		self.sub_assign(&mut out, b)?;
		Ok(out)
	}

	/// `a -= b`.
	pub fn sub_assign(&self, a: &mut Ciphertext<T>, b: &Ciphertext<T>) -> Result<()> {
		self.check_binary(a, b)?;
		let format = a.format();
		let mut polys = a.polys.clone();
		while polys.len() < b.poly_count() {
			polys.push(PolyRq::zero(a.context(), format));
		}
		for (i, poly) in polys.iter_mut().enumerate() {
			poly.sub_assign(&Self::rhs_poly(b, i, format)?)?;
		}
		a.polys = polys;
		a.invalidate_seed();
		Ok(())
	}

	/// `-a`.
	pub fn negate(&self, a: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		let mut out = a.clone();
		self.negate_assign(&mut out);
		Ok(out)
	}

	/// `a = -a`.
	pub fn negate_assign(&self, a: &mut Ciphertext<T>) {
		for poly in a.polys.iter_mut() {
			poly.neg_assign();
		}
		a.invalidate_seed();
	}

	/// The plaintext scaled by delta and the ciphertext's correction
	/// factor, lifted to the ciphertext's level and format.
	fn scaled_plain(&self, ct: &Ciphertext<T>, plaintext: &Plaintext<T>) -> Result<PolyRq<T>> {
		let level = self.context.level_of(ct.context())?;
		let t = self.context.plain_modulus();
		let factor = ct.correction_factor();
		let level_context = self.context.context_at(level)?;
		let mut lifted = PolyRq::zero(level_context, Format::Coeff);
		let coeffs = plaintext.poly.row(0);
		for i in 0..level_context.modulus_count() {
			for (slot, &m) in lifted.row_mut(i).iter_mut().zip(coeffs) {
				*slot = t.multiply_mod(m, factor);
			}
		}
		lifted.multiply_by_residues(self.context.delta_residues(level))?;
		match ct.format() {
			Format::Eval => lifted.convert_to_eval()?,
			Format::Coeff => {}
		}
		Ok(lifted)
	}

	/// `a + pt`.
	pub fn add_plain(&self, a: &Ciphertext<T>, plaintext: &Plaintext<T>) -> Result<Ciphertext<T>> {
		let scaled = self.scaled_plain(a, plaintext)?;
		let mut out = a.clone();
		out.polys[0].add_assign(&scaled)?;
		out.invalidate_seed();
		Ok(out)
	}

	/// `a - pt`.
	pub fn sub_plain(&self, a: &Ciphertext<T>, plaintext: &Plaintext<T>) -> Result<Ciphertext<T>> {
		let scaled = self.scaled_plain(a, plaintext)?;
		let mut out = a.clone();
		out.polys[0].sub_assign(&scaled)?;
		out.invalidate_seed();
		Ok(out)
	}

	/// `pt - a`.
	pub fn plain_sub(&self, plaintext: &Plaintext<T>, a: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		let negated = self.negate(a)?;
		self.add_plain(&negated, plaintext)
	}

	/// `a * pt` for an Eval-form ciphertext and lifted plaintext.
	pub fn multiply_plain(
		&self,
		a: &Ciphertext<T>,
		plaintext: &EvalPlaintext<T>,
	) -> Result<Ciphertext<T>> {
		if a.format() != Format::Eval {
			return Err(Error::unsupported(
				"plaintext multiplication requires an Eval-form ciphertext",
			));
		}
		let level = self.context.level_of(a.context())?;
		if level != plaintext.level() {
			return Err(Error::unsupported("plaintext lifted to a different level"));
		}
		let mut out = a.clone();
		for poly in out.polys.iter_mut() {
			poly.mul_assign(&plaintext.poly)?;
		}
		out.invalidate_seed();
		Ok(out)
	}

	/// `a * b`: the three-polynomial tensor product, scaled by `t/Q`.
	///
	/// Correction factors multiply modulo `t`. Relinearize to get back to
	/// two polynomials.
	pub fn multiply(&self, a: &Ciphertext<T>, b: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		if a.context() != b.context() {
			return Err(Error::unsupported("ciphertexts are at different levels"));
		}
		if a.poly_count() != 2 || b.poly_count() != 2 {
			return Err(Error::unsupported(
				"multiplication needs two-polynomial ciphertexts",
			));
		}
		let level = self.context.level_of(a.context())?;
		let aux = self.context.mul_aux(level);
		let level_context = self.context.context_at(level)?;
		let level_count = level_context.modulus_count();
		let one = num::BigUint::from(1u64);

		// The tensor base needs the exact centered lift; the fast
		// approximate conversion's +aQ slack would survive recomposition.
		let extend = |poly: &PolyRq<T>| -> Result<PolyRq<T>> {
			let coeff = poly.to_coeff()?;
			let extension = aux.up.scale(&coeff, &one, &one)?;
			let mut out = PolyRq::zero(&aux.tensor_context, Format::Coeff);
			for i in 0..level_count {
				out.row_mut(i).copy_from_slice(coeff.row(i));
			}
			for j in 0..extension.context().modulus_count() {
				out.row_mut(level_count + j).copy_from_slice(extension.row(j));
			}
			out.convert_to_eval()?;
			Ok(out)
		};

		let a0 = extend(&a.polys[0])?;
		let a1 = extend(&a.polys[1])?;
		let b0 = extend(&b.polys[0])?;
		let b1 = extend(&b.polys[1])?;

		let mut c0 = a0.clone();
		c0.mul_assign(&b0)?;
		let mut c1 = a0;
		c1.mul_assign(&b1)?;
		let mut cross = a1.clone();
		cross.mul_assign(&b0)?;
		c1.add_assign(&cross)?;
		let mut c2 = a1;
		c2.mul_assign(&b1)?;

		let t = self.context.plain_modulus().value().to_biguint();
		let q = level_context.modulus().clone();
		let scale_down = |mut poly: PolyRq<T>| -> Result<PolyRq<T>> {
			poly.convert_to_coeff()?;
			let mut scaled = aux.down.scale(&poly, &t, &q)?;
			scaled.convert_to_eval()?;
			Ok(scaled)
		};

		let polys = vec![scale_down(c0)?, scale_down(c1)?, scale_down(c2)?];
		let factor = self
			.context
			.plain_modulus()
			.multiply_mod(a.correction_factor(), b.correction_factor());
		Ok(Ciphertext::new(polys, None, factor))
	}

	/// Reduces a three-polynomial ciphertext back to two using the
	/// relinearization key. Level 0 only.
	pub fn relinearize(&self, a: &Ciphertext<T>, keys: &EvaluationKey<T>) -> Result<Ciphertext<T>> {
		if a.poly_count() != 3 {
			return Err(Error::unsupported("relinearization expects three polynomials"));
		}
		let c2 = a.polys[2].to_coeff()?;
		let (u0, u1) = keys.relin_key()?.key_switch(&c2)?;
		let mut c0 = a.polys[0].to_eval()?;
		c0.add_assign(&u0)?;
		let mut c1 = a.polys[1].to_eval()?;
		c1.add_assign(&u1)?;
		Ok(Ciphertext::new(vec![c0, c1], None, a.correction_factor()))
	}

	/// Applies a ciphertext-to-ciphertext key switch: the result decrypts
	/// under the key the switching key targets.
	pub fn apply_key_switch(
		&self,
		a: &Ciphertext<T>,
		key: &KeySwitchKey<T>,
	) -> Result<Ciphertext<T>> {
		if a.poly_count() != 2 {
			return Err(Error::unsupported("key switching expects two polynomials"));
		}
		let c1 = a.polys[1].to_coeff()?;
		let (u0, u1) = key.key_switch(&c1)?;
		let mut c0 = a.polys[0].to_eval()?;
		c0.add_assign(&u0)?;
		Ok(Ciphertext::new(vec![c0, u1], None, a.correction_factor()))
	}

	/// Applies the Galois automorphism `X -> X^g` and key-switches back
	/// under the original secret. Preserves the input format. Level 0 only.
	pub fn apply_galois(
		&self,
		a: &Ciphertext<T>,
		g: usize,
		keys: &EvaluationKey<T>,
	) -> Result<Ciphertext<T>> {
		if a.poly_count() != 2 {
			return Err(Error::unsupported("automorphisms expect two polynomials"));
		}
		let format = a.format();
		let key = keys.galois_key(g)?;
		let c0_permuted = apply_automorphism(&a.polys[0].to_coeff()?, g)?;
		let c1_permuted = apply_automorphism(&a.polys[1].to_coeff()?, g)?;
		let (u0, u1) = key.key_switch(&c1_permuted)?;
		let mut c0 = c0_permuted;
		c0.convert_to_eval()?;
		c0.add_assign(&u0)?;
		let mut c1 = u1;
		if format == Format::Coeff {
			c0.convert_to_coeff()?;
			c1.convert_to_coeff()?;
		}
		Ok(Ciphertext::new(vec![c0, c1], None, a.correction_factor()))
	}

	/// Rotates SIMD columns by `steps`, falling back to a multi-step
	/// power-of-two walk when the direct element's key is absent.
	pub fn rotate_columns(
		&self,
		a: &Ciphertext<T>,
		steps: isize,
		keys: &EvaluationKey<T>,
	) -> Result<Ciphertext<T>> {
		let degree = self.context.degree();
		let order = (degree / 2) as isize;
		let steps = steps.rem_euclid(order);
		if steps == 0 {
			return Ok(a.clone());
		}
		let direct = column_rotation_element(degree, steps);
		if keys.supports_galois_element(direct) {
			return self.apply_galois(a, direct, keys);
		}
		// Logarithmic fallback over power-of-two rotations.
		let mut out = a.clone();
		let mut remaining = steps as usize;
		let mut bit = 0usize;
		while remaining > 0 {
			if remaining & 1 == 1 {
				let g = column_rotation_element(degree, (1isize) << bit);
				out = self.apply_galois(&out, g, keys)?;
			}
			remaining >>= 1;
			bit += 1;
		}
		Ok(out)
	}

	/// Swaps the two SIMD rows.
	pub fn swap_rows(&self, a: &Ciphertext<T>, keys: &EvaluationKey<T>) -> Result<Ciphertext<T>> {
		self.apply_galois(a, row_swap_element(self.context.degree()), keys)
	}

	/// Switches the ciphertext down one level, dropping the last RNS
	/// channel. Fails with `InsufficientNoiseBudget` when the chain is
	/// exhausted.
	pub fn mod_switch_down(&self, a: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		let level = self.context.level_of(a.context())?;
		if level + 1 >= self.context.level_count() {
			return Err(Error::InsufficientNoiseBudget);
		}
		let next = self.context.context_at(level + 1)?;
		let format = a.format();
		let mut polys = Vec::with_capacity(a.poly_count());
		for poly in &a.polys {
			let mut switched = poly.to_coeff()?.divide_and_round_q_last(next)?;
			if format == Format::Eval {
				switched.convert_to_eval()?;
			}
			polys.push(switched);
		}
		Ok(Ciphertext::new(polys, None, a.correction_factor()))
	}

	/// Switches down until a single RNS channel remains.
	pub fn mod_switch_down_to_single(&self, a: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		let mut out = a.clone();
		while out.context().modulus_count() > 1 {
			out = self.mod_switch_down(&out)?;
		}
		Ok(out)
	}

	/// The ciphertext with every polynomial in Coeff form.
	pub fn to_coeff_format(&self, a: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		let polys = a.polys.iter().map(|p| p.to_coeff()).collect::<Result<_>>()?;
		Ok(Ciphertext::new(polys, a.seed().copied(), a.correction_factor()))
	}

	/// The ciphertext with every polynomial in Eval form.
	pub fn to_eval_format(&self, a: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		let polys = a.polys.iter().map(|p| p.to_eval()).collect::<Result<_>>()?;
		Ok(Ciphertext::new(polys, a.seed().copied(), a.correction_factor()))
	}

	/// Cooperative-scheduling variant of [`BfvEvaluator::add`].
	pub async fn add_async(&self, a: &Ciphertext<T>, b: &Ciphertext<T>) -> Result<Ciphertext<T>> {
		self.add(a, b)
	}

	/// Cooperative-scheduling variant of [`BfvEvaluator::multiply`].
	pub async fn multiply_async(
		&self,
		a: &Ciphertext<T>,
		b: &Ciphertext<T>,
	) -> Result<Ciphertext<T>> {
		self.multiply(a, b)
	}

	/// Cooperative-scheduling variant of [`BfvEvaluator::relinearize`].
	pub async fn relinearize_async(
		&self,
		a: &Ciphertext<T>,
		keys: &EvaluationKey<T>,
	) -> Result<Ciphertext<T>> {
		self.relinearize(a, keys)
	}

	/// Cooperative-scheduling variant of [`BfvEvaluator::apply_galois`].
	pub async fn apply_galois_async(
		&self,
		a: &Ciphertext<T>,
		g: usize,
		keys: &EvaluationKey<T>,
	) -> Result<Ciphertext<T>> {
		self.apply_galois(a, g, keys)
	}
}
