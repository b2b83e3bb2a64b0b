//! Polynomials over `Z_Q[X]/(X^N + 1)` in residue-number-system form.

use std::sync::Arc;

use itertools::izip;
use num::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::zq::{Modulus, MultiplyConstantModulus, Word};

pub mod convert;
pub(crate) mod ntt;

use ntt::NttTables;

/// Whether polynomial entries are coefficients or NTT evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
	/// Entry `[i][j]` is the `j`-th coefficient modulo the `i`-th prime.
	Coeff,
	/// Entry `[i][j]` is the evaluation at the `j`-th (bit-reversed)
	/// odd power of the 2N-th root modulo the `i`-th prime.
	Eval,
}

/// Row-major two-dimensional storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array2d<T> {
	data: Vec<T>,
	rows: usize,
	cols: usize,
}

impl<T: Word> Array2d<T> {
	/// A zero-filled array.
	pub fn zero(rows: usize, cols: usize) -> Self {
		Self {
			data: vec![T::ZERO; rows * cols],
			rows,
			cols,
		}
	}

	/// Row `i` as a slice.
	#[inline]
	pub fn row(&self, i: usize) -> &[T] {
		debug_assert!(i < self.rows);
		&self.data[i * self.cols..(i + 1) * self.cols]
	}

	/// Row `i` as a mutable slice.
	#[inline]
	pub fn row_mut(&mut self, i: usize) -> &mut [T] {
		debug_assert!(i < self.rows);
		&mut self.data[i * self.cols..(i + 1) * self.cols]
	}

	/// Entry at row `i`, column `j`.
	#[inline]
	pub fn get(&self, i: usize, j: usize) -> T {
		self.data[i * self.cols + j]
	}

	/// Overwrites the entry at row `i`, column `j`.
	#[inline]
	pub fn set(&mut self, i: usize, j: usize, value: T) {
		self.data[i * self.cols + j] = value;
	}

	/// Overwrites the whole buffer with zeros; the write is not elided.
	pub fn zeroize_in_place(&mut self) {
		for elem in self.data.iter_mut() {
			elem.zeroize();
		}
	}
}

/// Ordered moduli, degree, and per-prime NTT tables shared by polynomials.
///
/// Contexts are built once and shared through `Arc`; two contexts compare
/// equal iff their moduli sequences and degree are identical. NTT tables
/// are only present when every modulus is congruent to 1 mod 2N.
#[derive(Debug)]
pub struct PolyContext<T: Word> {
	moduli: Vec<Modulus<T>>,
	degree: usize,
	ntt: Option<Vec<NttTables<T>>>,
	modulus: BigUint,
	total_bits: usize,
}

impl<T: Word> PartialEq for PolyContext<T> {
	fn eq(&self, other: &Self) -> bool {
		self.degree == other.degree
			&& self.moduli.len() == other.moduli.len()
			&& izip!(&self.moduli, &other.moduli).all(|(a, b)| a.value() == b.value())
	}
}

impl<T: Word> Eq for PolyContext<T> {}

impl<T: Word> PolyContext<T> {
	/// Builds a context over the given moduli and degree.
	pub fn new(moduli: &[T], degree: usize) -> Result<Arc<Self>> {
		if moduli.is_empty() {
			return Err(Error::invalid_parameters("at least one modulus is required"));
		}
		if !degree.is_power_of_two() || degree < 2 {
			return Err(Error::invalid_parameters(format!(
				"degree {degree} is not a power of two >= 2"
			)));
		}
		let moduli: Vec<Modulus<T>> = moduli.iter().map(|&q| Modulus::new(q)).collect::<Result<_>>()?;
		for (i, a) in moduli.iter().enumerate() {
			if moduli[..i].iter().any(|b| b.value() == a.value()) {
				return Err(Error::invalid_parameters(format!(
					"duplicate modulus {}",
					a.value()
				)));
			}
		}
		let ntt_friendly = moduli
			.iter()
			.all(|m| (m.value().to_u64() - 1) % (2 * degree as u64) == 0);
		let ntt = if ntt_friendly {
			Some(
				moduli
					.iter()
					.map(|m| NttTables::new(degree, m))
					.collect::<Result<Vec<_>>>()?,
			)
		} else {
			None
		};
		let modulus = moduli
			.iter()
			.fold(BigUint::from(1u64), |acc, m| acc * m.value().to_biguint());
		let total_bits = moduli.iter().map(|m| m.significant_bits() as usize).sum();
		Ok(Arc::new(Self {
			moduli,
			degree,
			ntt,
			modulus,
			total_bits,
		}))
	}

	/// The polynomial degree N.
	pub fn degree(&self) -> usize {
		self.degree
	}

	/// The ordered moduli.
	pub fn moduli(&self) -> &[Modulus<T>] {
		&self.moduli
	}

	/// Number of RNS channels.
	pub fn modulus_count(&self) -> usize {
		self.moduli.len()
	}

	/// The composed modulus `Q` as a big integer. Setup paths only.
	pub fn modulus(&self) -> &BigUint {
		&self.modulus
	}

	/// Total significant bits across the moduli.
	pub fn total_bits(&self) -> usize {
		self.total_bits
	}

	/// Whether forward/inverse NTTs are available.
	pub fn supports_ntt(&self) -> bool {
		self.ntt.is_some()
	}

	pub(crate) fn ntt_tables(&self) -> Result<&[NttTables<T>]> {
		self.ntt
			.as_deref()
			.ok_or_else(|| Error::unsupported("context moduli do not support the NTT"))
	}

	/// Whether `self` equals `parent` with its last modulus removed.
	pub fn is_parent_truncation(&self, parent: &PolyContext<T>) -> bool {
		self.degree == parent.degree
			&& self.moduli.len() + 1 == parent.moduli.len()
			&& izip!(&self.moduli, &parent.moduli).all(|(a, b)| a.value() == b.value())
	}
}

/// An element of `Z_Q[X]/(X^N + 1)` stored as an `[L][N]` residue array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyRq<T: Word> {
	context: Arc<PolyContext<T>>,
	format: Format,
	data: Array2d<T>,
}

impl<T: Word> PolyRq<T> {
	/// The zero polynomial.
	pub fn zero(context: &Arc<PolyContext<T>>, format: Format) -> Self {
		Self {
			context: context.clone(),
			format,
			data: Array2d::zero(context.modulus_count(), context.degree()),
		}
	}

	/// A polynomial with uniformly random residues.
	pub fn random_uniform<R: RngCore + CryptoRng>(
		context: &Arc<PolyContext<T>>,
		format: Format,
		rng: &mut R,
	) -> Self {
		let mut poly = Self::zero(context, format);
		for (row, modulus) in izip!(0..context.modulus_count(), context.moduli()) {
			let q = modulus.value().to_u64();
			let mask = u64::MAX >> (q.leading_zeros());
			for value in poly.data.row_mut(row) {
				*value = loop {
					let candidate = rng.next_u64() & mask;
					if candidate < q {
						break T::from_u64(candidate);
					}
				};
			}
		}
		poly
	}

	/// The polynomial's context.
	pub fn context(&self) -> &Arc<PolyContext<T>> {
		&self.context
	}

	/// The current format tag.
	pub fn format(&self) -> Format {
		self.format
	}

	/// Residues of channel `i`.
	#[inline]
	pub(crate) fn row(&self, i: usize) -> &[T] {
		self.data.row(i)
	}

	#[inline]
	pub(crate) fn row_mut(&mut self, i: usize) -> &mut [T] {
		self.data.row_mut(i)
	}

	pub(crate) fn zeroize_in_place(&mut self) {
		self.data.zeroize_in_place();
	}

	/// True when every residue is zero.
	pub fn is_zero(&self) -> bool {
		self.data.data.iter().all(|&v| v == T::ZERO)
	}

	/// The L-vector of RNS residues at coefficient index `j`.
	pub fn coefficient(&self, j: usize) -> Vec<T> {
		(0..self.context.modulus_count())
			.map(|i| self.data.get(i, j))
			.collect()
	}

	fn check_compatible(&self, rhs: &Self) -> Result<()> {
		if self.context != rhs.context {
			return Err(Error::unsupported("operands use different poly contexts"));
		}
		if self.format != rhs.format {
			return Err(Error::FormatMismatch);
		}
		Ok(())
	}

	/// Entrywise addition of an equal-format operand.
	pub fn add_assign(&mut self, rhs: &Self) -> Result<()> {
		self.check_compatible(rhs)?;
		let context = self.context.clone();
		for (i, modulus) in context.moduli().iter().enumerate() {
			for (a, b) in izip!(self.data.row_mut(i), rhs.data.row(i)) {
				*a = modulus.add_mod(*a, *b);
			}
		}
		Ok(())
	}

	/// Entrywise subtraction of an equal-format operand.
	pub fn sub_assign(&mut self, rhs: &Self) -> Result<()> {
		self.check_compatible(rhs)?;
		let context = self.context.clone();
		for (i, modulus) in context.moduli().iter().enumerate() {
			for (a, b) in izip!(self.data.row_mut(i), rhs.data.row(i)) {
				*a = modulus.sub_mod(*a, *b);
			}
		}
		Ok(())
	}

	/// Entrywise negation.
	pub fn neg_assign(&mut self) {
		let context = self.context.clone();
		for (i, modulus) in context.moduli().iter().enumerate() {
			for a in self.data.row_mut(i) {
				*a = modulus.neg_mod(*a);
			}
		}
	}

	/// Entrywise (ring) multiplication; both operands must be in Eval form.
	pub fn mul_assign(&mut self, rhs: &Self) -> Result<()> {
		self.check_compatible(rhs)?;
		if self.format != Format::Eval {
			return Err(Error::unsupported(
				"ring multiplication requires Eval form",
			));
		}
		let context = self.context.clone();
		for (i, modulus) in context.moduli().iter().enumerate() {
			for (a, b) in izip!(self.data.row_mut(i), rhs.data.row(i)) {
				*a = modulus.multiply_mod(*a, *b);
			}
		}
		Ok(())
	}

	/// Multiplies each RNS channel by its residue of a constant.
	pub fn multiply_by_residues(&mut self, residues: &[T]) -> Result<()> {
		if residues.len() != self.context.modulus_count() {
			return Err(Error::unsupported("one residue per RNS channel required"));
		}
		let context = self.context.clone();
		for (i, modulus) in context.moduli().iter().enumerate() {
			let scale = MultiplyConstantModulus::new(modulus.reduce(residues[i]), modulus);
			for a in self.data.row_mut(i) {
				*a = scale.multiply(*a);
			}
		}
		Ok(())
	}

	/// Removes the last RNS channel, dividing and rounding by its modulus.
	///
	/// The result lives over `next`, which must equal this context with the
	/// last modulus dropped, and represents the same ring element scaled by
	/// `1/q_last`, rounded. Coeff form only.
	pub fn divide_and_round_q_last(&self, next: &Arc<PolyContext<T>>) -> Result<PolyRq<T>> {
		if self.format != Format::Coeff {
			return Err(Error::unsupported("divide-and-round requires Coeff form"));
		}
		if !next.is_parent_truncation(&self.context) {
			return Err(Error::unsupported(
				"target context is not this context minus its last modulus",
			));
		}
		let last_index = self.context.modulus_count() - 1;
		let q_last = &self.context.moduli()[last_index];
		let half = q_last.value() >> 1;

		let mut out = PolyRq::zero(next, Format::Coeff);
		for (i, modulus) in next.moduli().iter().enumerate() {
			let inv_q_last =
				MultiplyConstantModulus::new(modulus.inverse_mod(modulus.reduce(q_last.value()))?, modulus);
			let half_mod = modulus.reduce(half);
			for (j, value) in out.data.row_mut(i).iter_mut().enumerate() {
				// Center the last residue so truncation becomes rounding.
				let adjusted = q_last.add_mod(self.data.get(last_index, j), half);
				let r = modulus.sub_mod(modulus.reduce(adjusted), half_mod);
				let diff = modulus.sub_mod(self.data.get(i, j), r);
				*value = inv_q_last.multiply(diff);
			}
		}
		Ok(out)
	}

	/// Multiplies by `X^-k` (a negacyclic left shift by `k`). Coeff only.
	pub fn multiply_inverse_power_of_x(&mut self, k: usize) -> Result<()> {
		if self.format != Format::Coeff {
			return Err(Error::unsupported("coefficient shifts require Coeff form"));
		}
		let n = self.context.degree();
		let k = k % (2 * n);
		let mut out = Array2d::zero(self.context.modulus_count(), n);
		for (i, modulus) in self.context.moduli().iter().enumerate() {
			for j in 0..n {
				let e = (j + 2 * n - k) % (2 * n);
				let value = self.data.get(i, j);
				if e < n {
					out.set(i, e, value);
				} else {
					out.set(i, e - n, modulus.neg_mod(value));
				}
			}
		}
		self.data = out;
		Ok(())
	}

	fn transform(&mut self, forward: bool) -> Result<()> {
		let context = self.context.clone();
		let tables = context.ntt_tables()?;
		for (i, (modulus, table)) in izip!(context.moduli(), tables).enumerate() {
			if forward {
				ntt::forward_ntt(self.data.row_mut(i), modulus, table);
			} else {
				ntt::inverse_ntt(self.data.row_mut(i), modulus, table);
			}
		}
		Ok(())
	}

	/// Returns this polynomial in Eval form; a no-op copy if already there.
	pub fn to_eval(&self) -> Result<PolyRq<T>> {
		let mut out = self.clone();
		out.convert_to_eval()?;
		Ok(out)
	}

	/// Returns this polynomial in Coeff form; a no-op copy if already there.
	pub fn to_coeff(&self) -> Result<PolyRq<T>> {
		let mut out = self.clone();
		out.convert_to_coeff()?;
		Ok(out)
	}

	/// In-place conversion to Eval form.
	pub fn convert_to_eval(&mut self) -> Result<()> {
		if self.format == Format::Coeff {
			self.transform(true)?;
			self.format = Format::Eval;
		}
		Ok(())
	}

	/// In-place conversion to Coeff form.
	pub fn convert_to_coeff(&mut self) -> Result<()> {
		if self.format == Format::Eval {
			self.transform(false)?;
			self.format = Format::Coeff;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	fn context() -> Arc<PolyContext<u64>> {
		PolyContext::new(&[0x1fff_ffff_ffff_d801, 12289], 8).unwrap()
	}

	#[test]
	fn context_equality_is_structural() {
		let a = PolyContext::<u64>::new(&[97, 12289], 4).unwrap();
		let b = PolyContext::<u64>::new(&[97, 12289], 4).unwrap();
		let c = PolyContext::<u64>::new(&[12289, 97], 4).unwrap();
		assert_eq!(*a, *b);
		assert_ne!(*a, *c);
	}

	#[test]
	fn ntt_roundtrip_all_channels() {
		let ctx = context();
		let mut rng = StdRng::from_seed([7u8; 32]);
		let poly = PolyRq::random_uniform(&ctx, Format::Coeff, &mut rng);
		let roundtrip = poly.to_eval().unwrap().to_coeff().unwrap();
		assert_eq!(poly, roundtrip);
	}

	#[test]
	fn eval_multiplication_is_negacyclic_convolution() {
		let ctx = PolyContext::<u64>::new(&[97], 4).unwrap();
		// (1 + X) * X^3 = X^3 + X^4 = -1 + X^3.
		let mut a = PolyRq::zero(&ctx, Format::Coeff);
		a.row_mut(0)[0] = 1;
		a.row_mut(0)[1] = 1;
		let mut b = PolyRq::zero(&ctx, Format::Coeff);
		b.row_mut(0)[3] = 1;
		let mut a_eval = a.to_eval().unwrap();
		a_eval.mul_assign(&b.to_eval().unwrap()).unwrap();
		let product = a_eval.to_coeff().unwrap();
		assert_eq!(product.row(0), &[96, 0, 0, 1]);
	}

	#[test]
	fn mixed_format_operands_are_rejected() {
		let ctx = context();
		let coeff = PolyRq::zero(&ctx, Format::Coeff);
		let mut eval = PolyRq::zero(&ctx, Format::Eval);
		assert_eq!(eval.add_assign(&coeff), Err(Error::FormatMismatch));
		let mut coeff2 = coeff.clone();
		assert!(coeff2.mul_assign(&coeff).is_err());
	}

	#[test]
	fn add_sub_roundtrip() {
		let ctx = context();
		let mut rng = StdRng::from_seed([3u8; 32]);
		let a = PolyRq::random_uniform(&ctx, Format::Coeff, &mut rng);
		let b = PolyRq::random_uniform(&ctx, Format::Coeff, &mut rng);
		let mut c = a.clone();
		c.add_assign(&b).unwrap();
		c.sub_assign(&b).unwrap();
		assert_eq!(a, c);
		let mut d = a.clone();
		d.neg_assign();
		d.neg_assign();
		assert_eq!(a, d);
	}

	#[test]
	fn inverse_power_of_x_shifts_with_sign() {
		let ctx = PolyContext::<u64>::new(&[97], 4).unwrap();
		// a = X: a * X^-1 = 1; 1 * X^-1 = -X^3.
		let mut a = PolyRq::zero(&ctx, Format::Coeff);
		a.row_mut(0)[1] = 1;
		a.multiply_inverse_power_of_x(1).unwrap();
		assert_eq!(a.row(0), &[1, 0, 0, 0]);
		a.multiply_inverse_power_of_x(1).unwrap();
		assert_eq!(a.row(0), &[0, 0, 0, 96]);
	}

	#[test]
	fn divide_and_round_drops_last_channel() {
		let full = PolyContext::<u64>::new(&[0x1fff_ffff_ffff_d801, 12289], 8).unwrap();
		let next = PolyContext::<u64>::new(&[0x1fff_ffff_ffff_d801], 8).unwrap();
		// Value v encoded in both channels; result should be round(v / 12289).
		let v: u64 = 5 * 12289 + 7000; // rounds up to 6
		let mut poly = PolyRq::zero(&full, Format::Coeff);
		poly.row_mut(0)[0] = v;
		poly.row_mut(1)[0] = v % 12289;
		let out = poly.divide_and_round_q_last(&next).unwrap();
		assert_eq!(out.row(0)[0], 6);
		assert_eq!(out.context().modulus_count(), 1);
	}

	#[test]
	fn zeroize_clears_only_the_target_buffer() {
		let ctx = context();
		let mut rng = StdRng::from_seed([9u8; 32]);
		let mut secret = PolyRq::random_uniform(&ctx, Format::Coeff, &mut rng);
		let bystander = PolyRq::random_uniform(&ctx, Format::Coeff, &mut rng);
		let bystander_copy = bystander.clone();
		assert!(!secret.is_zero());
		secret.zeroize_in_place();
		for i in 0..ctx.modulus_count() {
			assert!(secret.row(i).iter().all(|&v| v == 0));
		}
		// Adjacent allocations are untouched.
		assert_eq!(bystander, bystander_copy);
	}

	#[test]
	fn coefficient_returns_residue_vector() {
		let ctx = context();
		let mut poly = PolyRq::zero(&ctx, Format::Coeff);
		poly.row_mut(0)[3] = 42;
		poly.row_mut(1)[3] = 17;
		assert_eq!(poly.coefficient(3), vec![42, 17]);
	}
}
