//! RNS base conversion: approximate fast conversion, CRT composition, and
//! exact scaled divide-and-round between contexts.

use std::sync::Arc;

use num::{BigInt, BigUint, Integer, ToPrimitive};

use crate::error::{Error, Result};
use crate::rq::{Format, PolyContext, PolyRq};
use crate::zq::{MultiplyConstantModulus, Word};

/// Converts polynomials from one RNS base to another.
///
/// `convert_approximate` is word-arithmetic only and exact up to an
/// additive `a * Q_in` with `a < L_in`. The big-integer paths
/// (`crt_compose`, `scale`, `divide_and_round`) are exact and variable
/// time; they back decryption, multiplication scaling, and setup work.
#[derive(Debug)]
pub struct RnsBaseConverter<T: Word> {
	input: Arc<PolyContext<T>>,
	output: Arc<PolyContext<T>>,
	/// Per input channel: ((Q/q_i)^-1 mod q_i) in Shoup form.
	inv_punctured: Vec<MultiplyConstantModulus<T>>,
	/// Per output channel, per input channel: (Q/q_i) mod p_j.
	punctured_mod_output: Vec<Vec<T>>,
	/// Per input channel: Q/q_i.
	punctured: Vec<BigUint>,
}

impl<T: Word> RnsBaseConverter<T> {
	/// Builds a converter between two contexts of equal degree.
	pub fn new(input: &Arc<PolyContext<T>>, output: &Arc<PolyContext<T>>) -> Result<Self> {
		if input.degree() != output.degree() {
			return Err(Error::unsupported("base conversion requires equal degrees"));
		}
		let q = input.modulus();
		let mut inv_punctured = Vec::with_capacity(input.modulus_count());
		let mut punctured = Vec::with_capacity(input.modulus_count());
		for modulus in input.moduli() {
			let q_i = modulus.value().to_biguint();
			let punctured_i = q / &q_i;
			let residue = T::from_biguint(&(&punctured_i % &q_i));
			inv_punctured.push(MultiplyConstantModulus::new(
				modulus.inverse_mod(residue)?,
				modulus,
			));
			punctured.push(punctured_i);
		}
		let punctured_mod_output = output
			.moduli()
			.iter()
			.map(|p_j| {
				punctured
					.iter()
					.map(|punctured_i| {
						T::from_biguint(&(punctured_i % p_j.value().to_biguint()))
					})
					.collect()
			})
			.collect();
		Ok(Self {
			input: input.clone(),
			output: output.clone(),
			inv_punctured,
			punctured_mod_output,
			punctured,
		})
	}

	/// The input context.
	pub fn input_context(&self) -> &Arc<PolyContext<T>> {
		&self.input
	}

	/// The output context.
	pub fn output_context(&self) -> &Arc<PolyContext<T>> {
		&self.output
	}

	fn check_input(&self, poly: &PolyRq<T>) -> Result<()> {
		if poly.context() != &self.input {
			return Err(Error::unsupported("polynomial is not over the input base"));
		}
		if poly.format() != Format::Coeff {
			return Err(Error::unsupported("base conversion requires Coeff form"));
		}
		Ok(())
	}

	/// Fast approximate conversion into the output base.
	///
	/// For each coefficient with canonical lift `x`, the output represents
	/// `x + a * Q_in` for some `a < L_in`.
	pub fn convert_approximate(&self, poly: &PolyRq<T>) -> Result<PolyRq<T>> {
		self.check_input(poly)?;
		let degree = self.input.degree();
		let l_in = self.input.modulus_count();
		let mut out = PolyRq::zero(&self.output, Format::Coeff);

		// y_i = x_i * (Q/q_i)^-1 mod q_i, shared across output channels.
		let mut scaled = vec![T::ZERO; l_in * degree];
		for i in 0..l_in {
			let inv = &self.inv_punctured[i];
			for (slot, &x) in scaled[i * degree..(i + 1) * degree]
				.iter_mut()
				.zip(poly.row(i))
			{
				*slot = inv.multiply(x);
			}
		}
		for (j, p_j) in self.output.moduli().iter().enumerate() {
			let factors = &self.punctured_mod_output[j];
			let row = out.row_mut(j);
			for i in 0..l_in {
				let factor = MultiplyConstantModulus::new(factors[i], p_j);
				for (acc, &y) in row.iter_mut().zip(&scaled[i * degree..(i + 1) * degree]) {
					*acc = p_j.add_mod(*acc, factor.multiply(p_j.reduce(y)));
				}
			}
		}
		Ok(out)
	}

	/// Canonical lifts of every coefficient, in `[0, Q_in)`. Variable time.
	pub fn crt_compose(&self, poly: &PolyRq<T>) -> Result<Vec<BigUint>> {
		self.check_input(poly)?;
		let q = self.input.modulus();
		let degree = self.input.degree();
		let mut out = vec![BigUint::from(0u64); degree];
		for (i, inv) in self.inv_punctured.iter().enumerate() {
			let punctured_i = &self.punctured[i];
			for (acc, &x) in out.iter_mut().zip(poly.row(i)) {
				*acc += inv.multiply(x).to_biguint() * punctured_i;
			}
		}
		for acc in out.iter_mut() {
			*acc %= q;
		}
		Ok(out)
	}

	/// Exact scaled conversion: each centered coefficient `x` maps to
	/// `round(x * num / den)` reduced into the output base. Variable time.
	pub fn scale(&self, poly: &PolyRq<T>, num: &BigUint, den: &BigUint) -> Result<PolyRq<T>> {
		let composed = self.crt_compose(poly)?;
		let q_in = BigInt::from(self.input.modulus().clone());
		let half_in = &q_in / 2;
		let num = BigInt::from(num.clone());
		let den = BigInt::from(den.clone());
		let half_den = &den / 2;

		let mut out = PolyRq::zero(&self.output, Format::Coeff);
		let output_moduli: Vec<BigInt> = self
			.output
			.moduli()
			.iter()
			.map(|m| BigInt::from(m.value().to_u64()))
			.collect();
		for (j, x) in composed.into_iter().enumerate() {
			let mut x = BigInt::from(x);
			if x > half_in {
				x -= &q_in;
			}
			let numerator: BigInt = x * &num + &half_den;
			let scaled = numerator.div_floor(&den);
			for (i, p_j) in output_moduli.iter().enumerate() {
				let residue = scaled.mod_floor(p_j).to_u64().unwrap_or(0);
				out.row_mut(i)[j] = T::from_u64(residue);
			}
		}
		Ok(out)
	}

	/// Divide-and-round into the output base: the ring element scaled by
	/// `Q_out / Q_in`, rounded. Variable time.
	pub fn divide_and_round(&self, poly: &PolyRq<T>) -> Result<PolyRq<T>> {
		let num = self.output.modulus().clone();
		let den = self.input.modulus().clone();
		self.scale(poly, &num, &den)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use num::One;

	fn contexts() -> (Arc<PolyContext<u64>>, Arc<PolyContext<u64>>) {
		let input = PolyContext::new(&[0x1fff_ffff_ffff_d801, 0x3ffc_0001, 12289], 8).unwrap();
		let output = PolyContext::new(&[1153], 8).unwrap();
		(input, output)
	}

	fn poly_with_lift(ctx: &Arc<PolyContext<u64>>, value: &BigUint) -> PolyRq<u64> {
		let mut poly = PolyRq::zero(ctx, Format::Coeff);
		for (i, modulus) in ctx.moduli().iter().enumerate() {
			let residue = value % BigUint::from(modulus.value());
			poly.row_mut(i)[0] = residue.to_u64().unwrap();
		}
		poly
	}

	#[test]
	fn compose_recovers_lift() {
		let (input, output) = contexts();
		let converter = RnsBaseConverter::new(&input, &output).unwrap();
		let value = input.modulus() / 3u64 + BigUint::one();
		let poly = poly_with_lift(&input, &value);
		let composed = converter.crt_compose(&poly).unwrap();
		assert_eq!(composed[0], value);
		assert_eq!(composed[1], BigUint::from(0u64));
	}

	#[test]
	fn approximate_conversion_is_exact_up_to_a_q() {
		let (input, output) = contexts();
		let converter = RnsBaseConverter::new(&input, &output).unwrap();
		let t = 1153u64;
		let q_mod_t = (input.modulus() % t).to_u64().unwrap();
		for seed in [1u64, 97, 4242, 1 << 40] {
			let value = input.modulus() / 7u64 * seed % input.modulus();
			let poly = poly_with_lift(&input, &value);
			let out = converter.convert_approximate(&poly).unwrap();
			let got = out.row(0)[0];
			let base = (&value % t).to_u64().unwrap();
			let matches = (0..input.modulus_count() as u64)
				.any(|a| (base + a * q_mod_t) % t == got);
			assert!(matches, "output {got} not within a*Q of {base}");
		}
	}

	#[test]
	fn divide_and_round_scales() {
		let (input, output) = contexts();
		let converter = RnsBaseConverter::new(&input, &output).unwrap();
		// x = round(Q_in * k / t) composes back to k after scaling by t/Q_in.
		for k in [0u64, 1, 576, 1152] {
			let value = (input.modulus() * k + BigUint::from(576u64)) / 1153u64;
			let poly = poly_with_lift(&input, &value);
			let out = converter.divide_and_round(&poly).unwrap();
			assert_eq!(out.row(0)[0], k % 1153);
		}
	}
}
