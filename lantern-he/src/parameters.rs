//! Encryption parameters: construction, validation, and factories.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::zq::{generate_primes, is_prime, Word};

/// Security standards a parameter set can be validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityLevel {
	/// No security validation; test and toy parameters.
	Unchecked,
	/// 128-bit post-quantum security per the homomorphic encryption
	/// standard's logQ tables.
	Quantum128,
}

/// Supported error distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorStdDev {
	/// Standard deviation 3.2, realized as a centered binomial with
	/// variance 10.
	StdDev32,
}

/// Maximum total coefficient-modulus bits for `Quantum128`, keyed by degree.
const QUANTUM128_LOG_Q: [(usize, usize); 6] = [
	(1024, 27),
	(2048, 54),
	(4096, 109),
	(8192, 218),
	(16384, 438),
	(32768, 881),
];

/// Factory for NTT-friendly coefficient modulus chains.
pub struct CoefficientModulus;

impl CoefficientModulus {
	/// Generates distinct primes with the given bit sizes, each congruent
	/// to 1 mod 2*degree.
	pub fn generate<T: Word>(degree: usize, bit_sizes: &[usize]) -> Result<Vec<T>> {
		generate_primes(bit_sizes, false, Some(degree))
	}
}

/// Factory for plaintext moduli.
pub struct PlainModulus;

impl PlainModulus {
	/// The smallest `bits`-bit prime congruent to 1 mod 2*degree, enabling
	/// SIMD batching.
	pub fn batching<T: Word>(degree: usize, bits: usize) -> Result<T> {
		Ok(generate_primes(&[bits], true, Some(degree))?[0])
	}
}

/// An immutable, validated set of BFV encryption parameters.
///
/// Use [`BfvEncryptionParametersBuilder`] to construct one; validation
/// happens once, before any expensive precomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionParameters<T: Word> {
	poly_degree: usize,
	plain_modulus: T,
	coefficient_moduli: Vec<T>,
	error_std_dev: ErrorStdDev,
	security_level: SecurityLevel,
}

impl<T: Word> EncryptionParameters<T> {
	/// The polynomial degree N.
	pub fn poly_degree(&self) -> usize {
		self.poly_degree
	}

	/// The plaintext modulus t.
	pub fn plain_modulus(&self) -> T {
		self.plain_modulus
	}

	/// The ordered coefficient moduli.
	pub fn coefficient_moduli(&self) -> &[T] {
		&self.coefficient_moduli
	}

	/// The error distribution.
	pub fn error_std_dev(&self) -> ErrorStdDev {
		self.error_std_dev
	}

	/// The validated security level.
	pub fn security_level(&self) -> SecurityLevel {
		self.security_level
	}
}

/// Builder for [`EncryptionParameters`].
#[derive(Debug, Clone, Default)]
pub struct BfvEncryptionParametersBuilder<T: Word> {
	poly_degree: Option<usize>,
	plain_modulus: Option<T>,
	coefficient_moduli: Option<Vec<T>>,
	error_std_dev: Option<ErrorStdDev>,
	security_level: Option<SecurityLevel>,
}

impl<T: Word> BfvEncryptionParametersBuilder<T> {
	/// An empty builder.
	pub fn new() -> Self {
		Self {
			poly_degree: None,
			plain_modulus: None,
			coefficient_moduli: None,
			error_std_dev: None,
			security_level: None,
		}
	}

	/// Sets the polynomial degree (a power of two, at least 8).
	pub fn set_poly_degree(mut self, degree: usize) -> Self {
		self.poly_degree = Some(degree);
		self
	}

	/// Sets the plaintext modulus.
	pub fn set_plain_modulus(mut self, modulus: T) -> Self {
		self.plain_modulus = Some(modulus);
		self
	}

	/// Sets the coefficient modulus chain.
	pub fn set_coefficient_moduli(mut self, moduli: Vec<T>) -> Self {
		self.coefficient_moduli = Some(moduli);
		self
	}

	/// Sets the error distribution; defaults to `StdDev32`.
	pub fn set_error_std_dev(mut self, std_dev: ErrorStdDev) -> Self {
		self.error_std_dev = Some(std_dev);
		self
	}

	/// Sets the security level; defaults to `Quantum128`.
	pub fn set_security_level(mut self, level: SecurityLevel) -> Self {
		self.security_level = Some(level);
		self
	}

	/// Validates and builds the parameter set.
	pub fn build(self) -> Result<EncryptionParameters<T>> {
		let poly_degree = self
			.poly_degree
			.ok_or_else(|| Error::invalid_parameters("polynomial degree not set"))?;
		if !poly_degree.is_power_of_two() || poly_degree < 8 {
			return Err(Error::invalid_parameters(format!(
				"polynomial degree {poly_degree} must be a power of two >= 8"
			)));
		}
		let plain_modulus = self
			.plain_modulus
			.ok_or_else(|| Error::invalid_parameters("plaintext modulus not set"))?;
		if !is_prime(plain_modulus.to_u64()) {
			return Err(Error::invalid_parameters(format!(
				"plaintext modulus {plain_modulus} must be prime"
			)));
		}
		let coefficient_moduli = self
			.coefficient_moduli
			.ok_or_else(|| Error::invalid_parameters("coefficient moduli not set"))?;
		if coefficient_moduli.is_empty() {
			return Err(Error::invalid_parameters("coefficient moduli are empty"));
		}
		let two_n = 2 * poly_degree as u64;
		for (i, q) in coefficient_moduli.iter().enumerate() {
			if q.significant_bits() > T::BITS - 2 || !is_prime(q.to_u64()) {
				return Err(Error::invalid_parameters(format!(
					"coefficient modulus {q} must be a prime below 2^{}",
					T::BITS - 2
				)));
			}
			if (q.to_u64() - 1) % two_n != 0 {
				return Err(Error::invalid_parameters(format!(
					"coefficient modulus {q} is not 1 mod {two_n}"
				)));
			}
			if coefficient_moduli[..i].contains(q) {
				return Err(Error::invalid_parameters(format!("duplicate modulus {q}")));
			}
			if plain_modulus >= *q {
				return Err(Error::invalid_parameters(format!(
					"plaintext modulus {plain_modulus} must be below every coefficient modulus"
				)));
			}
		}
		let security_level = self.security_level.unwrap_or(SecurityLevel::Quantum128);
		if security_level == SecurityLevel::Quantum128 {
			let total_bits: usize = coefficient_moduli
				.iter()
				.map(|q| q.significant_bits() as usize)
				.sum();
			let bound = QUANTUM128_LOG_Q
				.iter()
				.find(|(degree, _)| *degree == poly_degree)
				.map(|(_, bits)| *bits)
				.ok_or_else(|| {
					Error::insecure_parameters(format!(
						"degree {poly_degree} below the smallest standardized degree"
					))
				})?;
			if total_bits > bound {
				return Err(Error::insecure_parameters(format!(
					"logQ = {total_bits} exceeds the {bound}-bit bound for degree {poly_degree}"
				)));
			}
		}
		Ok(EncryptionParameters {
			poly_degree,
			plain_modulus,
			coefficient_moduli,
			error_std_dev: self.error_std_dev.unwrap_or(ErrorStdDev::StdDev32),
			security_level,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_unchecked_toy_parameters() {
		let params = BfvEncryptionParametersBuilder::<u64>::new()
			.set_poly_degree(8)
			.set_plain_modulus(17)
			.set_coefficient_moduli(CoefficientModulus::generate(8, &[30, 30]).unwrap())
			.set_security_level(SecurityLevel::Unchecked)
			.build()
			.unwrap();
		assert_eq!(params.poly_degree(), 8);
		assert_eq!(params.coefficient_moduli().len(), 2);
	}

	#[test]
	fn rejects_missing_and_invalid_fields() {
		assert!(matches!(
			BfvEncryptionParametersBuilder::<u64>::new().build(),
			Err(Error::InvalidEncryptionParameters(_))
		));
		let err = BfvEncryptionParametersBuilder::<u64>::new()
			.set_poly_degree(24)
			.set_plain_modulus(17)
			.set_coefficient_moduli(vec![12289])
			.build()
			.unwrap_err();
		assert!(matches!(err, Error::InvalidEncryptionParameters(_)));
	}

	#[test]
	fn rejects_plain_modulus_at_least_coefficient_modulus() {
		let err = BfvEncryptionParametersBuilder::<u64>::new()
			.set_poly_degree(8)
			.set_plain_modulus(12289)
			.set_coefficient_moduli(vec![12289])
			.set_security_level(SecurityLevel::Unchecked)
			.build()
			.unwrap_err();
		assert!(matches!(err, Error::InvalidEncryptionParameters(_)));
	}

	#[test]
	fn quantum128_rejects_oversized_modulus() {
		let moduli = CoefficientModulus::generate::<u64>(1024, &[30]).unwrap();
		let err = BfvEncryptionParametersBuilder::new()
			.set_poly_degree(1024)
			.set_plain_modulus(PlainModulus::batching(1024, 14).unwrap())
			.set_coefficient_moduli(moduli)
			.set_security_level(SecurityLevel::Quantum128)
			.build()
			.unwrap_err();
		assert!(matches!(err, Error::InsecureEncryptionParameters(_)));
	}

	#[test]
	fn quantum128_accepts_standard_set() {
		let moduli = CoefficientModulus::generate::<u64>(4096, &[36, 36, 36]).unwrap();
		let params = BfvEncryptionParametersBuilder::new()
			.set_poly_degree(4096)
			.set_plain_modulus(PlainModulus::batching(4096, 17).unwrap())
			.set_coefficient_moduli(moduli)
			.build()
			.unwrap();
		assert_eq!(params.security_level(), SecurityLevel::Quantum128);
	}

	#[test]
	fn batching_modulus_is_congruent() {
		let t: u64 = PlainModulus::batching(1024, 14).unwrap();
		assert_eq!((t - 1) % 2048, 0);
	}
}
