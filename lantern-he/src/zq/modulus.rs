use crate::error::{Error, Result};
use crate::zq::prime::is_prime;
use crate::zq::Word;

/// A word-sized odd prime modulus with precomputed Barrett factors.
///
/// The factor `mu = floor(2^(2*BITS) / p)` is split into two words at
/// construction; `reduce` and `reduce_wide` never divide. The modulus is
/// restricted to at most `BITS - 2` significant bits so that the Barrett
/// remainder fits a single word before its correction subtractions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modulus<T: Word> {
	value: T,
	mu_hi: T,
	mu_lo: T,
}

impl<T: Word> Modulus<T> {
	/// Creates a modulus, validating primality and the size bound.
	pub fn new(value: T) -> Result<Self> {
		if value <= T::ONE || value.significant_bits() > T::BITS - 2 {
			return Err(Error::invalid_parameters(format!(
				"modulus {value} must be in (1, 2^{})",
				T::BITS - 2
			)));
		}
		if !is_prime(value.to_u64()) {
			return Err(Error::invalid_parameters(format!(
				"modulus {value} is not prime"
			)));
		}
		let mu = T::wide_div(T::wide_max(), value.widen());
		Ok(Self {
			value,
			mu_hi: T::wide_hi(mu),
			mu_lo: T::truncate(mu),
		})
	}

	/// The modulus value.
	pub fn value(&self) -> T {
		self.value
	}

	/// Significant bits of the modulus.
	pub fn significant_bits(&self) -> u32 {
		self.value.significant_bits()
	}

	/// Conditionally subtracts the modulus, branch-free.
	#[inline]
	fn csub(&self, x: T) -> T {
		let (diff, borrow) = x.overflowing_sub(self.value);
		let mask = T::ZERO.wrapping_sub(T::from_u64(borrow as u64));
		diff.wrapping_add(mask & self.value)
	}

	/// Reduces a single word into `[0, p)`.
	#[inline]
	pub fn reduce(&self, x: T) -> T {
		let q = T::wide_hi(x.wide_mul(self.mu_hi));
		let r = x.wrapping_sub(q.wrapping_mul(self.value));
		self.csub(r)
	}

	/// Reduces a double-width value into `[0, p)`.
	#[inline]
	pub fn reduce_wide(&self, x: T::Wide) -> T {
		let x_lo = T::truncate(x);
		let x_hi = T::wide_hi(x);
		// q_hat = floor(x * mu / 2^(2*BITS)), off by at most 2.
		let carry = T::wide_hi(x_lo.wide_mul(self.mu_lo));
		let (mid, c1) = T::wide_overflowing_add(x_lo.wide_mul(self.mu_hi), x_hi.wide_mul(self.mu_lo));
		let (mid, c2) = T::wide_overflowing_add(mid, carry.widen());
		let carries = T::wide_shl(T::from_u64(c1 as u64 + c2 as u64).widen(), T::BITS);
		let q_hat = T::wide_wrapping_add(
			x_hi.wide_mul(self.mu_hi),
			T::wide_wrapping_add(T::wide_shr(mid, T::BITS), carries),
		);
		let r = x_lo.wrapping_sub(T::truncate(q_hat).wrapping_mul(self.value));
		self.csub(self.csub(r))
	}

	/// `x * y mod p` for full-range words.
	#[inline]
	pub fn reduce_product(&self, x: T, y: T) -> T {
		self.reduce_wide(x.wide_mul(y))
	}

	/// `x * y mod p`; alias of `reduce_product` on canonical inputs.
	#[inline]
	pub fn multiply_mod(&self, x: T, y: T) -> T {
		self.reduce_wide(x.wide_mul(y))
	}

	/// `floor(x / p)` for a double-width dividend. Variable time; setup
	/// paths only.
	pub fn divide_floor(&self, x: T::Wide) -> T::Wide {
		let r = self.reduce_wide(x);
		T::wide_div(T::wide_sub(x, r.widen()), self.value.widen())
	}

	/// `x + y mod p` on canonical inputs.
	#[inline]
	pub fn add_mod(&self, x: T, y: T) -> T {
		self.csub(x.wrapping_add(y))
	}

	/// `x - y mod p` on canonical inputs.
	#[inline]
	pub fn sub_mod(&self, x: T, y: T) -> T {
		self.csub(x.wrapping_add(self.value).wrapping_sub(y))
	}

	/// `-x mod p` on a canonical input.
	#[inline]
	pub fn neg_mod(&self, x: T) -> T {
		self.csub(self.value.wrapping_sub(x))
	}

	/// `x^exponent mod p`. Variable time in the exponent; setup paths only.
	pub fn pow_mod(&self, x: T, exponent: u64) -> T {
		let mut base = self.reduce(x);
		let mut exp = exponent;
		let mut acc = T::ONE;
		while exp > 0 {
			if exp & 1 == 1 {
				acc = self.multiply_mod(acc, base);
			}
			base = self.multiply_mod(base, base);
			exp >>= 1;
		}
		acc
	}

	/// `x^-1 mod p` by the extended Euclidean algorithm. Variable time;
	/// setup paths only.
	pub fn inverse_mod(&self, x: T) -> Result<T> {
		let p = self.value.to_u64() as i128;
		let a = self.reduce(x).to_u64() as i128;
		let (mut r0, mut r1) = (p, a);
		let (mut s0, mut s1) = (0i128, 1i128);
		while r1 != 0 {
			let q = r0 / r1;
			(r0, r1) = (r1, r0 - q * r1);
			(s0, s1) = (s1, s0 - q * s1);
		}
		if r0 != 1 {
			return Err(Error::NotInvertible {
				value: x.to_u64(),
				modulus: self.value.to_u64(),
			});
		}
		Ok(T::from_u64(s0.rem_euclid(p) as u64))
	}

	/// Maps a canonical remainder into the centered range
	/// `[-floor(p/2), floor((p-1)/2)]`.
	pub fn to_centered(&self, x: T) -> i64 {
		let p = self.value.to_u64();
		let v = x.to_u64();
		if v > (p - 1) / 2 {
			v as i64 - p as i64
		} else {
			v as i64
		}
	}

	/// Inverse of `to_centered`; the two maps form a bijection.
	pub fn from_centered(&self, value: i64) -> T {
		let p = self.value.to_u64() as i64;
		T::from_u64(value.rem_euclid(p) as u64)
	}
}

/// Shoup-style multiplication by a fixed constant modulo a fixed prime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplyConstantModulus<T: Word> {
	constant: T,
	quotient: T,
	modulus: T,
}

impl<T: Word> MultiplyConstantModulus<T> {
	/// Precomputes `floor(constant * 2^BITS / p)` for a canonical constant.
	pub fn new(constant: T, modulus: &Modulus<T>) -> Self {
		let p = modulus.value();
		debug_assert!(constant < p);
		Self {
			constant,
			quotient: T::truncate(T::wide_div(T::wide_shl(constant.widen(), T::BITS), p.widen())),
			modulus: p,
		}
	}

	/// The fixed constant.
	pub fn constant(&self) -> T {
		self.constant
	}

	/// `x * constant mod p`.
	#[inline]
	pub fn multiply(&self, x: T) -> T {
		let q = T::wide_hi(x.wide_mul(self.quotient));
		let r = self
			.constant
			.wrapping_mul(x)
			.wrapping_sub(q.wrapping_mul(self.modulus));
		let (diff, borrow) = r.overflowing_sub(self.modulus);
		let mask = T::ZERO.wrapping_sub(T::from_u64(borrow as u64));
		diff.wrapping_add(mask & self.modulus)
	}
}

/// Selects `a` where `mask` is all-ones and `b` where it is zero.
#[inline]
pub fn ct_select<T: Word>(mask: T, a: T, b: T) -> T {
	(mask & a) | (!mask & b)
}

/// All-ones mask when `x < y`, zero otherwise.
#[inline]
pub fn ct_lt<T: Word>(x: T, y: T) -> T {
	let (_, borrow) = x.overflowing_sub(y);
	T::ZERO.wrapping_sub(T::from_u64(borrow as u64))
}

/// All-ones mask when `x <= y`, zero otherwise.
#[inline]
pub fn ct_le<T: Word>(x: T, y: T) -> T {
	!ct_lt(y, x)
}

/// All-ones mask when `x == y`, zero otherwise.
#[inline]
pub fn ct_eq<T: Word>(x: T, y: T) -> T {
	let z = x ^ y;
	let nonzero = (z | T::ZERO.wrapping_sub(z)) >> (T::BITS - 1);
	!T::ZERO.wrapping_sub(nonzero)
}

/// All-ones mask when the most significant bit of `x` is set.
#[inline]
pub fn ct_msb<T: Word>(x: T) -> T {
	T::ZERO.wrapping_sub(x >> (T::BITS - 1))
}
