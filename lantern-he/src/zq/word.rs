use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::ops::{BitAnd, BitOr, BitXor, Not, Shl, Shr};

use num::BigUint;
use zeroize::Zeroize;

/// Capability set for the unsigned word types the arithmetic layer is
/// parameterized over.
///
/// The associated `Wide` type is the double-width unsigned integer used by
/// Barrett and Shoup reductions; `u32` pairs with `u64` and `u64` pairs
/// with `u128`. Wrapping semantics are spelled out explicitly so callers
/// never rely on debug-build overflow behavior.
pub trait Word:
	Copy
	+ Clone
	+ Debug
	+ Display
	+ Default
	+ Eq
	+ Ord
	+ Hash
	+ Send
	+ Sync
	+ Zeroize
	+ BitAnd<Output = Self>
	+ BitOr<Output = Self>
	+ BitXor<Output = Self>
	+ Not<Output = Self>
	+ Shl<u32, Output = Self>
	+ Shr<u32, Output = Self>
	+ 'static
{
	/// The unsigned type with twice the bit width.
	type Wide: Copy + Clone + Debug + Eq + Ord + Send + Sync;

	/// Bit width of the word.
	const BITS: u32;
	/// The additive identity.
	const ZERO: Self;
	/// The multiplicative identity.
	const ONE: Self;
	/// All bits set.
	const MAX: Self;

	/// Truncating conversion from `u64`.
	fn from_u64(value: u64) -> Self;
	/// Widening conversion to `u64`.
	fn to_u64(self) -> u64;

	/// Wrapping addition.
	fn wrapping_add(self, rhs: Self) -> Self;
	/// Wrapping subtraction.
	fn wrapping_sub(self, rhs: Self) -> Self;
	/// Wrapping multiplication.
	fn wrapping_mul(self, rhs: Self) -> Self;
	/// Subtraction reporting the borrow.
	fn overflowing_sub(self, rhs: Self) -> (Self, bool);
	/// Number of leading zero bits.
	fn leading_zeros(self) -> u32;

	/// Zero-extends into the double-width type.
	fn widen(self) -> Self::Wide;
	/// Truncates a double-width value to its low word.
	fn truncate(wide: Self::Wide) -> Self;
	/// High word of a double-width value.
	fn wide_hi(wide: Self::Wide) -> Self;
	/// Full-width product of two words.
	fn wide_mul(self, rhs: Self) -> Self::Wide;
	/// Wrapping double-width addition.
	fn wide_wrapping_add(a: Self::Wide, b: Self::Wide) -> Self::Wide;
	/// Double-width addition reporting the carry.
	fn wide_overflowing_add(a: Self::Wide, b: Self::Wide) -> (Self::Wide, bool);
	/// Double-width subtraction (callers guarantee no borrow).
	fn wide_sub(a: Self::Wide, b: Self::Wide) -> Self::Wide;
	/// Double-width left shift.
	fn wide_shl(a: Self::Wide, shift: u32) -> Self::Wide;
	/// Double-width logical right shift.
	fn wide_shr(a: Self::Wide, shift: u32) -> Self::Wide;
	/// Double-width division.
	fn wide_div(a: Self::Wide, b: Self::Wide) -> Self::Wide;
	/// The all-ones double-width value.
	fn wide_max() -> Self::Wide;

	/// Significant bit count of `self` (0 for zero).
	fn significant_bits(self) -> u32 {
		Self::BITS - self.leading_zeros()
	}

	/// Conversion into an arbitrary-precision integer. Setup paths only.
	fn to_biguint(self) -> BigUint {
		BigUint::from(self.to_u64())
	}

	/// Truncating conversion from an arbitrary-precision integer; callers
	/// guarantee the value fits the word.
	fn from_biguint(value: &BigUint) -> Self {
		Self::from_u64(value.to_u64_digits().first().copied().unwrap_or(0))
	}
}

impl Word for u32 {
	type Wide = u64;

	const BITS: u32 = 32;
	const ZERO: Self = 0;
	const ONE: Self = 1;
	const MAX: Self = u32::MAX;

	fn from_u64(value: u64) -> Self {
		value as u32
	}

	fn to_u64(self) -> u64 {
		self as u64
	}

	fn wrapping_add(self, rhs: Self) -> Self {
		self.wrapping_add(rhs)
	}

	fn wrapping_sub(self, rhs: Self) -> Self {
		self.wrapping_sub(rhs)
	}

	fn wrapping_mul(self, rhs: Self) -> Self {
		self.wrapping_mul(rhs)
	}

	fn overflowing_sub(self, rhs: Self) -> (Self, bool) {
		self.overflowing_sub(rhs)
	}

	fn leading_zeros(self) -> u32 {
		self.leading_zeros()
	}

	fn widen(self) -> u64 {
		self as u64
	}

	fn truncate(wide: u64) -> Self {
		wide as u32
	}

	fn wide_hi(wide: u64) -> Self {
		(wide >> 32) as u32
	}

	fn wide_mul(self, rhs: Self) -> u64 {
		self as u64 * rhs as u64
	}

	fn wide_wrapping_add(a: u64, b: u64) -> u64 {
		a.wrapping_add(b)
	}

	fn wide_overflowing_add(a: u64, b: u64) -> (u64, bool) {
		a.overflowing_add(b)
	}

	fn wide_sub(a: u64, b: u64) -> u64 {
		a - b
	}

	fn wide_shl(a: u64, shift: u32) -> u64 {
		a << shift
	}

	fn wide_shr(a: u64, shift: u32) -> u64 {
		a >> shift
	}

	fn wide_div(a: u64, b: u64) -> u64 {
		a / b
	}

	fn wide_max() -> u64 {
		u64::MAX
	}
}

impl Word for u64 {
	type Wide = u128;

	const BITS: u32 = 64;
	const ZERO: Self = 0;
	const ONE: Self = 1;
	const MAX: Self = u64::MAX;

	fn from_u64(value: u64) -> Self {
		value
	}

	fn to_u64(self) -> u64 {
		self
	}

	fn wrapping_add(self, rhs: Self) -> Self {
		self.wrapping_add(rhs)
	}

	fn wrapping_sub(self, rhs: Self) -> Self {
		self.wrapping_sub(rhs)
	}

	fn wrapping_mul(self, rhs: Self) -> Self {
		self.wrapping_mul(rhs)
	}

	fn overflowing_sub(self, rhs: Self) -> (Self, bool) {
		self.overflowing_sub(rhs)
	}

	fn leading_zeros(self) -> u32 {
		self.leading_zeros()
	}

	fn widen(self) -> u128 {
		self as u128
	}

	fn truncate(wide: u128) -> Self {
		wide as u64
	}

	fn wide_hi(wide: u128) -> Self {
		(wide >> 64) as u64
	}

	fn wide_mul(self, rhs: Self) -> u128 {
		self as u128 * rhs as u128
	}

	fn wide_wrapping_add(a: u128, b: u128) -> u128 {
		a.wrapping_add(b)
	}

	fn wide_overflowing_add(a: u128, b: u128) -> (u128, bool) {
		a.overflowing_add(b)
	}

	fn wide_sub(a: u128, b: u128) -> u128 {
		a - b
	}

	fn wide_shl(a: u128, shift: u32) -> u128 {
		a << shift
	}

	fn wide_shr(a: u128, shift: u32) -> u128 {
		a >> shift
	}

	fn wide_div(a: u128, b: u128) -> u128 {
		a / b
	}

	fn wide_max() -> u128 {
		u128::MAX
	}
}
