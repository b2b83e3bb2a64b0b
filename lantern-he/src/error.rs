use static_assertions::const_assert;

/// A type representing all errors that can occur in the HE layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// The encryption parameters fail validation.
	#[error("invalid encryption parameters: {0}")]
	InvalidEncryptionParameters(Box<str>),

	/// The encryption parameters are valid but violate the requested
	/// security level.
	#[error("parameters violate the requested security level: {0}")]
	InsecureEncryptionParameters(Box<str>),

	/// An encoding input lies outside the legal range.
	#[error("encoding input out of bounds for [{low}, {high})")]
	EncodingOutOfBounds {
		/// Inclusive lower bound of the legal range.
		low: i64,
		/// Exclusive upper bound of the legal range.
		high: i64,
	},

	/// The requested encoding is not defined for these parameters.
	#[error("unsupported encoding: {0}")]
	UnsupportedEncoding(Box<str>),

	/// The operation is not defined for the given format or scheme state.
	#[error("unsupported operation: {0}")]
	UnsupportedHeOperation(Box<str>),

	/// Operands differ on coefficient vs. evaluation format.
	#[error("operands differ in polynomial format")]
	FormatMismatch,

	/// An inverse was requested for a non-coprime element.
	#[error("{value} is not invertible modulo {modulus}")]
	NotInvertible {
		/// The element whose inverse was requested.
		value: u64,
		/// The modulus.
		modulus: u64,
	},

	/// The prime-generation search space is exhausted.
	#[error("not enough {bits}-bit primes congruent to 1 mod {congruence}")]
	NotEnoughPrimes {
		/// Requested significant bit count.
		bits: usize,
		/// The congruence class the primes must satisfy (2 * degree, or 2).
		congruence: usize,
	},

	/// The evaluation key lacks a required Galois element.
	#[error("evaluation key is missing Galois element {0}")]
	MissingGaloisElement(usize),

	/// Continuing would corrupt decryption.
	#[error("insufficient noise budget")]
	InsufficientNoiseBudget,

	/// (De)serialization of an HE object failed.
	#[error("serialization failed: {0}")]
	SerializationError(Box<str>),
}

const_assert!(std::mem::size_of::<Error>() <= 24);

impl Error {
	pub(crate) fn invalid_parameters(msg: impl Into<String>) -> Self {
		Self::InvalidEncryptionParameters(msg.into().into_boxed_str())
	}

	pub(crate) fn insecure_parameters(msg: impl Into<String>) -> Self {
		Self::InsecureEncryptionParameters(msg.into().into_boxed_str())
	}

	pub(crate) fn unsupported_encoding(msg: impl Into<String>) -> Self {
		Self::UnsupportedEncoding(msg.into().into_boxed_str())
	}

	pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
		Self::UnsupportedHeOperation(msg.into().into_boxed_str())
	}

	pub(crate) fn serialization(msg: impl Into<String>) -> Self {
		Self::SerializationError(msg.into().into_boxed_str())
	}
}

/// The result type for HE operations.
pub type Result<T> = std::result::Result<T, Error>;
