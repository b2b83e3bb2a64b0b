/// A type representing all errors that can occur in the PIR layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	/// A cuckoo table could not hold its input without growing past its
	/// fixed size.
	#[error("cuckoo table cannot hold the input at {bucket_count} buckets")]
	ExpansionExceeded {
		/// The bucket count at which insertion failed.
		bucket_count: usize,
	},

	/// A cuckoo build kept failing after the maximum number of
	/// expansions.
	#[error("cuckoo eviction limit exceeded after {expansions} expansions")]
	EvictionExceeded {
		/// How many times the table was grown before giving up.
		expansions: usize,
	},

	/// The PIR configuration or input sizes are invalid.
	#[error("invalid PIR configuration: {0}")]
	InvalidPirAlgorithm(Box<str>),

	/// A hash bucket entry value exceeds the 16-bit size limit.
	#[error("hash bucket value of {0} bytes exceeds the 16-bit limit")]
	InvalidHashBucketEntryValueSize(usize),

	/// A varint ended before its final byte.
	#[error("varint truncated")]
	VarIntTruncated,

	/// A varint encodes a value outside 64 bits.
	#[error("varint overflows 64 bits")]
	VarIntOverflow,

	/// An error from the HE layer.
	#[error(transparent)]
	He(#[from] lantern_he::Error),
}

impl Error {
	pub(crate) fn invalid(msg: impl Into<String>) -> Self {
		Self::InvalidPirAlgorithm(msg.into().into_boxed_str())
	}
}

/// The result type for PIR operations.
pub type Result<T> = std::result::Result<T, Error>;
