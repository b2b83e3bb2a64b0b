//! Wire primitives shared with other protocol implementations: unsigned
//! varints and the hash-bucket layout. Both are bit-exact protocol
//! surfaces.

use crate::error::{Error, Result};

/// Maximum value size a hash-bucket slot may carry.
pub const MAX_BUCKET_VALUE_SIZE: usize = u16::MAX as usize;

/// Appends the Protocol-Buffers-compatible unsigned varint encoding of
/// `value`: little-endian 7-bit groups, high bit as continuation.
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
	loop {
		let byte = (value & 0x7f) as u8;
		value >>= 7;
		if value == 0 {
			out.push(byte);
			return;
		}
		out.push(byte | 0x80);
	}
}

/// Decodes a varint from the front of `bytes`, returning the value and
/// the number of bytes consumed.
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
	let mut value = 0u64;
	for (i, &byte) in bytes.iter().enumerate().take(10) {
		value |= u64::from(byte & 0x7f) << (7 * i);
		if byte & 0x80 == 0 {
			// The 10th byte may only contribute the low bit of the value.
			if i == 9 && byte > 1 {
				return Err(Error::VarIntOverflow);
			}
			return Ok((value, i + 1));
		}
	}
	if bytes.len() >= 10 {
		Err(Error::VarIntOverflow)
	} else {
		Err(Error::VarIntTruncated)
	}
}

/// One stored (keyword hash, value) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashBucketEntry {
	/// Truncated SHA-256 of the keyword.
	pub keyword_hash: u64,
	/// The stored value.
	pub value: Vec<u8>,
}

/// A bucket of slots as it travels on the wire.
///
/// Layout: for each slot, `varint(keyword_hash) || varint(value_size) ||
/// value bytes`. Zero padding of any length after the last slot ends the
/// bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashBucket {
	/// The occupied slots.
	pub entries: Vec<HashBucketEntry>,
}

impl HashBucket {
	/// Serialized byte size of the bucket.
	pub fn serialized_size(&self) -> usize {
		self.entries.iter().map(Self::entry_size).sum()
	}

	/// Serialized byte size of one entry.
	pub fn entry_size(entry: &HashBucketEntry) -> usize {
		let mut scratch = Vec::with_capacity(10);
		encode_varint(entry.keyword_hash, &mut scratch);
		let hash_len = scratch.len();
		scratch.clear();
		encode_varint(entry.value.len() as u64, &mut scratch);
		hash_len + scratch.len() + entry.value.len()
	}

	/// Serializes every slot; value sizes must fit 16 bits.
	pub fn serialize(&self) -> Result<Vec<u8>> {
		let mut out = Vec::with_capacity(self.serialized_size());
		for entry in &self.entries {
			if entry.value.len() > MAX_BUCKET_VALUE_SIZE {
				return Err(Error::InvalidHashBucketEntryValueSize(entry.value.len()));
			}
			encode_varint(entry.keyword_hash, &mut out);
			encode_varint(entry.value.len() as u64, &mut out);
			out.extend_from_slice(&entry.value);
		}
		Ok(out)
	}

	/// Parses slots until the buffer is exhausted; a remainder of zero
	/// padding (any length) ends the bucket.
	pub fn deserialize(bytes: &[u8]) -> Result<Self> {
		let mut entries = Vec::new();
		let mut offset = 0;
		while offset < bytes.len() {
			if bytes[offset..].iter().all(|&b| b == 0) {
				break;
			}
			let (keyword_hash, read) = decode_varint(&bytes[offset..])?;
			offset += read;
			let (value_size, read) = decode_varint(&bytes[offset..])?;
			offset += read;
			if value_size as usize > MAX_BUCKET_VALUE_SIZE {
				return Err(Error::InvalidHashBucketEntryValueSize(value_size as usize));
			}
			if offset + value_size as usize > bytes.len() {
				return Err(Error::VarIntTruncated);
			}
			let value = bytes[offset..offset + value_size as usize].to_vec();
			offset += value_size as usize;
			entries.push(HashBucketEntry {
				keyword_hash,
				value,
			});
		}
		Ok(Self { entries })
	}

	/// The value stored under a keyword hash, if present.
	pub fn find(&self, keyword_hash: u64) -> Option<&[u8]> {
		self.entries
			.iter()
			.find(|entry| entry.keyword_hash == keyword_hash)
			.map(|entry| entry.value.as_slice())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn varint_known_encodings() {
		let mut out = Vec::new();
		encode_varint(150, &mut out);
		assert_eq!(out, [0x96, 0x01]);
		out.clear();
		encode_varint(16384, &mut out);
		assert_eq!(out, [0x80, 0x80, 0x01]);
		out.clear();
		encode_varint(0, &mut out);
		assert_eq!(out, [0x00]);
	}

	#[test]
	fn varint_roundtrip() {
		for value in [0u64, 1, 127, 128, 150, 16383, 16384, u32::MAX as u64, u64::MAX] {
			let mut out = Vec::new();
			encode_varint(value, &mut out);
			assert_eq!(decode_varint(&out).unwrap(), (value, out.len()));
		}
	}

	#[test]
	fn varint_failure_modes() {
		assert_eq!(decode_varint(&[]), Err(Error::VarIntTruncated));
		assert_eq!(decode_varint(&[0x80, 0x80]), Err(Error::VarIntTruncated));
		// 11 continuation bytes overflow 64 bits.
		assert_eq!(decode_varint(&[0xff; 11]), Err(Error::VarIntOverflow));
		// A 10th byte above 1 pushes past 2^64.
		let mut bytes = vec![0x80u8; 9];
		bytes.push(0x02);
		assert_eq!(decode_varint(&bytes), Err(Error::VarIntOverflow));
	}

	#[test]
	fn bucket_roundtrip_with_padding() {
		let bucket = HashBucket {
			entries: vec![
				HashBucketEntry {
					keyword_hash: 0xdead_beef_1234,
					value: b"ten bytes!".to_vec(),
				},
				HashBucketEntry {
					keyword_hash: 7,
					value: vec![],
				},
			],
		};
		let bytes = bucket.serialize().unwrap();
		assert_eq!(bytes.len(), bucket.serialized_size());
		// Buckets travel zero-padded to a fixed entry size; every padding
		// length must parse, odd ones included.
		for padding in 0..=19 {
			let mut padded = bytes.clone();
			padded.resize(padded.len() + padding, 0);
			let parsed = HashBucket::deserialize(&padded).unwrap();
			assert_eq!(parsed.entries.len(), 2, "padding {padding}");
			assert_eq!(parsed.find(0xdead_beef_1234), Some(&b"ten bytes!"[..]));
			assert_eq!(parsed.find(7), Some(&[][..]));
			assert_eq!(parsed.find(8), None);
		}
	}

	#[test]
	fn oversized_value_is_rejected() {
		let bucket = HashBucket {
			entries: vec![HashBucketEntry {
				keyword_hash: 1,
				value: vec![0; MAX_BUCKET_VALUE_SIZE + 1],
			}],
		};
		assert_eq!(
			bucket.serialize(),
			Err(Error::InvalidHashBucketEntryValueSize(
				MAX_BUCKET_VALUE_SIZE + 1
			))
		);
	}
}
