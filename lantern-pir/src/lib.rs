//! Keyword private information retrieval over `lantern-he`.
//!
//! A database of keyword-value rows is sharded, cuckoo-hashed into
//! fixed-size buckets, and packed into an index-PIR grid. Clients derive
//! their candidate buckets locally, retrieve them obliviously through
//! MulPIR (query expansion, plaintext inner products along dimension one,
//! ciphertext products along dimension two), and match on the keyword
//! hash after decryption.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod cuckoo;
mod database;
mod error;
mod index_pir;
mod keyword_pir;
pub mod wire;

pub use cuckoo::{hash_indices, BucketCountConfig, CuckooTable, CuckooTableConfig};
pub use database::{keyword_hash, KeywordDatabase, KeywordValuePair, ShardingFunction};
pub use error::{Error, Result};
pub use index_pir::{
	bytes_per_plaintext, generate_parameter, IndexPirConfig, IndexPirParameter, MulPirClient,
	MulPirServer,
};
pub use keyword_pir::{
	KeywordPirClient, KeywordPirConfig, KeywordPirParameter, KeywordPirServer, ShardParameter,
};

pub use lantern_he::KeyCompressionStrategy;
