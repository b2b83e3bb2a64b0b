//! RLWE fully homomorphic encryption (the BFV scheme) over
//! residue-number-system polynomial rings.
//!
//! The crate is layered bottom-up: word-level modular arithmetic
//! ([`zq`]), negacyclic RNS polynomials with their NTT and base
//! conversions ([`rq`]), and the BFV scheme on top — encoding,
//! encryption, homomorphic evaluation, key switching and Galois
//! automorphisms, oblivious query expansion, and compact ciphertext
//! serialization. The scalar type is generic over [`Word`] (`u32` or
//! `u64`).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use lantern_he::{
//! 	BfvContext, BfvEncoder, BfvEncryptionParametersBuilder, BfvEvaluator,
//! 	CoefficientModulus, Decryptor, EncodingFormat, Encryptor, SecretKey,
//! 	SecurityLevel,
//! };
//!
//! fn main() -> lantern_he::Result<()> {
//! 	let params = BfvEncryptionParametersBuilder::new()
//! 		.set_poly_degree(16)
//! 		.set_plain_modulus(97u64)
//! 		.set_coefficient_moduli(CoefficientModulus::generate(16, &[40, 40])?)
//! 		.set_security_level(SecurityLevel::Unchecked)
//! 		.build()?;
//! 	let context = BfvContext::new(params)?;
//! 	let mut rng = rand::thread_rng();
//! 	let secret_key = Arc::new(SecretKey::random(&context, &mut rng)?);
//! 	let encoder = BfvEncoder::new(&context);
//! 	let encryptor = Encryptor::new(&context, &secret_key);
//! 	let decryptor = Decryptor::new(&context, &secret_key);
//! 	let evaluator = BfvEvaluator::new(&context);
//!
//! 	let plaintext = encoder.encode(&[1, 2, 3], EncodingFormat::Coefficient)?;
//! 	let ciphertext = encryptor.encrypt(&plaintext, &mut rng)?;
//! 	let doubled = evaluator.add(&ciphertext, &ciphertext)?;
//! 	let decrypted = decryptor.decrypt(&doubled)?;
//! 	let decoded = encoder.decode(&decrypted, EncodingFormat::Coefficient)?;
//! 	assert_eq!(&decoded[..3], &[2, 4, 6]);
//! 	Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod ciphertext;
mod context;
mod decryptor;
mod encoder;
mod encryptor;
mod error;
mod evaluator;
mod expansion;
mod galois;
mod keys;
mod parameters;
mod plaintext;
pub mod rq;
mod sampler;
mod serialization;
pub mod zq;

pub use ciphertext::Ciphertext;
pub use context::BfvContext;
pub use decryptor::{Decryptor, MIN_NOISE_BUDGET};
pub use encoder::{BfvEncoder, EncodingFormat};
pub use encryptor::Encryptor;
pub use error::{Error, Result};
pub use evaluator::BfvEvaluator;
pub use expansion::{expand_ciphertext, expand_ciphertexts};
pub use galois::{column_rotation_element, inverse_element, row_swap_element};
pub use keys::{
	EvaluationKey, EvaluationKeyConfig, KeyCompressionStrategy, KeySwitchKey, SecretKey,
};
pub use parameters::{
	BfvEncryptionParametersBuilder, CoefficientModulus, EncryptionParameters, ErrorStdDev,
	PlainModulus, SecurityLevel,
};
pub use plaintext::{EvalPlaintext, Plaintext};
pub use rq::convert::RnsBaseConverter;
pub use rq::{Format, PolyContext, PolyRq};
pub use sampler::{
	random_seed, sample_centered_binomial, sample_ternary, sample_uniform_seeded, Seed, SeededRng,
};
pub use serialization::{
	conservative_skip_lsbs, deserialize_ciphertext, serialize_ciphertext,
	serialize_with_skip_lsbs, SerializedCiphertext,
};
pub use zq::{
	ct_eq, ct_le, ct_lt, ct_msb, ct_select, generate_primes, is_prime, Modulus,
	MultiplyConstantModulus, Word,
};
