//! Word-level modular arithmetic: Barrett/Shoup reduction, constant-time
//! selects, and prime generation.

mod modulus;
mod prime;
mod word;

pub use modulus::{ct_eq, ct_le, ct_lt, ct_msb, ct_select, Modulus, MultiplyConstantModulus};
pub use prime::{generate_primes, is_prime};
pub use word::Word;
