//! Detached PDF signing.
//!
//! Signing happens in two independent steps so the private key never has
//! to be co-located with document preparation:
//!
//! 1. [`prepare`] adds an invisible signature field whose `/Contents` value
//!    is a fixed-capacity all-zeros hex placeholder, computes the real
//!    `/ByteRange`, and patches it in place. The prepared file's bytes are
//!    final outside the placeholder.
//! 2. [`DetachedSigner::sign`] digests the byte ranges, builds a detached
//!    CMS SignedData container, and splices its hex encoding into the
//!    placeholder without changing the file length.

pub mod byterange;
pub mod cms;
pub mod placeholder;
pub mod signer;
pub mod types;

pub use byterange::ByteRangeCalculator;
pub use placeholder::prepare;
pub use signer::DetachedSigner;
pub use types::{
    DigestAlgorithm, PrepareOptions, SignOptions, SignatureSubFilter,
    DEFAULT_SIGNATURE_CAPACITY,
};
