//! pdf_signet - detached PDF signing in pure Rust.
//!
//! The crate splits signing into two steps that can run on different
//! machines:
//!
//! - **Prepare**: [`prepare`] parses a PDF, adds an invisible signature
//!   field with a fixed-capacity `/Contents` placeholder, serializes the
//!   file flat, and patches the real `/ByteRange` in place. After this
//!   step every byte outside the placeholder is final.
//! - **Sign**: [`DetachedSigner`] digests the covered byte ranges, builds
//!   a detached CMS `SignedData` container with signed attributes, and
//!   splices its hex encoding into the placeholder. The file length never
//!   changes.
//!
//! ```no_run
//! use pdf_signet::{prepare, DetachedSigner, PrepareOptions, SignOptions, SigningIdentity};
//! use std::sync::Arc;
//!
//! # fn main() -> pdf_signet::Result<()> {
//! let input = std::fs::read("contract.pdf")?;
//! let prepared = prepare(&input, &PrepareOptions::default())?;
//!
//! let identity = SigningIdentity::from_pem_files("signer.crt", "signer.key", None)?;
//! let signer = DetachedSigner::new(Arc::new(identity), SignOptions::default());
//! let signed = signer.sign(&prepared)?;
//! std::fs::write("contract-signed.pdf", signed)?;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod error;
pub mod identity;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod signatures;
pub mod writer;
pub mod xref;

pub use document::Document;
pub use error::{Error, ErrorKind, Result};
pub use identity::{IdentityInfo, SigningIdentity};
pub use object::{Dictionary, Object, ObjectRef};
pub use signatures::{
    prepare, ByteRangeCalculator, DetachedSigner, DigestAlgorithm, PrepareOptions, SignOptions,
};
