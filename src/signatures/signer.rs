//! Detached signing of prepared documents.
//!
//! [`DetachedSigner::sign`] takes a prepared file (see
//! [`super::placeholder::prepare`]), digests the two byte ranges, signs the
//! CMS signed attributes with the loaded identity, and splices the
//! hex-encoded container into the placeholder. The output differs from the
//! input only inside the placeholder's hex digits.

use super::byterange::ByteRangeCalculator;
use super::cms;
use super::types::{DigestAlgorithm, SignOptions};
use crate::error::{Error, Result};
use crate::identity::SigningIdentity;
use chrono::Utc;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::sync::Arc;

/// Signs prepared documents with one loaded identity.
///
/// Cheap to clone; safe to use from multiple threads at once.
#[derive(Debug, Clone)]
pub struct DetachedSigner {
    identity: Arc<SigningIdentity>,
    options: SignOptions,
}

impl DetachedSigner {
    /// Create a signer around a loaded identity.
    pub fn new(identity: Arc<SigningIdentity>, options: SignOptions) -> Self {
        Self { identity, options }
    }

    /// The identity this signer uses.
    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    /// Sign a prepared document.
    ///
    /// The placeholder geometry is recovered from the file's own
    /// `/ByteRange`; nothing outside the placeholder is touched, so the
    /// output length equals the input length.
    pub fn sign(&self, prepared: &[u8]) -> Result<Vec<u8>> {
        let byte_range = ByteRangeCalculator::parse_byte_range(prepared)?;
        ByteRangeCalculator::validate_byte_range(&byte_range, prepared.len())?;

        let contents_start = byte_range[1] as usize;
        let contents_end = byte_range[2] as usize;
        let placeholder_size = contents_end - contents_start;
        if placeholder_size < 4
            || prepared[contents_start] != b'<'
            || prepared[contents_end - 1] != b'>'
        {
            return Err(Error::InvalidPdf(
                "ByteRange gap is not a hex placeholder".to_string(),
            ));
        }

        let signed_bytes = ByteRangeCalculator::extract_signed_bytes(prepared, &byte_range)?;
        let digest = compute_digest(self.options.digest_algorithm, &signed_bytes);
        log::debug!(
            "signing {} bytes ({} digest), placeholder {} bytes",
            signed_bytes.len(),
            self.options.digest_algorithm.name(),
            placeholder_size
        );

        let signing_time = self.options.signing_time.unwrap_or_else(Utc::now);
        let signed_attrs = cms::signed_attributes(&digest, signing_time);
        let signature = self.sign_attributes(&signed_attrs)?;

        let container = cms::build_signed_data(
            self.options.digest_algorithm,
            &signed_attrs,
            &signature,
            self.identity.certificate_der(),
            self.identity.chain_der(),
        )?;

        let needed = container.len() * 2 + 2;
        if needed > placeholder_size {
            return Err(Error::PlaceholderOverflow {
                needed,
                capacity: placeholder_size,
            });
        }

        let mut output = prepared.to_vec();
        let calc = ByteRangeCalculator::with_placeholder_size(placeholder_size);
        calc.insert_signature(&mut output, contents_start, &bytes_to_hex(&container))?;

        log::info!(
            "signed document: container {} of {} reserved bytes",
            container.len(),
            (placeholder_size - 2) / 2
        );
        Ok(output)
    }

    /// RSA PKCS#1 v1.5 signature over the signed-attributes SET.
    fn sign_attributes(&self, signed_attrs: &[u8]) -> Result<Vec<u8>> {
        let key = self.identity.private_key().clone();
        let signature = match self.options.digest_algorithm {
            DigestAlgorithm::Sha1 => SigningKey::<Sha1>::new(key)
                .try_sign(signed_attrs)
                .map(|s| s.to_vec()),
            DigestAlgorithm::Sha256 => SigningKey::<Sha256>::new(key)
                .try_sign(signed_attrs)
                .map(|s| s.to_vec()),
            DigestAlgorithm::Sha384 => SigningKey::<Sha384>::new(key)
                .try_sign(signed_attrs)
                .map(|s| s.to_vec()),
            DigestAlgorithm::Sha512 => SigningKey::<Sha512>::new(key)
                .try_sign(signed_attrs)
                .map(|s| s.to_vec()),
        };
        signature.map_err(|e| Error::SigningFailure(format!("RSA signing failed: {}", e)))
    }
}

/// Digest the signed byte ranges with the chosen algorithm.
pub fn compute_digest(algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
        DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        DigestAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
        DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
    }
}

/// Uppercase hex encoding.
fn bytes_to_hex(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8] = b"0123456789ABCDEF";
    let mut hex = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
        hex.push(HEX_CHARS[(byte & 0x0F) as usize] as char);
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::placeholder::prepare;
    use crate::signatures::types::PrepareOptions;

    const FIXTURE: &[u8] = include_bytes!("../../tests/fixtures/minimal.pdf");
    const CERT: &[u8] = include_bytes!("../../tests/fixtures/signing_cert.pem");
    const KEY: &[u8] = include_bytes!("../../tests/fixtures/signing_key.pem");

    fn test_signer(options: SignOptions) -> DetachedSigner {
        let identity = SigningIdentity::from_pem(CERT, KEY, None).unwrap();
        DetachedSigner::new(Arc::new(identity), options)
    }

    #[test]
    fn test_compute_digest_lengths() {
        assert_eq!(compute_digest(DigestAlgorithm::Sha1, b"x").len(), 20);
        assert_eq!(compute_digest(DigestAlgorithm::Sha256, b"x").len(), 32);
        assert_eq!(compute_digest(DigestAlgorithm::Sha384, b"x").len(), 48);
        assert_eq!(compute_digest(DigestAlgorithm::Sha512, b"x").len(), 64);
    }

    #[test]
    fn test_bytes_to_hex() {
        assert_eq!(bytes_to_hex(&[0x00, 0xAB, 0xFF]), "00ABFF");
        assert_eq!(bytes_to_hex(&[]), "");
    }

    #[test]
    fn test_sign_preserves_length_and_ranges() {
        let prepared = prepare(FIXTURE, &PrepareOptions::default()).unwrap();
        let signed = test_signer(SignOptions::default()).sign(&prepared).unwrap();

        assert_eq!(signed.len(), prepared.len());
        // Bytes outside the placeholder are untouched
        let br = ByteRangeCalculator::parse_byte_range(&prepared).unwrap();
        assert_eq!(&signed[..br[1] as usize], &prepared[..br[1] as usize]);
        assert_eq!(&signed[br[2] as usize..], &prepared[br[2] as usize..]);
        // The placeholder is no longer all zeros
        let gap = &signed[br[1] as usize + 1..br[2] as usize - 1];
        assert!(gap.iter().any(|&b| b != b'0'));
        assert!(gap.iter().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sign_without_placeholder_fails() {
        let err = test_signer(SignOptions::default()).sign(FIXTURE).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::InvalidDocument
        ));
    }

    #[test]
    fn test_sign_overflows_tiny_placeholder() {
        // 64 bytes cannot hold a CMS container with a 2048-bit signature
        let opts = PrepareOptions::default().with_signature_capacity(64);
        let prepared = prepare(FIXTURE, &opts).unwrap();
        let err = test_signer(SignOptions::default()).sign(&prepared).unwrap_err();
        assert!(matches!(err, Error::PlaceholderOverflow { .. }));
    }

    #[test]
    fn test_sign_is_deterministic_with_pinned_time() {
        use chrono::TimeZone;
        let prepared = prepare(FIXTURE, &PrepareOptions::default()).unwrap();
        let t = chrono::Utc.with_ymd_and_hms(2026, 8, 29, 10, 0, 0).unwrap();
        let signer = test_signer(SignOptions::default().with_signing_time(t));
        let a = signer.sign(&prepared).unwrap();
        let b = signer.sign(&prepared).unwrap();
        assert_eq!(a, b);
    }
}
