//! Signing identity: private key plus certificate chain.
//!
//! The identity is loaded once, up front, from PEM material. Every failure
//! in here maps to the identity-load failure class so the caller can refuse
//! to start rather than discover a bad key on the first signing request.
//!
//! Supported key containers: PKCS#8 (`PRIVATE KEY`), encrypted PKCS#8
//! (`ENCRYPTED PRIVATE KEY`, requires a passphrase), and legacy PKCS#1
//! (`RSA PRIVATE KEY`). The certificate buffer may hold the full chain;
//! the first certificate is the signer, the rest travel along into the
//! signature container.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use serde::Serialize;
use x509_parser::pem::Pem;
use x509_parser::prelude::FromDer;

/// A loaded signing identity.
///
/// Holds the RSA private key, the signer certificate, and any chain
/// certificates, all validated at construction. Cheap to share behind an
/// `Arc`; signing borrows it immutably.
pub struct SigningIdentity {
    key: RsaPrivateKey,
    /// Signer certificate, DER
    certificate: Vec<u8>,
    /// Chain certificates (issuers), DER, in the order they appeared
    chain: Vec<Vec<u8>>,
    info: IdentityInfo,
}

/// Introspection data about a loaded identity. Never contains key material.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityInfo {
    /// Subject common name of the signer certificate
    pub subject_common_name: String,
    /// Issuer common name of the signer certificate
    pub issuer_common_name: String,
    /// Certificate serial number, lowercase hex
    pub serial_hex: String,
    /// Certificate expiry (notAfter)
    pub not_after: DateTime<Utc>,
    /// RSA modulus size in bits
    pub key_bits: usize,
    /// Number of chain certificates loaded alongside the signer
    pub chain_length: usize,
    /// When this identity was loaded
    pub loaded_at: DateTime<Utc>,
}

impl SigningIdentity {
    /// Load an identity from PEM-encoded certificate(s) and private key.
    ///
    /// `cert_pem` may contain the whole chain; the first `CERTIFICATE`
    /// block is taken as the signer. `passphrase` is required when the key
    /// block is `ENCRYPTED PRIVATE KEY` and ignored otherwise.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8], passphrase: Option<&str>) -> Result<Self> {
        let key = load_private_key(key_pem, passphrase)?;
        let (certificate, chain) = load_certificates(cert_pem)?;
        let info = inspect_certificate(&certificate, &key, chain.len())?;

        log::info!(
            "loaded signing identity: CN={}, serial={}, {} chain cert(s)",
            info.subject_common_name,
            info.serial_hex,
            info.chain_length
        );

        Ok(Self {
            key,
            certificate,
            chain,
            info,
        })
    }

    /// Load an identity from PEM files on disk.
    pub fn from_pem_files(
        cert_path: impl AsRef<std::path::Path>,
        key_path: impl AsRef<std::path::Path>,
        passphrase: Option<&str>,
    ) -> Result<Self> {
        let (cert_path, key_path) = (cert_path.as_ref(), key_path.as_ref());
        let cert_pem = std::fs::read(cert_path).map_err(|e| {
            Error::IdentityLoadFailure(format!("cannot read {}: {}", cert_path.display(), e))
        })?;
        let key_pem = std::fs::read(key_path).map_err(|e| {
            Error::IdentityLoadFailure(format!("cannot read {}: {}", key_path.display(), e))
        })?;
        Self::from_pem(&cert_pem, &key_pem, passphrase)
    }

    /// The RSA private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.key
    }

    /// The signer certificate, DER-encoded.
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate
    }

    /// Chain certificates, DER-encoded.
    pub fn chain_der(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// Introspection data about this identity.
    pub fn info(&self) -> &IdentityInfo {
        &self.info
    }
}

// Key material must never leak through Debug output.
impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("subject", &self.info.subject_common_name)
            .field("serial", &self.info.serial_hex)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn load_private_key(key_pem: &[u8], passphrase: Option<&str>) -> Result<RsaPrivateKey> {
    let pem_str = std::str::from_utf8(key_pem)
        .map_err(|_| Error::IdentityLoadFailure("key PEM is not valid UTF-8".to_string()))?;

    if pem_str.contains("ENCRYPTED PRIVATE KEY") {
        let passphrase = passphrase.ok_or_else(|| {
            Error::IdentityLoadFailure("key is encrypted but no passphrase given".to_string())
        })?;
        return RsaPrivateKey::from_pkcs8_encrypted_pem(pem_str, passphrase).map_err(|e| {
            Error::IdentityLoadFailure(format!("cannot decrypt PKCS#8 key: {}", e))
        });
    }

    if pem_str.contains("RSA PRIVATE KEY") {
        return RsaPrivateKey::from_pkcs1_pem(pem_str)
            .map_err(|e| Error::IdentityLoadFailure(format!("cannot parse PKCS#1 key: {}", e)));
    }

    RsaPrivateKey::from_pkcs8_pem(pem_str)
        .map_err(|e| Error::IdentityLoadFailure(format!("cannot parse PKCS#8 key: {}", e)))
}

fn load_certificates(cert_pem: &[u8]) -> Result<(Vec<u8>, Vec<Vec<u8>>)> {
    let mut certs = Vec::new();
    for pem in Pem::iter_from_buffer(cert_pem) {
        let pem = pem
            .map_err(|e| Error::IdentityLoadFailure(format!("bad certificate PEM: {}", e)))?;
        if pem.label == "CERTIFICATE" {
            certs.push(pem.contents);
        }
    }
    let mut iter = certs.into_iter();
    let leaf = iter.next().ok_or_else(|| {
        Error::IdentityLoadFailure("no CERTIFICATE block in certificate PEM".to_string())
    })?;
    Ok((leaf, iter.collect()))
}

fn inspect_certificate(
    cert_der: &[u8],
    key: &RsaPrivateKey,
    chain_length: usize,
) -> Result<IdentityInfo> {
    use rsa::traits::PublicKeyParts;

    let (_, cert) = x509_parser::certificate::X509Certificate::from_der(cert_der)
        .map_err(|e| Error::IdentityLoadFailure(format!("cannot parse certificate: {}", e)))?;

    let subject_common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or("<no CN>")
        .to_string();
    let issuer_common_name = cert
        .issuer()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or("<no CN>")
        .to_string();

    let serial_hex = cert
        .raw_serial()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| {
            Error::IdentityLoadFailure("certificate notAfter out of range".to_string())
        })?;
    if not_after < Utc::now() {
        log::warn!(
            "signer certificate expired at {} (CN={})",
            not_after,
            subject_common_name
        );
    }

    Ok(IdentityInfo {
        subject_common_name,
        issuer_common_name,
        serial_hex,
        not_after,
        key_bits: key.n().bits(),
        chain_length,
        loaded_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT: &[u8] = include_bytes!("../tests/fixtures/signing_cert.pem");
    const KEY: &[u8] = include_bytes!("../tests/fixtures/signing_key.pem");
    const ENCRYPTED_KEY: &[u8] = include_bytes!("../tests/fixtures/signing_key_encrypted.pem");

    #[test]
    fn test_load_plain_identity() {
        let identity = SigningIdentity::from_pem(CERT, KEY, None).unwrap();
        let info = identity.info();
        assert_eq!(info.subject_common_name, "Signet Test Signer");
        assert_eq!(info.key_bits, 2048);
        assert_eq!(info.chain_length, 0);
        assert!(!identity.certificate_der().is_empty());
    }

    #[test]
    fn test_load_encrypted_key_with_passphrase() {
        let identity =
            SigningIdentity::from_pem(CERT, ENCRYPTED_KEY, Some("correct-horse")).unwrap();
        assert_eq!(identity.info().key_bits, 2048);
    }

    #[test]
    fn test_encrypted_key_wrong_passphrase_fails() {
        let err = SigningIdentity::from_pem(CERT, ENCRYPTED_KEY, Some("wrong")).unwrap_err();
        assert!(matches!(err, Error::IdentityLoadFailure(_)));
    }

    #[test]
    fn test_encrypted_key_missing_passphrase_fails() {
        let err = SigningIdentity::from_pem(CERT, ENCRYPTED_KEY, None).unwrap_err();
        assert!(matches!(err, Error::IdentityLoadFailure(_)));
    }

    #[test]
    fn test_load_identity_from_files() {
        let identity = SigningIdentity::from_pem_files(
            "tests/fixtures/signing_cert.pem",
            "tests/fixtures/signing_key.pem",
            None,
        )
        .unwrap();
        assert_eq!(identity.info().key_bits, 2048);

        let err =
            SigningIdentity::from_pem_files("tests/fixtures/missing.pem", "also-missing", None)
                .unwrap_err();
        assert!(matches!(err, Error::IdentityLoadFailure(_)));
    }

    #[test]
    fn test_garbage_key_fails() {
        let err = SigningIdentity::from_pem(CERT, b"not a key", None).unwrap_err();
        assert!(matches!(err, Error::IdentityLoadFailure(_)));
    }

    #[test]
    fn test_missing_certificate_fails() {
        let err = SigningIdentity::from_pem(b"", KEY, None).unwrap_err();
        assert!(matches!(err, Error::IdentityLoadFailure(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let identity = SigningIdentity::from_pem(CERT, KEY, None).unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("PRIVATE"));
    }

    #[test]
    fn test_info_serializes() {
        let identity = SigningIdentity::from_pem(CERT, KEY, None).unwrap();
        let json = serde_json::to_string(identity.info()).unwrap();
        assert!(json.contains("subject_common_name"));
    }
}
