//! Signature types and options.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Default signature capacity in DER bytes. Large enough for an RSA-4096
/// signature with a typical certificate chain attached.
pub const DEFAULT_SIGNATURE_CAPACITY: usize = 8192;

/// Digest algorithm used for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    /// SHA-1 (legacy documents only)
    Sha1,
    /// SHA-256 (recommended)
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// DER-encoded OID value for this digest algorithm.
    pub fn oid(&self) -> &'static [u8] {
        match self {
            // 1.3.14.3.2.26
            DigestAlgorithm::Sha1 => &[0x2B, 0x0E, 0x03, 0x02, 0x1A],
            // 2.16.840.1.101.3.4.2.1
            DigestAlgorithm::Sha256 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01],
            // 2.16.840.1.101.3.4.2.2
            DigestAlgorithm::Sha384 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02],
            // 2.16.840.1.101.3.4.2.3
            DigestAlgorithm::Sha512 => &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03],
        }
    }

    /// DER-encoded OID of the matching RSA PKCS#1 v1.5 signature algorithm.
    pub fn rsa_signature_oid(&self) -> &'static [u8] {
        match self {
            // 1.2.840.113549.1.1.5 (sha1WithRSAEncryption)
            DigestAlgorithm::Sha1 => {
                &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x05]
            },
            // 1.2.840.113549.1.1.11 (sha256WithRSAEncryption)
            DigestAlgorithm::Sha256 => {
                &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B]
            },
            // 1.2.840.113549.1.1.12
            DigestAlgorithm::Sha384 => {
                &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0C]
            },
            // 1.2.840.113549.1.1.13
            DigestAlgorithm::Sha512 => {
                &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0D]
            },
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }
}

/// Signature sub-filter (container format named in the signature dict).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - detached CMS over the byte ranges
    #[default]
    Pkcs7Detached,
    /// adbe.pkcs7.sha1 - legacy SHA-1 wrapping
    Pkcs7Sha1,
}

impl SignatureSubFilter {
    /// The PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::Pkcs7Sha1 => "adbe.pkcs7.sha1",
        }
    }

    /// Parse a PDF name into a sub-filter.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "adbe.pkcs7.sha1" => Some(SignatureSubFilter::Pkcs7Sha1),
            _ => None,
        }
    }
}

/// Options for the placeholder preparation step.
///
/// Deserializable so a request body can carry it; every field has a
/// documented default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrepareOptions {
    /// Signature field name
    pub field_name: String,
    /// Reason recorded in the signature dictionary
    pub reason: String,
    /// Location recorded in the signature dictionary
    pub location: String,
    /// Contact info recorded in the signature dictionary
    pub contact_info: String,
    /// Reserved signature capacity in DER bytes
    pub signature_capacity: usize,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            field_name: "Signature1".to_string(),
            reason: "Digitally signed".to_string(),
            location: "Unknown".to_string(),
            contact_info: "Unknown".to_string(),
            signature_capacity: DEFAULT_SIGNATURE_CAPACITY,
        }
    }
}

impl PrepareOptions {
    /// Set the signature field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = name.into();
        self
    }

    /// Set the signing reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the contact info.
    pub fn with_contact_info(mut self, contact: impl Into<String>) -> Self {
        self.contact_info = contact.into();
        self
    }

    /// Set the reserved signature capacity in DER bytes.
    pub fn with_signature_capacity(mut self, capacity: usize) -> Self {
        self.signature_capacity = capacity;
        self
    }
}

/// Options for the detached signing step.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Digest algorithm over the byte ranges
    pub digest_algorithm: DigestAlgorithm,
    /// Signing time embedded in the signed attributes. `None` uses the
    /// current time; pinning it makes output reproducible.
    pub signing_time: Option<DateTime<Utc>>,
}

impl SignOptions {
    /// Set the digest algorithm.
    pub fn with_digest_algorithm(mut self, alg: DigestAlgorithm) -> Self {
        self.digest_algorithm = alg;
        self
    }

    /// Pin the signing time.
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }
}
