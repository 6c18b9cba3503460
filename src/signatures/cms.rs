//! CMS (PKCS#7) SignedData construction.
//!
//! Builds the detached signature container that goes into `/Contents`:
//! a `ContentInfo` wrapping `SignedData` with the signer certificate (plus
//! chain), one `SignerInfo`, and signed attributes content-type,
//! signing-time, and message-digest.
//!
//! Everything is emitted as DER directly via small TLV helpers. The
//! signature itself is computed elsewhere, over the exact `SET OF`
//! encoding of the signed attributes that [`signed_attributes`] returns.

use crate::error::{Error, Result};
use crate::signatures::types::DigestAlgorithm;
use chrono::{DateTime, Utc};
use x509_parser::prelude::FromDer;

/// OID for id-data: 1.2.840.113549.1.7.1
const OID_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x01];

/// OID for id-signedData: 1.2.840.113549.1.7.2
const OID_SIGNED_DATA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];

/// OID for the content-type attribute: 1.2.840.113549.1.9.3
const OID_CONTENT_TYPE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x03];

/// OID for the message-digest attribute: 1.2.840.113549.1.9.4
const OID_MESSAGE_DIGEST: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x04];

/// OID for the signing-time attribute: 1.2.840.113549.1.9.5
const OID_SIGNING_TIME: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x09, 0x05];

/// Build the signed attributes as their `SET OF` DER encoding.
///
/// This exact byte string is what the signature is computed over. The
/// attributes appear in ascending order of their encodings (content-type,
/// signing-time, message-digest), which is what DER requires of a `SET OF`.
pub fn signed_attributes(message_digest: &[u8], signing_time: DateTime<Utc>) -> Vec<u8> {
    let mut attrs = Vec::new();
    attrs.extend(build_attribute(OID_CONTENT_TYPE, &build_oid(OID_DATA)));
    attrs.extend(build_attribute(OID_SIGNING_TIME, &build_time(signing_time)));
    attrs.extend(build_attribute(
        OID_MESSAGE_DIGEST,
        &build_octet_string(message_digest),
    ));
    build_set(&attrs)
}

/// Assemble the complete `ContentInfo(SignedData)` container.
///
/// `signed_attrs` must be the `SET OF` encoding from [`signed_attributes`];
/// it is re-tagged `[0] IMPLICIT` inside the `SignerInfo`. `signature` is
/// the raw RSA PKCS#1 v1.5 signature over those attribute bytes. The signer
/// identity is taken from `certificate` (issuer and serial); `chain`
/// certificates are embedded after it untouched.
pub fn build_signed_data(
    digest_algorithm: DigestAlgorithm,
    signed_attrs: &[u8],
    signature: &[u8],
    certificate: &[u8],
    chain: &[Vec<u8>],
) -> Result<Vec<u8>> {
    let issuer_and_serial = issuer_and_serial_number(certificate)?;
    let signer_info = build_signer_info(
        digest_algorithm,
        &issuer_and_serial,
        signed_attrs,
        signature,
    );

    let mut content = Vec::new();
    // CMSVersion 1: issuerAndSerialNumber identification
    content.extend(build_integer(&[1]));
    content.extend(build_set(&build_algorithm_identifier(
        digest_algorithm.oid(),
    )));
    // EncapsulatedContentInfo with no content: detached
    content.extend(build_sequence(&[&build_oid(OID_DATA)]));

    let mut certs = Vec::new();
    certs.extend_from_slice(certificate);
    for cert in chain {
        certs.extend_from_slice(cert);
    }
    content.extend(build_context_specific(0, &certs));

    content.extend(build_set(&signer_info));

    let signed_data = build_sequence(&[&content]);
    Ok(build_sequence(&[
        &build_oid(OID_SIGNED_DATA),
        &build_context_specific(0, &signed_data),
    ]))
}

/// SignerInfo: version, sid, digest algorithm, `[0]` signed attrs,
/// signature algorithm, signature value.
fn build_signer_info(
    digest_algorithm: DigestAlgorithm,
    issuer_and_serial: &[u8],
    signed_attrs: &[u8],
    signature: &[u8],
) -> Vec<u8> {
    let mut content = Vec::new();
    content.extend(build_integer(&[1]));
    content.extend_from_slice(issuer_and_serial);
    content.extend(build_algorithm_identifier(digest_algorithm.oid()));
    // Re-tag the SET OF as [0] IMPLICIT, keeping the inner bytes
    content.extend(retag_implicit(0, signed_attrs));
    content.extend(build_algorithm_identifier(
        digest_algorithm.rsa_signature_oid(),
    ));
    content.extend(build_octet_string(signature));
    build_sequence(&[&content])
}

/// IssuerAndSerialNumber, lifted verbatim out of the certificate: the raw
/// issuer Name DER and the raw serial bytes. Re-encoding either would risk
/// a mismatch with what verifiers compare against the certificate.
fn issuer_and_serial_number(cert_der: &[u8]) -> Result<Vec<u8>> {
    let (_, cert) = x509_parser::certificate::X509Certificate::from_der(cert_der)
        .map_err(|e| Error::SigningFailure(format!("cannot parse signer certificate: {}", e)))?;
    let issuer = cert.issuer().as_raw();
    let serial = build_integer(cert.raw_serial());
    Ok(build_sequence(&[issuer, &serial]))
}

/// Attribute ::= SEQUENCE { attrType OID, attrValues SET OF AttributeValue }
fn build_attribute(oid: &[u8], value: &[u8]) -> Vec<u8> {
    build_sequence(&[&build_oid(oid), &build_set(value)])
}

// === DER encoding helpers ===

fn build_sequence(items: &[&[u8]]) -> Vec<u8> {
    let content: Vec<u8> = items.iter().flat_map(|i| i.iter().copied()).collect();
    build_tlv(0x30, &content)
}

fn build_set(content: &[u8]) -> Vec<u8> {
    build_tlv(0x31, content)
}

fn build_oid(oid_bytes: &[u8]) -> Vec<u8> {
    build_tlv(0x06, oid_bytes)
}

fn build_integer(value: &[u8]) -> Vec<u8> {
    // A set high bit would read as negative; pad with a zero byte
    if !value.is_empty() && value[0] & 0x80 != 0 {
        let mut padded = vec![0];
        padded.extend(value);
        build_tlv(0x02, &padded)
    } else {
        build_tlv(0x02, value)
    }
}

fn build_octet_string(content: &[u8]) -> Vec<u8> {
    build_tlv(0x04, content)
}

fn build_time(time: DateTime<Utc>) -> Vec<u8> {
    use chrono::Datelike;
    // X.690 limits UTCTime to 1950-2049; later dates take GeneralizedTime
    if (1950..2050).contains(&time.year()) {
        build_tlv(0x17, time.format("%y%m%d%H%M%SZ").to_string().as_bytes())
    } else {
        build_tlv(0x18, time.format("%Y%m%d%H%M%SZ").to_string().as_bytes())
    }
}

fn build_context_specific(tag: u8, content: &[u8]) -> Vec<u8> {
    build_tlv(0xA0 | tag, content)
}

/// Re-tag an already-encoded constructed value as `[tag] IMPLICIT`.
fn retag_implicit(tag: u8, encoded: &[u8]) -> Vec<u8> {
    let content = tlv_content(encoded);
    build_tlv(0xA0 | tag, content)
}

/// The content octets of a single TLV encoding.
fn tlv_content(encoded: &[u8]) -> &[u8] {
    if encoded.len() < 2 {
        return &[];
    }
    match encoded[1] {
        l if l < 0x80 => &encoded[2..],
        0x81 => &encoded[3..],
        0x82 => &encoded[4..],
        0x83 => &encoded[5..],
        _ => &[],
    }
}

fn build_algorithm_identifier(oid: &[u8]) -> Vec<u8> {
    let null = [0x05, 0x00];
    build_sequence(&[&build_oid(oid), &null])
}

fn build_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut result = vec![tag];
    let len = content.len();

    if len < 128 {
        result.push(len as u8);
    } else if len < 256 {
        result.push(0x81);
        result.push(len as u8);
    } else if len < 65536 {
        result.push(0x82);
        result.push((len >> 8) as u8);
        result.push(len as u8);
    } else {
        result.push(0x83);
        result.push((len >> 16) as u8);
        result.push((len >> 8) as u8);
        result.push(len as u8);
    }

    result.extend(content);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_build_integer_high_bit_padding() {
        assert_eq!(build_integer(&[0x01]), vec![0x02, 0x01, 0x01]);
        assert_eq!(build_integer(&[0x80]), vec![0x02, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn test_build_time_utc_before_2050() {
        let t = Utc.with_ymd_and_hms(2026, 8, 29, 12, 34, 56).unwrap();
        let encoded = build_time(t);
        assert_eq!(encoded[0], 0x17);
        assert_eq!(&encoded[2..], b"260829123456Z");
    }

    #[test]
    fn test_build_time_generalized_from_2050() {
        let t = Utc.with_ymd_and_hms(2050, 1, 1, 0, 0, 0).unwrap();
        let encoded = build_time(t);
        assert_eq!(encoded[0], 0x18);
        assert_eq!(&encoded[2..], b"20500101000000Z");

        // Last UTCTime year stays in the short form
        let t = Utc.with_ymd_and_hms(2049, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(build_time(t)[0], 0x17);
    }

    #[test]
    fn test_retag_implicit_keeps_content() {
        let set = build_set(&[0x02, 0x01, 0x07]);
        let tagged = retag_implicit(0, &set);
        assert_eq!(tagged[0], 0xA0);
        assert_eq!(&tagged[2..], &set[2..]);
    }

    #[test]
    fn test_signed_attributes_is_a_sorted_set() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let attrs = signed_attributes(&[0xAB; 32], t);
        assert_eq!(attrs[0], 0x31);

        // Walk the three attributes and check ascending DER order
        let content = tlv_content(&attrs);
        let mut encodings = Vec::new();
        let mut pos = 0;
        while pos < content.len() {
            let len = content[pos + 1] as usize;
            assert!(content[pos + 1] < 0x80, "attribute short-form length");
            encodings.push(&content[pos..pos + 2 + len]);
            pos += 2 + len;
        }
        assert_eq!(encodings.len(), 3);
        assert!(encodings[0] < encodings[1]);
        assert!(encodings[1] < encodings[2]);
    }

    #[test]
    fn test_signed_attributes_contains_digest() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let digest = [0xCD; 32];
        let attrs = signed_attributes(&digest, t);
        assert!(attrs
            .windows(digest.len())
            .any(|w| w == digest));
    }

    #[test]
    fn test_build_signed_data_with_real_certificate() {
        let cert_pem = include_bytes!("../../tests/fixtures/signing_cert.pem");
        let pem = x509_parser::pem::Pem::iter_from_buffer(cert_pem)
            .next()
            .unwrap()
            .unwrap();
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let attrs = signed_attributes(&[0u8; 32], t);
        let cms = build_signed_data(
            DigestAlgorithm::Sha256,
            &attrs,
            &[0u8; 256],
            &pem.contents,
            &[],
        )
        .unwrap();

        // ContentInfo SEQUENCE wrapping id-signedData
        assert_eq!(cms[0], 0x30);
        assert!(cms.windows(OID_SIGNED_DATA.len()).any(|w| w == OID_SIGNED_DATA));
        // The certificate travels embedded as-is
        assert!(cms
            .windows(pem.contents.len().min(64))
            .any(|w| w == &pem.contents[..pem.contents.len().min(64)]));
    }

    #[test]
    fn test_build_signed_data_rejects_garbage_certificate() {
        let t = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let attrs = signed_attributes(&[0u8; 32], t);
        let err = build_signed_data(DigestAlgorithm::Sha256, &attrs, &[0u8; 256], b"junk", &[])
            .unwrap_err();
        assert!(matches!(err, Error::SigningFailure(_)));
    }
}
