//! End-to-end prepare-then-sign pipeline tests.

use pdf_signet::signatures::ByteRangeCalculator;
use pdf_signet::{
    prepare, DetachedSigner, DigestAlgorithm, Document, ErrorKind, PrepareOptions, SignOptions,
    SigningIdentity,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const PDF: &[u8] = include_bytes!("fixtures/minimal.pdf");
const CERT: &[u8] = include_bytes!("fixtures/signing_cert.pem");
const KEY: &[u8] = include_bytes!("fixtures/signing_key.pem");
const KEY_ENCRYPTED: &[u8] = include_bytes!("fixtures/signing_key_encrypted.pem");

fn identity() -> Arc<SigningIdentity> {
    let _ = env_logger::builder().is_test(true).try_init();
    Arc::new(SigningIdentity::from_pem(CERT, KEY, None).unwrap())
}

fn hex_decode(hex: &[u8]) -> Vec<u8> {
    fn val(b: u8) -> u8 {
        match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => panic!("non-hex digit in placeholder"),
        }
    }
    hex.chunks(2).map(|p| (val(p[0]) << 4) | val(p[1])).collect()
}

#[test]
fn prepare_then_sign_round_trip() {
    let prepared = prepare(PDF, &PrepareOptions::default()).unwrap();
    let signer = DetachedSigner::new(identity(), SignOptions::default());
    let signed = signer.sign(&prepared).unwrap();

    // Length discipline: only hex digits inside the placeholder changed
    assert_eq!(signed.len(), prepared.len());
    let br = ByteRangeCalculator::parse_byte_range(&signed).unwrap();
    ByteRangeCalculator::validate_byte_range(&br, signed.len()).unwrap();
    assert_eq!(&signed[..br[1] as usize], &prepared[..br[1] as usize]);
    assert_eq!(&signed[br[2] as usize..], &prepared[br[2] as usize..]);

    // The signed output still parses as a document
    Document::from_bytes(&signed).unwrap();
}

#[test]
fn cms_container_covers_the_byte_ranges() {
    let prepared = prepare(PDF, &PrepareOptions::default()).unwrap();
    let signer = DetachedSigner::new(identity(), SignOptions::default());
    let signed = signer.sign(&prepared).unwrap();

    let br = ByteRangeCalculator::parse_byte_range(&signed).unwrap();
    let covered = ByteRangeCalculator::extract_signed_bytes(&signed, &br).unwrap();
    let digest = Sha256::digest(&covered);

    // The message-digest attribute inside the CMS container must hold the
    // digest of exactly those bytes
    let placeholder = &signed[br[1] as usize + 1..br[2] as usize - 1];
    let container = hex_decode(placeholder);
    assert_eq!(container[0], 0x30, "container must be a DER SEQUENCE");
    let found = container
        .windows(digest.len())
        .any(|w| w == digest.as_slice());
    assert!(found, "message digest not present in signed attributes");

    // SignedData content type right after the outer SEQUENCE header
    let signed_data_oid: &[u8] = &[
        0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02,
    ];
    assert!(container
        .windows(signed_data_oid.len())
        .any(|w| w == signed_data_oid));
}

#[test]
fn sign_is_reproducible_with_pinned_time() {
    use chrono::TimeZone;
    let prepared = prepare(PDF, &PrepareOptions::default()).unwrap();
    let t = chrono::Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 0).unwrap();
    let signer = DetachedSigner::new(identity(), SignOptions::default().with_signing_time(t));
    assert_eq!(signer.sign(&prepared).unwrap(), signer.sign(&prepared).unwrap());
}

#[test]
fn signer_is_safe_to_share_across_threads() {
    let prepared = Arc::new(prepare(PDF, &PrepareOptions::default()).unwrap());
    let signer = Arc::new(DetachedSigner::new(identity(), SignOptions::default()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let signer = Arc::clone(&signer);
            let prepared = Arc::clone(&prepared);
            std::thread::spawn(move || signer.sign(&prepared).unwrap().len())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), prepared.len());
    }
}

#[test]
fn digest_algorithm_is_selectable() {
    let prepared = prepare(PDF, &PrepareOptions::default()).unwrap();
    for alg in [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ] {
        let signer = DetachedSigner::new(
            identity(),
            SignOptions::default().with_digest_algorithm(alg),
        );
        let signed = signer.sign(&prepared).unwrap();
        assert_eq!(signed.len(), prepared.len());
    }
}

#[test]
fn signature_text_inside_streams_survives_the_pipeline() {
    // A page stream that happens to contain signature-dictionary syntax
    // must come out of prepare and sign byte-identical
    let decoy: &[u8] = b"BT /ByteRange [0 9999999999 9999999999 9999999999] /Contents <00> ET";
    let mut doc = Document::from_bytes(PDF).unwrap();
    doc.add_object(pdf_signet::Object::Stream {
        dict: pdf_signet::Dictionary::new(),
        data: decoy.to_vec().into(),
    });
    let input = pdf_signet::writer::PdfWriter::new()
        .write_document(&doc)
        .unwrap()
        .bytes;

    let prepared = prepare(&input, &PrepareOptions::default()).unwrap();
    let signer = DetachedSigner::new(identity(), SignOptions::default());
    let signed = signer.sign(&prepared).unwrap();

    assert!(prepared.windows(decoy.len()).any(|w| w == decoy));
    assert!(signed.windows(decoy.len()).any(|w| w == decoy));
    let br = ByteRangeCalculator::parse_byte_range(&signed).unwrap();
    ByteRangeCalculator::validate_byte_range(&br, signed.len()).unwrap();
}

#[test]
fn prepare_rejects_non_pdf_input() {
    let err = prepare(b"%not-a-pdf", &PrepareOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDocument);
}

#[test]
fn sign_rejects_unprepared_input() {
    let signer = DetachedSigner::new(identity(), SignOptions::default());
    let err = signer.sign(PDF).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDocument);
}

#[test]
fn encrypted_key_requires_the_right_passphrase() {
    let err = SigningIdentity::from_pem(CERT, KEY_ENCRYPTED, Some("wrong-horse")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdentityLoadFailure);

    let err = SigningIdentity::from_pem(CERT, KEY_ENCRYPTED, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IdentityLoadFailure);

    let identity = SigningIdentity::from_pem(CERT, KEY_ENCRYPTED, Some("correct-horse")).unwrap();
    let signer = DetachedSigner::new(Arc::new(identity), SignOptions::default());
    let prepared = prepare(PDF, &PrepareOptions::default()).unwrap();
    signer.sign(&prepared).unwrap();
}

#[test]
fn prepare_options_flow_into_the_output() {
    let opts = PrepareOptions::default()
        .with_field_name("ContractSig")
        .with_reason("Countersigned")
        .with_contact_info("legal@example.com")
        .with_signature_capacity(4096);
    let prepared = prepare(PDF, &opts).unwrap();

    let text = String::from_utf8_lossy(&prepared);
    assert!(text.contains("/T (ContractSig)"));
    assert!(text.contains("/Reason (Countersigned)"));
    assert!(text.contains("/ContactInfo (legal@example.com)"));

    let br = ByteRangeCalculator::parse_byte_range(&prepared).unwrap();
    assert_eq!((br[2] - br[1]) as usize, 4096 * 2 + 2);
}
