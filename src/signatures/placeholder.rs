//! Placeholder preparation.
//!
//! Takes an unsigned document and produces a byte-identical-on-resign
//! prepared copy: a signature dictionary with a fixed-capacity all-zeros
//! `/Contents` hex placeholder and a provisional `/ByteRange`, wired into
//! an invisible signature field on the first page. The file is then
//! serialized flat and the real `/ByteRange` values are patched in place,
//! so the prepared bytes never move again; signing only overwrites hex
//! digits inside the placeholder.

use super::byterange::ByteRangeCalculator;
use super::types::{PrepareOptions, SignatureSubFilter};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Object, ObjectRef};
use crate::writer::PdfWriter;
use chrono::Utc;

/// Prepare a document for detached signing.
///
/// Returns the complete prepared file. The output is deterministic apart
/// from the `/M` signing-date entry.
pub fn prepare(input: &[u8], options: &PrepareOptions) -> Result<Vec<u8>> {
    let mut doc = Document::from_bytes(input)?;
    let calc = ByteRangeCalculator::new(options.signature_capacity);

    log::debug!(
        "preparing placeholder: field={}, capacity={} bytes",
        options.field_name,
        options.signature_capacity
    );

    let page_ref = doc.first_page_ref()?;
    let sig_ref = add_signature_dictionary(&mut doc, options);
    let field_ref = add_signature_field(&mut doc, options, sig_ref, page_ref);
    register_in_page_annots(&mut doc, page_ref, field_ref)?;
    register_in_acroform(&mut doc, field_ref)?;

    let written = PdfWriter::new().write_document(&doc)?;
    let sig_offset = written
        .offset_of(sig_ref.id)
        .ok_or_else(|| Error::InvalidPdf("signature object offset not recorded".to_string()))?;
    let mut bytes = written.bytes;

    let contents_offset =
        ByteRangeCalculator::find_contents_offset(&bytes, sig_offset, calc.placeholder_size())
            .ok_or_else(|| Error::InvalidPdf("placeholder not found in output".to_string()))?;

    let byte_range = calc.calculate_byte_range(bytes.len(), contents_offset);
    ByteRangeCalculator::validate_byte_range(&byte_range, bytes.len())?;
    ByteRangeCalculator::patch_byte_range(&mut bytes, &byte_range, sig_offset)?;

    log::info!(
        "prepared document: {} bytes, ByteRange {}",
        bytes.len(),
        ByteRangeCalculator::format_byte_range(&byte_range)
    );
    Ok(bytes)
}

/// The signature dictionary with its provisional `/ByteRange` and all-zeros
/// `/Contents`. Entry order is load-bearing: the `/Contents` hex string and
/// the `/ByteRange` array must land in the serialized output exactly where
/// the patching code expects to find them by scanning.
fn add_signature_dictionary(doc: &mut Document, options: &PrepareOptions) -> ObjectRef {
    let byte_range = ByteRangeCalculator::provisional_byte_range();
    let sig_dict = Object::dict(vec![
        ("Type", Object::name("Sig")),
        ("Filter", Object::name("Adobe.PPKLite")),
        (
            "SubFilter",
            Object::name(SignatureSubFilter::Pkcs7Detached.as_pdf_name()),
        ),
        ("Reason", Object::string(&options.reason)),
        ("Location", Object::string(&options.location)),
        ("ContactInfo", Object::string(&options.contact_info)),
        ("M", Object::string(&format_pdf_date())),
        (
            "ByteRange",
            Object::Array(byte_range.iter().map(|&v| Object::Integer(v)).collect()),
        ),
        (
            "Contents",
            // Zero bytes hex-serialize to exactly the all-zeros placeholder
            Object::String(vec![0u8; options.signature_capacity]),
        ),
    ]);
    doc.add_object(sig_dict)
}

/// Invisible merged field/widget: zero rectangle, hidden-print flags.
fn add_signature_field(
    doc: &mut Document,
    options: &PrepareOptions,
    sig_ref: ObjectRef,
    page_ref: ObjectRef,
) -> ObjectRef {
    let field = Object::dict(vec![
        ("Type", Object::name("Annot")),
        ("Subtype", Object::name("Widget")),
        ("FT", Object::name("Sig")),
        ("T", Object::string(&options.field_name)),
        ("V", Object::Reference(sig_ref)),
        (
            "Rect",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(0),
            ]),
        ),
        // Print flag: the annotation exists but draws nothing
        ("F", Object::Integer(4)),
        ("P", Object::Reference(page_ref)),
    ]);
    doc.add_object(field)
}

/// Append the widget to the page's `/Annots`, creating the array when the
/// page has none. An `/Annots` held in its own indirect object is updated
/// there.
fn register_in_page_annots(
    doc: &mut Document,
    page_ref: ObjectRef,
    field_ref: ObjectRef,
) -> Result<()> {
    let page = doc.get(page_ref)?;
    let page_dict = page.as_dict().ok_or_else(|| Error::InvalidObjectType {
        expected: "Dictionary".to_string(),
        found: page.type_name().to_string(),
    })?;

    match page_dict.get("Annots") {
        Some(Object::Reference(annots_ref)) => {
            let annots_ref = *annots_ref;
            let annots = doc.get_mut(annots_ref)?;
            let arr = annots.as_array_mut().ok_or_else(|| {
                Error::InvalidPdf("/Annots is not an array".to_string())
            })?;
            arr.push(Object::Reference(field_ref));
        },
        _ => {
            let page = doc.get_mut(page_ref)?;
            let page_dict = page.as_dict_mut().ok_or_else(|| {
                Error::InvalidPdf("page is not a dictionary".to_string())
            })?;
            match page_dict.get_mut("Annots") {
                Some(Object::Array(arr)) => arr.push(Object::Reference(field_ref)),
                _ => {
                    page_dict.insert(
                        "Annots".to_string(),
                        Object::Array(vec![Object::Reference(field_ref)]),
                    );
                },
            }
        },
    }
    Ok(())
}

/// Register the field in the catalog's `/AcroForm`, creating the form
/// dictionary when absent, and set `SigFlags` to SignaturesExist |
/// AppendOnly.
fn register_in_acroform(doc: &mut Document, field_ref: ObjectRef) -> Result<()> {
    let catalog_ref = doc.catalog_ref()?;

    // Resolve an indirect AcroForm to the object that actually holds it
    let acroform_target = match doc.catalog()?.get("AcroForm") {
        Some(Object::Reference(r)) => Some(*r),
        Some(_) => None,
        None => None,
    };

    let form_holder = match acroform_target {
        Some(form_ref) => doc.get_mut(form_ref)?,
        None => {
            let catalog = doc.get_mut(catalog_ref)?;
            let catalog_dict = catalog.as_dict_mut().ok_or_else(|| {
                Error::InvalidPdf("catalog is not a dictionary".to_string())
            })?;
            if !matches!(catalog_dict.get("AcroForm"), Some(Object::Dictionary(_))) {
                catalog_dict.insert(
                    "AcroForm".to_string(),
                    Object::Dictionary(crate::object::Dictionary::new()),
                );
            }
            match catalog_dict.get_mut("AcroForm") {
                Some(obj) => obj,
                None => unreachable!("AcroForm inserted above"),
            }
        },
    };

    let form = form_holder.as_dict_mut().ok_or_else(|| {
        Error::InvalidPdf("/AcroForm is not a dictionary".to_string())
    })?;
    match form.get_mut("Fields") {
        Some(Object::Array(fields)) => fields.push(Object::Reference(field_ref)),
        _ => {
            form.insert(
                "Fields".to_string(),
                Object::Array(vec![Object::Reference(field_ref)]),
            );
        },
    }
    // SignaturesExist | AppendOnly
    form.insert("SigFlags".to_string(), Object::Integer(3));
    Ok(())
}

/// PDF date string: `D:YYYYMMDDHHmmSSZ`.
fn format_pdf_date() -> String {
    Utc::now().format("D:%Y%m%d%H%M%SZ").to_string()
}
