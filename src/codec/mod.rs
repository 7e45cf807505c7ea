//! Binary codec for audit records.
//!
//! Audit records travel between implementations as a compact schema-driven
//! binary encoding (an External Term Format subset, see [`term`]). Three
//! record kinds exist: `{package, Ecosystem, Name, Version}`,
//! `{audit, Package, Verdict, Message, Fingerprint, CreatedAt, ByAuthor}`
//! and `{signed_audit, Audit, Signature}`. The encoding must stay
//! byte-compatible across implementations: a signature is computed over
//! the audit's canonical encoding, so any drift breaks verification.
//!
//! Optional fields use the atoms `undefined` (explicit no-value) and
//! `default` (absent, take the schema default) as markers; both survive
//! decoding distinctly from a present value. String fields decoded from
//! the alternate character-sequence representation are normalized to
//! `String` before a record is returned, nested records included.

mod term;

use thiserror::Error;

use crate::model::{Audit, Field, Package, SignedAudit, Verdict};
use term::Term;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed encoding: {reason} at byte {offset}")]
    Malformed { reason: String, offset: usize },
    #[error("unrecognized record kind: {0}")]
    UnrecognizedRecord(String),
}

impl CodecError {
    fn malformed(reason: impl Into<String>, offset: usize) -> Self {
        CodecError::Malformed {
            reason: reason.into(),
            offset,
        }
    }

    /// Schema-level failures carry no meaningful byte offset.
    fn schema(reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            reason: reason.into(),
            offset: 0,
        }
    }
}

/// Any of the three record kinds, for callers that dispatch on the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Package(Package),
    Audit(Audit),
    SignedAudit(SignedAudit),
}

impl Record {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Record::Package(package) => encode_package(package),
            Record::Audit(audit) => encode_audit(audit),
            Record::SignedAudit(signed) => encode_signed_audit(signed),
        }
    }

    /// Decodes whichever record kind the bytes carry.
    ///
    /// A well-formed tuple with an unknown tag is an
    /// [`CodecError::UnrecognizedRecord`]; anything else that fails to
    /// parse is malformed.
    pub fn decode_any(bytes: &[u8]) -> Result<Record, CodecError> {
        let term = term::decode_message(bytes)?;
        match record_tag(&term)? {
            "package" => Ok(Record::Package(package_from_term(&term)?)),
            "audit" => Ok(Record::Audit(audit_from_term(&term)?)),
            "signed_audit" => Ok(Record::SignedAudit(signed_audit_from_term(&term)?)),
            other => Err(CodecError::UnrecognizedRecord(other.to_string())),
        }
    }
}

pub fn encode_package(package: &Package) -> Vec<u8> {
    term::encode_message(&package_term(package))
}

pub fn decode_package(bytes: &[u8]) -> Result<Package, CodecError> {
    package_from_term(&term::decode_message(bytes)?)
}

pub fn encode_audit(audit: &Audit) -> Vec<u8> {
    term::encode_message(&audit_term(audit))
}

pub fn decode_audit(bytes: &[u8]) -> Result<Audit, CodecError> {
    audit_from_term(&term::decode_message(bytes)?)
}

pub fn encode_signed_audit(signed: &SignedAudit) -> Vec<u8> {
    term::encode_message(&signed_audit_term(signed))
}

pub fn decode_signed_audit(bytes: &[u8]) -> Result<SignedAudit, CodecError> {
    signed_audit_from_term(&term::decode_message(bytes)?)
}

// =============================================================================
// Record schemas over terms
// =============================================================================

const NO_VALUE: &str = "undefined";
const DEFAULTED: &str = "default";

fn package_term(package: &Package) -> Term {
    Term::Tuple(vec![
        Term::atom("package"),
        string_field_term(&package.ecosystem),
        Term::binary(&package.name),
        Term::binary(&package.version),
    ])
}

fn audit_term(audit: &Audit) -> Term {
    Term::Tuple(vec![
        Term::atom("audit"),
        package_term(&audit.package),
        verdict_field_term(&audit.verdict),
        string_field_term(&audit.message),
        Term::binary(&audit.public_key_fingerprint),
        Term::Int(audit.created_at),
        Term::atom(if audit.audited_by_author { "true" } else { "false" }),
    ])
}

fn signed_audit_term(signed: &SignedAudit) -> Term {
    Term::Tuple(vec![
        Term::atom("signed_audit"),
        audit_term(&signed.audit),
        Term::Binary(signed.signature.clone()),
    ])
}

fn package_from_term(term: &Term) -> Result<Package, CodecError> {
    let fields = record_fields(term, "package", 4)?;
    Ok(Package {
        ecosystem: string_field_from_term(&fields[1])?,
        name: string_from_term(&fields[2])?,
        version: string_from_term(&fields[3])?,
    })
}

fn audit_from_term(term: &Term) -> Result<Audit, CodecError> {
    let fields = record_fields(term, "audit", 7)?;
    Ok(Audit {
        package: package_from_term(&fields[1])?,
        verdict: verdict_field_from_term(&fields[2])?,
        message: string_field_from_term(&fields[3])?,
        public_key_fingerprint: string_from_term(&fields[4])?,
        created_at: int_from_term(&fields[5])?,
        audited_by_author: bool_from_term(&fields[6])?,
    })
}

fn signed_audit_from_term(term: &Term) -> Result<SignedAudit, CodecError> {
    let fields = record_fields(term, "signed_audit", 3)?;
    let signature = match &fields[2] {
        Term::Binary(bytes) => bytes.clone(),
        _ => return Err(CodecError::schema("signature is not a binary")),
    };
    Ok(SignedAudit {
        audit: audit_from_term(&fields[1])?,
        signature,
    })
}

fn record_tag(term: &Term) -> Result<&str, CodecError> {
    match term {
        Term::Tuple(fields) => match fields.first() {
            Some(Term::Atom(tag)) => Ok(tag),
            _ => Err(CodecError::schema("record tag is not an atom")),
        },
        _ => Err(CodecError::schema("record is not a tuple")),
    }
}

fn record_fields<'a>(
    term: &'a Term,
    expected_tag: &str,
    arity: usize,
) -> Result<&'a [Term], CodecError> {
    let tag = record_tag(term)?;
    if tag != expected_tag {
        return Err(CodecError::schema(format!(
            "expected {} record, found {}",
            expected_tag, tag
        )));
    }
    match term {
        Term::Tuple(fields) if fields.len() == arity => Ok(fields),
        Term::Tuple(fields) => Err(CodecError::schema(format!(
            "{} record has arity {}, expected {}",
            expected_tag,
            fields.len(),
            arity
        ))),
        _ => unreachable!("record_tag accepted a non-tuple"),
    }
}

// Normalization point: both representations collapse to String here, so
// callers never observe a charlist.
fn string_from_term(term: &Term) -> Result<String, CodecError> {
    let bytes = match term {
        Term::Binary(bytes) | Term::Charlist(bytes) => bytes,
        _ => return Err(CodecError::schema("expected a string")),
    };
    String::from_utf8(bytes.clone())
        .map_err(|_| CodecError::schema("string is not valid utf-8"))
}

fn string_field_term(field: &Field<String>) -> Term {
    match field {
        Field::Unset => Term::atom(NO_VALUE),
        Field::Default => Term::atom(DEFAULTED),
        Field::Present(value) => Term::binary(value),
    }
}

fn string_field_from_term(term: &Term) -> Result<Field<String>, CodecError> {
    match term {
        Term::Atom(name) if name == NO_VALUE => Ok(Field::Unset),
        Term::Atom(name) if name == DEFAULTED => Ok(Field::Default),
        Term::Atom(name) => Err(CodecError::schema(format!(
            "unexpected field marker: {}",
            name
        ))),
        other => Ok(Field::Present(string_from_term(other)?)),
    }
}

fn verdict_field_term(field: &Field<Verdict>) -> Term {
    match field {
        Field::Unset => Term::atom(NO_VALUE),
        Field::Default => Term::atom(DEFAULTED),
        Field::Present(verdict) => Term::atom(verdict.as_str()),
    }
}

fn verdict_field_from_term(term: &Term) -> Result<Field<Verdict>, CodecError> {
    match term {
        Term::Atom(name) if name == NO_VALUE => Ok(Field::Unset),
        Term::Atom(name) if name == DEFAULTED => Ok(Field::Default),
        Term::Atom(name) => name
            .parse::<Verdict>()
            .map(Field::Present)
            .map_err(|_| CodecError::schema(format!("unknown verdict: {}", name))),
        _ => Err(CodecError::schema("verdict is not an atom")),
    }
}

fn int_from_term(term: &Term) -> Result<u64, CodecError> {
    match term {
        Term::Int(n) => Ok(*n),
        _ => Err(CodecError::schema("expected an integer")),
    }
}

fn bool_from_term(term: &Term) -> Result<bool, CodecError> {
    match term {
        Term::Atom(name) if name == "true" => Ok(true),
        Term::Atom(name) if name == "false" => Ok(false),
        _ => Err(CodecError::schema("expected a boolean")),
    }
}
