//! X.509 helpers for certificate mode.
//!
//! A certificate is identified by `MD5(issuer + serial)` in lowercase hex,
//! where `issuer` is the issuer distinguished name rendered the way the
//! gateway renders it (most specific RDN first, short names for the common
//! attributes, `oid=#hex` for anything else) and `serial` is the certificate
//! serial number in decimal.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::DecodePublicKey;
use rsa::{BigUint, RsaPublicKey};
use x509_cert::der::asn1::{AnyRef, PrintableStringRef, Utf8StringRef};
use x509_cert::der::oid::ObjectIdentifier;
use x509_cert::der::{Decode, DecodePem, Encode, Tag, Tagged};
use x509_cert::Certificate;

use crate::error::{GatewayError, GatewayResult};

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

const OID_COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_PROVINCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_STREET: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");
const OID_POSTAL_CODE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.17");
const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");

const OID_SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");

/// A certificate's serial number together with its RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateIdentity {
    pub sn: String,
    pub public_key: RsaPublicKey,
}

impl CertificateIdentity {
    /// Parse a certificate and derive its identity.
    pub fn from_pem(text: &str) -> GatewayResult<Self> {
        let cert = parse_certificate(text)?;
        Ok(Self {
            sn: cert_sn(&cert)?,
            public_key: public_key_of(&cert)?,
        })
    }
}

/// Parse a single certificate from PEM or a bare base64 DER body.
pub fn parse_certificate(text: &str) -> GatewayResult<Certificate> {
    let text = text.trim();
    if text.starts_with("-----BEGIN") {
        return Certificate::from_pem(text).map_err(|e| GatewayError::CertificateParse {
            message: format!("invalid certificate PEM: {}", e),
        });
    }

    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let der = BASE64
        .decode(compact)
        .map_err(|e| GatewayError::CertificateParse {
            message: format!("certificate is neither PEM nor base64 DER: {}", e),
        })?;
    Certificate::from_der(&der).map_err(|e| GatewayError::CertificateParse {
        message: format!("invalid certificate DER: {}", e),
    })
}

/// Serial number (SN) of a certificate.
pub fn cert_sn(cert: &Certificate) -> GatewayResult<String> {
    let serial = BigUint::from_bytes_be(cert.tbs_certificate.serial_number.as_bytes());
    Ok(sn_of(&issuer_name(cert)?, &serial.to_str_radix(10)))
}

/// `MD5(issuer + serial)` as lowercase hex.
pub fn sn_of(issuer: &str, serial_decimal: &str) -> String {
    format!("{:x}", md5::compute(format!("{}{}", issuer, serial_decimal)))
}

/// Parse a certificate and return its SN.
pub fn cert_sn_from_pem(text: &str) -> GatewayResult<String> {
    cert_sn(&parse_certificate(text)?)
}

/// SN of a root bundle: the SNs of every RSA-signed certificate in it,
/// joined with `_` in document order.
///
/// Text outside the PEM blocks is ignored. Blocks that fail to parse or use
/// another signature algorithm are skipped.
pub fn root_cert_sn(bundle: &str) -> GatewayResult<String> {
    let mut sns = Vec::new();
    for block in bundle.split(PEM_END) {
        let Some(begin) = block.find(PEM_BEGIN) else {
            continue;
        };
        let pem = format!("{}\n{}\n", block[begin..].trim_end(), PEM_END);
        let cert = match parse_certificate(&pem) {
            Ok(cert) => cert,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparsable root bundle entry");
                continue;
            }
        };

        let algorithm = cert.signature_algorithm.oid;
        if algorithm == OID_SHA1_WITH_RSA || algorithm == OID_SHA256_WITH_RSA {
            sns.push(cert_sn(&cert)?);
        } else {
            tracing::debug!(%algorithm, "skipping non-RSA root certificate");
        }
    }

    if sns.is_empty() {
        return Err(GatewayError::CertificateParse {
            message: "root bundle contains no RSA-signed certificate".to_string(),
        });
    }
    Ok(sns.join("_"))
}

/// RSA public key carried by a certificate.
pub fn public_key_of(cert: &Certificate) -> GatewayResult<RsaPublicKey> {
    let spki = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| GatewayError::CertificateParse {
            message: format!("cannot encode subject public key: {}", e),
        })?;
    RsaPublicKey::from_public_key_der(&spki).map_err(|e| GatewayError::CertificateParse {
        message: format!("certificate does not carry an RSA key: {}", e),
    })
}

// ==================== Issuer name rendering ====================

/// Render the issuer DN in the gateway's string form.
pub fn issuer_name(cert: &Certificate) -> GatewayResult<String> {
    let mut name = NameFields::default();
    for rdn in cert.tbs_certificate.issuer.0.iter() {
        for atv in rdn.0.iter() {
            name.push(atv.oid, AnyRef::from(&atv.value))?;
        }
    }
    Ok(name.render())
}

/// Attributes grouped the way the gateway groups them before rendering.
#[derive(Default)]
struct NameFields {
    country: Vec<String>,
    province: Vec<String>,
    locality: Vec<String>,
    street: Vec<String>,
    postal_code: Vec<String>,
    organization: Vec<String>,
    organizational_unit: Vec<String>,
    common_name: Option<String>,
    serial_number: Option<String>,
    // Rendered `oid=#hex` entries, in order of appearance.
    extra: Vec<String>,
}

impl NameFields {
    fn push(&mut self, oid: ObjectIdentifier, value: AnyRef<'_>) -> GatewayResult<()> {
        let Some(text) = decode_string(value) else {
            if !is_standard(oid) {
                self.extra.push(render_extra(oid, value, None)?);
            }
            return Ok(());
        };

        match oid {
            o if o == OID_COUNTRY => self.country.push(text),
            o if o == OID_PROVINCE => self.province.push(text),
            o if o == OID_LOCALITY => self.locality.push(text),
            o if o == OID_STREET => self.street.push(text),
            o if o == OID_POSTAL_CODE => self.postal_code.push(text),
            o if o == OID_ORGANIZATION => self.organization.push(text),
            o if o == OID_ORGANIZATIONAL_UNIT => self.organizational_unit.push(text),
            o if o == OID_COMMON_NAME => self.common_name = Some(text),
            o if o == OID_SERIAL_NUMBER => self.serial_number = Some(text),
            _ => self.extra.push(render_extra(oid, value, Some(&text))?),
        }
        Ok(())
    }

    fn render(&self) -> String {
        // Least specific first; reversed on output.
        let mut rdns: Vec<String> = Vec::new();
        let mut group = |short: &str, values: &[String]| {
            if !values.is_empty() {
                let joined = values
                    .iter()
                    .map(|v| format!("{}={}", short, escape_value(v)))
                    .collect::<Vec<_>>()
                    .join("+");
                rdns.push(joined);
            }
        };

        group("C", &self.country);
        group("ST", &self.province);
        group("L", &self.locality);
        group("STREET", &self.street);
        group("POSTALCODE", &self.postal_code);
        group("O", &self.organization);
        group("OU", &self.organizational_unit);
        if let Some(cn) = self.common_name.as_ref().filter(|v| !v.is_empty()) {
            group("CN", std::slice::from_ref(cn));
        }
        if let Some(serial) = self.serial_number.as_ref().filter(|v| !v.is_empty()) {
            group("SERIALNUMBER", std::slice::from_ref(serial));
        }

        let mut parts: Vec<&str> = rdns.iter().rev().map(String::as_str).collect();
        parts.extend(self.extra.iter().rev().map(String::as_str));
        parts.join(",")
    }
}

fn is_standard(oid: ObjectIdentifier) -> bool {
    [
        OID_COUNTRY,
        OID_PROVINCE,
        OID_LOCALITY,
        OID_STREET,
        OID_POSTAL_CODE,
        OID_ORGANIZATION,
        OID_ORGANIZATIONAL_UNIT,
        OID_COMMON_NAME,
        OID_SERIAL_NUMBER,
    ]
    .contains(&oid)
}

/// Decode a directory string value.
fn decode_string(value: AnyRef<'_>) -> Option<String> {
    let bytes = value.value();
    match value.tag() {
        Tag::PrintableString
        | Tag::Utf8String
        | Tag::Ia5String
        | Tag::TeletexString
        | Tag::NumericString
        | Tag::VisibleString => Some(String::from_utf8_lossy(bytes).into_owned()),
        Tag::BmpString => {
            if bytes.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).ok()
        }
        _ => None,
    }
}

/// `oid=#hex(DER)` for a non-standard attribute.
///
/// String values are re-encoded as PrintableString when every character
/// allows it, UTF8String otherwise.
fn render_extra(
    oid: ObjectIdentifier,
    value: AnyRef<'_>,
    text: Option<&str>,
) -> GatewayResult<String> {
    let der = match text {
        Some(text) => match PrintableStringRef::new(text) {
            Ok(printable) => printable.to_der(),
            Err(_) => Utf8StringRef::new(text).and_then(|utf8| utf8.to_der()),
        },
        None => value.to_der(),
    }
    .map_err(|e| GatewayError::CertificateParse {
        message: format!("cannot encode issuer attribute {}: {}", oid, e),
    })?;
    Ok(format!("{}=#{}", oid, hex::encode(der)))
}

fn escape_value(value: &str) -> String {
    let last = value.len().saturating_sub(1);
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.char_indices() {
        let escape = match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' => true,
            ' ' => i == 0 || i == last,
            '#' => i == 0,
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
