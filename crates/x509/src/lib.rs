// Copyright (C) Microsoft Corporation. All rights reserved.

//! This module implements assembly and signing of X509 certificates.
//!
//! Unlike a conventional builder, signing is split from assembly so that the
//! signature can be produced by an external signer (for example a hardware
//! operation) over the exact `TBSCertificate` encoding:
//!
//! - [`CertificateBuilder`] collects the certificate contents and produces an
//!   [`UnsignedCertificate`].
//! - [`UnsignedCertificate::sign_with`] hands the DER-encoded `TBSCertificate`
//!   to a caller-supplied closure and splices the returned signature into the
//!   final certificate.
//! - [`UnsignedCertificate::sign_with_key`] is the local-key shortcut for the
//!   same flow.

#![warn(missing_docs)]

use std::str::FromStr;
use std::time::Duration;

use der::asn1::BitString;
use der::asn1::GeneralizedTime;
use der::asn1::Null;
use der::asn1::OctetString;
use der::Any;
use der::DateTime;
use der::Decode;
use der::Encode;
use der::Sequence;
use openssl::pkey::HasPrivate;
use openssl::pkey::Id;
use openssl::pkey::PKeyRef;
use spki::AlgorithmIdentifierOwned;
use spki::ObjectIdentifier;
use spki::SubjectPublicKeyInfoOwned;
use thiserror::Error;
use x509_cert::certificate::Version;
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::ext::pkix::KeyUsage;
use x509_cert::ext::pkix::KeyUsages;
use x509_cert::ext::Extension;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;
use x509_cert::time::Validity;
use x509_cert::Certificate;
use x509_cert::TbsCertificate;

use kmbridge_crypto::hash;
use kmbridge_crypto::sign_digest;
use kmbridge_crypto::CryptoError;
use kmbridge_crypto::HashAlgorithm;
use kmbridge_crypto::RsaPadding;

pub use x509_cert::name::Name;

/// Latest validity instant RFC 5280 can express, 9999-12-31T23:59:59Z as
/// milliseconds since the UNIX epoch. Later instants are clamped to this.
pub const MAX_VALIDITY_INSTANT_MS: u64 = 253_402_300_799_000;

const ECDSA_WITH_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");
const ECDSA_WITH_SHA224: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.1");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
const SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const SHA224_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.14");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const RSASSA_PSS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.10");
const ID_MGF1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.8");
const ID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const ID_SHA224: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.4");
const ID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const ID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
const ID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");
const BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");
const KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");

/// Errors returned by certificate assembly and signing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum X509Error {
    /// The subject public key is not a DER SubjectPublicKeyInfo.
    #[error("failed to parse subject public key info")]
    SpkiParseError,

    /// The subject string is not a parsable distinguished name.
    #[error("failed to parse distinguished name")]
    NameParseError,

    /// A validity instant could not be expressed as an ASN.1 time.
    #[error("validity instant out of range")]
    ValidityRangeError,

    /// The serial number was rejected by the encoder.
    #[error("serial number rejected")]
    SerialNumberError,

    /// Signing was attempted before an issuer was set.
    #[error("issuer not set before signing")]
    MissingIssuer,

    /// DER assembly of the certificate failed.
    #[error("DER encoding failed")]
    DerEncodeError,

    /// Signing with the supplied local key failed.
    #[error("signing failed")]
    SigningError,

    /// The supplied local key type cannot sign certificates.
    #[error("unsupported key type")]
    UnsupportedKeyType,
}

/// Errors returned by [`UnsignedCertificate::sign_with`], separating assembly
/// failures from failures of the caller-supplied signer.
#[derive(Error, Debug)]
pub enum SignError<E> {
    /// Certificate assembly failed before or after invoking the signer.
    #[error("certificate assembly failed: {0}")]
    Build(#[from] X509Error),

    /// The caller-supplied signer returned an error.
    #[error("external signer failed")]
    Signer(E),
}

/// Signature algorithm recorded in the certificate, with the digest it
/// covers. The identifier is written to both the `TBSCertificate` signature
/// field and the outer `signatureAlgorithm` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 over the given digest.
    RsaPkcs1_5(HashAlgorithm),

    /// RSASSA-PSS over the given digest, with MGF1 over the same digest and
    /// a salt length equal to the digest length.
    RsaPss(HashAlgorithm),

    /// ECDSA over the given digest.
    Ecdsa(HashAlgorithm),
}

impl SignatureAlgorithm {
    /// Digest covered by this algorithm.
    pub fn hash(self) -> HashAlgorithm {
        match self {
            SignatureAlgorithm::RsaPkcs1_5(hash_algorithm)
            | SignatureAlgorithm::RsaPss(hash_algorithm)
            | SignatureAlgorithm::Ecdsa(hash_algorithm) => hash_algorithm,
        }
    }

    /// X509 AlgorithmIdentifier for this algorithm. PKCS#1 v1.5 identifiers
    /// carry NULL parameters, ECDSA identifiers carry none, and RSASSA-PSS
    /// identifiers carry explicit [`RsaPssParams`].
    pub fn algorithm_identifier(self) -> Result<AlgorithmIdentifierOwned, X509Error> {
        match self {
            SignatureAlgorithm::Ecdsa(hash_algorithm) => Ok(AlgorithmIdentifierOwned {
                oid: match hash_algorithm {
                    HashAlgorithm::Sha1 => ECDSA_WITH_SHA1,
                    HashAlgorithm::Sha224 => ECDSA_WITH_SHA224,
                    HashAlgorithm::Sha256 => ECDSA_WITH_SHA256,
                    HashAlgorithm::Sha384 => ECDSA_WITH_SHA384,
                    HashAlgorithm::Sha512 => ECDSA_WITH_SHA512,
                },
                parameters: None,
            }),
            SignatureAlgorithm::RsaPkcs1_5(hash_algorithm) => Ok(AlgorithmIdentifierOwned {
                oid: match hash_algorithm {
                    HashAlgorithm::Sha1 => SHA1_WITH_RSA,
                    HashAlgorithm::Sha224 => SHA224_WITH_RSA,
                    HashAlgorithm::Sha256 => SHA256_WITH_RSA,
                    HashAlgorithm::Sha384 => SHA384_WITH_RSA,
                    HashAlgorithm::Sha512 => SHA512_WITH_RSA,
                },
                parameters: Some(Any::from(Null)),
            }),
            SignatureAlgorithm::RsaPss(hash_algorithm) => {
                let params_der = RsaPssParams::for_hash(hash_algorithm)?
                    .to_der()
                    .map_err(|der_error| {
                        tracing::error!(?der_error);
                        X509Error::DerEncodeError
                    })?;
                let parameters = Any::from_der(&params_der).map_err(|der_error| {
                    tracing::error!(?der_error);
                    X509Error::DerEncodeError
                })?;
                Ok(AlgorithmIdentifierOwned {
                    oid: RSASSA_PSS,
                    parameters: Some(parameters),
                })
            }
        }
    }
}

/// RSASSA-PSS-params per RFC 4055. Fields at their DER DEFAULT are omitted,
/// which is why every field is optional.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct RsaPssParams {
    /// Digest applied to the message, absent for SHA-1.
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub hash_algorithm: Option<AlgorithmIdentifierOwned>,

    /// Mask generation function, absent for MGF1 with SHA-1.
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub mask_gen_algorithm: Option<AlgorithmIdentifierOwned>,

    /// Salt length in bytes, absent for 20.
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    pub salt_length: Option<u8>,

    /// Trailer field, always absent here (DEFAULT 1).
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", optional = "true")]
    pub trailer_field: Option<u8>,
}

impl RsaPssParams {
    fn for_hash(hash_algorithm: HashAlgorithm) -> Result<Self, X509Error> {
        let digest_identifier = AlgorithmIdentifierOwned {
            oid: match hash_algorithm {
                HashAlgorithm::Sha1 => ID_SHA1,
                HashAlgorithm::Sha224 => ID_SHA224,
                HashAlgorithm::Sha256 => ID_SHA256,
                HashAlgorithm::Sha384 => ID_SHA384,
                HashAlgorithm::Sha512 => ID_SHA512,
            },
            parameters: Some(Any::from(Null)),
        };
        let digest_der = digest_identifier.to_der().map_err(|der_error| {
            tracing::error!(?der_error);
            X509Error::DerEncodeError
        })?;
        let mgf1_parameters = Any::from_der(&digest_der).map_err(|der_error| {
            tracing::error!(?der_error);
            X509Error::DerEncodeError
        })?;
        Ok(RsaPssParams {
            hash_algorithm: Some(digest_identifier),
            mask_gen_algorithm: Some(AlgorithmIdentifierOwned {
                oid: ID_MGF1,
                parameters: Some(mgf1_parameters),
            }),
            salt_length: Some(hash_algorithm.size() as u8),
            trailer_field: None,
        })
    }
}

/// Key usage bits to record in the certificate. All false leaves the
/// extension out entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsageOptions {
    /// digitalSignature
    pub digital_signature: bool,

    /// keyCertSign
    pub key_cert_sign: bool,

    /// cRLSign
    pub crl_sign: bool,
}

/// Collects certificate contents. All fallible work happens in
/// [`CertificateBuilder::build`].
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    serial: u64,
    subject: String,
    spki_der: Vec<u8>,
    not_before_ms: u64,
    not_after_ms: u64,
    is_ca: bool,
    path_len: Option<u8>,
    usage: KeyUsageOptions,
}

impl CertificateBuilder {
    /// New builder for the given serial number, subject distinguished name
    /// (for example `"CN=device"`) and DER SubjectPublicKeyInfo. Validity
    /// defaults to the full encodable range.
    pub fn new(serial: u64, subject: &str, spki_der: &[u8]) -> Self {
        CertificateBuilder {
            serial,
            subject: subject.to_string(),
            spki_der: spki_der.to_vec(),
            not_before_ms: 0,
            not_after_ms: MAX_VALIDITY_INSTANT_MS,
            is_ca: false,
            path_len: None,
            usage: KeyUsageOptions::default(),
        }
    }

    /// Start of validity, milliseconds since the UNIX epoch.
    pub fn not_before_ms(mut self, instant_ms: u64) -> Self {
        self.not_before_ms = instant_ms;
        self
    }

    /// End of validity, milliseconds since the UNIX epoch. Values past
    /// [`MAX_VALIDITY_INSTANT_MS`] are clamped.
    pub fn not_after_ms(mut self, instant_ms: u64) -> Self {
        self.not_after_ms = instant_ms;
        self
    }

    /// Mark the certificate as a CA with an optional path length constraint.
    pub fn ca(mut self, path_len: Option<u8>) -> Self {
        self.is_ca = true;
        self.path_len = path_len;
        self
    }

    /// Record key usage bits.
    pub fn key_usage(mut self, usage: KeyUsageOptions) -> Self {
        self.usage = usage;
        self
    }

    /// Parse and validate the collected contents into an unsigned
    /// certificate. The issuer still has to be set before signing.
    pub fn build(self) -> Result<UnsignedCertificate, X509Error> {
        let spki =
            SubjectPublicKeyInfoOwned::from_der(&self.spki_der).map_err(|der_error| {
                tracing::error!(?der_error);
                X509Error::SpkiParseError
            })?;
        let subject = Name::from_str(&self.subject).map_err(|der_error| {
            tracing::error!(?der_error);
            X509Error::NameParseError
        })?;
        let serial_number = serial_number_from_u64(self.serial)?;
        let validity = Validity {
            not_before: instant_ms_to_time(self.not_before_ms)?,
            not_after: instant_ms_to_time(self.not_after_ms)?,
        };
        let extensions = self.encode_extensions()?;
        Ok(UnsignedCertificate {
            serial_number,
            subject,
            issuer: None,
            validity,
            spki,
            extensions,
        })
    }

    fn encode_extensions(&self) -> Result<Option<Vec<Extension>>, X509Error> {
        let mut extensions = Vec::new();
        if self.is_ca {
            let constraints = BasicConstraints {
                ca: true,
                path_len_constraint: self.path_len,
            };
            extensions.push(raw_extension(BASIC_CONSTRAINTS, true, constraints.to_der())?);
        }
        let mut usage_flags = Vec::new();
        if self.usage.digital_signature {
            usage_flags.push(KeyUsages::DigitalSignature);
        }
        if self.usage.key_cert_sign {
            usage_flags.push(KeyUsages::KeyCertSign);
        }
        if self.usage.crl_sign {
            usage_flags.push(KeyUsages::CRLSign);
        }
        if let Some((first, rest)) = usage_flags.split_first() {
            let mut usage = KeyUsage((*first).into());
            for flag in rest {
                usage.0 |= *flag;
            }
            extensions.push(raw_extension(KEY_USAGE, true, usage.to_der())?);
        }
        if extensions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(extensions))
        }
    }
}

/// A fully assembled certificate body awaiting an issuer and a signature.
#[derive(Debug, Clone)]
pub struct UnsignedCertificate {
    serial_number: SerialNumber,
    subject: Name,
    issuer: Option<Name>,
    validity: Validity,
    spki: SubjectPublicKeyInfoOwned,
    extensions: Option<Vec<Extension>>,
}

impl UnsignedCertificate {
    /// Subject distinguished name, as parsed by the builder. Cloning this
    /// into [`UnsignedCertificate::set_issuer`] produces a self-issued
    /// certificate.
    pub fn subject(&self) -> &Name {
        &self.subject
    }

    /// Set the issuer distinguished name. Signing fails until this is done.
    pub fn set_issuer(&mut self, issuer: Name) {
        self.issuer = Some(issuer);
    }

    /// Sign the certificate with a caller-supplied signer. The closure
    /// receives the DER-encoded `TBSCertificate` and returns the signature
    /// bytes, raw for RSA and DER-encoded for ECDSA.
    pub fn sign_with<E, F>(
        self,
        algorithm: SignatureAlgorithm,
        signer: F,
    ) -> Result<SignedCertificate, SignError<E>>
    where
        F: FnOnce(&[u8]) -> Result<Vec<u8>, E>,
    {
        let issuer = self.issuer.ok_or(X509Error::MissingIssuer)?;
        let signature_algorithm = algorithm.algorithm_identifier()?;
        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: self.serial_number,
            signature: signature_algorithm.clone(),
            issuer,
            validity: self.validity,
            subject: self.subject,
            subject_public_key_info: self.spki,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: self.extensions,
        };
        let tbs_der = tbs_certificate.to_der().map_err(|der_error| {
            tracing::error!(?der_error);
            X509Error::DerEncodeError
        })?;
        let signature_bytes = signer(&tbs_der).map_err(SignError::Signer)?;
        let signature = BitString::from_bytes(&signature_bytes).map_err(|der_error| {
            tracing::error!(?der_error);
            X509Error::DerEncodeError
        })?;
        let certificate = Certificate {
            tbs_certificate,
            signature_algorithm,
            signature,
        };
        let der = certificate.to_der().map_err(|der_error| {
            tracing::error!(?der_error);
            X509Error::DerEncodeError
        })?;
        Ok(SignedCertificate { der })
    }

    /// Sign the certificate with a local key. The signature algorithm is
    /// inferred from the key type, with PKCS#1 v1.5 for RSA keys.
    pub fn sign_with_key<T: HasPrivate>(
        self,
        key: &PKeyRef<T>,
        hash_algorithm: HashAlgorithm,
    ) -> Result<SignedCertificate, X509Error> {
        let (algorithm, padding) = match key.id() {
            Id::RSA => (
                SignatureAlgorithm::RsaPkcs1_5(hash_algorithm),
                Some(RsaPadding::Pkcs1_5),
            ),
            Id::EC => (SignatureAlgorithm::Ecdsa(hash_algorithm), None),
            _ => return Err(X509Error::UnsupportedKeyType),
        };
        self.sign_with(algorithm, |tbs_der| -> Result<Vec<u8>, CryptoError> {
            let digest = hash(hash_algorithm, tbs_der)?;
            sign_digest(key, hash_algorithm, &digest, padding)
        })
        .map_err(|sign_error| match sign_error {
            SignError::Build(build_error) => build_error,
            SignError::Signer(crypto_error) => {
                tracing::error!(?crypto_error);
                X509Error::SigningError
            }
        })
    }
}

/// A signed, DER-encoded certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificate {
    der: Vec<u8>,
}

impl SignedCertificate {
    /// DER encoding of the certificate.
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// DER encoding of the certificate.
    pub fn to_der(&self) -> Vec<u8> {
        self.der.clone()
    }

    /// Consume the certificate, returning its DER encoding.
    pub fn into_der(self) -> Vec<u8> {
        self.der
    }
}

fn serial_number_from_u64(serial: u64) -> Result<SerialNumber, X509Error> {
    let bytes = serial.to_be_bytes();
    let first = bytes.iter().position(|byte| *byte != 0).unwrap_or(7);
    let mut trimmed = Vec::with_capacity(9);
    if bytes[first] & 0x80 != 0 {
        trimmed.push(0);
    }
    trimmed.extend_from_slice(&bytes[first..]);
    SerialNumber::new(&trimmed).map_err(|der_error| {
        tracing::error!(?der_error);
        X509Error::SerialNumberError
    })
}

fn instant_ms_to_time(instant_ms: u64) -> Result<Time, X509Error> {
    let clamped_ms = instant_ms.min(MAX_VALIDITY_INSTANT_MS);
    let seconds = Duration::from_secs(clamped_ms / 1000);
    let date_time = DateTime::from_unix_duration(seconds).map_err(|der_error| {
        tracing::error!(?der_error);
        X509Error::ValidityRangeError
    })?;
    Ok(Time::GeneralTime(GeneralizedTime::from_date_time(date_time)))
}

fn raw_extension(
    extn_id: ObjectIdentifier,
    critical: bool,
    body: Result<Vec<u8>, der::Error>,
) -> Result<Extension, X509Error> {
    let body_der = body.map_err(|der_error| {
        tracing::error!(?der_error);
        X509Error::DerEncodeError
    })?;
    let extn_value = OctetString::new(body_der).map_err(|der_error| {
        tracing::error!(?der_error);
        X509Error::DerEncodeError
    })?;
    Ok(Extension {
        extn_id,
        critical,
        extn_value,
    })
}

// ================================= Tests ================================== //
