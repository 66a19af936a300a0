// Copyright (C) Microsoft Corporation. All rights reserved.

//! Certificate synthesis for freshly created keys.
//!
//! The legacy generation issues no certificates, so the adapter builds them.
//! Attestation requests are forwarded to the device; everything else gets a
//! locally assembled certificate, self-signed through the key itself when
//! policy permits and signed by a throwaway key otherwise.

use kmbridge_crypto::generate_ecc_p256;
use kmbridge_crypto::HashAlgorithm;
use kmbridge_hal_types::HalKeyFormat;
use kmbridge_x509::CertificateBuilder;
use kmbridge_x509::SignError;
use kmbridge_x509::SignatureAlgorithm;
use kmbridge_x509::SignedCertificate;
use kmbridge_x509::UnsignedCertificate;

use crate::device::Device;
use crate::error::check_hal_code;
use crate::types::convert::key_params_to_hal;
use crate::types::Algorithm;
use crate::types::Certificate;
use crate::types::Digest;
use crate::types::ErrorCode;
use crate::types::KeyParam;
use crate::types::KeyPurpose;
use crate::types::PaddingMode;
use crate::ApiError;
use crate::ApiResult;

// Fixed identity for locally built certificates. These shells are
// structurally valid but carry no verifiable provenance.
const CERT_SERIAL: u64 = 42;
const CERT_SUBJECT: &str = "CN=TODO";

const PADDING_PREFERENCE: [PaddingMode; 2] = [PaddingMode::RsaPss, PaddingMode::RsaPkcs115Sign];
const DIGEST_PREFERENCE: [Digest; 5] = [
    Digest::Sha256,
    Digest::Sha512,
    Digest::Sha384,
    Digest::Sha224,
    Digest::Sha1,
];

/// Produces the certificate chain for a key just created from `params`.
pub(crate) fn certificate_chain_for(
    device: &Device,
    params: &[KeyParam],
    key_blob: &[u8],
) -> ApiResult<Vec<Certificate>> {
    let Some(algorithm) = crate::get_tag_value!(params, Algorithm) else {
        tracing::error!("key creation parameters carry no algorithm tag");
        return Err(ApiError::Km(ErrorCode::UnknownError));
    };
    if !algorithm.is_asymmetric() {
        return Ok(Vec::new());
    }
    if crate::contains_tag_value!(params, AttestationChallenge) {
        return attested_chain(device, params, key_blob);
    }
    let certificate = build_local_certificate(device, params, key_blob, algorithm)?;
    Ok(vec![certificate])
}

/// Lets the device attest the key; the returned chain is passed on verbatim.
fn attested_chain(
    device: &Device,
    params: &[KeyParam],
    key_blob: &[u8],
) -> ApiResult<Vec<Certificate>> {
    let resp = device
        .hal()
        .attest_key(key_blob, &key_params_to_hal(params))
        .map_err(|transport_error| {
            tracing::error!(?transport_error, "transport failure during attest_key");
            ApiError::Km(ErrorCode::UnknownError)
        })?;
    check_hal_code(resp.error)?;
    Ok(resp
        .cert_chain
        .into_iter()
        .map(|encoded_certificate| Certificate {
            encoded_certificate,
        })
        .collect())
}

fn build_local_certificate(
    device: &Device,
    params: &[KeyParam],
    key_blob: &[u8],
    algorithm: Algorithm,
) -> ApiResult<Certificate> {
    let spki_der = export_public_key(device, params, key_blob)?;
    let not_before_ms = crate::get_tag_value!(params, ActiveDatetime).unwrap_or(0);
    let not_after_ms = crate::get_tag_value!(params, UsageExpireDatetime).unwrap_or(u64::MAX);
    let mut unsigned = CertificateBuilder::new(CERT_SERIAL, CERT_SUBJECT, &spki_der)
        .not_before_ms(not_before_ms)
        .not_after_ms(not_after_ms)
        .build()
        .map_err(|build_error| {
            tracing::error!(?build_error, "could not assemble the certificate shell");
            ApiError::Km(ErrorCode::UnknownError)
        })?;
    let issuer = unsigned.subject().clone();
    unsigned.set_issuer(issuer);

    let signing_purpose = params
        .iter()
        .any(|param| matches!(param, KeyParam::Purpose(KeyPurpose::Sign)));
    let signed = if signing_purpose && crate::get_bool_tag_value!(params, NoAuthRequired) {
        self_sign(device, params, key_blob, algorithm, unsigned)?
    } else {
        throwaway_sign(unsigned)?
    };
    Ok(Certificate {
        encoded_certificate: signed.into_der(),
    })
}

fn export_public_key(
    device: &Device,
    params: &[KeyParam],
    key_blob: &[u8],
) -> ApiResult<Vec<u8>> {
    let app_id = crate::get_tag_value!(params, ApplicationId).unwrap_or_default();
    let app_data = crate::get_tag_value!(params, ApplicationData).unwrap_or_default();
    let resp = device
        .hal()
        .export_key(HalKeyFormat::X509, key_blob, &app_id, &app_data)
        .map_err(|transport_error| {
            tracing::error!(?transport_error, "transport failure during export_key");
            ApiError::Km(ErrorCode::UnknownError)
        })?;
    check_hal_code(resp.error)?;
    Ok(resp.key_material)
}

/// Signs the certificate through the key itself, running a regular signing
/// operation on the device. The operation competes for the same slot pool as
/// client operations and surfaces its failures unchanged.
fn self_sign(
    device: &Device,
    params: &[KeyParam],
    key_blob: &[u8],
    algorithm: Algorithm,
    unsigned: UnsignedCertificate,
) -> ApiResult<SignedCertificate> {
    let padding = select_preferred(params, &PADDING_PREFERENCE, |param| match param {
        KeyParam::Padding(padding) => Some(*padding),
        _ => None,
    });
    let digest = select_preferred(params, &DIGEST_PREFERENCE, |param| match param {
        KeyParam::Digest(digest) => Some(*digest),
        _ => None,
    });
    let hash_algorithm = hash_for_digest(digest)?;
    let signature_algorithm = match algorithm {
        Algorithm::Rsa if padding == PaddingMode::RsaPss => {
            SignatureAlgorithm::RsaPss(hash_algorithm)
        }
        Algorithm::Rsa => SignatureAlgorithm::RsaPkcs1_5(hash_algorithm),
        Algorithm::Ec => SignatureAlgorithm::Ecdsa(hash_algorithm),
        _ => {
            tracing::error!(?algorithm, "key algorithm cannot sign a certificate");
            return Err(ApiError::Km(ErrorCode::UnknownError));
        }
    };

    let sign_params = [KeyParam::Padding(padding), KeyParam::Digest(digest)];
    let begin_result = device.begin(KeyPurpose::Sign, key_blob, &sign_params, None)?;
    let mut operation = begin_result.operation;
    unsigned
        .sign_with(signature_algorithm, move |tbs_der| {
            let mut remaining = tbs_der;
            while !remaining.is_empty() {
                let update = operation.update(&[], remaining, None, None)?;
                if update.consumed == 0 {
                    tracing::error!("device made no progress over the to-be-signed bytes");
                    return Err(ApiError::Km(ErrorCode::UnknownError));
                }
                remaining = remaining.get(update.consumed..).unwrap_or(&[]);
            }
            let finish = operation.finish(&[], &[], &[], None, None)?;
            Ok(finish.output)
        })
        .map_err(|sign_error| match sign_error {
            SignError::Build(build_error) => {
                tracing::error!(?build_error, "could not encode the certificate");
                ApiError::Km(ErrorCode::UnknownError)
            }
            SignError::Signer(api_error) => api_error,
        })
}

/// Signs the certificate with a fresh local P-256 key that is discarded
/// afterwards. Used when the key cannot sign for itself.
fn throwaway_sign(unsigned: UnsignedCertificate) -> ApiResult<SignedCertificate> {
    let key = generate_ecc_p256().map_err(|crypto_error| {
        tracing::error!(?crypto_error, "could not generate a throwaway signing key");
        ApiError::Km(ErrorCode::UnknownError)
    })?;
    unsigned
        .sign_with_key(&key, HashAlgorithm::Sha256)
        .map_err(|x509_error| {
            tracing::error!(?x509_error, "could not sign the certificate locally");
            ApiError::Km(ErrorCode::UnknownError)
        })
}

/// Picks the parameter value that appears earliest in `preferences`. Values
/// outside the preference list never win; with no candidate at all the
/// list's first entry is the default.
fn select_preferred<T: Copy + PartialEq>(
    params: &[KeyParam],
    preferences: &[T],
    project: impl Fn(&KeyParam) -> Option<T>,
) -> T {
    let mut best: Option<usize> = None;
    for param in params {
        if let Some(value) = project(param) {
            if let Some(index) = preferences.iter().position(|preferred| *preferred == value) {
                if index < best.unwrap_or(usize::MAX) {
                    best = Some(index);
                }
            }
        }
    }
    preferences[best.unwrap_or(0)]
}

fn hash_for_digest(digest: Digest) -> ApiResult<HashAlgorithm> {
    match digest {
        Digest::None | Digest::Sha256 => Ok(HashAlgorithm::Sha256),
        Digest::Sha1 => Ok(HashAlgorithm::Sha1),
        Digest::Sha224 => Ok(HashAlgorithm::Sha224),
        Digest::Sha384 => Ok(HashAlgorithm::Sha384),
        Digest::Sha512 => Ok(HashAlgorithm::Sha512),
        Digest::Md5 => {
            tracing::error!("refusing to sign a certificate over md5");
            Err(ApiError::Km(ErrorCode::UnknownError))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padding_of(param: &KeyParam) -> Option<PaddingMode> {
        match param {
            KeyParam::Padding(padding) => Some(*padding),
            _ => None,
        }
    }

    fn digest_of(param: &KeyParam) -> Option<Digest> {
        match param {
            KeyParam::Digest(digest) => Some(*digest),
            _ => None,
        }
    }

    #[test]
    fn test_preferred_padding_follows_list_order() {
        let params = vec![
            KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
            KeyParam::Padding(PaddingMode::RsaPss),
        ];
        assert_eq!(
            select_preferred(&params, &PADDING_PREFERENCE, padding_of),
            PaddingMode::RsaPss
        );
    }

    #[test]
    fn test_sole_candidate_wins_over_the_default() {
        let params = vec![KeyParam::Padding(PaddingMode::RsaPkcs115Sign)];
        assert_eq!(
            select_preferred(&params, &PADDING_PREFERENCE, padding_of),
            PaddingMode::RsaPkcs115Sign
        );
    }

    #[test]
    fn test_empty_candidate_set_falls_back_to_list_head() {
        let params = vec![KeyParam::KeySize(2048)];
        assert_eq!(
            select_preferred(&params, &PADDING_PREFERENCE, padding_of),
            PaddingMode::RsaPss
        );
        assert_eq!(
            select_preferred(&params, &DIGEST_PREFERENCE, digest_of),
            Digest::Sha256
        );
    }

    #[test]
    fn test_values_outside_the_list_never_win() {
        let params = vec![
            KeyParam::Padding(PaddingMode::RsaOaep),
            KeyParam::Padding(PaddingMode::RsaPkcs115Sign),
        ];
        assert_eq!(
            select_preferred(&params, &PADDING_PREFERENCE, padding_of),
            PaddingMode::RsaPkcs115Sign
        );
    }

    #[test]
    fn test_digest_none_signs_as_sha256() {
        assert_eq!(hash_for_digest(Digest::None), Ok(HashAlgorithm::Sha256));
        assert_eq!(hash_for_digest(Digest::Sha384), Ok(HashAlgorithm::Sha384));
        assert_eq!(
            hash_for_digest(Digest::Md5),
            Err(ApiError::Km(ErrorCode::UnknownError))
        );
    }
}
