// Copyright (C) Microsoft Corporation. All rights reserved.

//! Certificate synthesis for asymmetric key creation: the self-signed and
//! throwaway-signed local shells, algorithm selection, validity mapping, and
//! the attestation passthrough.

mod common;

use der::Decode;
use kmbridge_api::*;
use kmbridge_hal_mock::MockFailure;
use kmbridge_hal_mock::MockOp;
use kmbridge_hal_types::HalErrorCode;
use kmbridge_x509::MAX_VALIDITY_INSTANT_MS;
use openssl::x509::X509;
use spki::ObjectIdentifier;
use x509_cert::Certificate as ParsedCertificate;

use crate::common::*;

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const RSASSA_PSS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.10");

fn parse(certificate: &Certificate) -> ParsedCertificate {
    ParsedCertificate::from_der(&certificate.encoded_certificate).unwrap()
}

/// Whether the certificate's signature verifies against its own subject key.
fn self_verifies(certificate: &Certificate) -> bool {
    let parsed = X509::from_der(&certificate.encoded_certificate).unwrap();
    let key = parsed.public_key().unwrap();
    matches!(parsed.verify(&key), Ok(true))
}

#[test]
fn test_local_certificate_shape() {
    let (mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let result = device.generate_key(&ec_signing_params());
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();
    assert_eq!(created.certificate_chain.len(), 1);

    let parsed = parse(&created.certificate_chain[0]);
    assert_eq!(parsed.tbs_certificate.serial_number.as_bytes(), &[42u8][..]);
    assert_eq!(parsed.tbs_certificate.subject.to_string(), "CN=TODO");
    assert_eq!(
        parsed.tbs_certificate.issuer,
        parsed.tbs_certificate.subject
    );
    assert_eq!(parsed.signature_algorithm.oid, ECDSA_WITH_SHA256);
    assert!(self_verifies(&created.certificate_chain[0]));

    assert_eq!(mock.calls(MockOp::ExportKey), 1);
    assert_eq!(mock.calls(MockOp::Begin), 1);
    assert_eq!(mock.calls(MockOp::Finish), 1);
    assert_eq!(mock.calls(MockOp::AttestKey), 0);
    assert_eq!(mock.active_operations(), 0);
    assert_eq!(device.free_slots(), DEFAULT_OPERATION_SLOTS);
}

#[test]
fn test_rsa_certificate_signed_with_pkcs1() {
    let (_mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let result = device.generate_key(&rsa_signing_params(PaddingMode::RsaPkcs115Sign));
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();

    let parsed = parse(&created.certificate_chain[0]);
    assert_eq!(parsed.signature_algorithm.oid, SHA256_WITH_RSA);
    assert!(self_verifies(&created.certificate_chain[0]));
}

#[test]
fn test_pss_is_preferred_over_pkcs1() {
    let (_mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let mut params = rsa_signing_params(PaddingMode::RsaPkcs115Sign);
    params.push(KeyParam::Padding(PaddingMode::RsaPss));
    let result = device.generate_key(&params);
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();

    let parsed = parse(&created.certificate_chain[0]);
    assert_eq!(parsed.signature_algorithm.oid, RSASSA_PSS);
    assert!(self_verifies(&created.certificate_chain[0]));
}

#[test]
fn test_digest_choice_follows_the_preference_order() {
    let (_mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let mut params: Vec<KeyParam> = ec_signing_params()
        .into_iter()
        .filter(|param| !matches!(param, KeyParam::Digest(_)))
        .collect();
    params.push(KeyParam::Digest(Digest::Sha1));
    params.push(KeyParam::Digest(Digest::Sha512));
    let result = device.generate_key(&params);
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();

    let parsed = parse(&created.certificate_chain[0]);
    assert_eq!(parsed.signature_algorithm.oid, ECDSA_WITH_SHA512);
    assert!(self_verifies(&created.certificate_chain[0]));
}

#[test]
fn test_digest_none_signs_as_sha256() {
    let (_mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let mut params: Vec<KeyParam> = ec_signing_params()
        .into_iter()
        .filter(|param| !matches!(param, KeyParam::Digest(_)))
        .collect();
    params.push(KeyParam::Digest(Digest::None));
    let result = device.generate_key(&params);
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();

    let parsed = parse(&created.certificate_chain[0]);
    assert_eq!(parsed.signature_algorithm.oid, ECDSA_WITH_SHA256);
    assert!(self_verifies(&created.certificate_chain[0]));
}

#[test]
fn test_auth_bound_key_gets_a_throwaway_signature() {
    let (mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let params: Vec<KeyParam> = ec_signing_params()
        .into_iter()
        .filter(|param| !matches!(param, KeyParam::NoAuthRequired))
        .collect();
    let result = device.generate_key(&params);
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();
    assert_eq!(created.certificate_chain.len(), 1);

    // The key cannot sign without an auth token, so a one-off local key
    // signs the shell and the signature does not chain to the subject.
    assert_eq!(mock.calls(MockOp::Begin), 0);
    let parsed = parse(&created.certificate_chain[0]);
    assert_eq!(
        parsed.tbs_certificate.issuer,
        parsed.tbs_certificate.subject
    );
    assert!(!self_verifies(&created.certificate_chain[0]));
}

#[test]
fn test_export_honors_application_binding() {
    let (mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let mut params: Vec<KeyParam> = ec_signing_params()
        .into_iter()
        .filter(|param| !matches!(param, KeyParam::NoAuthRequired))
        .collect();
    params.push(KeyParam::ApplicationId(b"app".to_vec()));
    params.push(KeyParam::ApplicationData(b"data".to_vec()));
    let result = device.generate_key(&params);
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();

    assert_eq!(created.certificate_chain.len(), 1);
    assert_eq!(mock.calls(MockOp::ExportKey), 1);
    assert_eq!(mock.calls(MockOp::Begin), 0);
}

#[test]
fn test_validity_follows_the_key_parameters() {
    let (_mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let mut params = ec_signing_params();
    params.push(KeyParam::ActiveDatetime(1_600_000_000_000));
    params.push(KeyParam::UsageExpireDatetime(1_700_000_000_000));
    let result = device.generate_key(&params);
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();

    let parsed = parse(&created.certificate_chain[0]);
    let validity = &parsed.tbs_certificate.validity;
    assert_eq!(validity.not_before.to_unix_duration().as_secs(), 1_600_000_000);
    assert_eq!(validity.not_after.to_unix_duration().as_secs(), 1_700_000_000);
}

#[test]
fn test_validity_defaults_span_forever() {
    let (_mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let result = device.generate_key(&ec_signing_params());
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();

    let parsed = parse(&created.certificate_chain[0]);
    let validity = &parsed.tbs_certificate.validity;
    assert_eq!(validity.not_before.to_unix_duration().as_secs(), 0);
    assert_eq!(
        validity.not_after.to_unix_duration().as_millis() as u64,
        MAX_VALIDITY_INSTANT_MS
    );
}

#[test]
fn test_attested_chain_is_passed_through() {
    let (mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    let mut params = ec_signing_params();
    params.push(KeyParam::AttestationChallenge(b"challenge".to_vec()));
    let result = device.generate_key(&params);
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();

    assert_eq!(created.certificate_chain.len(), 3);
    assert_eq!(mock.calls(MockOp::AttestKey), 1);
    assert_eq!(mock.calls(MockOp::ExportKey), 0);
    assert_eq!(mock.calls(MockOp::Begin), 0);

    let leaf = X509::from_der(&created.certificate_chain[0].encoded_certificate).unwrap();
    let ca = X509::from_der(&created.certificate_chain[1].encoded_certificate).unwrap();
    let root = X509::from_der(&created.certificate_chain[2].encoded_certificate).unwrap();
    assert!(leaf.verify(&ca.public_key().unwrap()).unwrap());
    assert!(ca.verify(&root.public_key().unwrap()).unwrap());
    assert!(root.verify(&root.public_key().unwrap()).unwrap());
}

#[test]
fn test_attestation_errors_pass_through_verbatim() {
    let (mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    mock.fail_next(MockOp::AttestKey, MockFailure::Code(HalErrorCode(-777)));
    let mut params = ec_signing_params();
    params.push(KeyParam::AttestationChallenge(b"challenge".to_vec()));
    let result = device.generate_key(&params);
    assert_eq!(result.unwrap_err(), ApiError::Km(ErrorCode(-777)));
    assert_eq!(mock.calls(MockOp::DeleteKey), 1);
    assert_eq!(mock.key_count(), 0);
}

#[test]
fn test_attestation_transport_failure_maps_to_unknown_error() {
    let (mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    mock.fail_next(MockOp::AttestKey, MockFailure::Transport);
    let mut params = ec_signing_params();
    params.push(KeyParam::AttestationChallenge(b"challenge".to_vec()));
    let result = device.generate_key(&params);
    assert_eq!(result.unwrap_err(), ApiError::Km(ErrorCode::UnknownError));
    assert_eq!(mock.calls(MockOp::DeleteKey), 1);
    assert_eq!(mock.key_count(), 0);
}

#[test]
fn test_stalled_signing_aborts_the_nested_operation() {
    let (mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    mock.limit_next_update(0);
    let result = device.generate_key(&ec_signing_params());
    assert_eq!(result.unwrap_err(), ApiError::Km(ErrorCode::UnknownError));
    assert_eq!(mock.calls(MockOp::Abort), 1);
    assert_eq!(mock.active_operations(), 0);
    assert_eq!(mock.calls(MockOp::DeleteKey), 1);
    assert_eq!(mock.key_count(), 0);
    assert_eq!(device.free_slots(), DEFAULT_OPERATION_SLOTS);
}

#[test]
fn test_signing_resubmits_unconsumed_bytes() {
    let (mock, device) = mock_device(SecurityLevel::TrustedEnvironment);

    mock.limit_next_update(10);
    let result = device.generate_key(&ec_signing_params());
    assert!(result.is_ok(), "result {:?}", result);
    let created = result.unwrap();

    assert_eq!(mock.calls(MockOp::Update), 2);
    assert!(self_verifies(&created.certificate_chain[0]));
}
