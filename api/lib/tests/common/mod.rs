// Copyright (C) Microsoft Corporation. All rights reserved.

//! Shared fixtures for the adapter integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Once;

use tracing_subscriber::EnvFilter;

use kmbridge_api::types::convert::security_level_to_hal;
use kmbridge_api::*;
use kmbridge_hal_interface::HalDevice;
use kmbridge_hal_mock::HalMock;

static INIT_TRACING: Once = Once::new();

/// Installs the test tracing subscriber once per process. `RUST_LOG`
/// selects verbosity; without it everything at debug and up is captured.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Mock-backed device at the given level, with the mock kept around for
/// failure injection and call inspection.
pub fn mock_device(level: SecurityLevel) -> (Arc<HalMock>, Device) {
    init_tracing();
    let mock = Arc::new(HalMock::new(security_level_to_hal(level)));
    let hal: Arc<dyn HalDevice> = mock.clone();
    let device = Device::new(hal, level);
    (mock, device)
}

/// Creation parameters for a P-256 key that can sign its own certificate.
pub fn ec_signing_params() -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Ec),
        KeyParam::EcCurve(EcCurve::P256),
        KeyParam::KeySize(256),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::NoAuthRequired,
    ]
}

/// Creation parameters for a 2048-bit RSA key that can sign its own
/// certificate with the given padding.
pub fn rsa_signing_params(padding: PaddingMode) -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Rsa),
        KeyParam::KeySize(2048),
        KeyParam::RsaPublicExponent(65_537),
        KeyParam::Purpose(KeyPurpose::Sign),
        KeyParam::Digest(Digest::Sha256),
        KeyParam::Padding(padding),
        KeyParam::NoAuthRequired,
    ]
}

/// Creation parameters for an AES-256 key usable for cipher operations.
pub fn aes_params() -> Vec<KeyParam> {
    vec![
        KeyParam::Algorithm(Algorithm::Aes),
        KeyParam::KeySize(256),
        KeyParam::Purpose(KeyPurpose::Encrypt),
        KeyParam::Purpose(KeyPurpose::Decrypt),
        KeyParam::BlockMode(BlockMode::Ctr),
        KeyParam::NoAuthRequired,
    ]
}

/// Creates an AES key and returns its blob, asserting success.
pub fn create_aes_key(device: &Device) -> Vec<u8> {
    let result = device.generate_key(&aes_params());
    assert!(result.is_ok(), "result {:?}", result);
    result.unwrap().key_blob
}

/// Pulls the error out of a result whose success payload is not `Debug`.
pub fn error_of<T>(result: Result<T, ApiError>) -> ApiError {
    match result {
        Ok(_) => panic!("call unexpectedly succeeded"),
        Err(error) => error,
    }
}
