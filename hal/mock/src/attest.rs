// Copyright (C) Microsoft Corporation. All rights reserved.

//! Attestation identity of the mock device.
//!
//! The identity is a two-level CA: a self-signed root and an intermediate
//! that signs per-key attestation leaves. Both are generated on first use,
//! so a freshly constructed mock pays nothing until `attest_key` is called.

use openssl::pkey::PKey;
use openssl::pkey::Private;
use thiserror::Error;

use kmbridge_crypto::generate_ecc_p256;
use kmbridge_crypto::public_key_der;
use kmbridge_crypto::CryptoError;
use kmbridge_crypto::HashAlgorithm;
use kmbridge_x509::CertificateBuilder;
use kmbridge_x509::KeyUsageOptions;
use kmbridge_x509::Name;
use kmbridge_x509::X509Error;

const ROOT_SUBJECT: &str = "CN=kmbridge mock attestation root";
const CA_SUBJECT: &str = "CN=kmbridge mock attestation ca";
const LEAF_SUBJECT: &str = "CN=kmbridge mock attested key";

const ROOT_SERIAL: u64 = 1;
const CA_SERIAL: u64 = 2;

#[derive(Error, Debug)]
pub(crate) enum AttestError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    X509(#[from] X509Error),
}

pub(crate) struct AttestIdentity {
    ca_key: PKey<Private>,
    ca_subject: Name,
    ca_der: Vec<u8>,
    root_der: Vec<u8>,
}

impl AttestIdentity {
    pub(crate) fn generate() -> Result<Self, AttestError> {
        let root_key = generate_ecc_p256()?;
        let root_spki = public_key_der(&root_key)?;
        let mut root = CertificateBuilder::new(ROOT_SERIAL, ROOT_SUBJECT, &root_spki)
            .ca(None)
            .key_usage(KeyUsageOptions {
                key_cert_sign: true,
                ..KeyUsageOptions::default()
            })
            .build()?;
        let root_subject = root.subject().clone();
        root.set_issuer(root_subject.clone());
        let root_der = root
            .sign_with_key(&root_key, HashAlgorithm::Sha256)?
            .into_der();

        let ca_key = generate_ecc_p256()?;
        let ca_spki = public_key_der(&ca_key)?;
        let mut ca = CertificateBuilder::new(CA_SERIAL, CA_SUBJECT, &ca_spki)
            .ca(Some(0))
            .key_usage(KeyUsageOptions {
                key_cert_sign: true,
                ..KeyUsageOptions::default()
            })
            .build()?;
        let ca_subject = ca.subject().clone();
        ca.set_issuer(root_subject);
        let ca_der = ca.sign_with_key(&root_key, HashAlgorithm::Sha256)?.into_der();

        Ok(AttestIdentity {
            ca_key,
            ca_subject,
            ca_der,
            root_der,
        })
    }

    /// Issues an attestation leaf over the given subject public key and
    /// returns the full chain, leaf first.
    pub(crate) fn issue_chain(
        &self,
        serial: u64,
        subject_spki: &[u8],
    ) -> Result<Vec<Vec<u8>>, AttestError> {
        let mut leaf = CertificateBuilder::new(serial, LEAF_SUBJECT, subject_spki).build()?;
        leaf.set_issuer(self.ca_subject.clone());
        let leaf_der = leaf
            .sign_with_key(&self.ca_key, HashAlgorithm::Sha256)?
            .into_der();
        Ok(vec![leaf_der, self.ca_der.clone(), self.root_der.clone()])
    }
}
