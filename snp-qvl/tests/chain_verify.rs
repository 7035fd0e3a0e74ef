// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Integration test: verify a synthetic VCEK certificate chain end-to-end

use p384::ecdsa::{signature::Signer as _, Signature, SigningKey};
use p384::pkcs8::DecodePrivateKey as _;
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DnType, IsCa, KeyPair,
    PKCS_ECDSA_P384_SHA384,
};
use snp_qvl::report::{
    AttestationReport, EcdsaSignature, TcbVersion, REPORT_SIZE, SIGNED_MESSAGE_SIZE,
    SIG_ALGO_ECDSA_P384_SHA384,
};
use snp_qvl::verify;

const CHIP_ID: [u8; 64] = [0x42; 64];

fn test_tcb() -> TcbVersion {
    TcbVersion {
        boot_loader: 3,
        tee: 0,
        reserved: [0; 4],
        snp: 8,
        microcode: 115,
    }
}

struct TestChain {
    ark_der: Vec<u8>,
    ask_der: Vec<u8>,
    vcek_der: Vec<u8>,
    vcek_key: SigningKey,
}

fn der_integer(value: u8) -> Vec<u8> {
    vec![0x02, 0x01, value]
}

fn vcek_extensions(chip_id: &[u8; 64], tcb: &TcbVersion) -> Vec<CustomExtension> {
    vec![
        CustomExtension::from_oid_content(&[1, 3, 6, 1, 4, 1, 3704, 1, 4], chip_id.to_vec()),
        CustomExtension::from_oid_content(
            &[1, 3, 6, 1, 4, 1, 3704, 1, 3, 1],
            der_integer(tcb.boot_loader),
        ),
        CustomExtension::from_oid_content(&[1, 3, 6, 1, 4, 1, 3704, 1, 3, 2], der_integer(tcb.tee)),
        CustomExtension::from_oid_content(&[1, 3, 6, 1, 4, 1, 3704, 1, 3, 3], der_integer(tcb.snp)),
        CustomExtension::from_oid_content(
            &[1, 3, 6, 1, 4, 1, 3704, 1, 3, 8],
            der_integer(tcb.microcode),
        ),
    ]
}

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

fn build_chain() -> TestChain {
    let ark_key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
    let ark_cert = ca_params("ARK-Test").self_signed(&ark_key).unwrap();

    let ask_key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
    let ask_cert = ca_params("SEV-Test")
        .signed_by(&ask_key, &ark_cert, &ark_key)
        .unwrap();

    let vcek_key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
    let mut vcek_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    vcek_params
        .distinguished_name
        .push(DnType::CommonName, "SEV-VCEK-Test");
    vcek_params.custom_extensions = vcek_extensions(&CHIP_ID, &test_tcb());
    let vcek_cert = vcek_params
        .signed_by(&vcek_key, &ask_cert, &ask_key)
        .unwrap();

    TestChain {
        ark_der: ark_cert.der().to_vec(),
        ask_der: ask_cert.der().to_vec(),
        vcek_der: vcek_cert.der().to_vec(),
        vcek_key: SigningKey::from_pkcs8_der(&vcek_key.serialize_der()).unwrap(),
    }
}

fn test_report() -> AttestationReport {
    let mut report = AttestationReport::parse(&vec![0u8; REPORT_SIZE]).unwrap();
    report.version = 2;
    report.signature_algo = SIG_ALGO_ECDSA_P384_SHA384;
    report.report_data = [0x11; 64];
    report.measurement = [0x5a; 48];
    report.chip_id = CHIP_ID;
    report.reported_tcb = test_tcb();
    report
}

fn sign_report(mut report: AttestationReport, key: &SigningKey) -> Vec<u8> {
    let message = report.to_bytes();
    let signature: Signature = key.sign(&message[..SIGNED_MESSAGE_SIZE]);
    let (r, s) = signature.split_bytes();
    let mut sig = EcdsaSignature::zeroed();
    for (i, byte) in r.iter().rev().enumerate() {
        sig.r[i] = *byte;
    }
    for (i, byte) in s.iter().rev().enumerate() {
        sig.s[i] = *byte;
    }
    report.signature = sig;
    report.to_bytes()
}

#[test]
fn valid_chain_verifies() {
    let chain = build_chain();
    assert!(verify::verify_cert_chain(&chain.vcek_der, &chain.ask_der, &chain.ark_der).unwrap());
}

#[test]
fn chain_from_an_unrelated_authority_fails() {
    let chain = build_chain();
    let other = build_chain();
    assert!(
        !verify::verify_cert_chain(&chain.vcek_der, &other.ask_der, &other.ark_der).unwrap()
    );
}

#[test]
fn leaf_signed_directly_by_the_root_fails() {
    // A VCEK chained straight to the ARK yields a two-certificate path,
    // which must be rejected even though every signature checks out.
    let chain = build_chain();
    let ark_key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
    let ark_cert = ca_params("ARK-Test").self_signed(&ark_key).unwrap();
    let vcek_key = KeyPair::generate_for(&PKCS_ECDSA_P384_SHA384).unwrap();
    let mut vcek_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    vcek_params
        .distinguished_name
        .push(DnType::CommonName, "SEV-VCEK-Test");
    vcek_params.custom_extensions = vcek_extensions(&CHIP_ID, &test_tcb());
    let vcek_cert = vcek_params
        .signed_by(&vcek_key, &ark_cert, &ark_key)
        .unwrap();

    assert!(!verify::verify_cert_chain(
        vcek_cert.der().as_ref(),
        &chain.ask_der,
        ark_cert.der().as_ref()
    )
    .unwrap());

    // Offering the root a second time as the intermediate multiplies the
    // candidate paths; more than one path must also be rejected.
    assert!(!verify::verify_cert_chain(
        vcek_cert.der().as_ref(),
        ark_cert.der().as_ref(),
        ark_cert.der().as_ref()
    )
    .unwrap());
}

#[test]
fn garbled_certificates_are_errors_not_negatives() {
    let chain = build_chain();
    assert!(verify::verify_cert_chain(b"junk", &chain.ask_der, &chain.ark_der).is_err());
    assert!(verify::verify_cert_chain(&chain.vcek_der, b"junk", &chain.ark_der).is_err());
}

#[test]
fn extensions_cross_check_against_the_report() {
    let chain = build_chain();
    let report = test_report();
    assert!(verify::verify_vcek_extensions(&chain.vcek_der, &report).unwrap());

    let mut wrong_chip = report.clone();
    wrong_chip.chip_id[0] ^= 0x01;
    assert!(!verify::verify_vcek_extensions(&chain.vcek_der, &wrong_chip).unwrap());

    let mut wrong_tcb = report.clone();
    wrong_tcb.reported_tcb.microcode += 1;
    assert!(!verify::verify_vcek_extensions(&chain.vcek_der, &wrong_tcb).unwrap());
}

#[test]
fn report_signature_verifies_against_the_vcek() {
    let chain = build_chain();
    let raw = sign_report(test_report(), &chain.vcek_key);
    assert!(verify::verify_report_signature(&raw, &chain.vcek_der).unwrap());

    let mut tampered = raw.clone();
    tampered[144] ^= 0x01; // first byte of the measurement
    assert!(!verify::verify_report_signature(&tampered, &chain.vcek_der).unwrap());
}

#[test]
fn the_full_pipeline_accepts_a_well_formed_attestation() {
    let chain = build_chain();
    let raw = sign_report(test_report(), &chain.vcek_key);
    let report = AttestationReport::parse(&raw).unwrap();

    assert!(verify::verify_cert_chain(&chain.vcek_der, &chain.ask_der, &chain.ark_der).unwrap());
    assert!(verify::verify_vcek_extensions(&chain.vcek_der, &report).unwrap());
    assert!(verify::verify_report_signature(&raw, &chain.vcek_der).unwrap());
}
