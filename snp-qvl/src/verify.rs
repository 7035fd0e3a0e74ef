// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! SEV-SNP chain and report signature verification.
//!
//! Chain verification treats the ARK as the sole trusted root and the ASK
//! as the sole trusted intermediate, then requires that certification path
//! building from the VCEK yields exactly one path of exactly three
//! certificates. Any other count or length is a negative outcome, not an
//! error. The VCEK's X.509 extensions are additionally cross-checked
//! bit-for-bit against the report, binding the certificate to the exact
//! chip and TCB the report claims.

use anyhow::{bail, Context, Result};
use p384::ecdsa::{signature::Verifier as _, Signature as P384Signature, VerifyingKey};
use rsa::{pkcs1::DecodeRsaPublicKey, pss, RsaPublicKey};
use sha2::Sha384;
use tracing::debug;
use x509_parser::oid_registry::{OID_PKCS1_RSASSAPSS, OID_SIG_ECDSA_WITH_SHA384};
use x509_parser::prelude::*;

use crate::{
    oids,
    report::{AttestationReport, SIGNED_MESSAGE_SIZE, SIG_ALGO_ECDSA_P384_SHA384},
};

/// Verify the VCEK -> ASK -> ARK certificate chain.
///
/// Returns `Ok(false)` unless path building yields exactly one chain of
/// exactly three certificates in that order. Returns an error only when a
/// certificate fails to parse.
pub fn verify_cert_chain(vcek_der: &[u8], ask_der: &[u8], ark_der: &[u8]) -> Result<bool> {
    let (_, vcek) =
        X509Certificate::from_der(vcek_der).context("failed to parse VCEK certificate")?;
    let (_, ask) = X509Certificate::from_der(ask_der).context("failed to parse ASK certificate")?;
    let (_, ark) = X509Certificate::from_der(ark_der).context("failed to parse ARK certificate")?;

    let chains = build_chains(&vcek, &[&ask], &[&ark]);
    let ok = chains.len() == 1 && chains[0] == 3;
    if !ok {
        debug!(
            "VCEK chain verification failed: {} path(s), lengths {:?}",
            chains.len(),
            chains
        );
    }
    Ok(ok)
}

/// Enumerate certification paths from `leaf` to one of `roots`, optionally
/// through one of `intermediates`. Returns the length of every valid path.
fn build_chains(
    leaf: &X509Certificate,
    intermediates: &[&X509Certificate],
    roots: &[&X509Certificate],
) -> Vec<usize> {
    let mut chains = Vec::new();
    for root in roots {
        if issued_by(leaf, root) {
            chains.push(2);
        }
    }
    for intermediate in intermediates {
        if !issued_by(leaf, intermediate) {
            continue;
        }
        for root in roots {
            if issued_by(intermediate, root) {
                chains.push(3);
            }
        }
    }
    chains
}

/// True iff `issuer` names `child`'s issuer and its key verifies `child`'s
/// signature.
fn issued_by(child: &X509Certificate, issuer: &X509Certificate) -> bool {
    if child.issuer() != issuer.subject() {
        return false;
    }
    match verify_link_signature(child, issuer) {
        Ok(()) => true,
        Err(e) => {
            debug!("certificate signature check failed: {e:#}");
            false
        }
    }
}

/// Verify `child`'s signature with `issuer`'s public key. AMD production
/// chains sign with RSASSA-PSS/SHA-384; ECDSA P-384 links are also
/// accepted so locally minted chains are verifiable.
fn verify_link_signature(child: &X509Certificate, issuer: &X509Certificate) -> Result<()> {
    let tbs = child.tbs_certificate.as_ref();
    let sig = child.signature_value.data.as_ref();
    let spki = issuer.public_key().subject_public_key.data.as_ref();
    let alg = &child.signature_algorithm.algorithm;

    if *alg == OID_PKCS1_RSASSAPSS {
        let pubkey =
            RsaPublicKey::from_pkcs1_der(spki).context("failed to parse RSA public key")?;
        let key = pss::VerifyingKey::<Sha384>::new(pubkey);
        let signature =
            pss::Signature::try_from(sig).context("failed to parse RSA-PSS signature")?;
        key.verify(tbs, &signature)
            .context("RSA-PSS signature mismatch")?;
    } else if *alg == OID_SIG_ECDSA_WITH_SHA384 {
        let key =
            VerifyingKey::from_sec1_bytes(spki).context("failed to parse P-384 public key")?;
        let signature =
            P384Signature::from_der(sig).context("failed to parse ECDSA signature")?;
        key.verify(tbs, &signature)
            .context("ECDSA signature mismatch")?;
    } else {
        bail!("unsupported certificate signature algorithm: {alg}");
    }
    Ok(())
}

/// Cross-check the VCEK extensions against the report.
///
/// The VCEK carries the chip id and every TCB component it was issued for
/// as X.509 extensions. Returns `Ok(false)` unless every extension value
/// matches the corresponding report field exactly.
pub fn verify_vcek_extensions(vcek_der: &[u8], report: &AttestationReport) -> Result<bool> {
    let (_, vcek) =
        X509Certificate::from_der(vcek_der).context("failed to parse VCEK certificate")?;

    let mut chip_id: Option<&[u8]> = None;
    let mut boot_loader = None;
    let mut tee = None;
    let mut snp = None;
    let mut microcode = None;

    for ext in vcek.extensions() {
        // The TCB extensions hold a DER INTEGER; for the u8 component range
        // its value is the last content byte.
        if ext.oid == oids::VCEK_CHIP_ID {
            chip_id = Some(ext.value);
        } else if ext.oid == oids::VCEK_TCB_BOOT_LOADER {
            boot_loader = ext.value.last().copied();
        } else if ext.oid == oids::VCEK_TCB_TEE {
            tee = ext.value.last().copied();
        } else if ext.oid == oids::VCEK_TCB_SNP {
            snp = ext.value.last().copied();
        } else if ext.oid == oids::VCEK_TCB_MICROCODE {
            microcode = ext.value.last().copied();
        }
    }

    let tcb = &report.reported_tcb;
    let ok = chip_id == Some(report.chip_id.as_slice())
        && boot_loader == Some(tcb.boot_loader)
        && tee == Some(tcb.tee)
        && snp == Some(tcb.snp)
        && microcode == Some(tcb.microcode);
    if !ok {
        debug!("VCEK extensions do not match the report's chip id / reported TCB");
    }
    Ok(ok)
}

/// Verify the report signature with the VCEK public key.
///
/// The signature covers the first [`SIGNED_MESSAGE_SIZE`] bytes of the raw
/// report. Returns `Ok(false)` on mismatch; errors are reserved for
/// structurally invalid key or signature encodings.
pub fn verify_report_signature(raw_report: &[u8], vcek_der: &[u8]) -> Result<bool> {
    let report = AttestationReport::parse(raw_report)?;
    if report.signature_algo != SIG_ALGO_ECDSA_P384_SHA384 {
        bail!(
            "unsupported report signature algorithm: {}",
            report.signature_algo
        );
    }
    let (_, vcek) =
        X509Certificate::from_der(vcek_der).context("failed to parse VCEK certificate")?;
    let key = VerifyingKey::from_sec1_bytes(vcek.public_key().subject_public_key.data.as_ref())
        .context("failed to extract P-384 public key from VCEK")?;
    verify_signature_with_key(raw_report, &key)
}

/// Verify the report signature against an explicit key (testing hook).
pub fn verify_signature_with_key(raw_report: &[u8], key: &VerifyingKey) -> Result<bool> {
    let report = AttestationReport::parse(raw_report)?;
    let signature = P384Signature::from_scalars(
        mirror_scalar(&report.signature.r),
        mirror_scalar(&report.signature.s),
    )
    .context("malformed report signature scalars")?;
    Ok(key
        .verify(&raw_report[..SIGNED_MESSAGE_SIZE], &signature)
        .is_ok())
}

/// The firmware stores r and s as 48-byte little-endian integers, zero
/// padded to 72 bytes; `p384` wants big-endian.
fn mirror_scalar(le: &[u8; 72]) -> [u8; 48] {
    let mut be = [0u8; 48];
    for (i, byte) in le[..48].iter().enumerate() {
        be[47 - i] = *byte;
    }
    be
}
