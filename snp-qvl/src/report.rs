// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! SEV-SNP attestation report structures and codec.
//!
//! The report is a fixed 1184-byte little-endian structure produced by the
//! SEV firmware. All multi-byte integers are little-endian and every field
//! has a fixed offset, so the SCALE codec maps the struct to the wire
//! layout byte-for-byte.

use anyhow::{bail, Context, Result};
use scale::{Decode, Encode};
use serde::{Deserialize, Serialize};
use serde_human_bytes as hex_bytes;

/// Total size of an encoded attestation report in bytes.
pub const REPORT_SIZE: usize = 1184;

/// Size of the signed portion of the report. The signature covers every
/// byte before the signature field itself.
pub const SIGNED_MESSAGE_SIZE: usize = 672;

/// Maximum length of caller-supplied report data.
pub const REPORT_DATA_SIZE: usize = 64;

/// Report signature algorithm: ECDSA P-384 with SHA-384.
pub const SIG_ALGO_ECDSA_P384_SHA384: u32 = 1;

/// A TCB version number, the little-endian image of the 64-bit TCB word.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode, Serialize, Deserialize,
)]
pub struct TcbVersion {
    /// Security patch level of the boot loader.
    pub boot_loader: u8,
    /// Security patch level of the PSP TEE firmware.
    pub tee: u8,
    #[serde(skip)]
    pub reserved: [u8; 4],
    /// Security patch level of the SNP firmware.
    pub snp: u8,
    /// Microcode patch level.
    pub microcode: u8,
}

impl TcbVersion {
    /// Component-wise ordering used for TCB floor checks. A TCB satisfies a
    /// floor when every component is at or above the floor's.
    pub fn at_least(&self, min: &TcbVersion) -> bool {
        self.boot_loader >= min.boot_loader
            && self.tee >= min.tee
            && self.snp >= min.snp
            && self.microcode >= min.microcode
    }

    /// Component-wise equality, ignoring the reserved gap.
    pub fn matches(&self, other: &TcbVersion) -> bool {
        self.boot_loader == other.boot_loader
            && self.tee == other.tee
            && self.snp == other.snp
            && self.microcode == other.microcode
    }
}

/// The report signature. `r` and `s` hold 48-byte little-endian scalars,
/// zero padded to 72 bytes each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize)]
pub struct EcdsaSignature {
    #[serde(with = "hex_bytes")]
    pub r: [u8; 72],
    #[serde(with = "hex_bytes")]
    pub s: [u8; 72],
    #[serde(skip)]
    pub reserved: [u8; 368],
}

impl EcdsaSignature {
    pub fn zeroed() -> Self {
        Self {
            r: [0u8; 72],
            s: [0u8; 72],
            reserved: [0u8; 368],
        }
    }
}

/// An SEV-SNP attestation report (version 2 layout). Read-only once
/// decoded; no field is mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize)]
pub struct AttestationReport {
    /// Version of the report structure.
    pub version: u32,
    /// Guest security version number.
    pub guest_svn: u32,
    /// Guest policy bitmask supplied at launch.
    pub guest_policy: u64,
    #[serde(with = "hex_bytes")]
    pub family_id: [u8; 16],
    #[serde(with = "hex_bytes")]
    pub image_id: [u8; 16],
    /// VM privilege level the report was requested at.
    pub vmpl: u32,
    /// Signature algorithm of the report signature.
    pub signature_algo: u32,
    /// TCB currently running on the platform.
    pub current_tcb: TcbVersion,
    pub platform_info: u64,
    /// Bit 0 signals whether the author key digest is populated.
    pub author_key_en: u32,
    #[serde(skip)]
    pub reserved0: u32,
    /// Caller-supplied data, zero padded to 64 bytes.
    #[serde(with = "hex_bytes")]
    pub report_data: [u8; 64],
    /// Launch measurement of the guest.
    #[serde(with = "hex_bytes")]
    pub measurement: [u8; 48],
    /// Data supplied by the host at launch.
    #[serde(with = "hex_bytes")]
    pub host_data: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub id_key_digest: [u8; 48],
    #[serde(with = "hex_bytes")]
    pub author_key_digest: [u8; 48],
    #[serde(with = "hex_bytes")]
    pub report_id: [u8; 32],
    /// Report id of the migration agent, if any.
    #[serde(with = "hex_bytes")]
    pub report_id_ma: [u8; 32],
    /// TCB the report was attested under. Selects the VCEK.
    pub reported_tcb: TcbVersion,
    #[serde(skip)]
    pub reserved1: [u8; 24],
    /// Unique identifier of the physical chip. Selects the VCEK.
    #[serde(with = "hex_bytes")]
    pub chip_id: [u8; 64],
    pub committed_tcb: TcbVersion,
    pub current_build: u8,
    pub current_minor: u8,
    pub current_major: u8,
    #[serde(skip)]
    pub reserved2: u8,
    pub committed_build: u8,
    pub committed_minor: u8,
    pub committed_major: u8,
    #[serde(skip)]
    pub reserved3: u8,
    /// TCB at guest launch.
    pub launch_tcb: TcbVersion,
    #[serde(skip)]
    pub reserved4: [u8; 168],
    pub signature: EcdsaSignature,
}

impl AttestationReport {
    /// Decode a report from raw bytes. Input shorter than [`REPORT_SIZE`]
    /// is rejected; trailing bytes are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < REPORT_SIZE {
            bail!(
                "attestation report too short: {} bytes, expected {REPORT_SIZE}",
                bytes.len()
            );
        }
        let mut input = &bytes[..REPORT_SIZE];
        Self::decode(&mut input).context("malformed attestation report")
    }

    /// Encode the report to its wire format, the byte-exact inverse of
    /// [`parse`](Self::parse).
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }
}
