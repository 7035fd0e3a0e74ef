// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! AMD SEV-SNP Quote Verification Library (QVL)
//!
//! This module provides verification for SEV-SNP attestation reports.
//! It verifies:
//! - The VCEK certificate chain (VCEK -> ASK -> ARK)
//! - The VCEK X.509 extensions against the report's chip identity and TCB
//! - The report signature (ECDSA P-384 with SHA-384)
//! - Caller-supplied policy assertions over the report fields
//!
//! # Architecture
//! The verification follows the SEV-SNP attestation flow:
//! 1. Decode the fixed-layout binary attestation report
//! 2. Verify the certificate chain against the AMD root of trust
//! 3. Cross-check the VCEK extensions with the report
//! 4. Verify the report signature using the VCEK public key
//! 5. Evaluate policy assertions against the verified report
//!
//! # References
//! - https://www.amd.com/content/dam/amd/en/documents/epyc-technical-docs/specifications/56860.pdf
//! - https://www.amd.com/content/dam/amd/en/documents/epyc-technical-docs/specifications/57230.pdf

pub mod collateral;
pub mod oids;
pub mod policy;
pub mod report;
pub mod verify;

pub use collateral::KdsClient;
pub use policy::{Policies, PolicyResult};
pub use report::{AttestationReport, TcbVersion, REPORT_SIZE};
