// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! SEV-SNP attestation service
//!
//! This library provides the two attestation operations: obtaining a live
//! report from the SEV firmware (with optional VCEK resolution) and
//! verifying a report against the AMD chain of trust plus a caller-supplied
//! policy document.
//!
//! Can be used both as a library and through the `snp-attestd` CLI.

mod cert_cache;
mod config;
mod main_service;

pub use cert_cache::{CertCache, TrustAnchors};
pub use config::AttestdConfig;
pub use main_service::{
    AttestdService, IssueReportRequest, IssueReportResponse, ServiceError, ServiceResult,
    VerifyReportRequest, VerifyReportResponse,
};
