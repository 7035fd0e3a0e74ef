// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

// Linux x86_64 with glibc or musl
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub use linux::*;
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod linux;

// Fallback for non-Linux/non-x86_64 platforms (dummy implementation)
#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
pub use dummy::*;
#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
mod dummy;

pub type Result<T> = std::result::Result<T, SnpAttestError>;

/// Caller-supplied data mixed into the report, zero padded to 64 bytes.
pub type SnpReportData = [u8; 64];

/// Size of the attestation report returned by the firmware.
pub const SNP_REPORT_SIZE: usize = 1184;
