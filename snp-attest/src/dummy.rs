// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

use std::path::Path;

use thiserror::Error;

use crate::{Result, SnpReportData};

/// Default SEV guest device node.
pub const SNP_GUEST_DEVICE: &str = "/dev/sev-guest";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SnpAttestError {
    #[error("not supported")]
    NotSupported,
}

#[derive(Debug, Clone)]
pub struct SnpDevice;

impl SnpDevice {
    pub fn open(_path: impl AsRef<Path>, _vmpl: u32) -> Result<Self> {
        Err(SnpAttestError::NotSupported)
    }

    pub fn get_report(&self, _report_data: &SnpReportData) -> Result<Vec<u8>> {
        Err(SnpAttestError::NotSupported)
    }
}
