// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use fs_err as fs;
use serde::Deserialize;
use snp_attest::SNP_GUEST_DEVICE;
use snp_qvl::collateral::{AMD_KDS_URL, DEFAULT_PRODUCT_NAME};

/// Service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttestdConfig {
    /// Directory holding `ask.crt`, `ark.crt` and cached VCEK certificates.
    pub cache_dir: PathBuf,
    /// Only serve verification requests; report issuance is rejected and
    /// the SEV guest device is never opened.
    pub verify_only: bool,
    /// SEV guest device node used to obtain live reports.
    pub sev_device: String,
    /// VM privilege level reports are requested at.
    pub vmpl: u32,
    /// Base URL of the key distribution service.
    pub kds_url: String,
    /// Product line for VCEK lookups.
    pub product_name: String,
    /// Timeout for certificate fetches, in seconds.
    pub fetch_timeout_secs: u64,
}

impl Default for AttestdConfig {
    fn default() -> Self {
        Self {
            cache_dir: "/var/cache/snp-attestd".into(),
            verify_only: false,
            sev_device: SNP_GUEST_DEVICE.into(),
            vmpl: 0,
            kds_url: AMD_KDS_URL.into(),
            product_name: DEFAULT_PRODUCT_NAME.into(),
            fetch_timeout_secs: 30,
        }
    }
}

impl AttestdConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents =
            fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        serde_json::from_str(&contents).context("failed to parse config file")
    }
}
