// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Collateral retrieval module
//!
//! Fetches VCEK certificates from the AMD Key Distribution Service. A VCEK
//! is addressed by the chip id and the reported TCB components, both taken
//! from the attestation report.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::report::AttestationReport;

/// Default AMD Key Distribution Service endpoint.
pub const AMD_KDS_URL: &str = "https://kds.amd.com";

/// Default product line for VCEK lookups.
pub const DEFAULT_PRODUCT_NAME: &str = "Milan";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the AMD Key Distribution Service.
#[derive(Debug, Clone)]
pub struct KdsClient {
    base_url: String,
    product_name: String,
    timeout: Duration,
}

impl Default for KdsClient {
    fn default() -> Self {
        Self::new(AMD_KDS_URL, DEFAULT_PRODUCT_NAME, DEFAULT_FETCH_TIMEOUT)
    }
}

impl KdsClient {
    pub fn new(
        base_url: impl Into<String>,
        product_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            product_name: product_name.into(),
            timeout,
        }
    }

    /// URL of the VCEK certificate for the chip and TCB the report was
    /// attested under.
    pub fn vcek_url(&self, report: &AttestationReport) -> String {
        let tcb = &report.reported_tcb;
        format!(
            "{}/vcek/v1/{}/{}?blSPL={}&teeSPL={}&snpSPL={}&ucodeSPL={}",
            self.base_url,
            self.product_name,
            hex::encode(report.chip_id),
            tcb.boot_loader,
            tcb.tee,
            tcb.snp,
            tcb.microcode,
        )
    }

    /// Fetch the DER-encoded VCEK certificate for the report.
    pub async fn fetch_vcek(&self, report: &AttestationReport) -> Result<Vec<u8>> {
        let url = self.vcek_url(report);
        debug!("fetching VCEK certificate from {url}");

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build HTTP client")?;
        let response = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to fetch VCEK from {url}"))?;

        if !response.status().is_success() {
            bail!("VCEK fetch failed with status: {}", response.status());
        }

        let cert = response
            .bytes()
            .await
            .context("failed to read VCEK response body")?
            .to_vec();

        debug!("downloaded {} bytes VCEK certificate", cert.len());
        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{AttestationReport, TcbVersion, REPORT_SIZE};

    #[test]
    fn vcek_url_encodes_chip_id_and_tcb_components() {
        let mut report = AttestationReport::parse(&vec![0u8; REPORT_SIZE]).unwrap();
        report.chip_id = [0xab; 64];
        report.reported_tcb = TcbVersion {
            boot_loader: 3,
            tee: 0,
            reserved: [0; 4],
            snp: 8,
            microcode: 115,
        };
        let kds = KdsClient::default();
        let url = kds.vcek_url(&report);
        assert_eq!(
            url,
            format!(
                "https://kds.amd.com/vcek/v1/Milan/{}?blSPL=3&teeSPL=0&snpSPL=8&ucodeSPL=115",
                "ab".repeat(64)
            )
        );
    }
}
