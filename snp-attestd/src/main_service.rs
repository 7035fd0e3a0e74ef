// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! The attestation service: report issuance and report verification.
//!
//! Outcomes fall into three tiers. Malformed requests are rejected with
//! detail. Well-formed reports that fail a cryptographic or policy check
//! get a success-shaped response with `ok = false`; that is a legitimate
//! negative result, not an error. Environment faults (missing trust
//! anchors, broken cache I/O, unreachable key distribution service) are
//! logged in full and surfaced as one opaque error so the error text does
//! not reveal which internal stage failed.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_human_bytes as hex_bytes;
use snp_attest::SnpDevice;
use snp_qvl::{
    policy::Policies,
    report::{AttestationReport, REPORT_DATA_SIZE},
    verify, KdsClient,
};
use thiserror::Error;
use tracing::{debug, error};

use crate::{cert_cache::CertCache, config::AttestdConfig};

/// Errors surfaced to callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request itself is malformed; safe to expose with detail.
    #[error("{0}")]
    InvalidRequest(String),
    /// An environment fault. Deliberately opaque.
    #[error("internal server error")]
    Internal,
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

fn internal(err: anyhow::Error) -> ServiceError {
    error!("{err:#}");
    ServiceError::Internal
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueReportRequest {
    /// Up to 64 bytes mixed into the report; zero padded by the firmware
    /// interface.
    #[serde(with = "hex_bytes")]
    pub report_data: Vec<u8>,
    /// Also resolve the VCEK certificate for the issued report.
    #[serde(default)]
    pub include_vcek_cert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueReportResponse {
    /// The encoded attestation report.
    #[serde(with = "hex_bytes")]
    pub report: Vec<u8>,
    /// DER-encoded VCEK certificate; empty unless requested.
    #[serde(default, with = "hex_bytes")]
    pub vcek_cert: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReportRequest {
    /// The encoded attestation report.
    #[serde(with = "hex_bytes")]
    pub report: Vec<u8>,
    /// DER-encoded VCEK certificate. Resolved through the cache when
    /// empty.
    #[serde(default, with = "hex_bytes")]
    pub vcek_cert: Vec<u8>,
    /// JSON policy document.
    #[serde(default)]
    pub policies: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyReportResponse {
    pub ok: bool,
    /// Names of the policy assertions that failed, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_policies: Vec<String>,
}

#[derive(Clone)]
pub struct AttestdService {
    inner: Arc<ServiceInner>,
}

impl std::ops::Deref for AttestdService {
    type Target = ServiceInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct ServiceInner {
    config: AttestdConfig,
    device: Option<SnpDevice>,
    cache: CertCache,
}

impl AttestdService {
    pub fn new(config: AttestdConfig) -> Result<Self> {
        let device = if config.verify_only {
            None
        } else {
            let device = SnpDevice::open(&config.sev_device, config.vmpl)
                .context("failed to open the SEV guest device")?;
            Some(device)
        };
        Ok(Self::with_device(config, device))
    }

    /// Construct with an explicit device handle (testing hook).
    pub fn with_device(config: AttestdConfig, device: Option<SnpDevice>) -> Self {
        let kds = KdsClient::new(
            config.kds_url.clone(),
            config.product_name.clone(),
            config.fetch_timeout(),
        );
        let cache = CertCache::new(&config.cache_dir, kds);
        Self {
            inner: Arc::new(ServiceInner {
                config,
                device,
                cache,
            }),
        }
    }

    /// Obtain a live attestation report from the SEV firmware.
    pub async fn issue_report(
        &self,
        request: IssueReportRequest,
    ) -> ServiceResult<IssueReportResponse> {
        if self.config.verify_only {
            debug!("got report request while in verify only mode, refusing");
            return Err(ServiceError::InvalidRequest(
                "the service is in verify only mode and cannot provide attestation reports"
                    .to_string(),
            ));
        }
        if request.report_data.len() > REPORT_DATA_SIZE {
            debug!(
                "got a report request with {} bytes of report data, refusing",
                request.report_data.len()
            );
            return Err(ServiceError::InvalidRequest(format!(
                "expected at most {REPORT_DATA_SIZE} bytes of report data, got {} bytes",
                request.report_data.len()
            )));
        }

        let mut report_data = [0u8; REPORT_DATA_SIZE];
        report_data[..request.report_data.len()].copy_from_slice(&request.report_data);

        let device = self
            .device
            .as_ref()
            .context("no SEV guest device available")
            .map_err(internal)?;
        let raw_report = device
            .get_report(&report_data)
            .context("error retrieving report from the SEV firmware")
            .map_err(internal)?;
        let report = AttestationReport::parse(&raw_report)
            .context("the SEV firmware returned a malformed report")
            .map_err(internal)?;

        let vcek_cert = if request.include_vcek_cert {
            self.cache
                .get_vcek(&report)
                .await
                .context("could not fetch VCEK certificate")
                .map_err(internal)?
        } else {
            Vec::new()
        };

        Ok(IssueReportResponse {
            report: report.to_bytes(),
            vcek_cert,
        })
    }

    /// Verify a report's chain of trust, signature and policy assertions.
    pub async fn verify_report(
        &self,
        request: VerifyReportRequest,
    ) -> ServiceResult<VerifyReportResponse> {
        debug!("got verify request");

        let report = AttestationReport::parse(&request.report)
            .map_err(|e| ServiceError::InvalidRequest(format!("{e:#}")))?;

        let anchors = self
            .cache
            .load_trust_anchors()
            .context("could not load the VCEK certificate chain")
            .map_err(internal)?;

        // Step one: establish that the VCEK is signed by AMD.

        let vcek = if !request.vcek_cert.is_empty() {
            request.vcek_cert
        } else {
            self.cache
                .get_vcek(&report)
                .await
                .context("could not fetch VCEK certificate")
                .map_err(internal)?
        };

        let chain_ok = verify::verify_cert_chain(&vcek, &anchors.ask, &anchors.ark)
            .context("error during certificate verification")
            .map_err(internal)?;
        if !chain_ok {
            debug!("report verification failed as the VCEK certificate's signature could not be verified");
            return Ok(VerifyReportResponse::default());
        }

        let extensions_ok = verify::verify_vcek_extensions(&vcek, &report)
            .context("error reading the VCEK certificate extensions")
            .map_err(internal)?;
        if !extensions_ok {
            debug!("report verification failed as the VCEK certificate's X.509 extensions did not match the report");
            return Ok(VerifyReportResponse::default());
        }

        // Step two: verify the report signature.

        let signature_ok = verify::verify_report_signature(&request.report, &vcek)
            .context("error trying to verify the report's signature")
            .map_err(internal)?;
        if !signature_ok {
            debug!("report verification failed as the report's signature could not be verified");
            return Ok(VerifyReportResponse::default());
        }

        // Step three: do policy verification.

        let policies = Policies::parse(request.policies.as_bytes())
            // Most likely a caller error (e.g. malformed json), so the
            // detail is preserved instead of the generic server error.
            .map_err(|e| ServiceError::InvalidRequest(format!("could not parse policies: {e:#}")))?;

        let result = policies.evaluate(&report);
        if !result.ok {
            debug!(
                "report verification failed as the report did not pass the policy check: {:?}",
                result.failed
            );
            return Ok(VerifyReportResponse {
                ok: false,
                failed_policies: result.failed,
            });
        }

        debug!("report verification succeeded");
        Ok(VerifyReportResponse {
            ok: true,
            failed_policies: Vec::new(),
        })
    }
}
