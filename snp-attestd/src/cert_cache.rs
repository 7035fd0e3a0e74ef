// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed on-disk cache for VCEK certificates, plus the
//! pre-provisioned trust anchors.
//!
//! A VCEK is uniquely identified by the pair (chip id, reported TCB); the
//! cache key is `SHA-1(chip_id || reported_tcb)` over the raw wire bytes,
//! so identical pairs always resolve to the same file and distinct pairs
//! never collide in practice. Content for a given key is immutable and
//! reproducible, so concurrent writers may race freely: last write wins
//! with identical bytes.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs_err as fs;
use scale::Encode;
use sha1::{Digest, Sha1};
use snp_qvl::{report::AttestationReport, KdsClient};
use tracing::{debug, warn};
use x509_parser::prelude::*;

const ASK_CERT_FILE: &str = "ask.crt";
const ARK_CERT_FILE: &str = "ark.crt";

/// The pre-provisioned ASK and ARK certificates, DER-encoded.
#[derive(Debug, Clone)]
pub struct TrustAnchors {
    pub ask: Vec<u8>,
    pub ark: Vec<u8>,
}

/// On-disk VCEK certificate cache with fetch-on-miss.
#[derive(Debug, Clone)]
pub struct CertCache {
    cache_dir: PathBuf,
    kds: KdsClient,
}

impl CertCache {
    pub fn new(cache_dir: impl Into<PathBuf>, kds: KdsClient) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            kds,
        }
    }

    /// Deterministic cache location of the VCEK for the report's chip id
    /// and reported TCB.
    pub fn vcek_cache_path(&self, report: &AttestationReport) -> PathBuf {
        let mut hasher = Sha1::new();
        hasher.update(report.chip_id);
        hasher.update(report.reported_tcb.encode());
        let key = hasher.finalize();
        self.cache_dir.join(format!("{}.crt", hex::encode(key)))
    }

    /// Resolve the VCEK certificate for the report: cache hit, or fetch
    /// from the key distribution service and persist.
    pub async fn get_vcek(&self, report: &AttestationReport) -> Result<Vec<u8>> {
        self.get_vcek_with(report, || self.kds.fetch_vcek(report))
            .await
    }

    /// Resolve with an explicit fetcher (testing hook).
    pub async fn get_vcek_with<F, Fut>(
        &self,
        report: &AttestationReport,
        fetch: F,
    ) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let path = self.vcek_cache_path(report);
        if path.exists() {
            debug!("fetching VCEK from cache");
            // A read failure after a confirmed hit is a hard I/O error.
            return fs::read(&path).context("error reading VCEK certificate from cache");
        }

        fs::create_dir_all(&self.cache_dir)
            .context("the VCEK cache dir does not exist and could not be created")?;

        let cert = fetch().await.context("could not fetch VCEK certificate")?;

        // Persisting is best-effort: the fetched bytes still serve the
        // in-flight request.
        if let Err(e) = fs::write(&path, &cert) {
            warn!("could not save VCEK certificate to cache: {e}");
        }

        Ok(cert)
    }

    /// Load the pre-provisioned ASK and ARK certificates. Absence or parse
    /// failure makes every verification request unservable, which is a
    /// distinct condition from a negative verification outcome.
    pub fn load_trust_anchors(&self) -> Result<TrustAnchors> {
        let ask = load_cert(&self.cache_dir.join(ASK_CERT_FILE))
            .context("could not load the ASK certificate")?;
        let ark = load_cert(&self.cache_dir.join(ARK_CERT_FILE))
            .context("could not load the ARK certificate")?;
        Ok(TrustAnchors { ask, ark })
    }
}

fn load_cert(path: &Path) -> Result<Vec<u8>> {
    let contents = fs::read(path).context("error reading from file")?;
    X509Certificate::from_der(&contents).context("could not decode certificate")?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use snp_qvl::report::{TcbVersion, REPORT_SIZE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_report() -> AttestationReport {
        let mut report = AttestationReport::parse(&vec![0u8; REPORT_SIZE]).unwrap();
        report.chip_id = [0x42; 64];
        report.reported_tcb = TcbVersion {
            boot_loader: 3,
            tee: 0,
            reserved: [0; 4],
            snp: 8,
            microcode: 115,
        };
        report
    }

    fn test_cache(dir: &Path) -> CertCache {
        CertCache::new(dir, KdsClient::default())
    }

    #[tokio::test]
    async fn miss_fetches_once_and_hit_fetches_never() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = test_cache(tmp.path());
        let report = test_report();
        let fetches = AtomicUsize::new(0);

        let first = cache
            .get_vcek_with(&report, || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(b"fake vcek certificate".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(cache.vcek_cache_path(&report).exists());

        let second = cache
            .get_vcek_with(&report, || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok(b"different bytes".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1, "hit must not fetch");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn cache_path_is_the_sha1_of_chip_id_and_tcb() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = test_cache(tmp.path());
        let report = test_report();

        let mut hasher = Sha1::new();
        hasher.update([0x42; 64]);
        hasher.update(report.reported_tcb.encode());
        let expected = format!("{}.crt", hex::encode(hasher.finalize()));

        let path = cache.vcek_cache_path(&report);
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), expected);
        assert_eq!(path.parent().unwrap(), tmp.path());
    }

    #[tokio::test]
    async fn distinct_tcb_values_get_distinct_cache_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = test_cache(tmp.path());
        let report = test_report();
        let mut other = report.clone();
        other.reported_tcb.microcode += 1;
        assert_ne!(cache.vcek_cache_path(&report), cache.vcek_cache_path(&other));
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal_and_nothing_is_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = test_cache(tmp.path());
        let report = test_report();

        let result = cache
            .get_vcek_with(&report, || async { anyhow::bail!("endpoint unreachable") })
            .await;
        assert!(result.is_err());
        assert!(!cache.vcek_cache_path(&report).exists());
    }

    #[test]
    fn missing_trust_anchors_are_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = test_cache(tmp.path());
        assert!(cache.load_trust_anchors().is_err());
    }

    #[test]
    fn garbled_trust_anchors_are_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(ASK_CERT_FILE), b"not a certificate").unwrap();
        fs::write(tmp.path().join(ARK_CERT_FILE), b"not a certificate").unwrap();
        let cache = test_cache(tmp.path());
        assert!(cache.load_trust_anchors().is_err());
    }
}
