// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! SEV-SNP attestation report retrieval via `/dev/sev-guest`.
//!
//! The guest driver exposes a single message-based ioctl interface to the
//! PSP firmware. The interface is not reentrant: the driver sequences
//! messages with the firmware, so all report requests are serialized
//! behind one process-wide lock.

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::{Result, SnpReportData, SNP_REPORT_SIZE};

// ============================================================================
// Constants
// ============================================================================

/// Default SEV guest device node.
pub const SNP_GUEST_DEVICE: &str = "/dev/sev-guest";

// Space the driver hands back for the firmware response message.
const SNP_REPORT_RESP_SIZE: usize = 4000;
// The report payload starts after the 32-byte response header
// (status, report_size, reserved).
const SNP_REPORT_OFFSET: usize = 32;

const SNP_MSG_VERSION: u8 = 1;

// ============================================================================
// ioctl definitions for /dev/sev-guest
// ============================================================================

// ioctl request type varies between glibc and musl
#[cfg(target_env = "musl")]
type IoctlRequest = libc::c_int;
#[cfg(not(target_env = "musl"))]
type IoctlRequest = libc::c_ulong;

// ioctl command encoding
const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> IoctlRequest {
    (((dir as IoctlRequest) << 30)
        | ((ty as IoctlRequest) << 8)
        | (nr as IoctlRequest)
        | ((size as IoctlRequest) << 16)) as IoctlRequest
}

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

fn iowr<T>(ty: u8, nr: u8) -> IoctlRequest {
    ioc(IOC_READ | IOC_WRITE, ty, nr, std::mem::size_of::<T>())
}

fn snp_cmd_get_report() -> IoctlRequest {
    iowr::<SnpGuestRequestIoctl>(b'S', 0x0)
}

// ============================================================================
// Kernel interface structures
// ============================================================================

#[repr(C)]
struct SnpReportReq {
    user_data: SnpReportData,
    vmpl: u32,
    rsvd: [u8; 28],
}

#[repr(C)]
struct SnpReportResp {
    data: [u8; SNP_REPORT_RESP_SIZE],
}

#[repr(C)]
struct SnpGuestRequestIoctl {
    msg_version: u8,
    req_data: u64,
    resp_data: u64,
    fw_err: u64,
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Debug, Error)]
pub enum SnpAttestError {
    #[error("device failure: {0}")]
    DeviceFailure(String),
    #[error("report failure: {0}")]
    ReportFailure(String),
    #[error("firmware rejected the request: status {status:#x}, fw_err {fw_err:#x}")]
    FirmwareError { status: u32, fw_err: u64 },
    #[error("device busy")]
    Busy,
    #[error("not supported: {0}")]
    NotSupported(String),
}

// ============================================================================
// Global state
// ============================================================================

/// Global lock for SNP guest requests - the driver doesn't support
/// concurrent access
static SNP_LOCK: Mutex<()> = Mutex::new(());

// ============================================================================
// Public API
// ============================================================================

/// Handle to the SEV guest device. Opening verifies the device node
/// exists; the file descriptor itself is opened per request.
#[derive(Debug, Clone)]
pub struct SnpDevice {
    device_path: PathBuf,
    vmpl: u32,
}

impl SnpDevice {
    /// Open the SEV guest device at `path`, requesting reports at the
    /// given VM privilege level.
    pub fn open(path: impl AsRef<Path>, vmpl: u32) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SnpAttestError::NotSupported(format!(
                "SEV guest device not found: {}",
                path.display()
            )));
        }
        Ok(Self {
            device_path: path.to_path_buf(),
            vmpl,
        })
    }

    /// Request an attestation report from the firmware. Returns the raw
    /// encoded report bytes.
    pub fn get_report(&self, report_data: &SnpReportData) -> Result<Vec<u8>> {
        let _guard = SNP_LOCK.lock().map_err(|_| SnpAttestError::Busy)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device_path)
            .map_err(|e| {
                SnpAttestError::DeviceFailure(format!(
                    "open {}: {e}",
                    self.device_path.display()
                ))
            })?;

        let req = SnpReportReq {
            user_data: *report_data,
            vmpl: self.vmpl,
            rsvd: [0u8; 28],
        };
        let mut resp = SnpReportResp {
            data: [0u8; SNP_REPORT_RESP_SIZE],
        };
        let mut ioctl_req = SnpGuestRequestIoctl {
            msg_version: SNP_MSG_VERSION,
            req_data: &req as *const SnpReportReq as u64,
            resp_data: &mut resp as *mut SnpReportResp as u64,
            fw_err: 0,
        };

        let ret = unsafe {
            libc::ioctl(file.as_raw_fd(), snp_cmd_get_report(), &mut ioctl_req)
        };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EBUSY) {
                return Err(SnpAttestError::Busy);
            }
            return Err(SnpAttestError::ReportFailure(format!(
                "ioctl: {err}, fw_err {:#x}",
                ioctl_req.fw_err
            )));
        }

        // Response layout: status (u32), report_size (u32), reserved [24],
        // followed by the report itself.
        let data = &resp.data;
        let status = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let report_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
        if status != 0 {
            return Err(SnpAttestError::FirmwareError {
                status,
                fw_err: ioctl_req.fw_err,
            });
        }
        if report_size < SNP_REPORT_SIZE
            || SNP_REPORT_OFFSET + report_size > SNP_REPORT_RESP_SIZE
        {
            return Err(SnpAttestError::ReportFailure(format!(
                "invalid report size: {report_size}"
            )));
        }

        Ok(resp.data[SNP_REPORT_OFFSET..SNP_REPORT_OFFSET + report_size].to_vec())
    }
}
