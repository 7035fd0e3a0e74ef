// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! X.509 extension OIDs carried by AMD VCEK certificates.
//!
//! Values from Table 8 of the AMD VCEK Certificate specification (57230).

use x509_parser::der_parser::asn1_rs::{oid, Oid};

/// OID for the product name extension (e.g. "Milan-B0").
pub const VCEK_PRODUCT_NAME: Oid<'static> = oid!(1.3.6.1.4.1.3704.1.2);
/// OID for the boot loader security patch level.
pub const VCEK_TCB_BOOT_LOADER: Oid<'static> = oid!(1.3.6.1.4.1.3704.1.3.1);
/// OID for the PSP TEE security patch level.
pub const VCEK_TCB_TEE: Oid<'static> = oid!(1.3.6.1.4.1.3704.1.3.2);
/// OID for the SNP firmware security patch level.
pub const VCEK_TCB_SNP: Oid<'static> = oid!(1.3.6.1.4.1.3704.1.3.3);
/// OID for the microcode patch level.
pub const VCEK_TCB_MICROCODE: Oid<'static> = oid!(1.3.6.1.4.1.3704.1.3.8);
/// OID for the chip identity (hwID) the VCEK was issued for.
pub const VCEK_CHIP_ID: Oid<'static> = oid!(1.3.6.1.4.1.3704.1.4);
