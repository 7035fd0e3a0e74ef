// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Policy assertions over attestation report fields.
//!
//! A policy document is a JSON array of named assertions, each a predicate
//! over one report field:
//!
//! ```json
//! [
//!   {"name": "measurement", "field": "measurement", "check": "equals", "value": "8a…"},
//!   {"name": "no-debug", "field": "guest_policy", "check": "bit-clear", "bit": 19},
//!   {"name": "tcb-floor", "field": "reported_tcb", "check": "at-least",
//!    "value": {"boot_loader": 3, "tee": 0, "snp": 8, "microcode": 115}}
//! ]
//! ```
//!
//! Field, check and value compatibility is validated when the document is
//! parsed, so evaluation is total: every assertion is always evaluated and
//! every failing assertion name is reported.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::report::{AttestationReport, TcbVersion};

/// A single named assertion as it appears in the document.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyAssertion {
    pub name: String,
    pub field: ReportField,
    #[serde(flatten)]
    pub check: Check,
}

/// Report fields addressable from a policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportField {
    Version,
    GuestSvn,
    GuestPolicy,
    FamilyId,
    ImageId,
    Vmpl,
    SignatureAlgo,
    CurrentTcb,
    PlatformInfo,
    AuthorKeyEn,
    ReportData,
    Measurement,
    HostData,
    IdKeyDigest,
    AuthorKeyDigest,
    ReportId,
    ReportIdMa,
    ReportedTcb,
    ChipId,
    CommittedTcb,
    LaunchTcb,
}

/// The predicate applied to the field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "check", rename_all = "kebab-case")]
pub enum Check {
    Equals { value: CheckValue },
    AtLeast { value: CheckValue },
    BitSet { bit: u32 },
    BitClear { bit: u32 },
}

/// A literal to compare against: an integer, a hex string for byte
/// fields, or a TCB component object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CheckValue {
    Integer(u64),
    Hex(String),
    Tcb(TcbVersion),
}

/// A parsed and validated policy document.
#[derive(Debug, Clone, Default)]
pub struct Policies {
    assertions: Vec<CompiledAssertion>,
}

#[derive(Debug, Clone)]
struct CompiledAssertion {
    name: String,
    field: ReportField,
    check: CompiledCheck,
}

#[derive(Debug, Clone)]
enum CompiledCheck {
    BytesEqual(Vec<u8>),
    IntEqual(u64),
    IntAtLeast(u64),
    BitSet(u32),
    BitClear(u32),
    TcbEqual(TcbVersion),
    TcbAtLeast(TcbVersion),
}

/// Outcome of evaluating a policy document against a report. `failed` is
/// empty iff `ok`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyResult {
    pub ok: bool,
    pub failed: Vec<String>,
}

impl Policies {
    /// Parse and validate a JSON policy document. A malformed document —
    /// bad JSON, an unknown field or check, or a literal that does not fit
    /// the field — is a caller error carrying detail.
    pub fn parse(document: &[u8]) -> Result<Self> {
        let assertions: Vec<PolicyAssertion> =
            serde_json::from_slice(document).context("invalid policy document")?;
        let assertions = assertions
            .into_iter()
            .map(compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { assertions })
    }

    /// Evaluate every assertion against the report. Evaluation never stops
    /// early; the names of all failing assertions are collected in document
    /// order. An empty policy set trivially succeeds.
    pub fn evaluate(&self, report: &AttestationReport) -> PolicyResult {
        let failed: Vec<String> = self
            .assertions
            .iter()
            .filter(|a| !a.check.holds(field_value(report, a.field)))
            .map(|a| a.name.clone())
            .collect();
        PolicyResult {
            ok: failed.is_empty(),
            failed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assertions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assertions.len()
    }
}

enum FieldKind {
    Int { bits: u32 },
    Bytes { len: usize },
    Tcb,
}

enum FieldValue<'a> {
    Int(u64),
    Bytes(&'a [u8]),
    Tcb(TcbVersion),
}

fn field_kind(field: ReportField) -> FieldKind {
    use ReportField::*;
    match field {
        Version | GuestSvn | Vmpl | SignatureAlgo | AuthorKeyEn => FieldKind::Int { bits: 32 },
        GuestPolicy | PlatformInfo => FieldKind::Int { bits: 64 },
        FamilyId | ImageId => FieldKind::Bytes { len: 16 },
        ReportData | ChipId => FieldKind::Bytes { len: 64 },
        Measurement | IdKeyDigest | AuthorKeyDigest => FieldKind::Bytes { len: 48 },
        HostData | ReportId | ReportIdMa => FieldKind::Bytes { len: 32 },
        CurrentTcb | ReportedTcb | CommittedTcb | LaunchTcb => FieldKind::Tcb,
    }
}

fn field_value(report: &AttestationReport, field: ReportField) -> FieldValue<'_> {
    use ReportField::*;
    match field {
        Version => FieldValue::Int(report.version.into()),
        GuestSvn => FieldValue::Int(report.guest_svn.into()),
        GuestPolicy => FieldValue::Int(report.guest_policy),
        FamilyId => FieldValue::Bytes(&report.family_id),
        ImageId => FieldValue::Bytes(&report.image_id),
        Vmpl => FieldValue::Int(report.vmpl.into()),
        SignatureAlgo => FieldValue::Int(report.signature_algo.into()),
        CurrentTcb => FieldValue::Tcb(report.current_tcb),
        PlatformInfo => FieldValue::Int(report.platform_info),
        AuthorKeyEn => FieldValue::Int(report.author_key_en.into()),
        ReportData => FieldValue::Bytes(&report.report_data),
        Measurement => FieldValue::Bytes(&report.measurement),
        HostData => FieldValue::Bytes(&report.host_data),
        IdKeyDigest => FieldValue::Bytes(&report.id_key_digest),
        AuthorKeyDigest => FieldValue::Bytes(&report.author_key_digest),
        ReportId => FieldValue::Bytes(&report.report_id),
        ReportIdMa => FieldValue::Bytes(&report.report_id_ma),
        ReportedTcb => FieldValue::Tcb(report.reported_tcb),
        ChipId => FieldValue::Bytes(&report.chip_id),
        CommittedTcb => FieldValue::Tcb(report.committed_tcb),
        LaunchTcb => FieldValue::Tcb(report.launch_tcb),
    }
}

fn compile(assertion: PolicyAssertion) -> Result<CompiledAssertion> {
    let PolicyAssertion { name, field, check } = assertion;
    let compiled = match (&check, field_kind(field)) {
        (Check::Equals { value: CheckValue::Hex(literal) }, FieldKind::Bytes { len }) => {
            let bytes = hex::decode(literal)
                .with_context(|| format!("assertion {name:?}: invalid hex literal"))?;
            if bytes.len() != len {
                bail!(
                    "assertion {name:?}: field {field:?} is {len} bytes, literal is {}",
                    bytes.len()
                );
            }
            CompiledCheck::BytesEqual(bytes)
        }
        (Check::Equals { value: CheckValue::Integer(value) }, FieldKind::Int { .. }) => {
            CompiledCheck::IntEqual(*value)
        }
        (Check::Equals { value: CheckValue::Tcb(value) }, FieldKind::Tcb) => {
            CompiledCheck::TcbEqual(*value)
        }
        (Check::AtLeast { value: CheckValue::Integer(value) }, FieldKind::Int { .. }) => {
            CompiledCheck::IntAtLeast(*value)
        }
        (Check::AtLeast { value: CheckValue::Tcb(value) }, FieldKind::Tcb) => {
            CompiledCheck::TcbAtLeast(*value)
        }
        (Check::BitSet { bit }, FieldKind::Int { bits }) if *bit < bits => {
            CompiledCheck::BitSet(*bit)
        }
        (Check::BitClear { bit }, FieldKind::Int { bits }) if *bit < bits => {
            CompiledCheck::BitClear(*bit)
        }
        _ => bail!("assertion {name:?}: check is not applicable to field {field:?}"),
    };
    Ok(CompiledAssertion {
        name,
        field,
        check: compiled,
    })
}

impl CompiledCheck {
    fn holds(&self, value: FieldValue) -> bool {
        match (self, value) {
            (Self::BytesEqual(expected), FieldValue::Bytes(actual)) => expected == actual,
            (Self::IntEqual(expected), FieldValue::Int(actual)) => actual == *expected,
            (Self::IntAtLeast(floor), FieldValue::Int(actual)) => actual >= *floor,
            (Self::BitSet(bit), FieldValue::Int(actual)) => actual & (1 << bit) != 0,
            (Self::BitClear(bit), FieldValue::Int(actual)) => actual & (1 << bit) == 0,
            (Self::TcbEqual(expected), FieldValue::Tcb(actual)) => actual.matches(expected),
            (Self::TcbAtLeast(floor), FieldValue::Tcb(actual)) => actual.at_least(floor),
            // Unreachable: compile() rejects mismatched combinations.
            _ => false,
        }
    }
}
