// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fs_err as fs;
use snp_attestd::{AttestdConfig, AttestdService, IssueReportRequest, VerifyReportRequest};

/// SEV-SNP attestation utility
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the service configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain an attestation report, report data read from stdin
    Report(ReportArgs),
    /// Verify an attestation report against a policy document
    Verify(VerifyArgs),
}

#[derive(Parser)]
struct ReportArgs {
    /// also resolve and print the VCEK certificate
    #[arg(long)]
    include_cert: bool,
}

#[derive(Parser)]
struct VerifyArgs {
    /// file containing the encoded attestation report
    #[arg(short, long)]
    report: PathBuf,

    /// file containing the DER-encoded VCEK certificate; fetched when omitted
    #[arg(long)]
    cert: Option<PathBuf>,

    /// file containing the JSON policy document
    #[arg(short, long)]
    policies: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AttestdConfig::load(path)?,
        None => AttestdConfig::default(),
    };

    match cli.command {
        Commands::Report(args) => cmd_report(config, args).await,
        Commands::Verify(args) => cmd_verify(config, args).await,
    }
}

async fn cmd_report(config: AttestdConfig, args: ReportArgs) -> Result<()> {
    let mut report_data = Vec::new();
    std::io::stdin()
        .read_to_end(&mut report_data)
        .context("failed to read report data from stdin")?;

    let service = AttestdService::new(config)?;
    let response = service
        .issue_report(IssueReportRequest {
            report_data,
            include_vcek_cert: args.include_cert,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn cmd_verify(config: AttestdConfig, args: VerifyArgs) -> Result<()> {
    let report = fs::read(&args.report)?;
    let vcek_cert = match &args.cert {
        Some(path) => fs::read(path)?,
        None => Vec::new(),
    };
    let policies = fs::read_to_string(&args.policies)?;

    // Verification never touches the SEV device.
    let service = AttestdService::with_device(config, None);
    let response = service
        .verify_report(VerifyReportRequest {
            report,
            vcek_cert,
            policies,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.ok {
        std::process::exit(1);
    }
    Ok(())
}
