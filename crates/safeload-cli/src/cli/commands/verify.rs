//! `safeload verify` - Verify a signed container and extract its payload.
//!
//! Without `--server` only the certificate chain and the signature are
//! checked; revocation needs the trust service.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};

use safeload_core::{
    verify_offline, verify_signed_download, Certificate, RevocationFallback, ServiceConfig,
    TrustServiceClient, TrustSnapshot, VerifiedPayload,
};

use super::inspect::file_name_of;
use super::report_failure;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Signed container (`*.safe`)
    pub file: PathBuf,

    /// Trusted CA root (PEM). Fetched from the trust policy when omitted.
    #[arg(long, required_unless_present = "server")]
    pub root: Option<PathBuf>,

    /// Trust service base URL; enables the revocation check
    #[arg(long)]
    pub server: Option<String>,

    /// Write the verified payload into this directory
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Accept the download when the revocation service cannot be reached
    #[arg(long, requires = "server")]
    pub accept_unchecked_revocation: bool,

    /// Print nothing on success, and no error text on failure
    #[arg(long, short)]
    pub quiet: bool,
}

pub async fn cmd_verify(args: VerifyArgs) -> i32 {
    match run_verify(&args).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_failure(&e, args.quiet),
    }
}

async fn run_verify(args: &VerifyArgs) -> Result<()> {
    let buffer = fs::read(&args.file)
        .with_context(|| format!("failed to read container: {}", args.file.display()))?;
    let filename = file_name_of(&args.file);

    let verified = match &args.server {
        None => {
            let root_path = args
                .root
                .as_deref()
                .context("--root is required without --server")?;
            let root = load_root(root_path)?;
            tracing::warn!("no trust service given; revocation not checked");
            verify_offline(&buffer, &filename, &root, chrono::Utc::now())?
        }
        Some(server) => {
            let client = TrustServiceClient::new(ServiceConfig::from_env().with_url(server))?;
            let root = match &args.root {
                Some(path) => load_root(path)?,
                None => {
                    let document = client
                        .fetch_policy()
                        .await
                        .context("failed to fetch trust policy")?;
                    TrustSnapshot::from_document(&document)?.ca_root().clone()
                }
            };
            let fallback = if args.accept_unchecked_revocation {
                RevocationFallback::Accept
            } else {
                RevocationFallback::Reject
            };
            verify_signed_download(&buffer, &filename, &root, &client, fallback).await?
        }
    };

    let written = match &args.out_dir {
        Some(dir) => Some(write_payload(dir, &verified)?),
        None => None,
    };

    if !args.quiet {
        println!(
            "verified: {} (signed by {})",
            verified.file_name, verified.subject
        );
        if let Some(path) = written {
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}

fn load_root(path: &Path) -> Result<Certificate> {
    let pem = fs::read_to_string(path)
        .with_context(|| format!("failed to read CA root: {}", path.display()))?;
    Certificate::from_pem(&pem)
        .with_context(|| format!("not a PEM certificate: {}", path.display()))
}

fn write_payload(dir: &Path, verified: &VerifiedPayload) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
    let path = dir.join(&verified.file_name);
    fs::write(&path, &verified.payload)
        .with_context(|| format!("failed to write payload: {}", path.display()))?;
    Ok(path)
}
