//! `safeload pack` - Assemble a signed container.
//!
//! Signing itself happens elsewhere; this only lays out the bytes.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use safeload_core::{container, Certificate, SIGNATURE_SIZE};

use super::inspect::file_name_of;
use super::report_failure;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Payload file to wrap
    pub payload: PathBuf,

    /// Signer certificate (PEM)
    #[arg(long)]
    pub cert: PathBuf,

    /// Raw RSA-2048 PKCS#1 v1.5 signature over SHA-256 of the payload
    #[arg(long)]
    pub signature: PathBuf,

    /// Output path (default: payload path with `.safe` appended)
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

pub fn cmd_pack(args: PackArgs) -> i32 {
    match run_pack(&args) {
        Ok(out) => {
            println!("wrote {}", out.display());
            exit_codes::SUCCESS
        }
        Err(e) => report_failure(&e, false),
    }
}

fn run_pack(args: &PackArgs) -> Result<PathBuf> {
    let pem = fs::read_to_string(&args.cert)
        .with_context(|| format!("failed to read certificate: {}", args.cert.display()))?;
    Certificate::from_pem(&pem)
        .with_context(|| format!("not a PEM certificate: {}", args.cert.display()))?;

    let raw = fs::read(&args.signature)
        .with_context(|| format!("failed to read signature: {}", args.signature.display()))?;
    let signature: [u8; SIGNATURE_SIZE] = raw.as_slice().try_into().map_err(|_| {
        anyhow::anyhow!(
            "signature must be exactly {} bytes, got {}",
            SIGNATURE_SIZE,
            raw.len()
        )
    })?;

    let payload = fs::read(&args.payload)
        .with_context(|| format!("failed to read payload: {}", args.payload.display()))?;

    let out = match &args.out {
        Some(out) => out.clone(),
        None => args
            .payload
            .with_file_name(container::signed_filename(&file_name_of(&args.payload))),
    };

    fs::write(&out, container::build(&pem, &signature, &payload))
        .with_context(|| format!("failed to write container: {}", out.display()))?;

    Ok(out)
}
