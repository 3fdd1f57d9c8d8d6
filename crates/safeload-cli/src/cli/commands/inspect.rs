//! `safeload inspect` - Show the layout and signer of a signed container.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use safeload_core::{container, digest_hex, sha256_hex, sha256_reader, Certificate, GateError};

use super::report_failure;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Signed container (`*.safe`)
    pub file: PathBuf,

    /// Emit JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub fn cmd_inspect(args: InspectArgs) -> i32 {
    match run_inspect(&args) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => report_failure(&e, false),
    }
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let buffer = fs::read(&args.file)
        .with_context(|| format!("failed to read container: {}", args.file.display()))?;
    let filename = file_name_of(&args.file);
    let file = fs::File::open(&args.file)
        .with_context(|| format!("failed to open container: {}", args.file.display()))?;
    let container_sha256 = digest_hex(&sha256_reader(std::io::BufReader::new(file))?);

    let layout = container::layout(&buffer).map_err(GateError::from)?;
    let parsed = container::parse(&buffer, &filename).map_err(GateError::from)?;
    let certificate = Certificate::from_pem(&parsed.certificate_pem)
        .context("container certificate does not parse")?;
    let validity = certificate.validity();
    let key_bits = certificate.public_key().map(|k| k.bits());

    if args.json {
        let report = serde_json::json!({
            "file": filename,
            "declared_filename": parsed.declared_filename,
            "certificate": { "start": 0, "end": layout.certificate_end },
            "signature": { "start": layout.certificate_end, "end": layout.signature_end },
            "payload": { "start": layout.signature_end, "end": layout.total_len },
            "subject": certificate.subject(),
            "issuer": certificate.issuer(),
            "not_before": validity.not_before.to_rfc3339(),
            "not_after": validity.not_after.to_rfc3339(),
            "key_bits": key_bits,
            "fingerprint": certificate.fingerprint(),
            "payload_sha256": sha256_hex(&parsed.payload),
            "container_sha256": container_sha256,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("file:          {}", filename);
    println!("declared name: {}", parsed.declared_filename);
    println!("certificate:   bytes 0..{}", layout.certificate_end);
    println!(
        "signature:     bytes {}..{}",
        layout.certificate_end, layout.signature_end
    );
    println!(
        "payload:       bytes {}..{} ({} bytes)",
        layout.signature_end,
        layout.total_len,
        layout.payload_len()
    );
    println!("subject:       {}", certificate.subject());
    println!("issuer:        {}", certificate.issuer());
    println!(
        "valid:         {} .. {}",
        validity.not_before, validity.not_after
    );
    match key_bits {
        Some(bits) => println!("key:           RSA-{}", bits),
        None => println!("key:           not RSA"),
    }
    println!("fingerprint:   {}", certificate.fingerprint());
    println!("payload hash:  {}", sha256_hex(&parsed.payload));
    println!("file hash:     {}", container_sha256);

    Ok(())
}

pub(crate) fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
