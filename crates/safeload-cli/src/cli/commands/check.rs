//! `safeload check` - Show what the download gate would do with a URL.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;

use safeload_core::{
    decide, effective_name, Decision, PolicyDocument, ServiceConfig, TrustServiceClient,
    TrustSnapshot,
};

use super::report_failure;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Download URL
    pub url: String,

    /// Target filename (default: last URL path segment)
    #[arg(long, default_value = "")]
    pub filename: String,

    /// Policy document (JSON, as served by the trust service)
    #[arg(long, conflicts_with = "server", required_unless_present = "server")]
    pub policy: Option<PathBuf>,

    /// Trust service base URL to fetch the policy from
    #[arg(long)]
    pub server: Option<String>,
}

pub async fn cmd_check(args: CheckArgs) -> i32 {
    match run_check(&args).await {
        Ok(Decision::Deny(reasons)) => {
            println!("deny: {}", reasons.join("; "));
            exit_codes::DENIED
        }
        Ok(Decision::Allow) => {
            println!("allow");
            exit_codes::SUCCESS
        }
        Ok(Decision::Defer) => {
            println!("defer: signed container, verified on completion");
            exit_codes::SUCCESS
        }
        Err(e) => report_failure(&e, false),
    }
}

async fn run_check(args: &CheckArgs) -> Result<Decision> {
    let document = match (&args.policy, &args.server) {
        (Some(path), _) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read policy: {}", path.display()))?;
            serde_json::from_str::<PolicyDocument>(&raw)
                .with_context(|| format!("failed to parse policy: {}", path.display()))?
        }
        (None, Some(server)) => {
            let client = TrustServiceClient::new(ServiceConfig::from_env().with_url(server))?;
            client
                .fetch_policy()
                .await
                .context("failed to fetch trust policy")?
        }
        (None, None) => anyhow::bail!("either --policy or --server is required"),
    };

    let snapshot = TrustSnapshot::from_document(&document)?;
    let name = effective_name(&args.url, &args.filename);
    Ok(decide(&snapshot, &args.url, &name))
}
