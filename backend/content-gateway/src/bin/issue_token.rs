//! Issue a credential signed with the gateway secret.
//!
//! Usage: `issue-token <subject> [ttl_seconds]`

use anyhow::{anyhow, Context, Result};
use content_gateway::config::Config;
use crypto_core::TokenCodec;
use serde_json::Map;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let subject = args
        .next()
        .ok_or_else(|| anyhow!("usage: issue-token <subject> [ttl_seconds]"))?;
    let ttl_seconds = args
        .next()
        .map(|raw| raw.parse::<i64>().context("ttl_seconds must be an integer"))
        .transpose()?;

    let config = Config::from_env().context("Failed to load configuration")?;
    let codec = TokenCodec::new(&config.auth.jwt_secret, config.token_ttl())?;

    let token = match ttl_seconds {
        Some(seconds) => codec.issue(&subject, Map::new(), chrono::Duration::seconds(seconds))?,
        None => codec.issue_default(&subject, Map::new())?,
    };

    println!("{}", token);
    Ok(())
}
