//! Print the policy embedded in a TDF file

use clap::Parser;
use opentdf_client::TdfConfig;
use opentdf_client_cli::{connect_or_exit, init_tracing};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "policydumper")]
#[command(about = "Print the policy of a TDF file as indented JSON")]
struct Cli {
    /// Path to a TDF file
    path: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let path = std::fs::canonicalize(&cli.path)
        .map_err(|e| format!("Could not load TDF file from path {}: {}", cli.path.display(), e))?;
    let data = std::fs::read(&path)
        .map_err(|e| format!("Could not read TDF file {}: {}", cli.path.display(), e))?;

    let mut client = connect_or_exit(&TdfConfig::from_env());
    let mut storage = client.bytes_storage(data)?;

    debug!("Reading policy of encrypted payload");
    let policy = client.get_policy_from_tdf(&storage)?;
    debug!(attributes = policy.body.data_attributes.len(), "Got policy from TDF");

    println!("Policy JSON:");
    println!("{}", policy.to_json_pretty()?);

    storage.release()?;
    client.close()?;
    Ok(())
}
