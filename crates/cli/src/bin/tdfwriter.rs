//! Encrypt a string to a TDF file, then decrypt it back
//!
//! ```bash
//! export TDF_USER=user@example.com TDF_CLIENTID=tdf-client TDF_CLIENTSECRET=secret
//! export TDF_ORGNAME=example TDF_KAS_URL=https://kas.example.com TDF_OIDC_URL=https://idp.example.com
//! tdfwriter -p "some text" -o out.tdf
//! ```

use clap::Parser;
use opentdf_client::TdfConfig;
use opentdf_client_cli::{connect_or_exit, init_tracing};
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "tdfwriter")]
#[command(about = "Encrypt a string payload into a TDF file")]
struct Cli {
    /// Data attributes to apply, separated by commas
    #[arg(
        short = 'a',
        default_value = "https://example.com/attr/Classification/value/C,https://example.com/attr/COI/value/PRF"
    )]
    attributes: String,

    /// String data to encrypt
    #[arg(short = 'p', default_value = "holla at ya boi")]
    payload: String,

    /// Output filename
    #[arg(short = 'o', default_value = "out.tdf")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let attributes: Vec<&str> = cli.attributes.split(',').collect();

    let mut client = connect_or_exit(&TdfConfig::from_env());

    let mut plaintext = client.string_storage(&cli.payload)?;
    let encrypted = client.encrypt_to_string(&plaintext, "", &attributes)?;
    debug!(len = encrypted.len(), "Got TDF encrypted payload");
    std::fs::write(&cli.output, &encrypted)?;

    // Decrypt as well to validate the flow
    let mut container = client.bytes_storage(encrypted)?;
    let decrypted = client.decrypt_tdf(&container)?;
    println!("Round trip decrypted: {}", decrypted);
    println!("Wrote TDF to: {}", cli.output.display());

    container.release()?;
    plaintext.release()?;
    client.close()?;
    Ok(())
}
