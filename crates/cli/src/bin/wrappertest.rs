//! Sequential encrypt/decrypt soak test against one session

use opentdf_client::TdfConfig;
use opentdf_client_cli::{connect_or_exit, init_tracing, Backend};
use std::time::Instant;
use tracing::{debug, info};

const ATTRIBUTES: [&str; 2] = [
    "https://example.com/attr/Classification/value/C",
    "https://example.com/attr/COI/value/PRF",
];

const ITERATIONS: u32 = 1000;

fn round_trip(
    client: &mut opentdf_client::TdfClient<Backend>,
    iteration: u32,
) -> Result<String, opentdf_client::TdfClientError> {
    let started = Instant::now();
    let plaintext = client.string_storage("holla at ya boi")?;
    let encrypted = client.encrypt_to_string(&plaintext, "<some-metadata>", &ATTRIBUTES)?;
    debug!(len = encrypted.len(), "Got TDF encrypted payload");
    info!(iteration, elapsed = ?started.elapsed(), "encrypt");

    let started = Instant::now();
    let container = client.bytes_storage(encrypted)?;
    let decrypted = client.decrypt_tdf(&container)?;
    info!(iteration, elapsed = ?started.elapsed(), "decrypt");
    Ok(decrypted)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut client = connect_or_exit(&TdfConfig::from_env());
    for iteration in 1..=ITERATIONS {
        let decrypted = round_trip(&mut client, iteration)?;
        println!("Round trip decrypted: {}", decrypted);
    }
    client.close()?;
    Ok(())
}
