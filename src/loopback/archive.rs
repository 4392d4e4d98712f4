use super::manifest::TdfManifest;
use std::io::{self, Cursor, Read, Write};
use thiserror::Error;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

pub const MANIFEST_NAME: &str = "0.manifest.json";
pub const PAYLOAD_NAME: &str = "0.payload";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
    #[error("Invalid TDF structure: {0}")]
    Structure(String),
}

/// One decoded container: manifest plus encrypted payload
#[derive(Debug)]
pub struct TdfEntry {
    pub manifest: TdfManifest,
    pub payload: Vec<u8>,
}

/// Write a single-entry TDF zip container into memory
pub fn write_container(manifest: &TdfManifest, payload: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let manifest_json = manifest.to_json()?;

    writer.start_file::<_, ()>(
        MANIFEST_NAME,
        FileOptions::default().compression_method(zip::CompressionMethod::Stored),
    )?;
    writer.write_all(manifest_json.as_bytes())?;

    writer.start_file::<_, ()>(
        PAYLOAD_NAME,
        FileOptions::default().compression_method(zip::CompressionMethod::Stored),
    )?;
    writer.write_all(payload)?;

    Ok(writer.finish()?.into_inner())
}

pub fn read_container(data: &[u8]) -> Result<TdfEntry, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    let manifest = {
        let mut manifest_file = archive
            .by_name(MANIFEST_NAME)
            .map_err(|_| ArchiveError::Structure(format!("Missing manifest file: {}", MANIFEST_NAME)))?;
        let mut contents = String::new();
        manifest_file.read_to_string(&mut contents)?;
        TdfManifest::from_json(&contents)?
    };

    let payload = {
        let mut payload_file = archive
            .by_name(PAYLOAD_NAME)
            .map_err(|_| ArchiveError::Structure(format!("Missing payload file: {}", PAYLOAD_NAME)))?;
        let mut payload = Vec::new();
        payload_file.read_to_end(&mut payload)?;
        payload
    };

    Ok(TdfEntry { manifest, payload })
}
