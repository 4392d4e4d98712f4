mod common;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use common::*;
use opentdf_client::{PolicyError, ValidationErrorType};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Rewrite a container so its manifest carries `policy` as the encoded policy
fn with_embedded_policy(container: &[u8], policy: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(container)).unwrap();
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let name = entry.name().to_string();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        if name == "0.manifest.json" {
            let mut manifest: serde_json::Value = serde_json::from_slice(&contents).unwrap();
            manifest["encryptionInformation"]["policy"] = BASE64.encode(policy).into();
            contents = serde_json::to_vec(&manifest).unwrap();
        }
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(&contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[test]
fn test_policy_round_trip_preserves_attribute_order() -> Result<(), Box<dyn std::error::Error>> {
    let (_backend, mut client) = connect();
    let attributes = [
        "https://example.com/attr/COI/value/PRF",
        "https://example.com/attr/Classification/value/C",
        "https://example.com/attr/Releasable/value/USA",
    ];

    let encrypted = encrypt(&mut client, TEST_PLAINTEXT, "", &attributes);
    let container = client.bytes_storage(encrypted)?;
    let policy = client.get_policy_from_tdf(&container)?;

    assert_eq!(policy.attribute_uris(), attributes.to_vec());
    assert_eq!(policy.body.dissem, vec![USER.to_string()]);
    assert_eq!(policy.tdf_spec_version, "4.0.0");
    assert!(uuid::Uuid::parse_str(&policy.uuid).is_ok());
    policy.validate()?;
    Ok(())
}

#[test]
fn test_policy_without_attributes() {
    let (_backend, mut client) = connect();
    let encrypted = encrypt(&mut client, TEST_PLAINTEXT, "", &NO_ATTRIBUTES);
    let container = client.bytes_storage(encrypted).unwrap();

    let policy = client.get_policy_from_tdf(&container).unwrap();
    assert!(policy.body.data_attributes.is_empty());
    assert_eq!(policy.body.dissem, vec![USER.to_string()]);
}

#[test]
fn test_each_encrypt_gets_its_own_policy() {
    let (_backend, mut client) = connect();
    let first = encrypt(&mut client, TEST_PLAINTEXT, "", &ATTRIBUTES);
    let second = encrypt(&mut client, TEST_PLAINTEXT, "", &ATTRIBUTES[1..]);

    let first = client.bytes_storage(first).unwrap();
    let second = client.bytes_storage(second).unwrap();
    let first = client.get_policy_from_tdf(&first).unwrap();
    let second = client.get_policy_from_tdf(&second).unwrap();

    assert_eq!(first.attribute_uris(), ATTRIBUTES.to_vec());
    assert_eq!(second.attribute_uris(), vec![ATTRIBUTES[1]]);
    assert_ne!(first.uuid, second.uuid);
}

#[test]
fn test_policy_json_matches_decoded_policy() {
    let (_backend, mut client) = connect();
    let encrypted = encrypt(&mut client, TEST_PLAINTEXT, "", &ATTRIBUTES);
    let container = client.bytes_storage(encrypted).unwrap();

    let raw = client.get_policy_json(&container).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
        value["body"]["dataAttributes"][0]["attribute"],
        ATTRIBUTES[0]
    );

    let decoded = client.get_policy_from_tdf(&container).unwrap();
    assert_eq!(Policy::from_json(&raw).unwrap(), decoded);
}

#[test]
fn test_policy_readable_without_decrypt_rights() {
    let (_backend, mut client) = connect();
    let encrypted = encrypt(&mut client, TEST_PLAINTEXT, "", &ATTRIBUTES);

    // A different KAS key cannot decrypt but can still inspect the policy
    let (_other_backend, mut other) = connect();
    let container = other.bytes_storage(encrypted).unwrap();
    assert!(other.decrypt_tdf(&container).is_err());
    let policy = other.get_policy_from_tdf(&container).unwrap();
    assert_eq!(policy.attribute_uris(), ATTRIBUTES.to_vec());
}

#[test]
fn test_pretty_policy_uses_four_space_indent() {
    let (_backend, mut client) = connect();
    let encrypted = encrypt(&mut client, TEST_PLAINTEXT, "", &ATTRIBUTES);
    let container = client.bytes_storage(encrypted).unwrap();

    let pretty = client
        .get_policy_from_tdf(&container)
        .unwrap()
        .to_json_pretty()
        .unwrap();
    let mut lines = pretty.lines();
    assert_eq!(lines.next(), Some("{"));
    assert!(lines.next().unwrap().starts_with("    \"uuid\""));
    assert!(pretty.contains("        \"dataAttributes\""));
}

#[test]
fn test_permissive_decoding_of_partial_documents() {
    let policy = Policy::from_json(r#"{"body": {"dataAttributes": null}}"#).unwrap();
    assert!(policy.uuid.is_empty());
    assert!(policy.body.data_attributes.is_empty());
    assert!(policy.body.dissem.is_empty());

    match policy.validate() {
        Err(PolicyError::ValidationFailed(errors)) => {
            let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(fields, vec!["uuid", "tdf_spec_version"]);
            assert_eq!(errors[0].error_type, ValidationErrorType::Required);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_malformed_policy_is_a_decode_error() {
    let err = Policy::from_json("{\"uuid\": 42}").unwrap_err();
    assert!(matches!(err, PolicyError::SerializationError(_)));
}

#[test]
fn test_undecodable_embedded_policy_is_a_decode_error() {
    let (_backend, mut client) = connect();
    let encrypted = encrypt(&mut client, TEST_PLAINTEXT, "", &ATTRIBUTES);

    for policy in ["this is not json", r#"{"uuid": 42}"#] {
        let tampered = with_embedded_policy(&encrypted, policy);
        let container = client.bytes_storage(tampered).unwrap();

        // The raw document is still readable
        assert_eq!(client.get_policy_json(&container).unwrap(), policy);

        let err = client.get_policy_from_tdf(&container).unwrap_err();
        assert!(
            matches!(err, TdfClientError::Decode { what: "policy", .. }),
            "unexpected error: {:?}",
            err
        );
        assert!(err.is_decode_error());
        assert!(!matches!(err, TdfClientError::OperationFailed { .. }));
    }
}
