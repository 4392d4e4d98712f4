use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{
    digest::{KeyInit, MacError},
    Hmac, Mac,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const TDF_SPEC_VERSION: &str = "4.0.0";

#[derive(Debug, Serialize, Deserialize)]
pub struct TdfManifest {
    pub payload: Payload,
    #[serde(rename = "encryptionInformation")]
    pub encryption_information: EncryptionInformation,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub url: String,
    pub protocol: String,
    #[serde(rename = "isEncrypted")]
    pub is_encrypted: bool,
    #[serde(rename = "tdf_spec_version", skip_serializing_if = "Option::is_none")]
    pub tdf_spec_version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptionInformation {
    #[serde(rename = "type")]
    pub encryption_type: String,
    #[serde(rename = "keyAccess")]
    pub key_access: Vec<KeyAccess>,
    pub method: EncryptionMethod,
    /// Base64 of the policy JSON
    pub policy: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PolicyBinding {
    pub alg: String,
    pub hash: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeyAccess {
    #[serde(rename = "type")]
    pub access_type: String,
    pub url: String,
    pub protocol: String,
    #[serde(rename = "wrappedKey")]
    pub wrapped_key: String,
    #[serde(rename = "policyBinding")]
    pub policy_binding: PolicyBinding,
    #[serde(rename = "encryptedMetadata", skip_serializing_if = "Option::is_none")]
    pub encrypted_metadata: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptionMethod {
    pub algorithm: String,
    #[serde(rename = "isStreamable")]
    pub is_streamable: bool,
}

impl KeyAccess {
    pub fn new(url: String) -> Self {
        KeyAccess {
            access_type: "wrapped".to_string(),
            url,
            protocol: "kas".to_string(),
            wrapped_key: String::new(),
            policy_binding: PolicyBinding {
                alg: "HS256".to_string(),
                hash: String::new(),
            },
            encrypted_metadata: None,
        }
    }

    /// HMAC-SHA256 over the base64 policy, keyed by the payload key
    pub fn generate_policy_binding(&mut self, policy_base64: &str, key: &[u8]) -> Result<(), MacError> {
        let mut mac = <HmacSha256 as KeyInit>::new_from_slice(key).map_err(|_| MacError)?;
        mac.update(policy_base64.as_bytes());
        self.policy_binding.hash = BASE64.encode(mac.finalize().into_bytes());
        self.policy_binding.alg = "HS256".to_string();
        Ok(())
    }

    pub fn verify_policy_binding(&self, policy_base64: &str, key: &[u8]) -> Result<(), MacError> {
        let expected = BASE64
            .decode(&self.policy_binding.hash)
            .map_err(|_| MacError)?;
        let mut mac = <HmacSha256 as KeyInit>::new_from_slice(key).map_err(|_| MacError)?;
        mac.update(policy_base64.as_bytes());
        mac.verify_slice(&expected)
    }
}

impl TdfManifest {
    pub fn new(payload_url: String, kas_url: String) -> Self {
        TdfManifest {
            payload: Payload {
                payload_type: "reference".to_string(),
                url: payload_url,
                protocol: "zip".to_string(),
                is_encrypted: true,
                tdf_spec_version: Some(TDF_SPEC_VERSION.to_string()),
            },
            encryption_information: EncryptionInformation {
                encryption_type: "split".to_string(),
                key_access: vec![KeyAccess::new(kas_url)],
                method: EncryptionMethod {
                    algorithm: "AES-256-GCM".to_string(),
                    is_streamable: false,
                },
                policy: String::new(),
            },
        }
    }

    pub fn key_access(&self) -> Option<&KeyAccess> {
        self.encryption_information.key_access.first()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
