// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS service for sealing stored WHOOP tokens.
//!
//! Every ciphertext is bound to its owner through additional authenticated
//! data, so a sealed token copied onto another user's document fails to
//! decrypt.

use crate::error::AppError;
use crate::models::UserId;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// KMS encryption service.
#[derive(Clone)]
pub struct KmsService {
    /// Format: projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
    key_path: String,

    client: Option<std::sync::Arc<google_cloud_kms::client::Client>>,
}

fn aad_for(user_id: UserId) -> Vec<u8> {
    format!("user_id:{}", user_id).into_bytes()
}

impl KmsService {
    const KEY_RING_NAME: &str = "whoop-sentinel";

    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self, AppError> {
        let key_path = format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project_id,
            location,
            Self::KEY_RING_NAME,
            key_name
        );

        let config = google_cloud_kms::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS auth config: {}", e))
            })?;

        let client = google_cloud_kms::client::Client::new(config)
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to create KMS client: {}", e))
            })?;

        Ok(Self {
            key_path,
            client: Some(std::sync::Arc::new(client)),
        })
    }

    /// Offline service for tests and the emulator.
    ///
    /// Ciphertext is `base64(aad) . base64(plaintext)`; only debug builds have it.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: "projects/mock/locations/mock/keyRings/mock/cryptoKeys/mock".to_string(),
            client: None,
        }
    }

    /// Encrypt `plaintext` for `user_id`. Returns base64 ciphertext.
    pub async fn encrypt(&self, plaintext: &str, user_id: UserId) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::EncryptRequest;

        let aad = aad_for(user_id);

        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return Ok(format!("{}.{}", BASE64.encode(&aad), BASE64.encode(plaintext)));
            }
        }

        // Release builds never fall back to the mock.
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let req = EncryptRequest {
            name: self.key_path.clone(),
            plaintext: plaintext.as_bytes().to_vec(),
            additional_authenticated_data: aad,
            ..Default::default()
        };

        let response = client
            .encrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;

        Ok(BASE64.encode(response.ciphertext))
    }

    /// Decrypt base64 ciphertext sealed for `user_id`.
    pub async fn decrypt(&self, ciphertext_b64: &str, user_id: UserId) -> Result<String, AppError> {
        use google_cloud_googleapis::cloud::kms::v1::DecryptRequest;

        let aad = aad_for(user_id);

        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return mock_open(ciphertext_b64, &aad);
            }
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("KMS client not connected")))?;

        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Base64 output decode failed: {}", e))
        })?;

        let req = DecryptRequest {
            name: self.key_path.clone(),
            ciphertext,
            additional_authenticated_data: aad,
            ..Default::default()
        };

        let response = client
            .decrypt(req, None)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?;

        String::from_utf8(response.plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

#[cfg(debug_assertions)]
fn mock_open(ciphertext: &str, aad: &[u8]) -> Result<String, AppError> {
    let (aad_b64, body_b64) = ciphertext
        .split_once('.')
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Malformed ciphertext (mock)")))?;

    let sealed_aad = BASE64
        .decode(aad_b64)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Base64 decode failed (mock): {}", e)))?;
    if sealed_aad != aad {
        return Err(AppError::Internal(anyhow::anyhow!(
            "KMS decrypt failed (mock): AAD mismatch"
        )));
    }

    let bytes = BASE64
        .decode(body_b64)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Base64 decode failed (mock): {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed (mock): {}", e)))
}
