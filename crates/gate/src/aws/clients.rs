//! AWS SDK client bundle and the key-source adapters built on it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::primitives::Blob;

use crate::keys::{KeyUnwrapper, SecretPayload, SecretStore};

/// KMS and Secrets Manager clients sharing one [`aws_config::SdkConfig`].
#[derive(Clone)]
pub struct AwsClients {
    /// KMS client used to unwrap the data key.
    pub kms: aws_sdk_kms::Client,
    /// Secrets Manager client used to fetch the wrapped data key.
    pub secretsmanager: aws_sdk_secretsmanager::Client,
}

impl AwsClients {
    /// Load the SDK config from the standard credential chain and build both
    /// clients.
    ///
    /// `endpoint_url` overrides the service endpoint for every client, e.g. to
    /// point at LocalStack.
    ///
    /// # Errors
    ///
    /// Returns an error if the SDK config has no region.
    pub async fn init(endpoint_url: Option<&str>) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(url) = endpoint_url {
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;
        config
            .region()
            .context("no AWS region configured (set AWS_REGION)")?;

        Ok(Self {
            kms: aws_sdk_kms::Client::new(&config),
            secretsmanager: aws_sdk_secretsmanager::Client::new(&config),
        })
    }

    /// [`SecretStore`] backed by this bundle's Secrets Manager client.
    pub fn secret_store(&self) -> SecretsManagerStore {
        SecretsManagerStore {
            client: self.secretsmanager.clone(),
        }
    }

    /// [`KeyUnwrapper`] that decrypts under the KMS key `kms_key_id`.
    pub fn key_unwrapper(&self, kms_key_id: impl Into<String>) -> KmsUnwrapper {
        KmsUnwrapper {
            client: self.kms.clone(),
            key_id: kms_key_id.into(),
        }
    }
}

/// Reads secrets from AWS Secrets Manager.
#[derive(Clone)]
pub struct SecretsManagerStore {
    client: aws_sdk_secretsmanager::Client,
}

#[async_trait]
impl SecretStore for SecretsManagerStore {
    async fn fetch_secret(&self, secret_id: &str) -> Result<Option<SecretPayload>> {
        let secret = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .context("failed to fetch data key from Secrets Manager")?;

        if let Some(binary) = secret.secret_binary() {
            return Ok(Some(SecretPayload::Binary(binary.as_ref().to_vec())));
        }
        Ok(secret
            .secret_string()
            .map(|text| SecretPayload::Text(text.to_owned())))
    }
}

/// Unwraps data keys with AWS KMS `Decrypt`.
#[derive(Clone)]
pub struct KmsUnwrapper {
    client: aws_sdk_kms::Client,
    key_id: String,
}

#[async_trait]
impl KeyUnwrapper for KmsUnwrapper {
    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .decrypt()
            .key_id(&self.key_id)
            .ciphertext_blob(Blob::new(wrapped))
            .send()
            .await
            .context("failed to unwrap data key via KMS")?;

        Ok(resp.plaintext().map(|p| p.as_ref().to_vec()))
    }
}
