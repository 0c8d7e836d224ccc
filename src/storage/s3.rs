//! S3-compatible object storage.
//!
//! Uploads accepted books with a signed `PUT`, reads them back with `GET`
//! and removes them with `DELETE`. Requests are signed with
//! [AWS Signature Version 4](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-auth-using-authorization-header.html)
//! using `hmac` + `sha2`.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! kind = "s3"
//!
//! [storage.s3]
//! bucket = "books"
//! prefix = "library/"
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO
//! ```
//!
//! Credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the
//! optional `AWS_SESSION_TOKEN`. A custom endpoint is addressed path-style
//! (`/<bucket>/<key>`), the AWS endpoint virtual-host style.

use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::local::{book_path, remove_file_tolerant};
use crate::config::S3StorageConfig;
use crate::models::{BookRecord, Location};
use crate::traits::{AssetReader, AssetStorage};

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
#[derive(Clone)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: String, secret_access_key: String, session_token: Option<String>) -> Self {
        Self {
            access_key_id,
            secret_access_key,
            session_token,
        }
    }

    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self::new(access_key_id, secret_access_key, session_token))
    }
}

pub struct S3Storage {
    config: S3StorageConfig,
    creds: AwsCredentials,
    client: reqwest::Client,
}

impl S3Storage {
    pub fn new(config: S3StorageConfig, creds: AwsCredentials) -> Self {
        Self {
            config,
            creds,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env(config: S3StorageConfig) -> Result<Self> {
        Ok(Self::new(config, AwsCredentials::from_env()?))
    }

    /// Host part of every request (no scheme, no trailing slash).
    fn host(&self) -> String {
        match &self.config.endpoint_url {
            Some(endpoint) => endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string(),
            None => format!(
                "{}.s3.{}.amazonaws.com",
                self.config.bucket, self.config.region
            ),
        }
    }

    fn scheme(&self) -> &'static str {
        match &self.config.endpoint_url {
            Some(endpoint) if endpoint.starts_with("http://") => "http",
            _ => "https",
        }
    }

    fn object_key(&self, record: &BookRecord, ext: &str) -> String {
        let relative = book_path(&record.author, &record.title);
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}{}.{}", self.config.prefix, relative, ext)
    }

    /// Canonical URI for `key`: path-style on custom endpoints.
    fn canonical_uri(&self, bucket: &str, key: &str) -> String {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        if self.config.endpoint_url.is_some() {
            format!("/{}/{}", bucket, encoded_key)
        } else {
            format!("/{}", encoded_key)
        }
    }

    async fn send(
        &self,
        method: reqwest::Method,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let host = self.host();
        let canonical_uri = self.canonical_uri(bucket, key);
        let payload_hash = hex_sha256(&body);
        let signed = sign_request(
            &self.creds,
            &self.config.region,
            method.as_str(),
            &host,
            &canonical_uri,
            &payload_hash,
            Utc::now(),
        );

        let url = format!("{}://{}{}", self.scheme(), host, canonical_uri);
        let mut req_builder = self
            .client
            .request(method.clone(), &url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &signed.amz_date);

        if let Some(ref token) = self.creds.session_token {
            req_builder = req_builder.header("x-amz-security-token", token);
        }
        if !body.is_empty() {
            req_builder = req_builder.body(body);
        }

        req_builder
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("S3 {} s3://{}/{} failed: {}", method, bucket, key, e))
    }
}

#[async_trait]
impl AssetStorage for S3Storage {
    async fn store(&self, path: &Path, record: &BookRecord) -> Result<Location> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "epub".to_string());
        let key = self.object_key(record, &ext);
        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let resp = self
            .send(reqwest::Method::PUT, &self.config.bucket, &key, body)
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                body.chars().take(500).collect::<String>()
            );
        }

        remove_file_tolerant(path).await?;
        tracing::debug!(bucket = %self.config.bucket, key = %key, "uploaded");

        Ok(Location::ObjectStore {
            host: self.host(),
            bucket: self.config.bucket.clone(),
            key,
        })
    }

    async fn retrieve(&self, location: &Location) -> Result<AssetReader> {
        match location {
            Location::File { path } => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                Ok(Box::new(file))
            }
            Location::ObjectStore { bucket, key, .. } => {
                let resp = self
                    .send(reqwest::Method::GET, bucket, key, Vec::new())
                    .await?;
                if !resp.status().is_success() {
                    bail!("S3 GetObject failed (HTTP {}) for key '{}'", resp.status(), key);
                }
                let bytes = resp.bytes().await?;
                Ok(Box::new(Cursor::new(bytes.to_vec())))
            }
        }
    }

    async fn delete(&self, location: &Location) -> Result<()> {
        match location {
            Location::File { path } => remove_file_tolerant(path).await,
            Location::ObjectStore { bucket, key, .. } => {
                let resp = self
                    .send(reqwest::Method::DELETE, bucket, key, Vec::new())
                    .await?;
                let status = resp.status();
                if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
                    Ok(())
                } else {
                    bail!("S3 DeleteObject failed (HTTP {}) for key '{}'", status, key)
                }
            }
        }
    }
}

// ============ AWS SigV4 Helpers ============

struct SignedRequest {
    authorization: String,
    amz_date: String,
}

/// Sign a request without query parameters.
fn sign_request(
    creds: &AwsCredentials,
    region: &str,
    method: &str,
    host: &str,
    canonical_uri: &str,
    payload_hash: &str,
    now: DateTime<Utc>,
) -> SignedRequest {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut headers = vec![
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method, canonical_uri, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    SignedRequest {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
        amz_date,
    }
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything except `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
