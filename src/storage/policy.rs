//! Bucket-policy assertion.
//!
//! The s3 crate covers object traffic but exposes no bucket-policy
//! operation, so this one administrative request is signed here directly
//! (SigV4, single chunk) and sent with the shared HTTP client stack.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// The canned policy granting anonymous `s3:GetObject` on every key.
pub fn public_read_policy(bucket: &str) -> String {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "AddPublicReadCannedAcl",
                "Principal": "*",
                "Effect": "Allow",
                "Action": ["s3:GetObject"],
                "Resource": [format!("arn:aws:s3:::{bucket}/*")]
            }
        ]
    })
    .to_string()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// One fully signed `PUT /{bucket}?policy` request, ready to send.
#[derive(Debug, Clone)]
pub struct SignedPolicyRequest {
    pub url: String,
    pub amz_date: String,
    pub content_sha256: String,
    pub authorization: String,
}

/// Sign the policy upload for a path-style endpoint at a given instant.
pub fn sign_put_policy(
    endpoint: &str,
    region: &str,
    access_key: &str,
    secret_key: &str,
    bucket: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedPolicyRequest, AppError> {
    let parsed = reqwest::Url::parse(endpoint)
        .map_err(|e| AppError::EnvError(format!("Bad S3 endpoint {endpoint}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::EnvError(format!("S3 endpoint {endpoint} has no host")))?;
    let host = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let datestamp = now.format("%Y%m%d").to_string();
    let content_sha256 = sha256_hex(body);

    let canonical_request = format!(
        "PUT\n/{bucket}\npolicy=\nhost:{host}\nx-amz-content-sha256:{content_sha256}\n\
         x-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{content_sha256}"
    );

    let scope = format!("{datestamp}/{region}/s3/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), datestamp.as_bytes());
    let key = hmac_sha256(&key, region.as_bytes());
    let key = hmac_sha256(&key, b"s3");
    let key = hmac_sha256(&key, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={access_key}/{scope}, \
         SignedHeaders={SIGNED_HEADERS}, Signature={signature}"
    );

    Ok(SignedPolicyRequest {
        url: format!("{}/{bucket}?policy=", endpoint.trim_end_matches('/')),
        amz_date,
        content_sha256,
        authorization,
    })
}

/// Assert the public-read policy on a bucket. Idempotent; called on every
/// store connect.
pub async fn put_public_read_policy(
    endpoint: &str,
    region: &str,
    access_key: &str,
    secret_key: &str,
    bucket: &str,
) -> Result<(), AppError> {
    let body = public_read_policy(bucket);
    let request =
        sign_put_policy(endpoint, region, access_key, secret_key, bucket, body.as_bytes(), Utc::now())?;

    let response = reqwest::Client::new()
        .put(&request.url)
        .header("x-amz-date", &request.amz_date)
        .header("x-amz-content-sha256", &request.content_sha256)
        .header("authorization", &request.authorization)
        .body(body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        return Err(AppError::EnvError(format!(
            "Bucket policy rejected for {bucket}: {status} {detail}"
        )));
    }
    tracing::debug!("Public-read policy asserted on {}", bucket);
    Ok(())
}
