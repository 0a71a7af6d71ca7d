use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::blocking::Client;
use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, ETAG, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::JobError;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    pub key: String,
    pub bytes: usize,
    pub etag: Option<String>,
}

/// Unconditional object write. A later put to the same key replaces the earlier object.
pub trait ObjectStore: Send + Sync {
    fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str)
    -> Result<PutReceipt, JobError>;
}

#[derive(Clone)]
pub struct R2Credentials {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

/// S3-compatible client for a Cloudflare R2 bucket.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    endpoint: String,
    host: String,
    region: String,
    credentials: R2Credentials,
}

impl R2Client {
    pub fn new(credentials: R2Credentials) -> Result<Self, JobError> {
        let host = format!("{}.r2.cloudflarestorage.com", credentials.account_id);
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("relief-jobs/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| JobError::StorageHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| JobError::StorageHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("https://{host}"),
            host,
            region: "auto".to_string(),
            credentials,
        })
    }

    fn canonical_uri(&self, key: &str) -> String {
        format!("/{}/{}", uri_encode(&self.credentials.bucket), uri_encode_path(key))
    }

    fn signed_headers(
        &self,
        key: &str,
        body: &[u8],
        content_type: &str,
        now: DateTime<Utc>,
    ) -> Result<HeaderMap, JobError> {
        let request = SignableRequest {
            method: "PUT",
            canonical_uri: self.canonical_uri(key),
            host: &self.host,
            content_type,
            payload_hash: hex::encode(Sha256::digest(body)),
        };
        let signed = sign_v4(&request, &self.credentials, &self.region, now)?;

        let mut headers = HeaderMap::new();
        let pairs = [
            (HeaderName::from_static("x-amz-date"), signed.amz_date.as_str()),
            (
                HeaderName::from_static("x-amz-content-sha256"),
                request.payload_hash.as_str(),
            ),
            (CONTENT_TYPE, content_type),
            (AUTHORIZATION, signed.authorization.as_str()),
        ];
        for (name, value) in pairs {
            let value =
                HeaderValue::from_str(value).map_err(|err| JobError::StorageHttp(err.to_string()))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }
}

impl ObjectStore for R2Client {
    fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<PutReceipt, JobError> {
        let headers = self.signed_headers(key, &body, content_type, Utc::now())?;
        let url = format!("{}{}", self.endpoint, self.canonical_uri(key));
        let bytes = body.len();
        let response = self
            .client
            .put(url)
            .headers(headers)
            .body(body)
            .send()
            .map_err(|err| JobError::StorageHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "object upload failed".to_string());
            return Err(JobError::StorageStatus { status, message });
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim_matches('"').to_string());
        Ok(PutReceipt {
            key: key.to_string(),
            bytes,
            etag,
        })
    }
}

/// Writes JSON artifacts into the configured bucket.
pub struct Publisher<O: ObjectStore> {
    store: O,
}

impl<O: ObjectStore> Publisher<O> {
    pub fn new(store: O) -> Self {
        Self { store }
    }

    pub fn publish(&self, key: &str, body: Vec<u8>) -> Result<PutReceipt, JobError> {
        let receipt = self.store.put_object(key, body, JSON_CONTENT_TYPE)?;
        info!(
            key = %receipt.key,
            bytes = receipt.bytes,
            etag = receipt.etag.as_deref().unwrap_or("-"),
            "published"
        );
        Ok(receipt)
    }
}

struct SignableRequest<'a> {
    method: &'a str,
    canonical_uri: String,
    host: &'a str,
    content_type: &'a str,
    payload_hash: String,
}

struct SignedRequest {
    amz_date: String,
    authorization: String,
}

const SIGNED_HEADERS: &str = "content-type;host;x-amz-content-sha256;x-amz-date";

fn sign_v4(
    request: &SignableRequest<'_>,
    credentials: &R2Credentials,
    region: &str,
    now: DateTime<Utc>,
) -> Result<SignedRequest, JobError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let canonical_request = format!(
        "{method}\n{uri}\n\ncontent-type:{content_type}\nhost:{host}\nx-amz-content-sha256:{hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{hash}",
        method = request.method,
        uri = request.canonical_uri,
        content_type = request.content_type,
        host = request.host,
        hash = request.payload_hash,
    );
    let scope = format!("{date}/{region}/s3/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );
    let key = signing_key(&credentials.secret_access_key, &date, region, "s3")?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(SignedRequest {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            credentials.access_key_id
        ),
        amz_date,
    })
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, JobError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|err| JobError::Signing(err.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, JobError> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn uri_encode(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn uri_encode_path(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}
