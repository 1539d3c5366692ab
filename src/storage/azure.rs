//! Azure Blob Storage backend.
//!
//! Talks to the Azure Blob REST API with `reqwest`.  Every FileProvider
//! container maps to an Azure container of the same name and every
//! object to a block blob named `{prefix}{key}`.
//!
//!   `ensure_container()` -> Create Container (409 means it already exists)
//!   `put()`              -> Put Blob with `x-ms-blob-content-type` + `Content-MD5`
//!   `get()` / `exists()` -> Get Blob / Get Blob Properties
//!
//! Credentials are resolved via:
//!   - `AZURE_STORAGE_KEY` environment variable (Shared Key auth)
//!   - `AZURE_STORAGE_CONNECTION_STRING` environment variable
//!   - `AZURE_STORAGE_SAS_TOKEN` environment variable (SAS token auth)

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use reqwest::StatusCode;
use sha2::Sha256;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::backend::{StorageBackend, StoredObject};

/// Azure REST API version used for all requests.
const AZURE_API_VERSION: &str = "2023-11-03";

/// Characters left unescaped in blob paths: unreserved plus '/'.
const AZURE_BLOB_ENCODE_SET: percent_encoding::AsciiSet = percent_encoding::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Backend that stores objects in Azure Blob Storage.
pub struct AzureBlobBackend {
    /// HTTP client for Azure Blob REST API calls.
    client: reqwest::Client,
    /// Azure storage account name.
    account: String,
    /// Prefix for all blob names.
    prefix: String,
    /// The base URL for the Azure Blob service endpoint.
    base_url: String,
    /// Authentication method.
    auth: AzureAuth,
}

/// Azure authentication method.
enum AzureAuth {
    /// Shared Key authentication using the storage account key.
    SharedKey { key_bytes: Vec<u8> },
    /// SAS token authentication (appended as query parameter).
    SasToken { token: String },
}

/// The parts of a request that go into a Shared Key signature.
struct SignedRequest<'a> {
    method: &'a str,
    /// Canonicalized resource path without the account, e.g. `/files/key`.
    resource: &'a str,
    content_length: Option<usize>,
    content_md5: &'a str,
    content_type: &'a str,
    date: &'a str,
    extra_headers: &'a [(String, String)],
    query_params: &'a [(String, String)],
}

impl AzureBlobBackend {
    /// Create a new Azure backend for `account`.
    ///
    /// `endpoint` overrides the default
    /// `https://{account}.blob.core.windows.net` service URL when non-empty.
    /// Credentials are resolved from environment variables.
    pub fn new(account: String, endpoint: String, prefix: String) -> anyhow::Result<Self> {
        let auth = Self::resolve_auth()?;
        let backend = Self::from_parts(account, endpoint, prefix, auth)?;
        info!(
            "Azure blob backend initialized: account={} endpoint={} prefix='{}'",
            backend.account, backend.base_url, backend.prefix
        );
        Ok(backend)
    }

    fn from_parts(
        account: String,
        endpoint: String,
        prefix: String,
        auth: AzureAuth,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        let base_url = if endpoint.is_empty() {
            format!("https://{}.blob.core.windows.net", account)
        } else {
            endpoint.trim_end_matches('/').to_string()
        };

        Ok(Self {
            client,
            account,
            prefix,
            base_url,
            auth,
        })
    }

    /// Resolve Azure authentication from environment variables.
    fn resolve_auth() -> anyhow::Result<AzureAuth> {
        if let Ok(key) = std::env::var("AZURE_STORAGE_KEY") {
            let key_bytes = BASE64_STANDARD.decode(&key).map_err(|e| {
                anyhow::anyhow!("Invalid AZURE_STORAGE_KEY (not valid base64): {}", e)
            })?;
            return Ok(AzureAuth::SharedKey { key_bytes });
        }

        if let Ok(conn_str) = std::env::var("AZURE_STORAGE_CONNECTION_STRING") {
            for part in conn_str.split(';') {
                if let Some(key_val) = part.strip_prefix("AccountKey=") {
                    let key_bytes = BASE64_STANDARD.decode(key_val).map_err(|e| {
                        anyhow::anyhow!("Invalid AccountKey in connection string: {}", e)
                    })?;
                    return Ok(AzureAuth::SharedKey { key_bytes });
                }
            }
        }

        if let Ok(sas) = std::env::var("AZURE_STORAGE_SAS_TOKEN") {
            let token = sas.strip_prefix('?').unwrap_or(&sas).to_string();
            return Ok(AzureAuth::SasToken { token });
        }

        Err(anyhow::anyhow!(
            "No Azure credentials found. Set AZURE_STORAGE_KEY, \
             AZURE_STORAGE_CONNECTION_STRING, or AZURE_STORAGE_SAS_TOKEN."
        ))
    }

    /// Map an object key to its blob name.
    fn blob_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Full URL of a container.
    fn container_url(&self, container: &str) -> String {
        format!("{}/{}", self.base_url, container)
    }

    /// Full URL of a blob, percent-encoded except for '/'.
    fn blob_url(&self, container: &str, blob_name: &str) -> String {
        let encoded_blob =
            percent_encoding::utf8_percent_encode(blob_name, &AZURE_BLOB_ENCODE_SET).to_string();
        format!("{}/{}/{}", self.base_url, container, encoded_blob)
    }

    /// Base64 of the binary MD5 digest, the form Azure expects in `Content-MD5`.
    fn content_md5(data: &[u8]) -> String {
        let mut hasher = Md5::new();
        hasher.update(data);
        BASE64_STANDARD.encode(hasher.finalize())
    }

    /// Build the Shared Key string-to-sign.
    ///
    /// ```text
    /// VERB\n
    /// Content-Encoding\n
    /// Content-Language\n
    /// Content-Length\n
    /// Content-MD5\n
    /// Content-Type\n
    /// Date\n
    /// If-Modified-Since\n
    /// If-Match\n
    /// If-None-Match\n
    /// If-Unmodified-Since\n
    /// Range\n
    /// CanonicalizedHeaders\n
    /// CanonicalizedResource
    /// ```
    fn string_to_sign(&self, req: &SignedRequest<'_>) -> String {
        // Content-Length: empty for 0 or if not provided (GET/HEAD).
        let content_length_str = match req.content_length {
            Some(0) | None => String::new(),
            Some(len) => len.to_string(),
        };

        let mut ms_headers: Vec<(String, String)> = vec![
            ("x-ms-date".to_string(), req.date.to_string()),
            ("x-ms-version".to_string(), AZURE_API_VERSION.to_string()),
        ];
        for (k, v) in req.extra_headers {
            let lk = k.to_lowercase();
            if lk.starts_with("x-ms-") && lk != "x-ms-date" && lk != "x-ms-version" {
                ms_headers.push((lk, v.clone()));
            }
        }
        ms_headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonicalized_headers: String = ms_headers
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        // The canonicalized resource uses the un-encoded blob name.
        let mut canonicalized_resource = format!("/{}{}", self.account, req.resource);
        let mut sorted_params = req.query_params.to_vec();
        sorted_params.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in &sorted_params {
            canonicalized_resource.push_str(&format!("\n{}:{}", k.to_lowercase(), v));
        }

        format!(
            "{}\n\n\n{}\n{}\n{}\n\n\n\n\n\n\n{}\n{}",
            req.method,
            content_length_str,
            req.content_md5,
            req.content_type,
            canonicalized_headers,
            canonicalized_resource
        )
    }

    /// Sign a request and return the `Authorization` header value, or
    /// `None` when SAS auth is in use.
    fn authorization(&self, req: &SignedRequest<'_>) -> anyhow::Result<Option<String>> {
        let key_bytes = match &self.auth {
            AzureAuth::SharedKey { key_bytes } => key_bytes,
            AzureAuth::SasToken { .. } => return Ok(None),
        };

        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(key_bytes)
            .map_err(|e| anyhow::anyhow!("HMAC key error: {}", e))?;
        mac.update(self.string_to_sign(req).as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(Some(format!("SharedKey {}:{}", self.account, signature)))
    }

    /// Get the current UTC date in RFC 1123 format for Azure headers.
    fn rfc1123_date() -> String {
        httpdate::fmt_http_date(std::time::SystemTime::now())
    }

    /// Append SAS token to a URL if using SAS auth.
    fn maybe_append_sas(&self, url: &str) -> String {
        match &self.auth {
            AzureAuth::SasToken { token } => {
                if url.contains('?') {
                    format!("{}&{}", url, token)
                } else {
                    format!("{}?{}", url, token)
                }
            }
            AzureAuth::SharedKey { .. } => url.to_string(),
        }
    }

    /// Map an Azure HTTP error to an anyhow error with context.
    fn map_azure_error(context: &str, status: StatusCode, body: &str) -> anyhow::Error {
        anyhow::anyhow!("Azure {}: HTTP {} - {}", context, status, body)
    }

    // -- Azure Blob REST API operations ----------------------------------------

    /// Create Container. A 409 means the container already exists.
    async fn azure_create_container(&self, container: &str) -> anyhow::Result<()> {
        let url = format!("{}?restype=container", self.container_url(container));
        let date = Self::rfc1123_date();
        let resource = format!("/{}", container);
        let query = [("restype".to_string(), "container".to_string())];

        let mut req = self
            .client
            .put(self.maybe_append_sas(&url))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Content-Length", "0");

        if let Some(auth_header) = self.authorization(&SignedRequest {
            method: "PUT",
            resource: &resource,
            content_length: None,
            content_md5: "",
            content_type: "",
            date: &date,
            extra_headers: &[],
            query_params: &query,
        })? {
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Azure create container request failed: {}", e))?;

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            debug!("Azure container already exists: {}", container);
            return Ok(());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_azure_error("create container", status, &body));
        }

        info!("Created Azure container {}", container);
        Ok(())
    }

    /// Upload a block blob (Put Blob) and return its URL.
    async fn azure_upload(
        &self,
        container: &str,
        blob_name: &str,
        data: Bytes,
        content_type: &str,
    ) -> anyhow::Result<String> {
        let url = self.blob_url(container, blob_name);
        let date = Self::rfc1123_date();
        let content_md5 = Self::content_md5(&data);
        let resource = format!("/{}/{}", container, blob_name);

        let extra_headers = vec![
            ("x-ms-blob-type".to_string(), "BlockBlob".to_string()),
            ("x-ms-blob-content-type".to_string(), content_type.to_string()),
        ];

        let mut req = self
            .client
            .put(self.maybe_append_sas(&url))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-blob-content-type", content_type)
            .header("Content-Type", content_type)
            .header("Content-MD5", &content_md5);

        if let Some(auth_header) = self.authorization(&SignedRequest {
            method: "PUT",
            resource: &resource,
            content_length: Some(data.len()),
            content_md5: &content_md5,
            content_type,
            date: &date,
            extra_headers: &extra_headers,
            query_params: &[],
        })? {
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .body(data)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Azure upload request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_azure_error("upload", status, &body));
        }

        Ok(url)
    }

    /// Download a blob (Get Blob).
    async fn azure_download(&self, container: &str, blob_name: &str) -> anyhow::Result<StoredObject> {
        let url = self.blob_url(container, blob_name);
        let date = Self::rfc1123_date();
        let resource = format!("/{}/{}", container, blob_name);

        let mut req = self
            .client
            .get(self.maybe_append_sas(&url))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION);

        if let Some(auth_header) = self.authorization(&SignedRequest {
            method: "GET",
            resource: &resource,
            content_length: None,
            content_md5: "",
            content_type: "",
            date: &date,
            extra_headers: &[],
            query_params: &[],
        })? {
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Azure download request failed: {}", e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            anyhow::bail!("Object not found: {}/{}", container, blob_name);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::map_azure_error("download", status, &body));
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = resp
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("Azure download body read failed: {}", e))?;

        Ok(StoredObject { data, content_type })
    }

    /// Check if a blob exists via HEAD (Get Blob Properties).
    async fn azure_exists(&self, container: &str, blob_name: &str) -> anyhow::Result<bool> {
        let url = self.blob_url(container, blob_name);
        let date = Self::rfc1123_date();
        let resource = format!("/{}/{}", container, blob_name);

        let mut req = self
            .client
            .head(self.maybe_append_sas(&url))
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION);

        if let Some(auth_header) = self.authorization(&SignedRequest {
            method: "HEAD",
            resource: &resource,
            content_length: None,
            content_md5: "",
            content_type: "",
            date: &date,
            extra_headers: &[],
            query_params: &[],
        })? {
            req = req.header("Authorization", auth_header);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Azure exists request failed: {}", e))?;

        let status = resp.status();
        if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(Self::map_azure_error("exists", status, ""))
        }
    }
}

impl StorageBackend for AzureBlobBackend {
    fn ensure_container(
        &self,
        container: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let container = container.to_string();
        Box::pin(async move { self.azure_create_container(&container).await })
    }

    fn put(
        &self,
        container: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let container = container.to_string();
        let blob_name = self.blob_name(key);
        let content_type = content_type.to_string();
        Box::pin(async move {
            self.azure_upload(&container, &blob_name, data, &content_type)
                .await
        })
    }

    fn get(
        &self,
        container: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<StoredObject>> + Send + '_>> {
        let container = container.to_string();
        let blob_name = self.blob_name(key);
        Box::pin(async move { self.azure_download(&container, &blob_name).await })
    }

    fn exists(
        &self,
        container: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let container = container.to_string();
        let blob_name = self.blob_name(key);
        Box::pin(async move { self.azure_exists(&container, &blob_name).await })
    }
}
