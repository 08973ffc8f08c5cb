//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from sm-core.

use async_trait::async_trait;

use sm_core::{
    CompletedPart, ConnectionConfig, Error, ListOptions, ListResult, MultipartUpload, ObjectInfo,
    ObjectStore, Result, UploadedPart,
};

/// Map an SDK failure onto the core error taxonomy: 404-like errors become
/// NotFound, everything else propagates as Network.
fn classify_sdk_error(err: impl std::fmt::Display, subject: &str) -> Error {
    let err_str = err.to_string();
    if err_str.contains("NotFound") || err_str.contains("NoSuchKey") {
        Error::NotFound(subject.to_string())
    } else {
        Error::Network(err_str)
    }
}

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
}

impl S3Client {
    /// Create a new S3 client from explicit connection details
    pub async fn new(connection: &ConnectionConfig) -> Result<Self> {
        connection.validate()?;

        let credentials = aws_credential_types::Credentials::new(
            connection.access_key.clone(),
            connection.secret_key.clone(),
            None, // session token
            None, // expiry
            "sm-static-credentials",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(connection.region.clone()));
        if let Some(endpoint) = &connection.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(connection.force_path_style)
            .build();

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }

    /// Create a new S3 client from the ambient AWS configuration
    /// (environment, shared config files, instance metadata)
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            inner: aws_sdk_s3::Client::new(&config),
        }
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list_objects(&self, bucket: &str, options: ListOptions) -> Result<ListResult> {
        let mut request = self.inner.list_objects_v2().bucket(bucket);

        if let Some(prefix) = &options.prefix {
            request = request.prefix(prefix);
        }
        if let Some(delimiter) = &options.delimiter {
            request = request.delimiter(delimiter);
        }
        if let Some(max) = options.max_keys {
            request = request.max_keys(max);
        }
        if let Some(token) = &options.continuation_token {
            request = request.continuation_token(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let mut items = Vec::new();

        // Common prefixes (folders) first, then objects
        for prefix in response.common_prefixes() {
            if let Some(p) = prefix.prefix() {
                items.push(ObjectInfo::dir(p));
            }
        }

        for object in response.contents() {
            let key = object.key().unwrap_or_default().to_string();
            let size = object.size().unwrap_or(0);
            let mut info = ObjectInfo::file(&key, size);

            if let Some(modified) = object.last_modified() {
                info.last_modified = jiff::Timestamp::from_second(modified.secs()).ok();
            }
            if let Some(etag) = object.e_tag() {
                info.etag = Some(etag.trim_matches('"').to_string());
            }
            if let Some(sc) = object.storage_class() {
                info.storage_class = Some(sc.as_str().to_string());
            }

            items.push(info);
        }

        Ok(ListResult {
            items,
            truncated: response.is_truncated().unwrap_or(false),
            continuation_token: response.next_continuation_token().map(|s| s.to_string()),
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        let response = self
            .inner
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(aws_sdk_s3::error::DisplayErrorContext(e), key))?;

        let size = response.content_length().unwrap_or(0);
        let mut info = ObjectInfo::file(key, size);

        if let Some(modified) = response.last_modified() {
            info.last_modified = jiff::Timestamp::from_second(modified.secs()).ok();
        }
        if let Some(etag) = response.e_tag() {
            info.etag = Some(etag.trim_matches('"').to_string());
        }
        if let Some(ct) = response.content_type() {
            info.content_type = Some(ct.to_string());
        }
        if let Some(sc) = response.storage_class() {
            info.storage_class = Some(sc.as_str().to_string());
        }

        Ok(info)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(aws_sdk_s3::error::DisplayErrorContext(e), key))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<ObjectInfo> {
        let size = data.len() as i64;
        let body = aws_sdk_s3::primitives::ByteStream::from(data);

        let mut request = self.inner.put_object().bucket(bucket).key(key).body(body);
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let mut info = ObjectInfo::file(key, size);
        if let Some(etag) = response.e_tag() {
            info.etag = Some(etag.trim_matches('"').to_string());
        }
        info.last_modified = Some(jiff::Timestamp::now());

        Ok(info)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(aws_sdk_s3::error::DisplayErrorContext(e), key))?;

        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: Vec<String>) -> Result<Vec<String>> {
        use aws_sdk_s3::types::{Delete, ObjectIdentifier};

        if keys.is_empty() {
            return Ok(vec![]);
        }

        let mut objects = Vec::with_capacity(keys.len());
        for key in &keys {
            let object = ObjectIdentifier::builder()
                .key(key)
                .build()
                .map_err(|e| Error::General(e.to_string()))?;
            objects.push(object);
        }

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .build()
            .map_err(|e| Error::General(e.to_string()))?;

        let response = self
            .inner
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let deleted: Vec<String> = response
            .deleted()
            .iter()
            .filter_map(|d| d.key().map(|k| k.to_string()))
            .collect();

        if !response.errors().is_empty() {
            let error_keys: Vec<String> = response
                .errors()
                .iter()
                .filter_map(|e| e.key().map(|k| k.to_string()))
                .collect();
            tracing::warn!("Failed to delete some objects: {:?}", error_keys);
        }

        Ok(deleted)
    }

    async fn copy_object(
        &self,
        bucket: &str,
        src_key: &str,
        dst_key: &str,
    ) -> Result<ObjectInfo> {
        // Build copy source: bucket/key
        let copy_source = format!("{bucket}/{src_key}");

        let response = self
            .inner
            .copy_object()
            .copy_source(&copy_source)
            .bucket(bucket)
            .key(dst_key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(aws_sdk_s3::error::DisplayErrorContext(e), src_key))?;

        // Copy doesn't return the size; head the destination for it
        let mut info = self.head_object(bucket, dst_key).await?;
        if let Some(copy_result) = response.copy_object_result() {
            if let Some(etag) = copy_result.e_tag() {
                info.etag = Some(etag.trim_matches('"').to_string());
            }
        }

        Ok(info)
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> Result<String> {
        let response = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| Error::Network(format!("no upload id returned for {key}")))
    }

    async fn list_multipart_uploads(&self, bucket: &str) -> Result<Vec<MultipartUpload>> {
        let mut uploads = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let mut request = self.inner.list_multipart_uploads().bucket(bucket);
            if let Some(marker) = &key_marker {
                request = request.key_marker(marker);
            }
            if let Some(marker) = &upload_id_marker {
                request = request.upload_id_marker(marker);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Network(e.to_string()))?;

            for upload in response.uploads() {
                let (Some(key), Some(upload_id)) = (upload.key(), upload.upload_id()) else {
                    continue;
                };
                uploads.push(MultipartUpload {
                    key: key.to_string(),
                    upload_id: upload_id.to_string(),
                    initiated: upload
                        .initiated()
                        .and_then(|t| jiff::Timestamp::from_second(t.secs()).ok()),
                });
            }

            if response.is_truncated().unwrap_or(false) {
                key_marker = response.next_key_marker().map(str::to_string);
                upload_id_marker = response.next_upload_id_marker().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(uploads)
    }

    async fn list_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>> {
        let mut parts = Vec::new();
        let mut part_number_marker: Option<String> = None;

        loop {
            let mut request = self
                .inner
                .list_parts()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id);
            if let Some(marker) = &part_number_marker {
                request = request.part_number_marker(marker);
            }

            let response = request
                .send()
                .await
                .map_err(|e| classify_sdk_error(aws_sdk_s3::error::DisplayErrorContext(e), key))?;

            for part in response.parts() {
                let (Some(part_number), Some(etag)) = (part.part_number(), part.e_tag()) else {
                    continue;
                };
                parts.push(UploadedPart {
                    part_number,
                    etag: etag.trim_matches('"').to_string(),
                    size: part.size().unwrap_or(0).max(0) as u64,
                });
            }

            if response.is_truncated().unwrap_or(false) {
                part_number_marker = response.next_part_number_marker().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(parts)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<String> {
        let body = aws_sdk_s3::primitives::ByteStream::from(data);

        let response = self
            .inner
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        response
            .e_tag()
            .map(|etag| etag.trim_matches('"').to_string())
            .ok_or_else(|| Error::Network(format!("no etag returned for part {part_number} of {key}")))
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()> {
        use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as SdkCompletedPart};

        let sdk_parts: Vec<SdkCompletedPart> = parts
            .iter()
            .map(|part| {
                SdkCompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(sdk_parts))
            .build();

        self.inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.inner
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error(aws_sdk_s3::error::DisplayErrorContext(e), key))?;

        Ok(())
    }
}
