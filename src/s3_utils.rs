// src/s3_utils.rs
//
// Object keys and public URLs for product images in an S3-compatible bucket.

use aws_sdk_s3::primitives::ByteStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub fn build_public_url(base: &str, bucket: &str, key: &str) -> String {
    let trimmed = base.trim_end_matches('/');

    // https://host/{bucket}/{key} or https://{bucket}.host/{key}
    if trimmed.contains("{bucket}") || trimmed.contains("{key}") {
        return trimmed.replace("{bucket}", bucket).replace("{key}", key);
    }

    if trimmed.contains(bucket) {
        format!("{trimmed}/{key}")
    } else {
        format!("{trimmed}/{bucket}/{key}")
    }
}

/// Maps an upload's content type to the extension used in its key.
/// Anything that is not a common web image is refused.
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

pub fn product_image_key(owner_id: i32, product_id: i32, extension: &str) -> String {
    format!("products/{owner_id}/{product_id}/{}.{extension}", Uuid::new_v4())
}

/// Uploads the image and returns its public URL. With `MOCK_S3` set the
/// upload is skipped and only the URL is computed.
pub async fn put_product_image(
    state: &AppState,
    owner_id: i32,
    product_id: i32,
    content_type: &str,
    bytes: Vec<u8>,
) -> Result<String, AppError> {
    let extension = image_extension(content_type)
        .ok_or_else(|| AppError::bad_request("Formato de imagen no soportado"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("No se ha subido ninguna imagen"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::bad_request("La imagen supera el tamaño máximo"));
    }

    let key = product_image_key(owner_id, product_id, extension);

    if !state.config.mock_s3 {
        state
            .s3_client
            .put_object()
            .bucket(&state.config.s3_bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
    }

    Ok(build_public_url(
        &state.config.s3_public_base_url,
        &state.config.s3_bucket,
        &key,
    ))
}
