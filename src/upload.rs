use image::{DynamicImage, ImageFormat};
use std::time::Duration;

/// Largest scan accepted from a remote URL.
pub const MAX_REMOTE_IMAGE_BYTES: usize = 20 * 1024 * 1024;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error("no image supplied")]
    Missing,
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not fetch image: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("remote image is larger than 20 MiB")]
    TooLarge,
}

/// Raw scan bytes plus the format the client declared, if any.
#[derive(Debug)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub format: Option<ImageFormat>,
}

impl UploadedImage {
    pub fn decode(&self) -> Result<DynamicImage, UploadError> {
        if self.bytes.is_empty() {
            return Err(UploadError::Missing);
        }
        let image = match self.format {
            Some(format) => image::load_from_memory_with_format(&self.bytes, format)?,
            None => image::load_from_memory(&self.bytes)?,
        };
        Ok(image)
    }
}

pub fn http_client() -> Result<reqwest::Client, UploadError> {
    Ok(reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?)
}

pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    format: Option<ImageFormat>,
) -> Result<UploadedImage, UploadError> {
    let response = client.get(url).send().await?.error_for_status()?;
    if response
        .content_length()
        .is_some_and(|len| len > MAX_REMOTE_IMAGE_BYTES as u64)
    {
        return Err(UploadError::TooLarge);
    }
    let bytes = response.bytes().await?;
    if bytes.len() > MAX_REMOTE_IMAGE_BYTES {
        return Err(UploadError::TooLarge);
    }
    Ok(UploadedImage {
        bytes: bytes.to_vec(),
        format,
    })
}
