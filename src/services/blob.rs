use data_encoding::HEXLOWER;
use log::{debug, error};
use rand::Rng;
use reqwest::{header::CONTENT_TYPE, Client};
use rocket::http::ContentType;

use crate::{config::Config, model::api::voter::ImageUpload};

use super::{ImageStore, ProviderError};

const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";

/// Uploads photos to an Azure Blob Storage container using a SAS token.
pub struct AzureBlobStore {
    client: Client,
    container_url: String,
    sas_token: String,
}

impl AzureBlobStore {
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.provider_timeout())
            .build()?;
        Ok(Self {
            client,
            container_url: format!(
                "{}/{}",
                config.blob_account_url().trim_end_matches('/'),
                config.blob_container().trim_matches('/')
            ),
            sas_token: config.blob_sas_token().to_string(),
        })
    }

    /// A collision-free blob name that still shows the original filename.
    fn blob_name(filename: &str) -> String {
        let mut prefix = [0_u8; 8];
        rand::thread_rng().fill(&mut prefix);
        format!("{}-{}", HEXLOWER.encode(&prefix), filename)
    }

    /// Public URL of a blob, without the SAS token.
    fn blob_url(&self, name: &str) -> String {
        format!("{}/{}", self.container_url, name)
    }

    /// The client's content type if it names an image, otherwise a guess
    /// from the file extension.
    fn content_type(image: &ImageUpload) -> ContentType {
        if image.content_type.top() == "image" {
            return image.content_type.clone();
        }
        image
            .filename
            .rsplit_once('.')
            .and_then(|(_, ext)| ContentType::from_extension(ext))
            .unwrap_or(ContentType::Binary)
    }
}

#[rocket::async_trait]
impl ImageStore for AzureBlobStore {
    async fn upload(&self, image: &ImageUpload) -> Result<String, ProviderError> {
        let url = self.blob_url(&Self::blob_name(&image.filename));
        let response = self
            .client
            .put(format!("{url}?{}", self.sas_token))
            .header(BLOB_TYPE_HEADER, "BlockBlob")
            .header(CONTENT_TYPE, Self::content_type(image).to_string())
            .body(image.bytes.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!("Blob storage responded with {status}: {message}");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        debug!("Uploaded voter photo to {url}");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_urls_exclude_sas_token() {
        let store = AzureBlobStore::new(&Config::example()).unwrap();
        let url = store.blob_url("abc-face.jpg");
        assert_eq!(
            url,
            "https://facevote.blob.core.windows.net/photos/abc-face.jpg"
        );
        assert!(!url.contains("sig="));
        assert_eq!(store.sas_token, "sv=2022-11-02&sig=abc");
    }

    #[test]
    fn blob_names_keep_filename() {
        let name = AzureBlobStore::blob_name("face.jpg");
        assert!(name.ends_with("-face.jpg"));
        assert_ne!(name, AzureBlobStore::blob_name("face.jpg"));
    }

    #[test]
    fn client_content_type_preferred() {
        let upload = |filename: &str, content_type: ContentType| {
            AzureBlobStore::content_type(&ImageUpload::new(b"img".to_vec(), filename, content_type))
        };

        assert_eq!(upload("face.jpg", ContentType::PNG), ContentType::PNG);
        assert_eq!(upload("face", ContentType::JPEG), ContentType::JPEG);

        // Generic or non-image types fall back to the extension
        assert_eq!(upload("face.jpg", ContentType::Binary), ContentType::JPEG);
        assert_eq!(upload("face.png", ContentType::Plain), ContentType::PNG);
        assert_eq!(upload("face", ContentType::Binary), ContentType::Binary);
    }
}
