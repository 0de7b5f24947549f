//! Azure Face API client.
//!
//! Voters are enrolled as persons in a single person group. Verification
//! detects the face in a fresh image and compares it against that person.

use data_encoding::HEXLOWER;
use log::{debug, error};
use rand::Rng;
use reqwest::{header::CONTENT_TYPE, Client, Response};
use serde::{Deserialize, Serialize};

use crate::{config::Config, model::api::voter::VerificationResult};

use super::{IdentityVerifier, ProviderError};

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const DETECTION_MODEL: &str = "detection_03";
const RECOGNITION_MODEL: &str = "recognition_04";

pub struct AzureFaceClient {
    client: Client,
    endpoint: String,
    api_key: String,
    person_group: String,
}

#[derive(Serialize)]
struct CreatePerson<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedPerson {
    person_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedFace {
    face_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    face_id: &'a str,
    person_id: &'a str,
    person_group_id: &'a str,
}

impl AzureFaceClient {
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.provider_timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.face_endpoint().trim_end_matches('/').to_string(),
            api_key: config.face_api_key().to_string(),
            person_group: config.face_person_group().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/face/v1.0/{}", self.endpoint, path)
    }

    fn person_group_url(&self, path: &str) -> String {
        self.url(&format!("persongroups/{}/{}", self.person_group, path))
    }

    /// Persons need a name; the voter's real name is deliberately not sent.
    fn anonymous_person_name() -> String {
        let mut bytes = [0_u8; 8];
        rand::thread_rng().fill(&mut bytes);
        format!("voter-{}", HEXLOWER.encode(&bytes))
    }

    async fn post_image(&self, url: String, image: &[u8]) -> Result<Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;
        check_status(response).await
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: String,
        body: &T,
    ) -> Result<Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }
}

/// Turn a non-2xx response into a [`ProviderError::Api`].
async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    error!("Face API responded with {status}: {message}");
    Err(ProviderError::Api {
        status: status.as_u16(),
        message,
    })
}

#[rocket::async_trait]
impl IdentityVerifier for AzureFaceClient {
    async fn enroll(&self, image: &[u8]) -> Result<String, ProviderError> {
        let name = Self::anonymous_person_name();
        let person: CreatedPerson = self
            .post_json(self.person_group_url("persons"), &CreatePerson { name: &name })
            .await?
            .json()
            .await?;
        debug!("Created face person {}", person.person_id);

        let faces_url = self.person_group_url(&format!(
            "persons/{}/persistedFaces?detectionModel={DETECTION_MODEL}",
            person.person_id
        ));
        self.post_image(faces_url, image).await?;

        // Training runs asynchronously on the provider side.
        self.post_json(self.person_group_url("train"), &serde_json_empty())
            .await?;

        Ok(person.person_id)
    }

    async fn verify(
        &self,
        image: &[u8],
        identity: &str,
    ) -> Result<VerificationResult, ProviderError> {
        let detect_url = self.url(&format!(
            "detect?returnFaceId=true&detectionModel={DETECTION_MODEL}&recognitionModel={RECOGNITION_MODEL}"
        ));
        let faces: Vec<DetectedFace> = self.post_image(detect_url, image).await?.json().await?;
        let face = faces.first().ok_or(ProviderError::NoFaceDetected)?;

        let request = VerifyRequest {
            face_id: &face.face_id,
            person_id: identity,
            person_group_id: &self.person_group,
        };
        let result: VerificationResult = self
            .post_json(self.url("verify"), &request)
            .await?
            .json()
            .await?;
        debug!(
            "Face verification for {identity}: identical={}, confidence={}",
            result.is_identical, result.confidence
        );
        Ok(result)
    }
}

/// An empty JSON object body.
fn serde_json_empty() -> rocket::serde::json::Value {
    rocket::serde::json::Value::Object(Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_under_person_group() {
        let client = AzureFaceClient::new(&Config::example()).unwrap();
        assert_eq!(
            client.person_group_url("train"),
            "https://facevote.cognitiveservices.azure.com/face/v1.0/persongroups/voters/train"
        );
        assert_eq!(
            client.url("verify"),
            "https://facevote.cognitiveservices.azure.com/face/v1.0/verify"
        );
    }

    #[test]
    fn person_names_are_anonymous_and_unique() {
        let first = AzureFaceClient::anonymous_person_name();
        let second = AzureFaceClient::anonymous_person_name();
        assert!(first.starts_with("voter-"));
        assert_eq!(first.len(), "voter-".len() + 16);
        assert_ne!(first, second);
    }

    #[test]
    fn verify_response_parses() {
        let body = r#"{"isIdentical": true, "confidence": 0.91}"#;
        let result: VerificationResult = rocket::serde::json::from_str(body).unwrap();
        assert!(result.is_identical);
        assert_eq!(result.confidence, 0.91);
    }
}
