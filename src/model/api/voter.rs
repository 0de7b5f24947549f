use chrono::NaiveDate;
use rocket::{
    data::ToByteUnit,
    form::{self, prelude::ErrorKind, DataField, FromFormField},
    http::{ContentType, Status},
    FromForm,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{api::id::ApiId, db::voter::Voter},
};

/// Name of the Rocket limit governing uploaded face images.
pub const IMAGE_LIMIT: &str = "image";

/// Used when `limits.image` is not configured.
pub const DEFAULT_IMAGE_LIMIT_MIB: usize = 4;

const FALLBACK_FILENAME: &str = "image";

/// Personal attributes supplied when registering a voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterAttributes {
    /// The identifier clients use for this voter; distinct from the database ID.
    pub public_voter_id: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// An image received as a multipart file field.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    /// The client's filename, reduced to a safe final path component.
    pub filename: String,
    pub content_type: ContentType,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, filename: &str, content_type: ContentType) -> Self {
        Self {
            bytes,
            filename: sanitize_filename(filename),
            content_type,
        }
    }
}

/// Strip any directories and unusual characters from a client-supplied filename.
fn sanitize_filename(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let clean: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let clean = clean.trim_start_matches('.');
    if clean.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        clean.to_string()
    }
}

#[rocket::async_trait]
impl<'r> FromFormField<'r> for ImageUpload {
    async fn from_data(field: DataField<'r, '_>) -> form::Result<'r, Self> {
        let limit = field
            .request
            .limits()
            .get(IMAGE_LIMIT)
            .unwrap_or_else(|| DEFAULT_IMAGE_LIMIT_MIB.mebibytes());

        let filename = field
            .file_name
            .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str())
            .unwrap_or(FALLBACK_FILENAME);
        let filename = sanitize_filename(filename);
        let content_type = field.content_type;

        let bytes = field.data.open(limit).into_bytes().await?;
        if !bytes.is_complete() {
            return Err(ErrorKind::InvalidLength {
                min: None,
                max: Some(limit.as_u64()),
            }
            .into());
        }
        let bytes = bytes.into_inner();
        if bytes.is_empty() {
            return Err(ErrorKind::Validation("image must not be empty".into()).into());
        }

        Ok(Self {
            bytes,
            filename,
            content_type,
        })
    }
}

/// Multipart registration request from the admin workflow.
#[derive(Debug, FromForm)]
pub struct VoterRegistration {
    #[field(name = "publicVoterId")]
    pub public_voter_id: String,
    #[field(name = "fullName")]
    pub full_name: String,
    /// `YYYY-MM-DD`.
    #[field(name = "dateOfBirth")]
    pub date_of_birth: String,
    pub address: Option<String>,
    pub image: ImageUpload,
}

impl VoterRegistration {
    /// Validate the text fields, splitting the request into attributes and image.
    pub fn into_parts(self) -> Result<(VoterAttributes, ImageUpload)> {
        let public_voter_id = non_blank(self.public_voter_id, "publicVoterId")?;
        let full_name = non_blank(self.full_name, "fullName")?;
        let date_of_birth = NaiveDate::parse_from_str(self.date_of_birth.trim(), "%Y-%m-%d")
            .map_err(|e| {
                Error::Status(Status::BadRequest, format!("Invalid dateOfBirth: {e}"))
            })?;
        let address = self
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        let attributes = VoterAttributes {
            public_voter_id,
            full_name,
            date_of_birth,
            address,
        };
        Ok((attributes, self.image))
    }
}

fn non_blank(value: String, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::Status(
            Status::BadRequest,
            format!("`{field}` must not be blank"),
        ))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Multipart authentication request from a voting terminal.
#[derive(Debug, FromForm)]
pub struct VoterAuthentication {
    #[field(name = "publicVoterId")]
    pub public_voter_id: String,
    pub image: ImageUpload,
}

/// What the face provider concluded when comparing two faces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub is_identical: bool,
    /// In `[0, 1]`.
    pub confidence: f64,
}

/// The only voter details revealed on successful authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterSummary {
    pub full_name: String,
}

/// Successful authentication: the voter may proceed to the ballot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    pub success: bool,
    pub message: String,
    pub voter: VoterSummary,
    pub voting_token: String,
    pub election_id: ApiId,
    pub verification_result: VerificationResult,
}

pub const AUTH_SUCCESS_MESSAGE: &str = "Verification successful. Proceed to ballot.";

/// A registered voter, as returned to the admin workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterDescription {
    pub id: ApiId,
    pub public_voter_id: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub photo_url: String,
}

impl From<Voter> for VoterDescription {
    fn from(voter: Voter) -> Self {
        let id = voter.id.into();
        let core = voter.voter;
        Self {
            id,
            public_voter_id: core.attributes.public_voter_id,
            full_name: core.attributes.full_name,
            date_of_birth: core.attributes.date_of_birth,
            address: core.attributes.address,
            photo_url: core.photo_url,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl VoterAttributes {
        pub fn example() -> Self {
            Self {
                public_voter_id: "V100".to_string(),
                full_name: "Ada Lovelace".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 12, 10).unwrap(),
                address: Some("12 St James's Square, London".to_string()),
            }
        }
    }

    impl ImageUpload {
        pub fn example() -> Self {
            Self::new(b"\xFF\xD8\xFFjpeg-bytes".to_vec(), "face.jpg", ContentType::JPEG)
        }
    }
}
