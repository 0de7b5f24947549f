use std::ops::Deref;

use mongodb::bson::doc;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{
        api::voter::VoterAttributes,
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
    services::VoterRepository,
};

/// Core voter data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoterCore {
    #[serde(flatten)]
    pub attributes: VoterAttributes,
    /// Opaque person ID from the face recognition provider.
    pub face_person_id: String,
    /// Where the registration photo was stored.
    pub photo_url: String,
}

impl VoterCore {
    /// Combine validated attributes with the results of enrollment and upload.
    /// Both provider results are required, so a stored voter can never have
    /// one without the other.
    pub fn new(attributes: VoterAttributes, face_person_id: String, photo_url: String) -> Self {
        Self {
            attributes,
            face_person_id,
            photo_url,
        }
    }

    /// The public-facing voter ID.
    pub fn public_voter_id(&self) -> &str {
        &self.attributes.public_voter_id
    }

    /// The voter's full name.
    pub fn full_name(&self) -> &str {
        &self.attributes.full_name
    }

    /// The face person ID in the form the provider compares against.
    pub fn normalized_face_person_id(&self) -> String {
        self.face_person_id.to_lowercase()
    }
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

#[rocket::async_trait]
impl VoterRepository for Coll<Voter> {
    async fn create(&self, voter: NewVoter) -> Result<Voter> {
        let new_id: Id = match self.with_type::<NewVoter>().insert_one(&voter, None).await {
            Ok(result) => result
                .inserted_id
                .as_object_id()
                .unwrap() // Valid because the ID comes directly from the DB
                .into(),
            Err(err) if is_duplicate_key_error(&err) => {
                return Err(Error::DuplicateVoter(voter.attributes.public_voter_id));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Voter { id: new_id, voter })
    }

    async fn find_by_public_id(&self, public_voter_id: &str) -> Result<Option<Voter>> {
        let filter = doc! {
            "public_voter_id": public_voter_id,
        };
        Ok(self.find_one(filter, None).await?)
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl VoterCore {
        pub fn example() -> Self {
            Self {
                attributes: VoterAttributes::example(),
                face_person_id: "3F2504E0-4F89-11D3-9A0C-0305E82C3301".to_string(),
                photo_url: "https://voters.blob.core.windows.net/photos/v100.jpg".to_string(),
            }
        }
    }
}
