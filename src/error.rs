use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use log::{error, warn};
use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder};
use thiserror::Error;

use crate::model::mongodb::Id;
use crate::services::ProviderError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which half of the registration fan-out went wrong.
#[derive(Debug, Error)]
pub enum ImageFailure {
    #[error("face enrollment failed: {0}")]
    Enroll(#[source] ProviderError),
    #[error("image upload failed: {0}")]
    Upload(#[source] ProviderError),
    #[error("face enrollment returned no identity reference")]
    EmptyIdentity,
    #[error("image upload returned no URL")]
    EmptyUrl,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to process voter image: {0}")]
    ImageProcessing(#[from] ImageFailure),
    #[error("No voter found with public ID '{0}'")]
    VoterNotFound(String),
    #[error("No active election is currently open for voting")]
    NoActiveElection,
    #[error("Voter {voter_id} has already cast their ballot in election {election_id}")]
    AlreadyVoted { voter_id: Id, election_id: Id },
    #[error("Facial verification failed (identical: {is_identical}, confidence: {confidence})")]
    VerificationFailed { is_identical: bool, confidence: f64 },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Identity provider error: {0}")]
    Identity(#[source] ProviderError),
    #[error("A voter is already registered with public ID '{0}'")]
    DuplicateVoter(String),
    #[error("More than one election is marked active")]
    MultipleActiveElections,
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// The HTTP status this error maps onto.
    pub fn status(&self) -> Status {
        match self {
            Self::ImageProcessing(_) | Self::Identity(_) => Status::BadGateway,
            Self::VoterNotFound(_) => Status::NotFound,
            Self::NoActiveElection | Self::DuplicateVoter(_) => Status::Conflict,
            Self::AlreadyVoted { .. } => Status::Forbidden,
            Self::VerificationFailed { .. } => Status::Unauthorized,
            Self::Configuration(_) | Self::MultipleActiveElections | Self::Db(_) => {
                Status::InternalServerError
            }
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::Status(status, _) => *status,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        Err(status)
    }
}
