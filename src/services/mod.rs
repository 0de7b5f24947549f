//! Capabilities the voter orchestrator depends on.
//!
//! Each trait is a seam: production implementations talk to Azure or MongoDB,
//! while tests substitute the in-memory doubles from `mock`.

use chrono::Duration;
use thiserror::Error;

use crate::{
    error::Result,
    model::{
        api::voter::{ImageUpload, VerificationResult},
        db::{
            admin::{Admin, NewAdmin},
            election::Election,
            voter::{NewVoter, Voter},
        },
        mongodb::Id,
    },
};

pub mod blob;
pub mod credential;
pub mod face;
#[cfg(test)]
pub mod mock;

pub use blob::AzureBlobStore;
pub use credential::{JwtCredentialIssuer, VotingClaims};
pub use face::AzureFaceClient;

/// Failure talking to an external provider (face recognition or blob storage).
///
/// Transient and permanent failures are not distinguished.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("provider responded with {status}: {message}")]
    Api { status: u16, message: String },
    #[error("no face detected in the supplied image")]
    NoFaceDetected,
}

/// Biometric enrollment and verification.
#[rocket::async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Enroll a face, returning an opaque identity reference.
    async fn enroll(&self, image: &[u8]) -> Result<String, ProviderError>;

    /// Compare a face against a previously enrolled identity.
    async fn verify(
        &self,
        image: &[u8],
        identity: &str,
    ) -> Result<VerificationResult, ProviderError>;
}

/// Blob storage for registration photos.
#[rocket::async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the image under its filename and content type, returning a URL it
    /// can be retrieved from.
    async fn upload(&self, image: &ImageUpload) -> Result<String, ProviderError>;
}

#[rocket::async_trait]
pub trait VoterRepository: Send + Sync {
    /// Persist a new voter. Fails with `DuplicateVoter` if the public ID is taken.
    async fn create(&self, voter: NewVoter) -> Result<Voter>;

    async fn find_by_public_id(&self, public_voter_id: &str) -> Result<Option<Voter>>;
}

#[rocket::async_trait]
pub trait ElectionRepository: Send + Sync {
    /// The single election currently accepting votes, if any.
    async fn find_active(&self) -> Result<Option<Election>>;
}

#[rocket::async_trait]
pub trait VoteStatusRepository: Send + Sync {
    async fn has_voted(&self, voter_id: Id, election_id: Id) -> Result<bool>;

    /// Atomically mark the voter as having voted, failing with `AlreadyVoted`
    /// if they already had. Called by ballot casting, never by the orchestrator.
    async fn record_vote(&self, voter_id: Id, election_id: Id) -> Result<()>;
}

/// Signs and checks short-lived voting credentials.
pub trait CredentialIssuer: Send + Sync {
    fn sign(&self, voter_id: Id, election_id: Id, ttl: Duration) -> Result<String>;

    /// Check signature, audience and expiry, returning the bound claims.
    fn validate(&self, token: &str) -> Result<VotingClaims>;
}

#[rocket::async_trait]
pub trait AdminRepository: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Admin>>;

    async fn find_by_id(&self, id: Id) -> Result<Option<Admin>>;

    async fn insert(&self, admin: NewAdmin) -> Result<Admin>;
}
