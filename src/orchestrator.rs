//! Voter registration and authentication.
//!
//! The orchestrator owns no state of its own. Everything it reads or writes
//! lives behind the collaborator traits in [`crate::services`], so any number
//! of instances may run concurrently.
//!
//! The vote-status check in [`VoterOrchestrator::authenticate_voter`] is a
//! fast-path rejection only. Two concurrent authentications for the same
//! voter can both pass it; the unique `(voter_id, election_id)` index behind
//! [`VoteStatusRepository::record_vote`] is what actually prevents a second
//! ballot.

use std::sync::Arc;

use chrono::Duration;
use log::{debug, info, warn};
use rocket::futures::future::join;

use crate::{
    config::Config,
    error::{Error, ImageFailure, Result},
    model::{
        api::voter::{
            AuthResult, ImageUpload, VerificationResult, VoterAttributes, VoterSummary,
            AUTH_SUCCESS_MESSAGE,
        },
        db::voter::{NewVoter, Voter},
    },
    services::{
        CredentialIssuer, ElectionRepository, IdentityVerifier, ImageStore, ProviderError,
        VoteStatusRepository, VoterRepository,
    },
};

/// Everything the orchestrator talks to.
pub struct Collaborators {
    pub identity: Arc<dyn IdentityVerifier>,
    pub images: Arc<dyn ImageStore>,
    pub voters: Arc<dyn VoterRepository>,
    pub elections: Arc<dyn ElectionRepository>,
    pub vote_status: Arc<dyn VoteStatusRepository>,
    pub credentials: Arc<dyn CredentialIssuer>,
}

pub struct VoterOrchestrator {
    identity: Arc<dyn IdentityVerifier>,
    images: Arc<dyn ImageStore>,
    voters: Arc<dyn VoterRepository>,
    elections: Arc<dyn ElectionRepository>,
    vote_status: Arc<dyn VoteStatusRepository>,
    credentials: Arc<dyn CredentialIssuer>,
    confidence_threshold: f64,
    credential_ttl: Duration,
}

impl VoterOrchestrator {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        Self {
            identity: collaborators.identity,
            images: collaborators.images,
            voters: collaborators.voters,
            elections: collaborators.elections,
            vote_status: collaborators.vote_status,
            credentials: collaborators.credentials,
            confidence_threshold: config.confidence_threshold(),
            credential_ttl: config.credential_ttl(),
        }
    }

    /// Enroll the voter's face and store their photo concurrently, then persist
    /// the voter. Nothing is persisted unless both succeed.
    ///
    /// Both calls always run to completion. Failures are reported in a fixed
    /// order regardless of timing: enrollment error, upload error, empty
    /// identity, empty URL. If one side succeeds and the other fails, the
    /// successful side effect is left in place.
    pub async fn register_voter(
        &self,
        attributes: VoterAttributes,
        image: &ImageUpload,
    ) -> Result<Voter> {
        let (enrolled, uploaded) =
            join(self.identity.enroll(&image.bytes), self.images.upload(image)).await;

        let outcome = match (enrolled, uploaded) {
            (Err(err), _) => Err(ImageFailure::Enroll(err)),
            (_, Err(err)) => Err(ImageFailure::Upload(err)),
            (Ok(identity), _) if identity.trim().is_empty() => Err(ImageFailure::EmptyIdentity),
            (_, Ok(url)) if url.trim().is_empty() => Err(ImageFailure::EmptyUrl),
            (Ok(identity), Ok(url)) => Ok((identity, url)),
        };
        let (face_person_id, photo_url) = match outcome {
            Ok(results) => results,
            Err(failure) => {
                warn!(
                    "Registration of voter '{}' aborted, any completed enrollment or upload is orphaned: {failure}",
                    attributes.public_voter_id
                );
                return Err(failure.into());
            }
        };

        let voter = self
            .voters
            .create(NewVoter::new(attributes, face_person_id, photo_url))
            .await?;
        info!(
            "Registered voter '{}' as {}",
            voter.public_voter_id(),
            voter.id
        );
        Ok(voter)
    }

    /// Check, in order, that the voter exists, that an election is active,
    /// that the voter has not yet voted in it, and that their face matches.
    /// The first failing check ends the operation.
    pub async fn authenticate_voter(
        &self,
        public_voter_id: &str,
        image: &[u8],
    ) -> Result<AuthResult> {
        let voter = self
            .voters
            .find_by_public_id(public_voter_id)
            .await?
            .ok_or_else(|| Error::VoterNotFound(public_voter_id.to_string()))?;

        let election = self
            .elections
            .find_active()
            .await?
            .ok_or(Error::NoActiveElection)?;

        if self.vote_status.has_voted(voter.id, election.id).await? {
            return Err(Error::AlreadyVoted {
                voter_id: voter.id,
                election_id: election.id,
            });
        }

        let verification = match self
            .identity
            .verify(image, &voter.normalized_face_person_id())
            .await
        {
            Ok(verification) => verification,
            // A capture without a face is the caller's problem, not the provider's.
            Err(ProviderError::NoFaceDetected) => VerificationResult {
                is_identical: false,
                confidence: 0.0,
            },
            Err(err) => return Err(Error::Identity(err)),
        };
        debug!(
            "Voter {} verification: identical={}, confidence={}",
            voter.id, verification.is_identical, verification.confidence
        );
        if !self.is_match(&verification) {
            return Err(Error::VerificationFailed {
                is_identical: verification.is_identical,
                confidence: verification.confidence,
            });
        }

        let voting_token = self
            .credentials
            .sign(voter.id, election.id, self.credential_ttl)?;
        info!(
            "Voter {} authenticated for election {}",
            voter.id, election.id
        );

        Ok(AuthResult {
            success: true,
            message: AUTH_SUCCESS_MESSAGE.to_string(),
            voter: VoterSummary {
                full_name: voter.full_name().to_string(),
            },
            voting_token,
            election_id: election.id.into(),
            verification_result: verification,
        })
    }

    /// A match at exactly the threshold passes.
    fn is_match(&self, verification: &VerificationResult) -> bool {
        verification.is_identical && verification.confidence >= self.confidence_threshold
    }
}
