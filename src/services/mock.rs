//! In-memory collaborators for tests.
//!
//! Each double records how often it was called and can be scripted to fail,
//! so tests can assert both on outcomes and on which collaborators ran.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use rocket::{http::ContentType, tokio::time::sleep, Build, Rocket};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::voter::{ImageUpload, VerificationResult},
        db::{
            admin::{Admin, NewAdmin},
            election::Election,
            voter::{NewVoter, Voter},
        },
        mongodb::Id,
    },
    orchestrator::{Collaborators, VoterOrchestrator},
    AdminStore,
};

use super::{
    AdminRepository, CredentialIssuer, ElectionRepository, IdentityVerifier, ImageStore,
    JwtCredentialIssuer, ProviderError, VoteStatusRepository, VoterRepository,
};

fn scripted_failure() -> ProviderError {
    ProviderError::Api {
        status: 503,
        message: "scripted failure".to_string(),
    }
}

pub struct FakeIdentityVerifier {
    enrolled_identity: Mutex<String>,
    verification: Mutex<VerificationResult>,
    enroll_fails: Mutex<bool>,
    enroll_delay: Mutex<Option<Duration>>,
    verify_fails: Mutex<bool>,
    verify_finds_no_face: Mutex<bool>,
    last_verified_identity: Mutex<Option<String>>,
    pub enroll_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl FakeIdentityVerifier {
    pub fn new() -> Self {
        Self {
            enrolled_identity: Mutex::new("9A1B7C3E-0000-4F00-8000-00000000CAFE".to_string()),
            verification: Mutex::new(VerificationResult {
                is_identical: true,
                confidence: 0.9,
            }),
            enroll_fails: Mutex::new(false),
            enroll_delay: Mutex::new(None),
            verify_fails: Mutex::new(false),
            verify_finds_no_face: Mutex::new(false),
            last_verified_identity: Mutex::new(None),
            enroll_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn enrolled_identity(&self) -> String {
        self.enrolled_identity.lock().unwrap().clone()
    }

    pub fn set_enrolled_identity(&self, identity: &str) {
        *self.enrolled_identity.lock().unwrap() = identity.to_string();
    }

    pub fn set_verification(&self, verification: VerificationResult) {
        *self.verification.lock().unwrap() = verification;
    }

    pub fn fail_enroll(&self) {
        *self.enroll_fails.lock().unwrap() = true;
    }

    /// Make enrollment take `delay` before returning its result.
    pub fn delay_enroll(&self, delay: Duration) {
        *self.enroll_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_verify(&self) {
        *self.verify_fails.lock().unwrap() = true;
    }

    /// Make verification report that the capture contains no face.
    pub fn find_no_face(&self) {
        *self.verify_finds_no_face.lock().unwrap() = true;
    }

    pub fn last_verified_identity(&self) -> Option<String> {
        self.last_verified_identity.lock().unwrap().clone()
    }
}

#[rocket::async_trait]
impl IdentityVerifier for FakeIdentityVerifier {
    async fn enroll(&self, _image: &[u8]) -> Result<String, ProviderError> {
        self.enroll_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.enroll_delay.lock().unwrap();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        if *self.enroll_fails.lock().unwrap() {
            return Err(scripted_failure());
        }
        Ok(self.enrolled_identity())
    }

    async fn verify(
        &self,
        _image: &[u8],
        identity: &str,
    ) -> Result<VerificationResult, ProviderError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_verified_identity.lock().unwrap() = Some(identity.to_string());
        if *self.verify_fails.lock().unwrap() {
            return Err(scripted_failure());
        }
        if *self.verify_finds_no_face.lock().unwrap() {
            return Err(ProviderError::NoFaceDetected);
        }
        Ok(*self.verification.lock().unwrap())
    }
}

pub struct FakeImageStore {
    upload_fails: Mutex<bool>,
    empty_url: Mutex<bool>,
    last_content_type: Mutex<Option<ContentType>>,
    pub upload_calls: AtomicUsize,
}

impl FakeImageStore {
    pub fn new() -> Self {
        Self {
            upload_fails: Mutex::new(false),
            empty_url: Mutex::new(false),
            last_content_type: Mutex::new(None),
            upload_calls: AtomicUsize::new(0),
        }
    }

    /// The URL a successful upload of `filename` returns.
    pub fn url_for(&self, filename: &str) -> String {
        format!("https://photos.test/{filename}")
    }

    pub fn fail_upload(&self) {
        *self.upload_fails.lock().unwrap() = true;
    }

    pub fn return_empty_url(&self) {
        *self.empty_url.lock().unwrap() = true;
    }

    /// Content type of the most recent upload.
    pub fn last_content_type(&self) -> Option<ContentType> {
        self.last_content_type.lock().unwrap().clone()
    }
}

#[rocket::async_trait]
impl ImageStore for FakeImageStore {
    async fn upload(&self, image: &ImageUpload) -> Result<String, ProviderError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_content_type.lock().unwrap() = Some(image.content_type.clone());
        if *self.upload_fails.lock().unwrap() {
            return Err(scripted_failure());
        }
        if *self.empty_url.lock().unwrap() {
            return Ok(String::new());
        }
        Ok(self.url_for(&image.filename))
    }
}

pub struct FakeVoterRepository {
    voters: Mutex<Vec<Voter>>,
    pub create_calls: AtomicUsize,
}

impl FakeVoterRepository {
    pub fn new() -> Self {
        Self {
            voters: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Insert a voter directly, bypassing the call counter.
    pub fn seed(&self, voter: NewVoter) -> Voter {
        let voter = Voter {
            id: Id::new(),
            voter,
        };
        self.voters.lock().unwrap().push(voter.clone());
        voter
    }

    pub fn count(&self) -> usize {
        self.voters.lock().unwrap().len()
    }
}

#[rocket::async_trait]
impl VoterRepository for FakeVoterRepository {
    async fn create(&self, voter: NewVoter) -> Result<Voter> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut voters = self.voters.lock().unwrap();
        if voters
            .iter()
            .any(|v| v.public_voter_id() == voter.public_voter_id())
        {
            return Err(Error::DuplicateVoter(voter.attributes.public_voter_id));
        }
        let voter = Voter {
            id: Id::new(),
            voter,
        };
        voters.push(voter.clone());
        Ok(voter)
    }

    async fn find_by_public_id(&self, public_voter_id: &str) -> Result<Option<Voter>> {
        let voters = self.voters.lock().unwrap();
        Ok(voters
            .iter()
            .find(|v| v.public_voter_id() == public_voter_id)
            .cloned())
    }
}

pub struct FakeElectionRepository {
    elections: Mutex<Vec<Election>>,
}

impl FakeElectionRepository {
    pub fn new() -> Self {
        Self {
            elections: Mutex::new(Vec::new()),
        }
    }

    pub fn seed(&self, election: Election) -> Election {
        self.elections.lock().unwrap().push(election.clone());
        election
    }
}

#[rocket::async_trait]
impl ElectionRepository for FakeElectionRepository {
    async fn find_active(&self) -> Result<Option<Election>> {
        let elections = self.elections.lock().unwrap();
        let mut active = elections.iter().filter(|e| e.is_active());
        match (active.next(), active.next()) {
            (_, Some(_)) => Err(Error::MultipleActiveElections),
            (election, None) => Ok(election.cloned()),
        }
    }
}

pub struct FakeVoteStatusRepository {
    votes: Mutex<Vec<(Id, Id)>>,
    pub has_voted_calls: AtomicUsize,
}

impl FakeVoteStatusRepository {
    pub fn new() -> Self {
        Self {
            votes: Mutex::new(Vec::new()),
            has_voted_calls: AtomicUsize::new(0),
        }
    }

    /// Mark a voter as having voted.
    pub fn seed(&self, voter_id: Id, election_id: Id) {
        self.votes.lock().unwrap().push((voter_id, election_id));
    }
}

#[rocket::async_trait]
impl VoteStatusRepository for FakeVoteStatusRepository {
    async fn has_voted(&self, voter_id: Id, election_id: Id) -> Result<bool> {
        self.has_voted_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .votes
            .lock()
            .unwrap()
            .contains(&(voter_id, election_id)))
    }

    async fn record_vote(&self, voter_id: Id, election_id: Id) -> Result<()> {
        let mut votes = self.votes.lock().unwrap();
        if votes.contains(&(voter_id, election_id)) {
            return Err(Error::AlreadyVoted {
                voter_id,
                election_id,
            });
        }
        votes.push((voter_id, election_id));
        Ok(())
    }
}

pub struct FakeAdminRepository {
    admins: Mutex<Vec<Admin>>,
}

impl FakeAdminRepository {
    pub fn new() -> Self {
        Self {
            admins: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.admins.lock().unwrap().len()
    }

    /// Remove every admin, as if their accounts had been deleted.
    pub fn clear(&self) {
        self.admins.lock().unwrap().clear();
    }
}

#[rocket::async_trait]
impl AdminRepository for FakeAdminRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let admins = self.admins.lock().unwrap();
        Ok(admins.iter().find(|a| a.username == username).cloned())
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Admin>> {
        let admins = self.admins.lock().unwrap();
        Ok(admins.iter().find(|a| a.id == id).cloned())
    }

    async fn insert(&self, admin: NewAdmin) -> Result<Admin> {
        let admin = Admin {
            id: Id::new(),
            admin,
        };
        self.admins.lock().unwrap().push(admin.clone());
        Ok(admin)
    }
}

/// A full set of doubles sharing one config.
///
/// The orchestrator and rocket built from a `Fakes` share its doubles, so
/// state seeded or scripted through the fields is visible to both.
pub struct Fakes {
    pub config: Config,
    pub identity: Arc<FakeIdentityVerifier>,
    pub images: Arc<FakeImageStore>,
    pub voters: Arc<FakeVoterRepository>,
    pub elections: Arc<FakeElectionRepository>,
    pub vote_status: Arc<FakeVoteStatusRepository>,
    pub admins: Arc<FakeAdminRepository>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            config: Config::example(),
            identity: Arc::new(FakeIdentityVerifier::new()),
            images: Arc::new(FakeImageStore::new()),
            voters: Arc::new(FakeVoterRepository::new()),
            elections: Arc::new(FakeElectionRepository::new()),
            vote_status: Arc::new(FakeVoteStatusRepository::new()),
            admins: Arc::new(FakeAdminRepository::new()),
        }
    }

    /// The real credential issuer, keyed by the fake config.
    pub fn issuer(&self) -> JwtCredentialIssuer {
        JwtCredentialIssuer::new(&self.config)
    }

    pub fn collaborators(&self) -> Collaborators {
        let credentials: Arc<dyn CredentialIssuer> = Arc::new(self.issuer());
        Collaborators {
            identity: self.identity.clone(),
            images: self.images.clone(),
            voters: self.voters.clone(),
            elections: self.elections.clone(),
            vote_status: self.vote_status.clone(),
            credentials,
        }
    }

    pub fn orchestrator(&self) -> VoterOrchestrator {
        VoterOrchestrator::new(self.collaborators(), &self.config)
    }

    pub fn admin_store(&self) -> AdminStore {
        self.admins.clone()
    }

    /// A rocket serving the full API over these doubles.
    pub fn rocket(&self) -> Rocket<Build> {
        crate::rocket_for_services(self.config.clone(), self.orchestrator(), self.admin_store())
    }
}
