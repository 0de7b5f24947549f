use chrono::{serde::ts_seconds, DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::Result,
    model::{api::id::ApiId, mongodb::Id},
};

use super::CredentialIssuer;

/// Audience claim carried by every voting credential, so that admin cookies
/// signed with the same secret are never accepted as one.
pub const BALLOT_AUDIENCE: &str = "ballot";

/// The payload of a voting credential: one voter, one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingClaims {
    pub voter_id: ApiId,
    pub election_id: ApiId,
    #[serde(rename = "iat", with = "ts_seconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(rename = "exp", with = "ts_seconds")]
    pub expire_at: DateTime<Utc>,
    #[serde(rename = "aud")]
    pub audience: String,
}

/// HS256 JWT credentials keyed by the configured `jwt_secret`.
pub struct JwtCredentialIssuer {
    secret: Vec<u8>,
}

impl JwtCredentialIssuer {
    pub fn new(config: &Config) -> Self {
        Self::from_secret(config.jwt_secret())
    }

    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
        }
    }

    /// Sign a credential as if issued at `issued_at`.
    pub fn sign_at(
        &self,
        voter_id: Id,
        election_id: Id,
        ttl: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        let claims = VotingClaims {
            voter_id: voter_id.into(),
            election_id: election_id.into(),
            issued_at,
            expire_at: issued_at + ttl,
            audience: BALLOT_AUDIENCE.to_string(),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?;
        Ok(token)
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; a 15 minute credential must not live for 16.
        validation.leeway = 0;
        validation.set_audience(&[BALLOT_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        validation
    }
}

impl CredentialIssuer for JwtCredentialIssuer {
    fn sign(&self, voter_id: Id, election_id: Id, ttl: Duration) -> Result<String> {
        self.sign_at(voter_id, election_id, ttl, Utc::now())
    }

    fn validate(&self, token: &str) -> Result<VotingClaims> {
        let data = jsonwebtoken::decode::<VotingClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Self::validation(),
        )?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::errors::ErrorKind;

    use super::*;
    use crate::error::Error;

    fn issuer() -> JwtCredentialIssuer {
        JwtCredentialIssuer::from_secret(b"a very secret test key")
    }

    fn jwt_kind(err: Error) -> ErrorKind {
        match err {
            Error::Jwt(e) => e.into_kind(),
            other => panic!("expected JWT error, got {other:?}"),
        }
    }

    #[test]
    fn credential_binds_voter_and_election() {
        let (voter_id, election_id) = (Id::new(), Id::new());
        let token = issuer()
            .sign(voter_id, election_id, Duration::minutes(15))
            .unwrap();

        let claims = issuer().validate(&token).unwrap();
        assert_eq!(*claims.voter_id, voter_id);
        assert_eq!(*claims.election_id, election_id);
        assert_eq!(claims.audience, BALLOT_AUDIENCE);
        assert_eq!(claims.expire_at - claims.issued_at, Duration::minutes(15));
    }

    #[test]
    fn credential_accepted_before_expiry() {
        let issued_at = Utc::now() - Duration::minutes(14);
        let token = issuer()
            .sign_at(Id::new(), Id::new(), Duration::minutes(15), issued_at)
            .unwrap();
        assert!(issuer().validate(&token).is_ok());
    }

    #[test]
    fn credential_rejected_after_expiry() {
        let issued_at = Utc::now() - Duration::minutes(16);
        let token = issuer()
            .sign_at(Id::new(), Id::new(), Duration::minutes(15), issued_at)
            .unwrap();
        let err = issuer().validate(&token).unwrap_err();
        assert!(matches!(jwt_kind(err), ErrorKind::ExpiredSignature));
    }

    #[test]
    fn credential_from_other_secret_rejected() {
        let token = JwtCredentialIssuer::from_secret(b"someone else's key")
            .sign(Id::new(), Id::new(), Duration::minutes(15))
            .unwrap();
        let err = issuer().validate(&token).unwrap_err();
        assert!(matches!(jwt_kind(err), ErrorKind::InvalidSignature));
    }
}
