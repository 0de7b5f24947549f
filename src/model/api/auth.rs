use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::Error,
    model::{db::admin::Admin, mongodb::Id},
    AdminStore,
};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: Id,
    #[serde(rename = "usr")]
    pub username: String,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given admin.
    pub fn new(admin: &Admin) -> Self {
        Self {
            id: admin.id,
            username: admin.username.clone(),
        }
    }

    #[allow(clippy::missing_panics_doc)]
    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie and check that the admin still exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` and `AdminStore` are always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();
        let admins = req.guard::<&State<AdminStore>>().await.unwrap();

        let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) else {
            return Outcome::Failure((
                Status::Unauthorized,
                Error::Status(Status::Unauthorized, "Admin login required".to_string()),
            ));
        };

        let token = match Self::from_cookie(cookie, config) {
            Ok(token) => token,
            Err(e) => return Outcome::Failure((Status::Unauthorized, e)),
        };

        match admins.find_by_id(token.id).await {
            Ok(Some(_)) => Outcome::Success(token),
            Ok(None) => Outcome::Failure((
                Status::Unauthorized,
                Error::Status(
                    Status::Unauthorized,
                    format!("Admin {} no longer exists", token.id),
                ),
            )),
            Err(e) => Outcome::Failure((Status::InternalServerError, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::db::admin::NewAdmin;

    #[test]
    fn cookie_round_trip() {
        let config = Config::example();
        let admin = Admin {
            id: Id::new(),
            admin: NewAdmin::example(),
        };
        let cookie = AuthToken::new(&admin).into_cookie(&config);
        assert_eq!(cookie.name(), AUTH_TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));

        let token = AuthToken::from_cookie(&cookie, &config).unwrap();
        assert_eq!(token.id, admin.id);
        assert_eq!(token.username, "coordinator");
    }

    #[test]
    fn cookie_from_other_secret_rejected() {
        let config = Config::example();
        let admin = Admin {
            id: Id::new(),
            admin: NewAdmin::example(),
        };
        let cookie = AuthToken::new(&admin).into_cookie(&Config::example_with_secret("other"));
        assert!(AuthToken::from_cookie(&cookie, &config).is_err());
    }
}
