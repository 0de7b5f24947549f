use std::ops::Deref;

use argon2::Config as Argon2Config;
use log::info;
use mongodb::bson::doc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::admin::{AdminCredentials, MIN_PASSWORD_LENGTH},
        mongodb::{Coll, Id},
    },
    services::AdminRepository,
};

/// Core admin user data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCore {
    pub username: String,
    pub full_name: String,
    pub password_hash: String,
}

impl AdminCore {
    /// Hash the given credentials into a new admin.
    /// Returns `None` if the username is empty or the password is too short.
    pub fn new(credentials: AdminCredentials, full_name: String) -> Option<Self> {
        if credentials.username.is_empty() || credentials.password.len() < MIN_PASSWORD_LENGTH {
            return None;
        }

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash = argon2::hash_encoded(
            credentials.password.as_bytes(),
            &salt,
            &Argon2Config::default(),
        )
        .ok()?;
        Some(Self {
            username: credentials.username,
            full_name,
            password_hash,
        })
    }

    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }
}

/// An admin without an ID.
pub type NewAdmin = AdminCore;

/// An admin user from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub admin: AdminCore,
}

impl Deref for Admin {
    type Target = AdminCore;

    fn deref(&self) -> &Self::Target {
        &self.admin
    }
}

#[rocket::async_trait]
impl AdminRepository for Coll<Admin> {
    async fn find_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let filter = doc! {
            "username": username,
        };
        Ok(self.find_one(filter, None).await?)
    }

    async fn find_by_id(&self, id: Id) -> Result<Option<Admin>> {
        Ok(self.find_one(id.as_doc(), None).await?)
    }

    async fn insert(&self, admin: NewAdmin) -> Result<Admin> {
        let id: Id = self
            .with_type::<NewAdmin>()
            .insert_one(&admin, None)
            .await?
            .inserted_id
            .as_object_id()
            .unwrap() // Valid because the ID comes directly from the DB
            .into();
        Ok(Admin { id, admin })
    }
}

/// Create the bootstrap admin from config, unless it already exists or no
/// bootstrap credentials are configured.
pub async fn ensure_admin_exists(admins: &dyn AdminRepository, config: &Config) -> Result<()> {
    let Some(credentials) = config.bootstrap_admin() else {
        info!("No bootstrap admin configured, seeding skipped");
        return Ok(());
    };

    if admins.find_by_username(&credentials.username).await?.is_some() {
        info!(
            "Admin '{}' already exists, seeding skipped",
            credentials.username
        );
        return Ok(());
    }

    let username = credentials.username.clone();
    let full_name = config.bootstrap_admin_name().unwrap_or(&username).to_string();
    let admin = NewAdmin::new(credentials, full_name).ok_or_else(|| {
        Error::Configuration(format!(
            "bootstrap admin '{username}' needs a password of at least {MIN_PASSWORD_LENGTH} characters"
        ))
    })?;
    admins.insert(admin).await?;
    info!("Created bootstrap admin '{username}'");
    Ok(())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl AdminCore {
        pub fn example() -> Self {
            Self::new(AdminCredentials::example(), "Election Coordinator".to_string()).unwrap()
        }
    }
}
