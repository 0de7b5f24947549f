use std::sync::Arc;

use chrono::Duration;
use log::{error, info};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    model::{
        api::admin::AdminCredentials,
        db::{
            admin::{ensure_admin_exists, Admin},
            election::Election,
            vote_status::VoteStatus,
            voter::Voter,
        },
        mongodb::{ensure_indexes_exist, Coll},
    },
    orchestrator::{Collaborators, VoterOrchestrator},
    services::{AzureBlobStore, AzureFaceClient, JwtCredentialIssuer},
    AdminStore,
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Clone, Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    #[serde(default = "default_credential_ttl")]
    credential_ttl: u32,
    #[serde(default = "default_confidence_threshold")]
    confidence_threshold: f64,
    #[serde(default = "default_provider_timeout")]
    provider_timeout: u32,
    face_endpoint: String,
    face_person_group: String,
    blob_account_url: String,
    blob_container: String,
    // secrets
    jwt_secret: String,
    face_api_key: String,
    blob_sas_token: String,
    admin_username: Option<String>,
    admin_password: Option<String>,
    admin_full_name: Option<String>,
}

fn default_credential_ttl() -> u32 {
    15 * 60
}

fn default_confidence_threshold() -> f64 {
    0.75
}

fn default_provider_timeout() -> u32 {
    30
}

impl Config {
    /// Valid lifetime of admin auth token cookies.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Valid lifetime of an issued voting credential.
    pub fn credential_ttl(&self) -> Duration {
        Duration::seconds(self.credential_ttl.into())
    }

    /// Minimum face verification confidence, inclusive.
    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Timeout applied to each call to an external provider.
    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.provider_timeout.into())
    }

    /// Base URL of the Azure Face API resource.
    pub fn face_endpoint(&self) -> &str {
        &self.face_endpoint
    }

    /// Person group that voters are enrolled into.
    pub fn face_person_group(&self) -> &str {
        &self.face_person_group
    }

    /// Base URL of the Azure storage account.
    pub fn blob_account_url(&self) -> &str {
        &self.blob_account_url
    }

    /// Container holding voter photos.
    pub fn blob_container(&self) -> &str {
        &self.blob_container
    }

    /// Secret key used to sign JWTs, both admin cookies and voting credentials.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Subscription key for the Face API.
    pub fn face_api_key(&self) -> &str {
        &self.face_api_key
    }

    /// Shared access signature granting write access to the photo container.
    pub fn blob_sas_token(&self) -> &str {
        self.blob_sas_token.trim_start_matches('?')
    }

    /// Credentials for the admin to create at startup, if configured.
    pub fn bootstrap_admin(&self) -> Option<AdminCredentials> {
        match (&self.admin_username, &self.admin_password) {
            (Some(username), Some(password)) => Some(AdminCredentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    /// Display name for the bootstrap admin.
    pub fn bootstrap_admin_name(&self) -> Option<&str> {
        self.admin_full_name.as_deref()
    }

    /// Check that every required setting is present and sane.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("jwt_secret", &self.jwt_secret),
            ("face_endpoint", &self.face_endpoint),
            ("face_person_group", &self.face_person_group),
            ("face_api_key", &self.face_api_key),
            ("blob_account_url", &self.blob_account_url),
            ("blob_container", &self.blob_container),
            ("blob_sas_token", &self.blob_sas_token),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::Configuration(format!("`{name}` must be set")));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Configuration(format!(
                "`confidence_threshold` must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.auth_ttl == 0 || self.credential_ttl == 0 || self.provider_timeout == 0 {
            return Err(Error::Configuration(
                "`auth_ttl`, `credential_ttl` and `provider_timeout` must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A fairing that loads and validates the application config and puts it in
/// managed state. Ignition fails if the config is missing or invalid, so no
/// request can ever be served without it.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if let Err(e) = config.validate() {
            error!("{e}");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places the `Database` and the admin
/// store into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(DATABASE);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to set up database indexes: {e}");
            return Err(rocket);
        }

        // Seed the bootstrap admin, if configured.
        let admins: AdminStore = Arc::new(Coll::<Admin>::from_db(&db));
        let Some(app_config) = rocket.state::<Config>().cloned() else {
            error!("Application config must be loaded before the database");
            return Err(rocket);
        };
        if let Err(e) = ensure_admin_exists(admins.as_ref(), &app_config).await {
            error!("Failed to seed bootstrap admin: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(db).manage(admins);
        Ok(rocket)
    }
}

static DATABASE: &str = "facevote";

/// A fairing that constructs the provider clients and the voter orchestrator
/// from the already-managed config and database.
pub struct ServicesFairing;

#[rocket::async_trait]
impl Fairing for ServicesFairing {
    fn info(&self) -> Info {
        Info {
            name: "Voter services",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = rocket.state::<Config>().cloned();
        let db = rocket.state::<Database>().cloned();
        let (Some(config), Some(db)) = (config, db) else {
            error!("Config and database must be loaded before voter services");
            return Err(rocket);
        };

        let identity = match AzureFaceClient::new(&config) {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to construct Face API client: {e}");
                return Err(rocket);
            }
        };
        let images = match AzureBlobStore::new(&config) {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to construct blob storage client: {e}");
                return Err(rocket);
            }
        };

        let collaborators = Collaborators {
            identity: Arc::new(identity),
            images: Arc::new(images),
            voters: Arc::new(Coll::<Voter>::from_db(&db)),
            elections: Arc::new(Coll::<Election>::from_db(&db)),
            vote_status: Arc::new(Coll::<VoteStatus>::from_db(&db)),
            credentials: Arc::new(JwtCredentialIssuer::new(&config)),
        };
        let orchestrator = VoterOrchestrator::new(collaborators, &config);
        info!("Voter services ready");

        Ok(rocket.manage(orchestrator))
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self::example_with_secret("test jwt secret")
        }

        pub fn example_with_secret(secret: &str) -> Self {
            Self {
                auth_ttl: 3600,
                credential_ttl: default_credential_ttl(),
                confidence_threshold: default_confidence_threshold(),
                provider_timeout: default_provider_timeout(),
                face_endpoint: "https://facevote.cognitiveservices.azure.com".to_string(),
                face_person_group: "voters".to_string(),
                blob_account_url: "https://facevote.blob.core.windows.net".to_string(),
                blob_container: "photos".to_string(),
                jwt_secret: secret.to_string(),
                face_api_key: "face key".to_string(),
                blob_sas_token: "?sv=2022-11-02&sig=abc".to_string(),
                admin_username: None,
                admin_password: None,
                admin_full_name: None,
            }
        }

        pub fn with_bootstrap_admin(mut self, credentials: AdminCredentials) -> Self {
            self.admin_username = Some(credentials.username);
            self.admin_password = Some(credentials.password);
            self
        }
    }
}
