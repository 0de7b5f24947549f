#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

#[cfg(test)]
#[macro_use]
extern crate db_test;

use std::sync::Arc;

use rocket::{Build, Rocket};

use crate::{
    config::{ConfigFairing, DatabaseFairing, ServicesFairing},
    logging::LoggerFairing,
    services::AdminRepository,
};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod services;

pub use config::Config;

/// Admin accounts, as held in managed state.
pub type AdminStore = Arc<dyn AdminRepository>;

/// Assemble the server. Configuration, the database and provider clients are
/// all set up by fairings during ignition.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(ServicesFairing)
}

/// Assemble the server around already-constructed services, skipping the
/// fairings that would connect to MongoDB and Azure.
#[cfg(test)]
pub(crate) fn rocket_for_services(
    config: Config,
    orchestrator: orchestrator::VoterOrchestrator,
    admins: AdminStore,
) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .manage(config)
        .manage(orchestrator)
        .manage(admins)
}

/// A fresh, uniquely named database with indexes in place, on the server
/// named by `db_uri`.
#[cfg(test)]
pub(crate) async fn test_database() -> mongodb::Database {
    use data_encoding::HEXLOWER;
    use rand::Rng;

    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let client = mongodb::Client::with_uri_str(&db_uri)
        .await
        .unwrap_or_else(|e| panic!("Could not connect to database with `db_uri` \"{db_uri}\": {e}"));

    let mut suffix = [0_u8; 6];
    rand::thread_rng().fill(&mut suffix);
    let db = client.database(&format!("facevote-test-{}", HEXLOWER.encode(&suffix)));
    model::mongodb::ensure_indexes_exist(&db).await.unwrap();
    db
}
