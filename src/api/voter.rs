use log::info;
use rocket::{form::Form, http::Status, serde::json::Json, Route, State};

use crate::{
    error::Result,
    logging::RequestId,
    model::api::{
        auth::AuthToken,
        voter::{AuthResult, VoterAuthentication, VoterDescription, VoterRegistration},
    },
    orchestrator::VoterOrchestrator,
};

pub fn routes() -> Vec<Route> {
    routes![register_voter, authenticate_voter]
}

#[post("/voters", data = "<registration>")]
pub async fn register_voter(
    token: AuthToken,
    request_id: &RequestId,
    registration: Form<VoterRegistration>,
    orchestrator: &State<VoterOrchestrator>,
) -> Result<(Status, Json<VoterDescription>)> {
    let (attributes, image) = registration.into_inner().into_parts()?;
    info!(
        "{request_id}: admin '{}' registering voter '{}'",
        token.username, attributes.public_voter_id
    );

    let voter = orchestrator.register_voter(attributes, &image).await?;

    Ok((Status::Created, Json(voter.into())))
}

#[post("/voters/authenticate", data = "<authentication>")]
pub async fn authenticate_voter(
    request_id: &RequestId,
    authentication: Form<VoterAuthentication>,
    orchestrator: &State<VoterOrchestrator>,
) -> Result<Json<AuthResult>> {
    let authentication = authentication.into_inner();
    let public_voter_id = authentication.public_voter_id.trim();
    info!("{request_id}: authenticating voter '{public_voter_id}'");

    let result = orchestrator
        .authenticate_voter(public_voter_id, &authentication.image.bytes)
        .await?;

    Ok(Json(result))
}
