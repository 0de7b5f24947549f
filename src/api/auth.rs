use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    error::{Error, Result},
    model::api::{
        admin::AdminCredentials,
        auth::{AuthToken, AUTH_TOKEN_COOKIE},
    },
    AdminStore, Config,
};

pub fn routes() -> Vec<Route> {
    routes![login, logout]
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn login(
    cookies: &CookieJar<'_>,
    credentials: Json<AdminCredentials>,
    admins: &State<AdminStore>,
    config: &State<Config>,
) -> Result<()> {
    let admin = admins
        .find_by_username(&credentials.username)
        .await?
        .filter(|admin| admin.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No admin found with the provided username and password combination.".to_string(),
            )
        })?;

    let token = AuthToken::new(&admin);
    cookies.add(token.into_cookie(config));

    Ok(())
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}
