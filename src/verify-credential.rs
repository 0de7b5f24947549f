use std::fmt::{Display, Formatter};

use chrono::Utc;
use clap::{Arg, ArgAction, ArgMatches, Command};
use jsonwebtoken::errors::ErrorKind;

use facevote_backend::{
    error::Error as BackendError,
    services::{CredentialIssuer, JwtCredentialIssuer, VotingClaims},
};

const PROGRAM_NAME: &str = "verify-credential";

const ABOUT_TEXT: &str = "Check a voting credential issued after facial verification.

EXIT CODES:
     0: The credential is valid.
   255: The credential is well-formed but expired or wrongly signed.
 Other: Error.";

const TOKEN: &str = "TOKEN";

const TOKEN_HELP: &str = "The `votingToken` returned by `POST /voters/authenticate`";

const SECRET: &str = "secret";

const SECRET_HELP: &str = "The server's `jwt_secret`";

fn cli() -> Command {
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(TOKEN)
                .help(TOKEN_HELP)
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(SECRET)
                .long(SECRET)
                .short('s')
                .help(SECRET_HELP)
                .action(ArgAction::Set)
                .required(true),
        )
}

#[derive(Debug, Eq, PartialEq)]
enum Error {
    Malformed(String),
    Expired,
    Rejected(String),
}

/// Claims in the form shown to the operator.
#[derive(Debug, Eq, PartialEq)]
struct FriendlyClaims(VotingClaims);

impl Display for FriendlyClaims {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let claims = &self.0;
        let remaining = claims.expire_at - Utc::now();
        writeln!(f, "Voter:    {}", claims.voter_id)?;
        writeln!(f, "Election: {}", claims.election_id)?;
        writeln!(f, "Issued:   {}", claims.issued_at.to_rfc3339())?;
        write!(
            f,
            "Expires:  {} ({}s remaining)",
            claims.expire_at.to_rfc3339(),
            remaining.num_seconds().max(0)
        )
    }
}

fn verify(token: &str, secret: &str) -> Result<FriendlyClaims, Error> {
    let issuer = JwtCredentialIssuer::from_secret(secret.as_bytes());
    match issuer.validate(token.trim()) {
        Ok(claims) => Ok(FriendlyClaims(claims)),
        Err(BackendError::Jwt(err)) => match err.kind() {
            ErrorKind::ExpiredSignature => Err(Error::Expired),
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAudience
            | ErrorKind::MissingRequiredClaim(_) => Err(Error::Rejected(err.to_string())),
            _ => Err(Error::Malformed(err.to_string())),
        },
        Err(err) => Err(Error::Malformed(err.to_string())),
    }
}

/// Run verification, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    // Required arguments are guaranteed to be present.
    let token: &String = args.get_one(TOKEN).unwrap();
    let secret: &String = args.get_one(SECRET).unwrap();
    match verify(token, secret) {
        Ok(claims) => {
            println!("Credential is valid.");
            println!("{claims}");
            0
        }
        Err(Error::Malformed(msg)) => {
            println!("Not a voting credential: {msg}");
            1
        }
        Err(Error::Expired) => {
            println!("Credential has expired.");
            255
        }
        Err(Error::Rejected(msg)) => {
            println!("Credential rejected: {msg}");
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
