//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.
//!
//! Each collection type also implements the matching repository trait from
//! [`crate::services`] on its [`Coll`](crate::model::mongodb::Coll).

pub mod admin;
pub mod election;
pub mod vote_status;
pub mod voter;
