use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Document};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::mongodb::{is_duplicate_key_error, Coll, Id},
    services::VoteStatusRepository,
};

/// Record that a voter has cast their ballot in an election.
///
/// Documents only ever exist for voters who have voted, and are never
/// modified or removed, so `has_voted` cannot revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStatus {
    pub voter_id: Id,
    pub election_id: Id,
    pub has_voted: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub voted_at: DateTime<Utc>,
}

impl VoteStatus {
    pub fn voted(voter_id: Id, election_id: Id) -> Self {
        Self {
            voter_id,
            election_id,
            has_voted: true,
            voted_at: Utc::now(),
        }
    }

    /// Filter matching the status of one voter in one election.
    pub fn filter(voter_id: Id, election_id: Id) -> Document {
        doc! {
            "voter_id": voter_id,
            "election_id": election_id,
        }
    }
}

#[rocket::async_trait]
impl VoteStatusRepository for Coll<VoteStatus> {
    async fn has_voted(&self, voter_id: Id, election_id: Id) -> Result<bool> {
        let mut filter = VoteStatus::filter(voter_id, election_id);
        filter.insert("has_voted", true);
        Ok(self.find_one(filter, None).await?.is_some())
    }

    async fn record_vote(&self, voter_id: Id, election_id: Id) -> Result<()> {
        // The unique (voter_id, election_id) index makes this insert the
        // atomic check-and-mark; concurrent ballots for one voter cannot both
        // succeed.
        match self
            .insert_one(VoteStatus::voted(voter_id, election_id), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => Err(Error::AlreadyVoted {
                voter_id,
                election_id,
            }),
            Err(err) => Err(err.into()),
        }
    }
}
