use mongodb::{
    bson::{doc, to_bson, Bson},
    options::FindOptions,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::mongodb::{Coll, Id},
    services::ElectionRepository,
};

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionStatus {
    /// Scheduled, not yet open.
    Upcoming,
    /// Currently accepting votes. At most one election is ever in this state.
    Active,
    /// Finished.
    Closed,
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

/// An election, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    pub name: String,
    pub status: ElectionStatus,
}

impl Election {
    pub fn is_active(&self) -> bool {
        self.status == ElectionStatus::Active
    }
}

#[rocket::async_trait]
impl ElectionRepository for Coll<Election> {
    async fn find_active(&self) -> Result<Option<Election>> {
        let filter = doc! {
            "status": ElectionStatus::Active,
        };
        // Fetch two so that a broken invariant is noticed rather than hidden.
        let options = FindOptions::builder().limit(2).build();
        let mut active: Vec<Election> = self.find(filter, options).await?.try_collect().await?;
        match active.len() {
            0 | 1 => Ok(active.pop()),
            _ => Err(Error::MultipleActiveElections),
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Election {
        pub fn example() -> Self {
            Self {
                id: Id::new(),
                name: "General Election".to_string(),
                status: ElectionStatus::Active,
            }
        }

        pub fn example_closed() -> Self {
            Self {
                id: Id::new(),
                name: "Previous Election".to_string(),
                status: ElectionStatus::Closed,
            }
        }
    }
}
