//! Polls and the single-vote ledger.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::Store;
use crate::error::{is_unique_violation, Result, TripError};
use crate::model::{
    GroupId, NewVoting, OptionTally, TravelGroup, UserId, Vote, Voting, VotingId, VotingTally,
};

fn decode_options(raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn load_voting(conn: &Connection, voting_id: VotingId) -> Result<Option<Voting>> {
    let voting = conn
        .query_row(
            "SELECT id, group_id, question, options, created_at FROM votings WHERE id = ?1",
            params![voting_id],
            |row| {
                let raw: String = row.get(3)?;
                Ok(Voting {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    question: row.get(2)?,
                    options: decode_options(&raw)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(voting)
}

fn insert_vote(conn: &Connection, vote: &Vote) -> Result<()> {
    conn.execute(
        "INSERT INTO votes (voting_id, user_id, selected_option, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![vote.voting_id, vote.user_id, vote.selected_option, vote.created_at],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            TripError::conflict("user has already voted in this voting")
        } else {
            e.into()
        }
    })?;
    Ok(())
}

impl Store {
    pub fn create_voting(&self, new: &NewVoting) -> Result<Voting> {
        let options = serde_json::to_string(&new.options)
            .map_err(|e| TripError::internal(format!("encode voting options: {}", e)))?;

        let created_at = Utc::now();
        let id = self.write(|uow| {
            uow.conn().execute(
                "INSERT INTO votings (group_id, question, options, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![new.group_id, new.question, options, created_at],
            )?;
            Ok(uow.last_insert_id())
        })?;

        let voting = Voting {
            id,
            group_id: new.group_id,
            question: new.question.clone(),
            options: new.options.clone(),
            created_at,
        };
        info!(voting_id = voting.id, group_id = voting.group_id, "Voting created");
        Ok(voting)
    }

    /// Group a voting belongs to, used to authorize votes on it.
    pub fn voting_group(&self, voting_id: VotingId) -> Result<GroupId> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT group_id FROM votings WHERE id = ?1",
            params![voting_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(TripError::NotFound)
    }

    /// Record `user_id`'s choice in a poll.
    ///
    /// The option must be one of the poll's options. The existence check and
    /// the insert share one immediate transaction, and the UNIQUE constraint on
    /// (voting_id, user_id) turns any remaining race into a conflict.
    pub fn cast_vote(&self, voting_id: VotingId, user_id: UserId, selected_option: &str) -> Result<Vote> {
        let vote = self.write(|uow| {
            let voting = load_voting(uow.conn(), voting_id)?.ok_or(TripError::NotFound)?;
            if !voting.options.iter().any(|o| o == selected_option) {
                return Err(TripError::validation("selected option is not part of this voting"));
            }

            let already: Option<String> = uow
                .conn()
                .query_row(
                    "SELECT selected_option FROM votes WHERE voting_id = ?1 AND user_id = ?2",
                    params![voting_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            if already.is_some() {
                debug!(voting_id, user_id, "Duplicate vote rejected");
                return Err(TripError::conflict("user has already voted in this voting"));
            }

            let vote = Vote {
                voting_id,
                user_id,
                selected_option: selected_option.to_string(),
                created_at: Utc::now(),
            };
            insert_vote(uow.conn(), &vote)?;
            Ok(vote)
        })?;

        info!(voting_id, user_id, "Vote recorded");
        Ok(vote)
    }

    /// Polls of an authorized group with tallies as seen by `viewer`.
    pub fn list_votings(&self, group: &TravelGroup, viewer: UserId) -> Result<Vec<VotingTally>> {
        let conn = self.connect()?;

        // (voting_id, option) -> count
        let mut counts: HashMap<(VotingId, String), i64> = HashMap::new();
        let mut own: HashMap<VotingId, String> = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT v.voting_id, v.selected_option, COUNT(*), SUM(v.user_id = ?2)
             FROM votes v
             JOIN votings p ON p.id = v.voting_id
             WHERE p.group_id = ?1
             GROUP BY v.voting_id, v.selected_option",
        )?;
        let rows = stmt.query_map(params![group.id, viewer], |row| {
            Ok((
                row.get::<_, VotingId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        for row in rows {
            let (voting_id, option, n, mine) = row?;
            if mine > 0 {
                own.insert(voting_id, option.clone());
            }
            counts.insert((voting_id, option), n);
        }

        let mut stmt = conn.prepare(
            "SELECT id, group_id, question, options, created_at
             FROM votings WHERE group_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let votings = stmt
            .query_map(params![group.id], |row| {
                let raw: String = row.get(3)?;
                Ok(Voting {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    question: row.get(2)?,
                    options: decode_options(&raw)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let tallies = votings
            .into_iter()
            .map(|voting| {
                let tallies: Vec<OptionTally> = voting
                    .options
                    .iter()
                    .map(|option| OptionTally {
                        option: option.clone(),
                        votes: counts.get(&(voting.id, option.clone())).copied().unwrap_or(0),
                    })
                    .collect();
                VotingTally {
                    total_votes: tallies.iter().map(|t| t.votes).sum(),
                    user_vote: own.remove(&voting.id),
                    tallies,
                    voting,
                }
            })
            .collect();
        Ok(tallies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::*;
    use std::sync::{Arc, Barrier};

    fn poll(store: &Store, group: &TravelGroup) -> Voting {
        let options = vec!["Porto".to_string(), "Faro".to_string(), "Sintra".to_string()];
        store
            .create_voting(&NewVoting::new(group.id, "Next stop?", &options).unwrap())
            .unwrap()
    }

    #[test]
    fn test_options_round_trip_in_order() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let trip = group(&store, &ana, "Lisbon");
        let voting = poll(&store, &trip);

        let conn = store.connect().unwrap();
        let loaded = load_voting(&conn, voting.id).unwrap().unwrap();
        assert_eq!(loaded.options, vec!["Porto", "Faro", "Sintra"]);
        assert_eq!(store.voting_group(voting.id).unwrap(), trip.id);
        assert!(matches!(store.voting_group(999), Err(TripError::NotFound)));
    }

    #[test]
    fn test_cast_vote_once() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let trip = group(&store, &ana, "Lisbon");
        let voting = poll(&store, &trip);

        store.cast_vote(voting.id, ana.id, "Faro").unwrap();
        let err = store.cast_vote(voting.id, ana.id, "Porto").unwrap_err();
        assert!(matches!(err, TripError::Conflict(_)));
        assert_eq!(count(&store, "votes", ""), 1);
    }

    #[test]
    fn test_invalid_option_rejected() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let trip = group(&store, &ana, "Lisbon");
        let voting = poll(&store, &trip);

        for option in ["Madrid", "", "porto"] {
            let err = store.cast_vote(voting.id, ana.id, option).unwrap_err();
            assert!(matches!(err, TripError::Validation(_)), "option {:?}", option);
        }
        assert_eq!(count(&store, "votes", ""), 0);
    }

    #[test]
    fn test_unknown_voting_not_found() {
        let store = test_store();
        let ana = user(&store, "Ana");
        assert!(matches!(store.cast_vote(7, ana.id, "Porto"), Err(TripError::NotFound)));
    }

    #[test]
    fn test_uniqueness_constraint_is_authoritative() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let trip = group(&store, &ana, "Lisbon");
        let voting = poll(&store, &trip);

        // Bypass the pre-check entirely
        let conn = store.connect().unwrap();
        let vote = Vote {
            voting_id: voting.id,
            user_id: ana.id,
            selected_option: "Porto".into(),
            created_at: Utc::now(),
        };
        insert_vote(&conn, &vote).unwrap();
        let err = insert_vote(&conn, &Vote { selected_option: "Faro".into(), ..vote }).unwrap_err();

        assert!(matches!(err, TripError::Conflict(_)));
        assert_eq!(count(&store, "votes", ""), 1);
    }

    #[test]
    fn test_concurrent_identical_votes_store_one_row() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let trip = group(&store, &ana, "Lisbon");
        let voting = poll(&store, &trip);

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = ["Porto", "Faro", "Porto", "Sintra"]
            .into_iter()
            .map(|option| {
                let store = store.store.clone();
                let barrier = Arc::clone(&barrier);
                let (voting_id, user_id) = (voting.id, ana.id);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.cast_vote(voting_id, user_id, option)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, TripError::Conflict(_))));
        assert_eq!(count(&store, "votes", ""), 1);
    }

    #[test]
    fn test_tally_counts_and_own_selection() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let bia = user(&store, "Bia");
        let caio = user(&store, "Caio");
        let trip = group(&store, &ana, "Lisbon");
        store.add_member(&trip, bia.id).unwrap();
        store.add_member(&trip, caio.id).unwrap();
        let voting = poll(&store, &trip);

        store.cast_vote(voting.id, ana.id, "Faro").unwrap();
        store.cast_vote(voting.id, bia.id, "Faro").unwrap();
        store.cast_vote(voting.id, caio.id, "Sintra").unwrap();

        let tallies = store.list_votings(&trip, bia.id).unwrap();
        assert_eq!(tallies.len(), 1);
        let tally = &tallies[0];
        assert_eq!(tally.total_votes, 3);
        assert_eq!(tally.user_vote.as_deref(), Some("Faro"));
        let votes: Vec<i64> = tally.tallies.iter().map(|t| t.votes).collect();
        assert_eq!(votes, vec![0, 2, 1]);

        let outsider_view = store.list_votings(&trip, 999).unwrap();
        assert_eq!(outsider_view[0].user_vote, None);
    }
}
