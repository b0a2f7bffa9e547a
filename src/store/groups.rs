//! Group aggregate: groups, memberships and destinations.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::Store;
use crate::error::{is_unique_violation, Result, TripError};
use crate::model::{
    Destination, GroupId, GroupMember, GroupSummary, MemberRole, NewDestination, NewGroup,
    TravelGroup, UserId,
};

const GROUP_COLUMNS: &str =
    "g.id, g.name, g.description, g.creator_id, g.start_date, g.end_date, g.created_at";

pub(crate) fn group_from_row(row: &Row<'_>) -> rusqlite::Result<TravelGroup> {
    Ok(TravelGroup {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        creator_id: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<GroupSummary> {
    Ok(GroupSummary {
        group: group_from_row(row)?,
        creator_name: row.get(7)?,
        member_count: row.get(8)?,
    })
}

/// Load `group_id` if `user_id` is its creator or a member.
///
/// A missing group and a group the user cannot see both yield `NotFound`.
pub(crate) fn authorize_member(
    conn: &Connection,
    group_id: GroupId,
    user_id: UserId,
) -> Result<TravelGroup> {
    let sql = format!(
        "SELECT {GROUP_COLUMNS} FROM travel_groups g
         WHERE g.id = ?1
           AND (g.creator_id = ?2
                OR EXISTS (SELECT 1 FROM group_members m
                           WHERE m.group_id = g.id AND m.user_id = ?2))"
    );
    let group = conn
        .query_row(&sql, params![group_id, user_id], group_from_row)
        .optional()?;

    group.ok_or_else(|| {
        debug!(group_id, user_id, "Group access denied");
        TripError::NotFound
    })
}

pub(crate) fn is_member(conn: &Connection, group_id: GroupId, user_id: UserId) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            params![group_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

impl Store {
    /// Create a group and record its creator as the first member, atomically.
    pub fn create_group(&self, new: &NewGroup) -> Result<TravelGroup> {
        let group = self.write(|uow| {
            let created_at = Utc::now();
            uow.conn().execute(
                "INSERT INTO travel_groups
                 (name, description, creator_id, start_date, end_date, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    new.name,
                    new.description,
                    new.creator_id,
                    new.start_date,
                    new.end_date,
                    created_at
                ],
            )?;
            let group_id = uow.last_insert_id();

            uow.conn().execute(
                "INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                params![group_id, new.creator_id, created_at],
            )?;

            Ok(TravelGroup {
                id: group_id,
                name: new.name.clone(),
                description: new.description.clone(),
                creator_id: new.creator_id,
                start_date: new.start_date,
                end_date: new.end_date,
                created_at,
            })
        })?;

        info!(group_id = group.id, creator_id = group.creator_id, "Group created");
        Ok(group)
    }

    /// Groups the user created or belongs to, latest trips first.
    pub fn list_groups_for_user(&self, user_id: UserId) -> Result<Vec<GroupSummary>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {GROUP_COLUMNS}, u.name,
                    (SELECT COUNT(*) FROM group_members c WHERE c.group_id = g.id)
             FROM travel_groups g
             JOIN users u ON u.id = g.creator_id
             WHERE g.creator_id = ?1
                OR g.id IN (SELECT group_id FROM group_members WHERE user_id = ?1)
             ORDER BY g.start_date DESC, g.id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let groups = stmt
            .query_map(params![user_id], summary_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(groups)
    }

    /// Detail view of an already authorized group.
    pub fn group_summary(&self, group_id: GroupId) -> Result<GroupSummary> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {GROUP_COLUMNS}, u.name,
                    (SELECT COUNT(*) FROM group_members c WHERE c.group_id = g.id)
             FROM travel_groups g
             JOIN users u ON u.id = g.creator_id
             WHERE g.id = ?1"
        );
        conn.query_row(&sql, params![group_id], summary_from_row)
            .optional()?
            .ok_or(TripError::NotFound)
    }

    /// Members of a group, organizer first, then by name.
    pub fn list_members(&self, group: &TravelGroup) -> Result<Vec<GroupMember>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT u.id, u.name, u.email, m.joined_at
             FROM group_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.group_id = ?1
             ORDER BY (u.id = ?2) DESC, u.name ASC",
        )?;
        let members = stmt
            .query_map(params![group.id, group.creator_id], |row| {
                let user_id: UserId = row.get(0)?;
                Ok(GroupMember {
                    user_id,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    role: if user_id == group.creator_id {
                        MemberRole::Organizer
                    } else {
                        MemberRole::Participant
                    },
                    joined_at: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    /// Add `user_id` to a group the caller has already been authorized for.
    pub fn add_member(&self, group: &TravelGroup, user_id: UserId) -> Result<GroupMember> {
        let member = self.write(|uow| {
            let user = uow
                .conn()
                .query_row(
                    "SELECT id, name, email, created_at FROM users WHERE id = ?1",
                    params![user_id],
                    super::users::user_from_row,
                )
                .optional()?
                .ok_or_else(|| TripError::validation(format!("user {} does not exist", user_id)))?;

            if is_member(uow.conn(), group.id, user_id)? {
                return Err(TripError::conflict("user is already a member"));
            }

            let joined_at = Utc::now();
            uow.conn()
                .execute(
                    "INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                    params![group.id, user_id, joined_at],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        TripError::conflict("user is already a member")
                    } else {
                        e.into()
                    }
                })?;

            Ok(GroupMember {
                user_id,
                name: user.name,
                email: user.email,
                role: if user_id == group.creator_id {
                    MemberRole::Organizer
                } else {
                    MemberRole::Participant
                },
                joined_at,
            })
        })?;

        info!(group_id = group.id, user_id, "Member added");
        Ok(member)
    }

    pub fn create_destination(&self, new: &NewDestination) -> Result<Destination> {
        let created_at = Utc::now();
        let id = self.write(|uow| {
            uow.conn().execute(
                "INSERT INTO destinations (group_id, name, location, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![new.group_id, new.name, new.location, new.description, created_at],
            )?;
            Ok(uow.last_insert_id())
        })?;
        Ok(Destination {
            id,
            group_id: new.group_id,
            name: new.name.clone(),
            location: new.location.clone(),
            description: new.description.clone(),
            created_at,
        })
    }

    pub fn list_destinations(&self, group_id: GroupId) -> Result<Vec<Destination>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, group_id, name, location, description, created_at
             FROM destinations WHERE group_id = ?1 ORDER BY name ASC, id ASC",
        )?;
        let destinations = stmt
            .query_map(params![group_id], |row| {
                Ok(Destination {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    name: row.get(2)?,
                    location: row.get(3)?,
                    description: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(destinations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CreateDestinationRequest;
    use crate::store::testing::*;
    use chrono::NaiveDate;

    #[test]
    fn test_create_group_records_creator_membership() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let trip = group(&store, &ana, "Lisbon");

        assert_eq!(count(&store, "travel_groups", ""), 1);
        assert_eq!(
            count(&store, "group_members", &format!("group_id = {} AND user_id = {}", trip.id, ana.id)),
            1
        );
        assert_eq!(trip.start_date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
    }

    #[test]
    fn test_create_group_is_atomic() {
        let store = test_store();
        let ana = user(&store, "Ana");
        fail_inserts(&store, "group_members", "1");

        let new = NewGroup::new(
            ana.id,
            "Lisbon",
            "",
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        )
        .unwrap();
        let err = store.create_group(&new).unwrap_err();

        assert!(matches!(err, TripError::Storage(_)));
        assert_eq!(count(&store, "travel_groups", ""), 0);
        assert_eq!(count(&store, "group_members", ""), 0);
    }

    #[test]
    fn test_authorize_creator_and_members_only() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let bia = user(&store, "Bia");
        let caio = user(&store, "Caio");
        let trip = group(&store, &ana, "Lisbon");
        store.add_member(&trip, bia.id).unwrap();

        let conn = store.connect().unwrap();
        assert_eq!(authorize_member(&conn, trip.id, ana.id).unwrap().id, trip.id);
        assert_eq!(authorize_member(&conn, trip.id, bia.id).unwrap().id, trip.id);
        assert!(matches!(authorize_member(&conn, trip.id, caio.id), Err(TripError::NotFound)));
        assert!(matches!(authorize_member(&conn, 999, ana.id), Err(TripError::NotFound)));
    }

    #[test]
    fn test_creator_without_membership_row_is_still_authorized() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let trip = group(&store, &ana, "Lisbon");
        let conn = store.connect().unwrap();
        conn.execute("DELETE FROM group_members", []).unwrap();

        assert!(authorize_member(&conn, trip.id, ana.id).is_ok());
    }

    #[test]
    fn test_add_member_conflict_and_unknown_user() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let bia = user(&store, "Bia");
        let trip = group(&store, &ana, "Lisbon");

        let member = store.add_member(&trip, bia.id).unwrap();
        assert_eq!(member.role, MemberRole::Participant);

        assert!(matches!(store.add_member(&trip, bia.id), Err(TripError::Conflict(_))));
        assert!(matches!(store.add_member(&trip, ana.id), Err(TripError::Conflict(_))));
        assert!(matches!(store.add_member(&trip, 404), Err(TripError::Validation(_))));
    }

    #[test]
    fn test_list_groups_and_members() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let bia = user(&store, "Bia");
        let zoe = user(&store, "Zoe");
        let lisbon = group(&store, &zoe, "Lisbon");
        group(&store, &ana, "Rome");
        store.add_member(&lisbon, bia.id).unwrap();

        let groups = store.list_groups_for_user(bia.id).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].creator_name, "Zoe");
        assert_eq!(groups[0].member_count, 2);

        let members = store.list_members(&lisbon).unwrap();
        assert_eq!(members[0].user_id, zoe.id);
        assert_eq!(members[0].role, MemberRole::Organizer);
        assert_eq!(members[1].name, "Bia");
    }

    #[test]
    fn test_destinations_are_group_scoped() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let lisbon = group(&store, &ana, "Lisbon");
        let rome = group(&store, &ana, "Rome");

        let req = CreateDestinationRequest {
            name: "Belem".into(),
            location: "Lisbon".into(),
            description: String::new(),
        };
        store
            .create_destination(&NewDestination::from_request(lisbon.id, req).unwrap())
            .unwrap();

        assert_eq!(store.list_destinations(lisbon.id).unwrap().len(), 1);
        assert!(store.list_destinations(rome.id).unwrap().is_empty());
    }
}
