//! Group membership checks.

use crate::error::Result;
use crate::model::{GroupId, TravelGroup, UserId};
use crate::store::{self, Store};

/// Decides whether a user may see a group.
///
/// Implementations are synchronous; the gate calls them from a blocking task
/// together with the operation they guard.
pub trait MembershipOracle: Send + Sync {
    /// Load `group_id` if `user_id` is its creator or a member.
    ///
    /// Any other outcome, including a group that does not exist, is
    /// `TripError::NotFound`.
    fn authorize(&self, group_id: GroupId, user_id: UserId) -> Result<TravelGroup>;
}

impl MembershipOracle for Store {
    fn authorize(&self, group_id: GroupId, user_id: UserId) -> Result<TravelGroup> {
        let conn = self.connect()?;
        store::authorize_member(&conn, group_id, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TripError;
    use crate::store::testing::*;

    #[test]
    fn test_non_member_and_missing_group_are_indistinguishable() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let outsider = user(&store, "Out");
        let trip = group(&store, &ana, "Lisbon");

        let hidden = store.authorize(trip.id, outsider.id).unwrap_err();
        let missing = store.authorize(trip.id + 100, outsider.id).unwrap_err();

        assert!(matches!(hidden, TripError::NotFound));
        assert!(matches!(missing, TripError::NotFound));
        assert_eq!(hidden.to_string(), missing.to_string());
    }

    #[test]
    fn test_added_member_is_authorized() {
        let store = test_store();
        let ana = user(&store, "Ana");
        let bia = user(&store, "Bia");
        let trip = group(&store, &ana, "Lisbon");

        assert!(store.authorize(trip.id, bia.id).is_err());
        store.add_member(&trip, bia.id).unwrap();
        assert_eq!(store.authorize(trip.id, bia.id).unwrap().id, trip.id);
    }
}
