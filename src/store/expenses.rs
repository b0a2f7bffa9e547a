//! Expenses and their participant sets.

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::params;
use tracing::info;

use super::groups::is_member;
use super::Store;
use crate::error::{Result, TripError};
use crate::model::{Expense, ExpenseId, NewExpense, TravelGroup, UserId};

impl Store {
    /// Insert an expense and one row per participant as a single unit.
    ///
    /// Participants must already belong to the group; this is checked inside
    /// the unit before anything is written.
    pub fn create_expense(&self, new: &NewExpense) -> Result<Expense> {
        let expense = self.write(|uow| {
            for &user_id in &new.participant_ids {
                if !is_member(uow.conn(), new.group_id, user_id)? {
                    return Err(TripError::validation(format!(
                        "participant {} is not a member of the group",
                        user_id
                    )));
                }
            }

            let created_at = Utc::now();
            uow.conn().execute(
                "INSERT INTO expenses (group_id, description, amount, payer_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![new.group_id, new.description, new.amount, new.payer_id, created_at],
            )?;
            let expense_id = uow.last_insert_id();

            let mut stmt = uow
                .conn()
                .prepare("INSERT INTO expense_participants (expense_id, user_id) VALUES (?1, ?2)")?;
            for &user_id in &new.participant_ids {
                stmt.execute(params![expense_id, user_id])?;
            }

            Ok(Expense {
                id: expense_id,
                group_id: new.group_id,
                description: new.description.clone(),
                amount: new.amount,
                payer_id: new.payer_id,
                participant_ids: new.participant_ids.clone(),
                created_at,
            })
        })?;

        info!(
            expense_id = expense.id,
            group_id = expense.group_id,
            participants = expense.participant_ids.len(),
            "Expense created"
        );
        Ok(expense)
    }

    /// Expenses of an authorized group, newest first.
    pub fn list_expenses(&self, group: &TravelGroup) -> Result<Vec<Expense>> {
        let group_id = group.id;
        let conn = self.connect()?;

        let mut participants: HashMap<ExpenseId, Vec<UserId>> = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT p.expense_id, p.user_id
             FROM expense_participants p
             JOIN expenses e ON e.id = p.expense_id
             WHERE e.group_id = ?1
             ORDER BY p.user_id ASC",
        )?;
        let rows = stmt.query_map(params![group_id], |row| {
            Ok((row.get::<_, ExpenseId>(0)?, row.get::<_, UserId>(1)?))
        })?;
        for row in rows {
            let (expense_id, user_id) = row?;
            participants.entry(expense_id).or_default().push(user_id);
        }

        let mut stmt = conn.prepare(
            "SELECT id, group_id, description, amount, payer_id, created_at
             FROM expenses WHERE group_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let expenses = stmt
            .query_map(params![group_id], |row| {
                let id: ExpenseId = row.get(0)?;
                Ok(Expense {
                    id,
                    group_id: row.get(1)?,
                    description: row.get(2)?,
                    amount: row.get(3)?,
                    payer_id: row.get(4)?,
                    participant_ids: participants.remove(&id).unwrap_or_default(),
                    created_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(expenses)
    }
}
