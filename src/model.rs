//! Domain records and validated inputs.
//!
//! Request payloads deserialize into the `*Request` types; converting one into
//! its `New*` counterpart is where field rules are checked. Identity fields
//! (creator, payer) never come from a payload.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TripError};

pub type UserId = i64;
pub type GroupId = i64;
pub type ExpenseId = i64;
pub type VotingId = i64;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelGroup {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub creator_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// A group as shown in listings and on its detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: TravelGroup,
    pub creator_name: String,
    pub member_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Organizer,
    Participant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: i64,
    pub group_id: GroupId,
    pub name: String,
    pub location: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub description: String,
    pub amount: f64,
    pub payer_id: UserId,
    pub participant_ids: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voting {
    pub id: VotingId,
    pub group_id: GroupId,
    pub question: String,
    pub options: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub voting_id: VotingId,
    pub user_id: UserId,
    pub selected_option: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTally {
    pub option: String,
    pub votes: i64,
}

/// Read-side aggregation of one poll for a particular viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingTally {
    #[serde(flatten)]
    pub voting: Voting,
    pub total_votes: i64,
    pub tallies: Vec<OptionTally>,
    /// The viewer's own selection, if they voted
    pub user_vote: Option<String>,
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDestinationRequest {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
}

/// Expense payload. There is deliberately no payer field.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateExpenseRequest {
    pub description: String,
    pub amount: f64,
    pub participant_ids: Vec<UserId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVotingRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CastVoteRequest {
    pub selected_option: String,
}

// ---------------------------------------------------------------------------
// Validated inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub creator_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl NewGroup {
    pub fn new(
        creator_id: UserId,
        name: &str,
        description: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self> {
        let name = non_empty(name, "name")?;
        if start_date > end_date {
            return Err(TripError::validation("start_date must not be after end_date"));
        }
        Ok(Self {
            name,
            description: description.trim().to_string(),
            creator_id,
            start_date,
            end_date,
        })
    }

    pub fn from_request(creator_id: UserId, req: CreateGroupRequest) -> Result<Self> {
        let start = parse_date(&req.start_date, "start_date")?;
        let end = parse_date(&req.end_date, "end_date")?;
        Self::new(creator_id, &req.name, &req.description, start, end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewDestination {
    pub group_id: GroupId,
    pub name: String,
    pub location: String,
    pub description: String,
}

impl NewDestination {
    pub fn from_request(group_id: GroupId, req: CreateDestinationRequest) -> Result<Self> {
        Ok(Self {
            group_id,
            name: non_empty(&req.name, "name")?,
            location: req.location.trim().to_string(),
            description: req.description.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub group_id: GroupId,
    pub description: String,
    pub amount: f64,
    pub payer_id: UserId,
    pub participant_ids: Vec<UserId>,
}

impl NewExpense {
    /// Build an expense paid by `payer_id`, which must be the authenticated actor.
    pub fn new(
        group_id: GroupId,
        payer_id: UserId,
        description: &str,
        amount: f64,
        participant_ids: &[UserId],
    ) -> Result<Self> {
        let description = non_empty(description, "description")?;
        if !(amount.is_finite() && amount > 0.0) {
            return Err(TripError::validation("amount must be a positive number"));
        }

        let mut seen = HashSet::new();
        let participant_ids: Vec<UserId> = participant_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if participant_ids.is_empty() {
            return Err(TripError::validation("at least one participant is required"));
        }

        Ok(Self {
            group_id,
            description,
            amount,
            payer_id,
            participant_ids,
        })
    }

    pub fn from_request(group_id: GroupId, payer_id: UserId, req: CreateExpenseRequest) -> Result<Self> {
        Self::new(group_id, payer_id, &req.description, req.amount, &req.participant_ids)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVoting {
    pub group_id: GroupId,
    pub question: String,
    pub options: Vec<String>,
}

impl NewVoting {
    pub fn new(group_id: GroupId, question: &str, options: &[String]) -> Result<Self> {
        let question = non_empty(question, "question")?;

        let mut seen = HashSet::new();
        let mut cleaned = Vec::with_capacity(options.len());
        for option in options {
            let option = non_empty(option, "option")?;
            if !seen.insert(option.clone()) {
                return Err(TripError::validation(format!("duplicate option '{}'", option)));
            }
            cleaned.push(option);
        }
        if cleaned.len() < 2 {
            return Err(TripError::validation("a voting needs at least two options"));
        }

        Ok(Self {
            group_id,
            question,
            options: cleaned,
        })
    }

    pub fn from_request(group_id: GroupId, req: CreateVotingRequest) -> Result<Self> {
        Self::new(group_id, &req.question, &req.options)
    }
}

fn non_empty(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TripError::validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| TripError::validation(format!("{} must be a YYYY-MM-DD date", field)))
}
