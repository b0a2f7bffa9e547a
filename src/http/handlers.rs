//! Route handlers.
//!
//! Bodies arrive as raw bytes and are decoded inside the gated operation, after
//! membership has been checked.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::extract::Actor;
use crate::error::{Result, TripError};
use crate::gate::RequestGate;
use crate::model::{
    AddMemberRequest, CastVoteRequest, CreateDestinationRequest, CreateExpenseRequest,
    CreateGroupRequest, CreateVotingRequest, Destination, Expense, GroupId, GroupMember,
    GroupSummary, NewDestination, NewExpense, NewGroup, NewVoting, RegisterUserRequest,
    TravelGroup, UpdateProfileRequest, User, Vote, Voting, VotingId, VotingTally,
};

type Created<T> = (StatusCode, Json<T>);

/// Decode a JSON body; syntax errors are `BadRequest`, shape errors `Validation`.
fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| match e.classify() {
        serde_json::error::Category::Data => TripError::validation(e.to_string()),
        _ => TripError::BadRequest(e.to_string()),
    })
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_profile(State(gate): State<RequestGate>, Actor(user_id): Actor) -> Result<Json<User>> {
    let user = gate.unscoped(move |store| store.get_profile(user_id)).await?;
    Ok(Json(user))
}

pub async fn update_profile(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    body: Bytes,
) -> Result<Json<User>> {
    let user = gate
        .unscoped(move |store| {
            let req: UpdateProfileRequest = decode(&body)?;
            store.update_user_name(user_id, &req.name)
        })
        .await?;
    Ok(Json(user))
}

/// Open registration; no token is required.
pub async fn register_user(State(gate): State<RequestGate>, body: Bytes) -> Result<Created<User>> {
    let user = gate
        .unscoped(move |store| {
            let req: RegisterUserRequest = decode(&body)?;
            store.create_user(&req.name, &req.email)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_groups(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
) -> Result<Json<Vec<GroupSummary>>> {
    let groups = gate
        .unscoped(move |store| store.list_groups_for_user(user_id))
        .await?;
    Ok(Json(groups))
}

pub async fn create_group(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    body: Bytes,
) -> Result<Created<TravelGroup>> {
    let group = gate
        .unscoped(move |store| {
            let req: CreateGroupRequest = decode(&body)?;
            store.create_group(&NewGroup::from_request(user_id, req)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(group_id): Path<GroupId>,
) -> Result<Json<GroupSummary>> {
    let summary = gate
        .group_scoped(group_id, user_id, |store, group| store.group_summary(group.id))
        .await?;
    Ok(Json(summary))
}

pub async fn list_members(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Vec<GroupMember>>> {
    let members = gate
        .group_scoped(group_id, user_id, |store, group| store.list_members(group))
        .await?;
    Ok(Json(members))
}

pub async fn add_member(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(group_id): Path<GroupId>,
    body: Bytes,
) -> Result<Created<GroupMember>> {
    let member = gate
        .group_scoped(group_id, user_id, move |store, group| {
            let req: AddMemberRequest = decode(&body)?;
            store.add_member(group, req.user_id)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn list_destinations(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Vec<Destination>>> {
    let destinations = gate
        .group_scoped(group_id, user_id, |store, group| store.list_destinations(group.id))
        .await?;
    Ok(Json(destinations))
}

pub async fn create_destination(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(group_id): Path<GroupId>,
    body: Bytes,
) -> Result<Created<Destination>> {
    let destination = gate
        .group_scoped(group_id, user_id, move |store, group| {
            let req: CreateDestinationRequest = decode(&body)?;
            store.create_destination(&NewDestination::from_request(group.id, req)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(destination)))
}

pub async fn list_votings(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Vec<VotingTally>>> {
    let votings = gate
        .group_scoped(group_id, user_id, move |store, group| {
            store.list_votings(group, user_id)
        })
        .await?;
    Ok(Json(votings))
}

pub async fn create_voting(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(group_id): Path<GroupId>,
    body: Bytes,
) -> Result<Created<Voting>> {
    let voting = gate
        .group_scoped(group_id, user_id, move |store, group| {
            let req: CreateVotingRequest = decode(&body)?;
            store.create_voting(&NewVoting::from_request(group.id, req)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(voting)))
}

pub async fn cast_vote(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(voting_id): Path<VotingId>,
    body: Bytes,
) -> Result<Created<Vote>> {
    let vote = gate
        .voting_scoped(voting_id, user_id, move |store, _| {
            let req: CastVoteRequest = decode(&body)?;
            store.cast_vote(voting_id, user_id, &req.selected_option)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

pub async fn list_expenses(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(group_id): Path<GroupId>,
) -> Result<Json<Vec<Expense>>> {
    let expenses = gate
        .group_scoped(group_id, user_id, |store, group| store.list_expenses(group))
        .await?;
    Ok(Json(expenses))
}

/// The payer is always the actor; a `payer_id` in the body is ignored.
pub async fn create_expense(
    State(gate): State<RequestGate>,
    Actor(user_id): Actor,
    Path(group_id): Path<GroupId>,
    body: Bytes,
) -> Result<Created<Expense>> {
    let expense = gate
        .group_scoped(group_id, user_id, move |store, group| {
            let req: CreateExpenseRequest = decode(&body)?;
            store.create_expense(&NewExpense::from_request(group.id, user_id, req)?)
        })
        .await?;
    Ok((StatusCode::CREATED, Json(expense)))
}
