//! Per-lead comment log and the lead-state synchronizer.
//!
//! A comment may carry a status, meaning "this comment moved the lead to X".
//! The owning lead's `status`/`schedule_time` always mirror the most recent
//! non-deleted status-bearing comment; both directions of that invariant are
//! maintained here, inside one transaction per mutation.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use log::error;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::resolve_actor;
use crate::leads::{normalized, visible_lead, LeadListQuery};
use crate::scope::{record_scope, RecordScope, ScopeParams};
use crate::shared::errors::ApiError;
use crate::shared::models::{is_valid_status, Comment, ListResponse, Role, STATUS_NEW, STATUS_SCHEDULED};
use crate::shared::schema::{comments, leads};
use crate::shared::state::AppState;

pub const COMMENT_PAGE_SIZE: i64 = 50;

type BoxedCommentQuery = comments::BoxedQuery<'static, Pg>;

// ============================================================================
// Synchronizer core
// ============================================================================

/// Status a lead reverts to after a comment deletion, given the status of the
/// most recent remaining status-bearing comment.
///
/// A prior `Scheduled` comment does not retain its schedule time, so the lead
/// falls back to `New` rather than becoming `Scheduled` with no time.
pub fn revert_status(latest_remaining: Option<&str>) -> &'static str {
    match latest_remaining {
        None => STATUS_NEW,
        Some(s) if s == STATUS_SCHEDULED => STATUS_NEW,
        Some(s) => crate::shared::models::LEAD_STATUSES
            .iter()
            .copied()
            .find(|known| *known == s)
            .unwrap_or(STATUS_NEW),
    }
}

/// Cosmetic marker appended when a schedule time exists but the caller did not
/// annotate the text themselves. Never feeds back into `schedule_time`.
pub fn annotate_comment(text: String, scheduled: bool) -> String {
    if scheduled && !text.contains("(Scheduled") {
        format!("{text} (Scheduled)")
    } else {
        text
    }
}

fn sync_lead_from_comment(
    conn: &mut PgConnection,
    lead_id: Uuid,
    status: &str,
    schedule_time: Option<DateTime<Utc>>,
) -> QueryResult<usize> {
    diesel::update(leads::table.filter(leads::id.eq(lead_id))).set((
        leads::status.eq(status),
        leads::schedule_time.eq(schedule_time),
        leads::updated_at.eq(Utc::now()),
    ))
    .execute(conn)
}

fn latest_status_comment(conn: &mut PgConnection, lead: Uuid) -> QueryResult<Option<Comment>> {
    comments::table
        .filter(comments::lead_id.eq(lead))
        .filter(comments::is_deleted.eq(false))
        .filter(comments::status.is_not_null())
        .order(comments::created_at.desc())
        .first(conn)
        .optional()
}

// ============================================================================
// Scope lowering
// ============================================================================

fn visible_comments(scope: &RecordScope) -> BoxedCommentQuery {
    let q = comments::table
        .into_boxed()
        .filter(comments::is_deleted.eq(false));
    match scope {
        RecordScope::Unrestricted => q,
        RecordScope::CreatedByAnyOf(ids) => q.filter(comments::created_by.eq_any(ids.clone())),
        // Comments carry no assignment column; "mine or assigned" reduces to
        // the comments the actor authored.
        RecordScope::MineOrAssigned(actor) | RecordScope::CreatedBy(actor) => {
            q.filter(comments::created_by.eq(*actor))
        }
        RecordScope::AssignedTo(_) | RecordScope::Deny => q
            .filter(comments::id.eq(Uuid::nil()))
            .filter(comments::id.ne(Uuid::nil())),
    }
}

fn apply_search(q: BoxedCommentQuery, term: &str) -> BoxedCommentQuery {
    let pattern = format!("%{}%", term.trim());
    let text_match = comments::comment_text
        .ilike(pattern.clone())
        .or(comments::created_by_email.ilike(pattern.clone()))
        .or(comments::status.ilike(pattern));
    match crate::leads::parse_uuid_term(term) {
        Some(id) => q.filter(text_match.or(comments::id.eq(id)).or(comments::lead_id.eq(id))),
        None => q.filter(text_match),
    }
}

/// Scoped comment count for the insight panels.
pub fn count_comments(conn: &mut PgConnection, scope: &RecordScope) -> i64 {
    if scope.is_deny() {
        return 0;
    }
    match visible_comments(scope).count().get_result(conn) {
        Ok(n) => n,
        Err(e) => {
            error!("Comment count failed: {e}");
            0
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub comment_text: String,
    pub status: Option<String>,
    pub schedule_time: Option<DateTime<Utc>>,
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let text = normalized(Some(req.comment_text))
        .ok_or_else(|| ApiError::Validation("Field 'comment_text' is required.".to_string()))?;
    let status = normalized(req.status);
    if let Some(s) = &status {
        if !is_valid_status(s) {
            return Err(ApiError::Validation(format!("Unknown status '{s}'.")));
        }
    }
    let schedule_time = match status.as_deref() {
        Some(STATUS_SCHEDULED) => Some(req.schedule_time.ok_or_else(|| {
            ApiError::Validation("A schedule time is required for status 'Scheduled'.".to_string())
        })?),
        _ => None,
    };

    let comment = conn.transaction::<Comment, ApiError, _>(|conn| {
        let (lead, _) = visible_lead(conn, &actor, lead_id)?;
        let comment = Comment {
            id: Uuid::new_v4(),
            lead_id: lead.id,
            comment_text: annotate_comment(text, schedule_time.is_some()),
            status: status.clone(),
            created_by: actor.id,
            created_by_email: actor.email.clone(),
            created_at: Utc::now(),
            is_deleted: false,
        };
        diesel::insert_into(comments::table)
            .values(&comment)
            .execute(conn)?;
        if let Some(s) = &status {
            sync_lead_from_comment(conn, lead.id, s, schedule_time)?;
        }
        Ok(comment)
    })?;

    Ok(Json(comment))
}

pub async fn list_lead_comments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(lead_id): Path<Uuid>,
    Query(params): Query<LeadListQuery>,
) -> Result<Json<ListResponse<Comment>>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;
    visible_lead(&mut conn, &actor, lead_id)?;

    let page = params.page.unwrap_or(1);
    let mut load = || -> QueryResult<(Vec<Comment>, i64)> {
        let base = || {
            comments::table
                .into_boxed()
                .filter(comments::lead_id.eq(lead_id))
                .filter(comments::is_deleted.eq(false))
        };
        let items = base()
            .order(comments::created_at.desc())
            .limit(COMMENT_PAGE_SIZE)
            .offset(crate::shared::utils::page_offset(page, COMMENT_PAGE_SIZE))
            .load(&mut conn)?;
        let count = base().count().get_result(&mut conn)?;
        Ok((items, count))
    };
    match load() {
        Ok((items, count)) => Ok(Json(ListResponse { items, count })),
        Err(e) => {
            error!("Comment query failed for lead {lead_id}: {e}");
            Ok(Json(ListResponse::empty()))
        }
    }
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LeadListQuery>,
) -> Result<Json<ListResponse<Comment>>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let scope = match record_scope(&mut conn, &actor, &params.scope_params()) {
        Ok(scope) => scope,
        Err(e) => {
            error!("Comment scope resolution failed: {e}");
            return Ok(Json(ListResponse::empty()));
        }
    };
    if scope.is_deny() {
        return Ok(Json(ListResponse::empty()));
    }

    let page = params.page.unwrap_or(1);
    let mut load = || -> QueryResult<(Vec<Comment>, i64)> {
        let base = || {
            let mut q = visible_comments(&scope);
            if let Some(term) = params.query.as_deref() {
                q = apply_search(q, term);
            }
            q
        };
        let items = base()
            .order(comments::created_at.desc())
            .limit(COMMENT_PAGE_SIZE)
            .offset(crate::shared::utils::page_offset(page, COMMENT_PAGE_SIZE))
            .load(&mut conn)?;
        let count = base().count().get_result(&mut conn)?;
        Ok((items, count))
    };
    match load() {
        Ok((items, count)) => Ok(Json(ListResponse { items, count })),
        Err(e) => {
            error!("Comment query failed: {e}");
            Ok(Json(ListResponse::empty()))
        }
    }
}

pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    conn.transaction::<_, ApiError, _>(|conn| {
        let comment: Comment = comments::table
            .filter(comments::id.eq(id))
            .filter(comments::is_deleted.eq(false))
            .first(conn)
            .optional()?
            .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

        let scope = record_scope(conn, &actor, &ScopeParams::default())?;
        if !scope.allows(comment.created_by, None) {
            return Err(ApiError::NotFound("Comment not found".to_string()));
        }
        if actor.role == Role::User && comment.created_by != actor.id {
            return Err(ApiError::Forbidden(
                "You can only delete comments created by you".to_string(),
            ));
        }

        diesel::update(comments::table.filter(comments::id.eq(id)))
            .set(comments::is_deleted.eq(true))
            .execute(conn)?;

        let latest = latest_status_comment(conn, comment.lead_id)?;
        let next = revert_status(latest.as_ref().and_then(|c| c.status.as_deref()));
        sync_lead_from_comment(conn, comment.lead_id, next, None)?;
        Ok(())
    })?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{STATUS_CONTACTED, STATUS_IN_CONVERSATION, STATUS_PO};

    #[test]
    fn no_remaining_comment_reverts_to_new() {
        assert_eq!(revert_status(None), STATUS_NEW);
    }

    #[test]
    fn latest_remaining_status_wins() {
        assert_eq!(revert_status(Some(STATUS_CONTACTED)), STATUS_CONTACTED);
        assert_eq!(
            revert_status(Some(STATUS_IN_CONVERSATION)),
            STATUS_IN_CONVERSATION
        );
        assert_eq!(revert_status(Some(STATUS_PO)), STATUS_PO);
    }

    #[test]
    fn unrecoverable_scheduled_reverts_to_new() {
        // The deleted comment's schedule time only existed as free text, so
        // Scheduled cannot be resurrected without violating the
        // status/schedule_time invariant.
        assert_eq!(revert_status(Some(STATUS_SCHEDULED)), STATUS_NEW);
    }

    #[test]
    fn unknown_remaining_status_falls_back_to_new() {
        assert_eq!(revert_status(Some("Archived")), STATUS_NEW);
    }

    #[test]
    fn generic_marker_added_when_caller_did_not_annotate() {
        assert_eq!(
            annotate_comment("Call back tomorrow".to_string(), true),
            "Call back tomorrow (Scheduled)"
        );
    }

    #[test]
    fn caller_annotation_is_preserved() {
        let text = "Call back (Scheduled: 3 Mar, 10:00)".to_string();
        assert_eq!(annotate_comment(text.clone(), true), text);
    }

    #[test]
    fn unscheduled_comments_are_untouched() {
        assert_eq!(
            annotate_comment("Spoke briefly".to_string(), false),
            "Spoke briefly"
        );
    }
}
