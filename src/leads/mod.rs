use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use log::error;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{resolve_actor, ActorContext};
use crate::shared::errors::{unique_violation_field, ApiError};
use crate::shared::models::{
    is_valid_status, Lead, ListResponse, Role, STATUS_NEW, STATUS_SCHEDULED,
};
use crate::shared::schema::{leads, profiles};
use crate::shared::state::AppState;
use crate::scope::{record_scope, RecordScope, ScopeParams};

pub const LEAD_PAGE_SIZE: i64 = 50;

type BoxedLeadQuery = leads::BoxedQuery<'static, Pg>;

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LeadListQuery {
    pub page: Option<i64>,
    pub query: Option<String>,
    pub status: Option<String>,
    pub filter: Option<String>,
    pub scope: Option<String>,
    pub mine_only: Option<bool>,
    pub assigned_only: Option<bool>,
    pub company_id: Option<Uuid>,
}

impl LeadListQuery {
    pub fn scope_params(&self) -> ScopeParams {
        ScopeParams {
            scope: self.scope.clone(),
            mine_only: self.mine_only,
            assigned_only: self.assigned_only,
            company_id: self.company_id,
        }
    }
}

/// Date-range shortcut keywords accepted by the list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateShortcut {
    NewToday,
    Today,
    Overdue,
    Upcoming,
}

impl DateShortcut {
    pub fn parse(keyword: &str) -> Option<Self> {
        match keyword {
            "new_today" => Some(DateShortcut::NewToday),
            "today" => Some(DateShortcut::Today),
            "overdue" => Some(DateShortcut::Overdue),
            "upcoming" => Some(DateShortcut::Upcoming),
            _ => None,
        }
    }
}

/// UTC day window containing `now`: `[00:00 today, 00:00 tomorrow)`.
pub fn day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = DateTime::from_naive_utc_and_offset(now.date_naive().and_time(NaiveTime::MIN), Utc);
    (start, start + Duration::days(1))
}

/// A search term that parses as a UUID is additionally matched against `id`.
pub fn parse_uuid_term(term: &str) -> Option<Uuid> {
    Uuid::parse_str(term.trim()).ok()
}

// ============================================================================
// Validation
// ============================================================================

/// Empty and whitespace-only form values count as absent.
pub fn normalized(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn valid_phone(value: &str) -> bool {
    value.len() == 10 && value.chars().all(|c| c.is_ascii_digit())
}

/// At least one contact method, and phone fields must be exactly 10 digits.
pub fn validate_contact_fields(
    phone: Option<&str>,
    secondary_phone: Option<&str>,
    email: Option<&str>,
) -> Result<(), ApiError> {
    if phone.is_none() && secondary_phone.is_none() && email.is_none() {
        return Err(ApiError::Validation(
            "At least one of phone, email or secondary phone is required.".to_string(),
        ));
    }
    if let Some(p) = phone {
        if !valid_phone(p) {
            return Err(ApiError::Validation(
                "Field 'phone' must be exactly 10 digits.".to_string(),
            ));
        }
    }
    if let Some(p) = secondary_phone {
        if !valid_phone(p) {
            return Err(ApiError::Validation(
                "Field 'secondary_phone' must be exactly 10 digits.".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_status(status: &str) -> Result<(), ApiError> {
    if is_valid_status(status) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("Unknown status '{status}'.")))
    }
}

/// `schedule_time` is non-null iff the status is `Scheduled`.
pub fn normalize_schedule(
    status: &str,
    submitted: Option<DateTime<Utc>>,
    existing: Option<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    if status == STATUS_SCHEDULED {
        submitted.or(existing).map(Some).ok_or_else(|| {
            ApiError::Validation("A schedule time is required for status 'Scheduled'.".to_string())
        })
    } else {
        Ok(None)
    }
}

fn lead_write_error(e: diesel::result::Error) -> ApiError {
    match unique_violation_field(&e) {
        Some("phone") => {
            ApiError::Conflict("A lead with this phone number already exists.".to_string())
        }
        Some("email") => ApiError::Conflict("A lead with this email already exists.".to_string()),
        Some(_) => ApiError::Conflict("Lead already exists.".to_string()),
        None => e.into(),
    }
}

// ============================================================================
// Scope lowering and filter composition
// ============================================================================

/// Base query: non-deleted rows restricted to the given scope.
pub fn visible_leads(scope: &RecordScope) -> BoxedLeadQuery {
    let q = leads::table
        .into_boxed()
        .filter(leads::is_deleted.eq(false));
    match scope {
        RecordScope::Unrestricted => q,
        RecordScope::CreatedByAnyOf(ids) => q.filter(leads::created_by.eq_any(ids.clone())),
        RecordScope::MineOrAssigned(actor) => q.filter(
            leads::created_by
                .eq(*actor)
                .or(leads::assigned_to.eq(*actor)),
        ),
        RecordScope::CreatedBy(actor) => q.filter(leads::created_by.eq(*actor)),
        RecordScope::AssignedTo(actor) => q.filter(leads::assigned_to.eq(*actor)),
        // Contradiction: selects zero rows even if a caller forgets to
        // short-circuit on Deny.
        RecordScope::Deny => q
            .filter(leads::id.eq(Uuid::nil()))
            .filter(leads::id.ne(Uuid::nil())),
    }
}

fn apply_shortcut(q: BoxedLeadQuery, shortcut: DateShortcut, now: DateTime<Utc>) -> BoxedLeadQuery {
    let (start, end) = day_bounds(now);
    match shortcut {
        DateShortcut::NewToday => q
            .filter(leads::created_at.ge(start))
            .filter(leads::created_at.lt(end)),
        DateShortcut::Today => q
            .filter(leads::schedule_time.ge(start))
            .filter(leads::schedule_time.lt(end)),
        // schedule_time is only ever set on Scheduled leads, so no extra
        // status filter is needed here.
        DateShortcut::Overdue => q.filter(leads::schedule_time.lt(now)),
        DateShortcut::Upcoming => q.filter(leads::schedule_time.gt(now)),
    }
}

fn apply_search(q: BoxedLeadQuery, term: &str) -> BoxedLeadQuery {
    let pattern = format!("%{}%", term.trim());
    let text_match = leads::lead_name
        .ilike(pattern.clone())
        .or(leads::email.ilike(pattern.clone()))
        .or(leads::phone.ilike(pattern.clone()))
        .or(leads::secondary_phone.ilike(pattern.clone()))
        .or(leads::status.ilike(pattern));
    match parse_uuid_term(term) {
        Some(id) => q.filter(text_match.or(leads::id.eq(id))),
        None => q.filter(text_match),
    }
}

struct LeadFilters<'a> {
    status: Option<&'a str>,
    shortcut: Option<DateShortcut>,
    search: Option<&'a str>,
    page: i64,
}

fn run_lead_query(
    conn: &mut PgConnection,
    scope: &RecordScope,
    filters: &LeadFilters<'_>,
    now: DateTime<Utc>,
) -> QueryResult<(Vec<Lead>, i64)> {
    let build = || {
        let mut q = visible_leads(scope);
        if let Some(status) = filters.status {
            q = q.filter(leads::status.eq(status.to_string()));
        }
        if let Some(shortcut) = filters.shortcut {
            q = apply_shortcut(q, shortcut, now);
        }
        if let Some(term) = filters.search {
            q = apply_search(q, term);
        }
        q
    };

    // The Scheduled view sorts soonest-first; everything else newest-first.
    let ordered = if filters.status == Some(STATUS_SCHEDULED) {
        build().order(leads::schedule_time.asc())
    } else {
        build().order(leads::created_at.desc())
    };

    let items = ordered
        .limit(LEAD_PAGE_SIZE)
        .offset(crate::shared::utils::page_offset(
            filters.page,
            LEAD_PAGE_SIZE,
        ))
        .load::<Lead>(conn)?;
    let count = build().count().get_result(conn)?;
    Ok((items, count))
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub lead_name: String,
    pub phone: Option<String>,
    pub secondary_phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub note: Option<String>,
    pub status: Option<String>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    pub lead_name: Option<String>,
    pub phone: Option<String>,
    pub secondary_phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub note: Option<String>,
    pub status: Option<String>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub assigned_to: Option<Uuid>,
}

fn assignee(
    conn: &mut PgConnection,
    actor: &ActorContext,
    requested: Option<Uuid>,
) -> Result<(Uuid, String), ApiError> {
    // Assignment defaults to self; only elevated roles may point it elsewhere.
    match requested {
        Some(id) if actor.is_elevated() && id != actor.id => {
            let (pid, email): (Uuid, String) = profiles::table
                .filter(profiles::id.eq(id))
                .select((profiles::id, profiles::email))
                .first(conn)
                .optional()?
                .ok_or_else(|| ApiError::Validation("Assignee not found.".to_string()))?;
            Ok((pid, email))
        }
        _ => Ok((actor.id, actor.email.clone())),
    }
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateLeadRequest>,
) -> Result<Json<Lead>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let lead_name = normalized(Some(req.lead_name))
        .ok_or_else(|| ApiError::Validation("Field 'lead_name' is required.".to_string()))?;
    let phone = normalized(req.phone);
    let secondary_phone = normalized(req.secondary_phone);
    let email = normalized(req.email);
    validate_contact_fields(phone.as_deref(), secondary_phone.as_deref(), email.as_deref())?;

    let status = req.status.unwrap_or_else(|| STATUS_NEW.to_string());
    validate_status(&status)?;
    let schedule_time = normalize_schedule(&status, req.schedule_time, None)?;

    let (assigned_to, assigned_to_email) = assignee(&mut conn, &actor, req.assigned_to)?;
    let now = Utc::now();
    let lead = Lead {
        id: Uuid::new_v4(),
        lead_name,
        phone,
        secondary_phone,
        email,
        location: normalized(req.location),
        note: normalized(req.note),
        status,
        schedule_time,
        created_by: actor.id,
        created_by_email: actor.email.clone(),
        assigned_to: Some(assigned_to),
        assigned_to_email: Some(assigned_to_email),
        created_at: now,
        updated_at: now,
        is_deleted: false,
    };

    diesel::insert_into(leads::table)
        .values(&lead)
        .execute(&mut conn)
        .map_err(lead_write_error)?;

    Ok(Json(lead))
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LeadListQuery>,
) -> Result<Json<ListResponse<Lead>>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    list_leads_inner(&state, &actor, &params, params.status.as_deref())
}

/// Scheduled view: forced `status=Scheduled`, ascending `schedule_time`.
pub async fn list_scheduled_leads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LeadListQuery>,
) -> Result<Json<ListResponse<Lead>>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    list_leads_inner(&state, &actor, &params, Some(STATUS_SCHEDULED))
}

fn list_leads_inner(
    state: &AppState,
    actor: &ActorContext,
    params: &LeadListQuery,
    status: Option<&str>,
) -> Result<Json<ListResponse<Lead>>, ApiError> {
    let mut conn = state.conn.get()?;
    let scope = match record_scope(&mut conn, actor, &params.scope_params()) {
        Ok(scope) => scope,
        Err(e) => {
            error!("Lead scope resolution failed: {e}");
            return Ok(Json(ListResponse::empty()));
        }
    };
    if scope.is_deny() {
        return Ok(Json(ListResponse::empty()));
    }

    let filters = LeadFilters {
        status,
        shortcut: params.filter.as_deref().and_then(DateShortcut::parse),
        search: params.query.as_deref(),
        page: params.page.unwrap_or(1),
    };
    match run_lead_query(&mut conn, &scope, &filters, Utc::now()) {
        Ok((items, count)) => Ok(Json(ListResponse { items, count })),
        Err(e) => {
            error!("Lead query failed: {e}");
            Ok(Json(ListResponse::empty()))
        }
    }
}

pub(crate) fn visible_lead(
    conn: &mut PgConnection,
    actor: &ActorContext,
    id: Uuid,
) -> Result<(Lead, RecordScope), ApiError> {
    let scope = record_scope(conn, actor, &ScopeParams::default())?;
    let lead: Lead = leads::table
        .filter(leads::id.eq(id))
        .filter(leads::is_deleted.eq(false))
        .first(conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Lead not found".to_string()))?;
    if !scope.allows(lead.created_by, lead.assigned_to) {
        return Err(ApiError::NotFound("Lead not found".to_string()));
    }
    Ok((lead, scope))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;
    let (lead, _) = visible_lead(&mut conn, &actor, id)?;
    Ok(Json(lead))
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLeadRequest>,
) -> Result<Json<Lead>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;
    let (mut lead, _) = visible_lead(&mut conn, &actor, id)?;

    if let Some(name) = normalized(req.lead_name) {
        lead.lead_name = name;
    }
    if req.phone.is_some() {
        lead.phone = normalized(req.phone);
    }
    if req.secondary_phone.is_some() {
        lead.secondary_phone = normalized(req.secondary_phone);
    }
    if req.email.is_some() {
        lead.email = normalized(req.email);
    }
    if req.location.is_some() {
        lead.location = normalized(req.location);
    }
    if req.note.is_some() {
        lead.note = normalized(req.note);
    }
    validate_contact_fields(
        lead.phone.as_deref(),
        lead.secondary_phone.as_deref(),
        lead.email.as_deref(),
    )?;

    if let Some(status) = req.status {
        validate_status(&status)?;
        // Direct edits never leave a schedule time behind on a
        // non-Scheduled lead.
        lead.schedule_time = normalize_schedule(&status, req.schedule_time, lead.schedule_time)?;
        lead.status = status;
    } else if req.schedule_time.is_some() {
        lead.schedule_time = normalize_schedule(&lead.status, req.schedule_time, None)?;
    }

    if req.assigned_to.is_some() {
        let (assigned_to, assigned_to_email) = assignee(&mut conn, &actor, req.assigned_to)?;
        lead.assigned_to = Some(assigned_to);
        lead.assigned_to_email = Some(assigned_to_email);
    }

    lead.updated_at = Utc::now();
    diesel::update(leads::table.filter(leads::id.eq(id)))
        .set(&lead)
        .execute(&mut conn)
        .map_err(lead_write_error)?;

    Ok(Json(lead))
}

pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;
    let (lead, _) = visible_lead(&mut conn, &actor, id)?;

    if actor.role == Role::User && lead.created_by != actor.id {
        return Err(ApiError::Forbidden(
            "You can only delete leads created by you".to_string(),
        ));
    }

    diesel::update(leads::table.filter(leads::id.eq(id)))
        .set((leads::is_deleted.eq(true), leads::updated_at.eq(Utc::now())))
        .execute(&mut conn)?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lead(created_by: Uuid, assigned_to: Option<Uuid>) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            lead_name: "Acme Rooftop".to_string(),
            phone: Some("9876543210".to_string()),
            secondary_phone: None,
            email: None,
            location: None,
            note: None,
            status: STATUS_NEW.to_string(),
            schedule_time: None,
            created_by,
            created_by_email: "owner@example.com".to_string(),
            assigned_to,
            assigned_to_email: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }

    #[test]
    fn contact_method_is_required() {
        let err = validate_contact_fields(None, None, None).unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn five_digit_phone_is_rejected() {
        let err = validate_contact_fields(Some("12345"), None, None).unwrap_err();
        assert!(err.to_string().contains("10 digits"));
    }

    #[test]
    fn ten_digit_phone_is_accepted() {
        assert!(validate_contact_fields(Some("1234567890"), None, None).is_ok());
    }

    #[test]
    fn non_numeric_phone_is_rejected() {
        assert!(validate_contact_fields(Some("12345abcde"), None, None).is_err());
        assert!(validate_contact_fields(None, Some("123-456-78"), None).is_err());
    }

    #[test]
    fn email_alone_is_a_valid_contact() {
        assert!(validate_contact_fields(None, None, Some("x@y.com")).is_ok());
    }

    #[test]
    fn schedule_forced_null_unless_scheduled() {
        let t = Utc::now();
        assert_eq!(normalize_schedule("Contacted", Some(t), None).unwrap(), None);
        assert_eq!(normalize_schedule(STATUS_SCHEDULED, Some(t), None).unwrap(), Some(t));
    }

    #[test]
    fn scheduled_without_time_is_rejected() {
        assert!(normalize_schedule(STATUS_SCHEDULED, None, None).is_err());
    }

    #[test]
    fn scheduled_edit_keeps_existing_time() {
        let t = Utc::now();
        assert_eq!(
            normalize_schedule(STATUS_SCHEDULED, None, Some(t)).unwrap(),
            Some(t)
        );
    }

    #[test]
    fn normalization_drops_blank_values() {
        assert_eq!(normalized(Some("  ".to_string())), None);
        assert_eq!(normalized(Some(" a ".to_string())), Some("a".to_string()));
        assert_eq!(normalized(None), None);
    }

    #[test]
    fn day_bounds_cover_exactly_one_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        let (start, end) = day_bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
        assert!(start <= now && now < end);
    }

    #[test]
    fn shortcut_keywords() {
        assert_eq!(DateShortcut::parse("new_today"), Some(DateShortcut::NewToday));
        assert_eq!(DateShortcut::parse("today"), Some(DateShortcut::Today));
        assert_eq!(DateShortcut::parse("overdue"), Some(DateShortcut::Overdue));
        assert_eq!(DateShortcut::parse("upcoming"), Some(DateShortcut::Upcoming));
        assert_eq!(DateShortcut::parse("yesterday"), None);
    }

    #[test]
    fn uuid_search_terms_are_detected() {
        let id = Uuid::new_v4();
        assert_eq!(parse_uuid_term(&id.to_string()), Some(id));
        assert_eq!(parse_uuid_term(&format!("  {id} ")), Some(id));
        assert_eq!(parse_uuid_term("9876543210"), None);
        assert_eq!(parse_uuid_term("acme"), None);
    }

    #[test]
    fn scope_row_visibility() {
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let row = lead(owner, Some(other));

        assert!(RecordScope::Unrestricted.allows(row.created_by, row.assigned_to));
        assert!(RecordScope::CreatedBy(owner).allows(row.created_by, row.assigned_to));
        assert!(!RecordScope::CreatedBy(other).allows(row.created_by, row.assigned_to));
        assert!(RecordScope::AssignedTo(other).allows(row.created_by, row.assigned_to));
        assert!(RecordScope::MineOrAssigned(owner).allows(row.created_by, row.assigned_to));
        assert!(RecordScope::MineOrAssigned(other).allows(row.created_by, row.assigned_to));
        assert!(!RecordScope::MineOrAssigned(Uuid::new_v4()).allows(row.created_by, row.assigned_to));
        assert!(RecordScope::CreatedByAnyOf(vec![owner]).allows(row.created_by, row.assigned_to));
        assert!(!RecordScope::CreatedByAnyOf(vec![other]).allows(row.created_by, row.assigned_to));
        assert!(!RecordScope::Deny.allows(row.created_by, row.assigned_to));
    }
}
