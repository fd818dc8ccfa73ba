//! Scoped dashboard counters. Every counter goes through the scope policy
//! engine; a failed count degrades to zero rather than erroring the panel.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Duration, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use log::error;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::resolve_actor;
use crate::comments;
use crate::leads::{day_bounds, visible_leads, LeadListQuery};
use crate::scope::{profile_scope, record_scope, ProfileScope, RecordScope, ScopeParams};
use crate::shared::errors::ApiError;
use crate::shared::models::{STATUS_IN_CONVERSATION, STATUS_PO, STATUS_SCHEDULED};
use crate::shared::schema::{broadcast_notifications, company, leads, profiles};
use crate::shared::state::AppState;

type BoxedLeadQuery = leads::BoxedQuery<'static, Pg>;

fn count_leads<F>(conn: &mut PgConnection, scope: &RecordScope, refine: F) -> i64
where
    F: FnOnce(BoxedLeadQuery) -> BoxedLeadQuery,
{
    if scope.is_deny() {
        return 0;
    }
    match refine(visible_leads(scope)).count().get_result(conn) {
        Ok(n) => n,
        Err(e) => {
            error!("Lead count failed: {e}");
            0
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeadInsights {
    pub total: i64,
    pub created_today: i64,
    pub in_conversation: i64,
    pub po: i64,
}

pub async fn lead_insights(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LeadListQuery>,
) -> Result<Json<LeadInsights>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;
    let scope = record_scope(&mut conn, &actor, &params.scope_params()).unwrap_or_else(|e| {
        error!("Insight scope resolution failed: {e}");
        RecordScope::Deny
    });

    let now = Utc::now();
    let (start, end) = day_bounds(now);
    Ok(Json(LeadInsights {
        total: count_leads(&mut conn, &scope, |q| q),
        created_today: count_leads(&mut conn, &scope, |q| {
            q.filter(leads::created_at.ge(start))
                .filter(leads::created_at.lt(end))
        }),
        in_conversation: count_leads(&mut conn, &scope, |q| {
            q.filter(leads::status.eq(STATUS_IN_CONVERSATION))
        }),
        po: count_leads(&mut conn, &scope, |q| q.filter(leads::status.eq(STATUS_PO))),
    }))
}

#[derive(Debug, Serialize)]
pub struct MyLeadInsights {
    pub total: i64,
    pub scheduled_today: i64,
    pub in_conversation: i64,
    pub po: i64,
}

pub async fn my_lead_insights(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MyLeadInsights>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;
    let scope = RecordScope::CreatedBy(actor.id);

    let now = Utc::now();
    let (start, end) = day_bounds(now);
    Ok(Json(MyLeadInsights {
        total: count_leads(&mut conn, &scope, |q| q),
        scheduled_today: count_leads(&mut conn, &scope, |q| {
            q.filter(leads::schedule_time.ge(start))
                .filter(leads::schedule_time.lt(end))
        }),
        in_conversation: count_leads(&mut conn, &scope, |q| {
            q.filter(leads::status.eq(STATUS_IN_CONVERSATION))
        }),
        po: count_leads(&mut conn, &scope, |q| q.filter(leads::status.eq(STATUS_PO))),
    }))
}

#[derive(Debug, Serialize)]
pub struct ScheduledInsights {
    pub total: i64,
    pub today: i64,
    pub overdue: i64,
    pub upcoming: i64,
}

pub async fn scheduled_insights(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LeadListQuery>,
) -> Result<Json<ScheduledInsights>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;
    let scope = record_scope(&mut conn, &actor, &params.scope_params()).unwrap_or_else(|e| {
        error!("Insight scope resolution failed: {e}");
        RecordScope::Deny
    });

    let now = Utc::now();
    let (start, end) = day_bounds(now);
    let scheduled = |q: BoxedLeadQuery| q.filter(leads::status.eq(STATUS_SCHEDULED));
    Ok(Json(ScheduledInsights {
        total: count_leads(&mut conn, &scope, scheduled),
        today: count_leads(&mut conn, &scope, |q| {
            q.filter(leads::schedule_time.ge(start))
                .filter(leads::schedule_time.lt(end))
        }),
        overdue: count_leads(&mut conn, &scope, |q| q.filter(leads::schedule_time.lt(now))),
        upcoming: count_leads(&mut conn, &scope, |q| q.filter(leads::schedule_time.gt(now))),
    }))
}

#[derive(Debug, Serialize)]
pub struct UserInsights {
    pub total: i64,
    pub admins: i64,
    pub users: i64,
    pub new_last_30_days: i64,
}

pub async fn user_insights(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LeadListQuery>,
) -> Result<Json<UserInsights>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let scope = profile_scope(&actor, params.company_id);
    if scope == ProfileScope::Deny {
        return Ok(Json(UserInsights {
            total: 0,
            admins: 0,
            users: 0,
            new_last_30_days: 0,
        }));
    }
    let mut conn = state.conn.get()?;

    let base = || {
        let q = profiles::table.into_boxed();
        match scope {
            ProfileScope::All => q,
            ProfileScope::Company(cid) => q.filter(profiles::company_id.eq(cid)),
            ProfileScope::Deny => q
                .filter(profiles::id.eq(Uuid::nil()))
                .filter(profiles::id.ne(Uuid::nil())),
        }
    };
    let count = |q: profiles::BoxedQuery<'static, Pg>, conn: &mut PgConnection| -> i64 {
        match q.count().get_result(conn) {
            Ok(n) => n,
            Err(e) => {
                error!("Profile count failed: {e}");
                0
            }
        }
    };

    let month_ago = Utc::now() - Duration::days(30);
    Ok(Json(UserInsights {
        total: count(base(), &mut conn),
        admins: count(base().filter(profiles::role_id.eq(1)), &mut conn),
        users: count(base().filter(profiles::role_id.eq(0)), &mut conn),
        new_last_30_days: count(base().filter(profiles::created_at.ge(month_ago)), &mut conn),
    }))
}

#[derive(Debug, Serialize)]
pub struct TotalInsights {
    pub all_comments: i64,
    pub my_comments: i64,
    pub companies: i64,
    pub notifications: i64,
}

pub async fn total_insights(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TotalInsights>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let scope = record_scope(&mut conn, &actor, &ScopeParams::default()).unwrap_or_else(|e| {
        error!("Insight scope resolution failed: {e}");
        RecordScope::Deny
    });
    let all_comments = comments::count_comments(&mut conn, &scope);
    let my_comments = comments::count_comments(&mut conn, &RecordScope::CreatedBy(actor.id));

    let companies = company::table
        .count()
        .get_result(&mut conn)
        .unwrap_or_else(|e| {
            error!("Company count failed: {e}");
            0
        });
    let notifications = broadcast_notifications::table
        .count()
        .get_result(&mut conn)
        .unwrap_or_else(|e| {
            error!("Notification count failed: {e}");
            0
        });

    Ok(Json(TotalInsights {
        all_comments,
        my_comments,
        companies,
        notifications,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_day_window_arithmetic() {
        let now = Utc::now();
        let month_ago = now - Duration::days(30);
        assert_eq!((now - month_ago).num_days(), 30);
        assert!(month_ago < now);
    }
}
