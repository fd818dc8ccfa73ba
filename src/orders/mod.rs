//! Purchase orders. Creating one forces the referenced lead to status `PO`
//! within the same transaction.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use log::error;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::resolve_actor;
use crate::leads::visible_lead;
use crate::scope::{record_scope, RecordScope};
use crate::shared::errors::ApiError;
use crate::shared::models::{ListResponse, PurchaseOrder, STATUS_PO};
use crate::shared::schema::{leads, po_data};
use crate::shared::state::AppState;

pub const ORDER_PAGE_SIZE: i64 = 50;

type BoxedOrderQuery = po_data::BoxedQuery<'static, Pg>;

fn visible_orders(scope: &RecordScope) -> BoxedOrderQuery {
    let q = po_data::table.into_boxed();
    match scope {
        RecordScope::Unrestricted => q,
        RecordScope::CreatedByAnyOf(ids) => q.filter(po_data::created_by.eq_any(ids.clone())),
        RecordScope::MineOrAssigned(actor) | RecordScope::CreatedBy(actor) => {
            q.filter(po_data::created_by.eq(*actor))
        }
        RecordScope::AssignedTo(_) | RecordScope::Deny => q
            .filter(po_data::id.eq(Uuid::nil()))
            .filter(po_data::id.ne(Uuid::nil())),
    }
}

fn apply_search(q: BoxedOrderQuery, term: &str) -> BoxedOrderQuery {
    let pattern = format!("%{}%", term.trim());
    let text_match = po_data::note
        .ilike(pattern.clone())
        .or(po_data::created_by_email.ilike(pattern));
    match crate::leads::parse_uuid_term(term) {
        Some(id) => q.filter(text_match.or(po_data::id.eq(id)).or(po_data::lead_id.eq(id))),
        None => q.filter(text_match),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub lead_id: Uuid,
    pub amount_received: BigDecimal,
    #[serde(default)]
    pub amount_remaining: BigDecimal,
    pub release_date: Option<String>,
    pub note: Option<String>,
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<PurchaseOrder>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let release_date = match req.release_date.as_deref() {
        Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            ApiError::Validation("Field 'release_date' must be YYYY-MM-DD.".to_string())
        })?),
        None => None,
    };

    let order = conn.transaction::<PurchaseOrder, ApiError, _>(|conn| {
        let (lead, _) = visible_lead(conn, &actor, req.lead_id)?;
        let order = PurchaseOrder {
            id: Uuid::new_v4(),
            lead_id: lead.id,
            amount_received: req.amount_received.clone(),
            amount_remaining: req.amount_remaining.clone(),
            release_date,
            note: crate::leads::normalized(req.note.clone()),
            created_by: actor.id,
            created_by_email: actor.email.clone(),
            company_id: actor.company_id,
            created_at: Utc::now(),
        };
        diesel::insert_into(po_data::table)
            .values(&order)
            .execute(conn)?;
        diesel::update(leads::table.filter(leads::id.eq(lead.id)))
            .set((
                leads::status.eq(STATUS_PO),
                leads::schedule_time.eq(None::<chrono::DateTime<Utc>>),
                leads::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
        Ok(order)
    })?;

    Ok(Json(order))
}

pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<crate::leads::LeadListQuery>,
) -> Result<Json<ListResponse<PurchaseOrder>>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let scope = match record_scope(&mut conn, &actor, &params.scope_params()) {
        Ok(scope) => scope,
        Err(e) => {
            error!("Order scope resolution failed: {e}");
            return Ok(Json(ListResponse::empty()));
        }
    };
    if scope.is_deny() {
        return Ok(Json(ListResponse::empty()));
    }

    let page = params.page.unwrap_or(1);
    let mut load = || -> QueryResult<(Vec<PurchaseOrder>, i64)> {
        let base = || {
            let mut q = visible_orders(&scope);
            if let Some(term) = params.query.as_deref() {
                q = apply_search(q, term);
            }
            q
        };
        let items = base()
            .order(po_data::created_at.desc())
            .limit(ORDER_PAGE_SIZE)
            .offset(crate::shared::utils::page_offset(page, ORDER_PAGE_SIZE))
            .load(&mut conn)?;
        let count = base().count().get_result(&mut conn)?;
        Ok((items, count))
    };
    match load() {
        Ok((items, count)) => Ok(Json(ListResponse { items, count })),
        Err(e) => {
            error!("Order query failed: {e}");
            Ok(Json(ListResponse::empty()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_date_format() {
        assert!(NaiveDate::parse_from_str("2026-03-14", "%Y-%m-%d").is_ok());
        assert!(NaiveDate::parse_from_str("14/03/2026", "%Y-%m-%d").is_err());
    }

    #[test]
    fn deny_scope_selects_nothing_for_orders() {
        // The Deny arm is a contradictory filter; row-level check mirrors it.
        assert!(!RecordScope::Deny.allows(Uuid::new_v4(), None));
    }
}
