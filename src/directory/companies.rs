use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use diesel::pg::Pg;
use diesel::prelude::*;
use log::error;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::resolve_actor;
use crate::leads::{normalized, parse_uuid_term};
use crate::shared::errors::ApiError;
use crate::shared::models::{Company, ListResponse};
use crate::shared::schema::company;
use crate::shared::state::AppState;

pub const COMPANY_PAGE_SIZE: i64 = 20;

type BoxedCompanyQuery = company::BoxedQuery<'static, Pg>;

#[derive(Debug, Default, Deserialize)]
pub struct CompanyListQuery {
    pub page: Option<i64>,
    pub query: Option<String>,
}

fn apply_search(q: BoxedCompanyQuery, term: &str) -> BoxedCompanyQuery {
    let pattern = format!("%{}%", term.trim());
    let text_match = company::name
        .ilike(pattern.clone())
        .or(company::email.ilike(pattern.clone()))
        .or(company::phone.ilike(pattern));
    match parse_uuid_term(term) {
        Some(id) => q.filter(text_match.or(company::id.eq(id))),
        None => q.filter(text_match),
    }
}

/// Company listing does not enforce a role. Deliberate: profiles reference
/// their company by id and every tier may read the directory.
pub async fn list_companies(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CompanyListQuery>,
) -> Result<Json<ListResponse<Company>>, ApiError> {
    resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let page = params.page.unwrap_or(1);
    let mut load = || -> QueryResult<(Vec<Company>, i64)> {
        let base = || {
            let mut q = company::table.into_boxed();
            if let Some(term) = params.query.as_deref() {
                q = apply_search(q, term);
            }
            q
        };
        let items = base()
            .order(company::created_at.desc())
            .limit(COMPANY_PAGE_SIZE)
            .offset(crate::shared::utils::page_offset(page, COMPANY_PAGE_SIZE))
            .load(&mut conn)?;
        let count = base().count().get_result(&mut conn)?;
        Ok((items, count))
    };
    match load() {
        Ok((items, count)) => Ok(Json(ListResponse { items, count })),
        Err(e) => {
            error!("Company query failed: {e}");
            Ok(Json(ListResponse::empty()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub details: Option<String>,
}

pub async fn create_company(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateCompanyRequest>,
) -> Result<Json<Company>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    if !actor.is_superadmin() {
        return Err(ApiError::Forbidden("Unauthorized".to_string()));
    }
    let mut conn = state.conn.get()?;

    let name = normalized(Some(req.name))
        .ok_or_else(|| ApiError::Validation("Field 'name' is required.".to_string()))?;
    let record = Company {
        id: Uuid::new_v4(),
        name,
        email: normalized(req.email),
        phone: normalized(req.phone),
        details: normalized(req.details),
        created_at: Utc::now(),
    };

    diesel::insert_into(company::table)
        .values(&record)
        .execute(&mut conn)?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub details: Option<String>,
}

pub async fn update_company(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCompanyRequest>,
) -> Result<Json<Company>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    if !actor.is_superadmin() {
        return Err(ApiError::Forbidden("Unauthorized".to_string()));
    }
    let mut conn = state.conn.get()?;

    let mut record: Company = company::table
        .filter(company::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("Company not found".to_string()))?;
    if let Some(name) = normalized(req.name) {
        record.name = name;
    }
    if req.email.is_some() {
        record.email = normalized(req.email);
    }
    if req.phone.is_some() {
        record.phone = normalized(req.phone);
    }
    if req.details.is_some() {
        record.details = normalized(req.details);
    }

    diesel::update(company::table.filter(company::id.eq(id)))
        .set(&record)
        .execute(&mut conn)?;
    Ok(Json(record))
}

pub async fn delete_company(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    if !actor.is_superadmin() {
        return Err(ApiError::Forbidden("Unauthorized".to_string()));
    }
    let mut conn = state.conn.get()?;
    diesel::delete(company::table.filter(company::id.eq(id))).execute(&mut conn)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
