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

use crate::auth::{resolve_actor, ActorContext};
use crate::leads::{normalized, parse_uuid_term};
use crate::scope::{profile_scope, ProfileScope};
use crate::shared::errors::{unique_violation_field, ApiError};
use crate::shared::models::{ListResponse, Profile, Role};
use crate::shared::schema::profiles;
use crate::shared::state::AppState;

pub const USER_PAGE_SIZE: i64 = 20;

type BoxedProfileQuery = profiles::BoxedQuery<'static, Pg>;

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub query: Option<String>,
    pub role: Option<i32>,
    pub company_id: Option<Uuid>,
}

fn scoped_profiles(scope: ProfileScope) -> BoxedProfileQuery {
    let q = profiles::table.into_boxed();
    match scope {
        ProfileScope::All => q,
        ProfileScope::Company(company) => q.filter(profiles::company_id.eq(company)),
        ProfileScope::Deny => q
            .filter(profiles::id.eq(Uuid::nil()))
            .filter(profiles::id.ne(Uuid::nil())),
    }
}

fn apply_search(q: BoxedProfileQuery, term: &str) -> BoxedProfileQuery {
    let pattern = format!("%{}%", term.trim());
    let text_match = profiles::name
        .ilike(pattern.clone())
        .or(profiles::email.ilike(pattern.clone()))
        .or(profiles::phone.ilike(pattern));
    match parse_uuid_term(term) {
        Some(id) => q.filter(text_match.or(profiles::id.eq(id))),
        None => q.filter(text_match),
    }
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<UserListQuery>,
) -> Result<Json<ListResponse<Profile>>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let scope = profile_scope(&actor, params.company_id);
    if scope == ProfileScope::Deny {
        return Ok(Json(ListResponse::empty()));
    }
    let mut conn = state.conn.get()?;

    let page = params.page.unwrap_or(1);
    let mut load = || -> QueryResult<(Vec<Profile>, i64)> {
        let base = || {
            let mut q = scoped_profiles(scope);
            if let Some(role) = params.role {
                q = q.filter(profiles::role_id.eq(role));
            }
            if let Some(term) = params.query.as_deref() {
                q = apply_search(q, term);
            }
            q
        };
        let items = base()
            .order(profiles::created_at.desc())
            .limit(USER_PAGE_SIZE)
            .offset(crate::shared::utils::page_offset(page, USER_PAGE_SIZE))
            .load(&mut conn)?;
        let count = base().count().get_result(&mut conn)?;
        Ok((items, count))
    };
    match load() {
        Ok((items, count)) => Ok(Json(ListResponse { items, count })),
        Err(e) => {
            error!("Profile query failed: {e}");
            Ok(Json(ListResponse::empty()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub role_id: Option<i32>,
    pub company_id: Option<Uuid>,
    pub custom_message: Option<String>,
}

/// Which role/company a new profile may be created with, per the creating
/// actor's tier.
pub fn admissible_new_profile(
    actor: &ActorContext,
    requested_role: Role,
    requested_company: Option<Uuid>,
) -> Result<(Role, Option<Uuid>), ApiError> {
    match actor.role {
        Role::Superadmin => Ok((requested_role, requested_company)),
        Role::Admin => {
            if requested_role != Role::User {
                return Err(ApiError::Forbidden(
                    "Admins can only create ordinary users".to_string(),
                ));
            }
            match actor.company_id {
                Some(company) => Ok((Role::User, Some(company))),
                None => Err(ApiError::Forbidden("Unauthorized".to_string())),
            }
        }
        Role::User => Err(ApiError::Forbidden("Unauthorized".to_string())),
    }
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<Profile>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let name = normalized(Some(req.name))
        .ok_or_else(|| ApiError::Validation("Field 'name' is required.".to_string()))?;
    let email = normalized(Some(req.email))
        .ok_or_else(|| ApiError::Validation("Field 'email' is required.".to_string()))?;
    let requested_role = Role::try_from(req.role_id.unwrap_or(Role::User.as_i32()))
        .map_err(|v| ApiError::Validation(format!("Unknown role '{v}'.")))?;
    let (role, company_id) = admissible_new_profile(&actor, requested_role, req.company_id)?;

    let profile = Profile {
        id: Uuid::new_v4(),
        name,
        email,
        phone: normalized(req.phone),
        address: normalized(req.address),
        gender: normalized(req.gender),
        role_id: role.as_i32(),
        company_id,
        custom_message: normalized(req.custom_message),
        created_at: Utc::now(),
    };

    diesel::insert_into(profiles::table)
        .values(&profile)
        .execute(&mut conn)
        .map_err(|e| match unique_violation_field(&e) {
            Some("email") => {
                ApiError::Conflict("A user with this email already exists.".to_string())
            }
            Some(_) => ApiError::Conflict("User already exists.".to_string()),
            None => e.into(),
        })?;

    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub role_id: Option<i32>,
    pub company_id: Option<Uuid>,
    pub custom_message: Option<String>,
}

fn can_manage_profile(actor: &ActorContext, target: &Profile) -> bool {
    match actor.role {
        Role::Superadmin => true,
        Role::Admin => actor.company_id.is_some() && target.company_id == actor.company_id,
        Role::User => target.id == actor.id,
    }
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<Profile>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let mut profile: Profile = profiles::table
        .filter(profiles::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    if !can_manage_profile(&actor, &profile) {
        return Err(ApiError::Forbidden("Unauthorized".to_string()));
    }

    if let Some(name) = normalized(req.name) {
        profile.name = name;
    }
    if req.phone.is_some() {
        profile.phone = normalized(req.phone);
    }
    if req.address.is_some() {
        profile.address = normalized(req.address);
    }
    if req.gender.is_some() {
        profile.gender = normalized(req.gender);
    }
    if req.custom_message.is_some() {
        profile.custom_message = normalized(req.custom_message);
    }
    // Tier and company moves are a Superadmin concern.
    if let Some(role_id) = req.role_id {
        if !actor.is_superadmin() {
            return Err(ApiError::Forbidden("Unauthorized".to_string()));
        }
        Role::try_from(role_id).map_err(|v| ApiError::Validation(format!("Unknown role '{v}'.")))?;
        profile.role_id = role_id;
    }
    if req.company_id.is_some() {
        if !actor.is_superadmin() {
            return Err(ApiError::Forbidden("Unauthorized".to_string()));
        }
        profile.company_id = req.company_id;
    }

    diesel::update(profiles::table.filter(profiles::id.eq(id)))
        .set(&profile)
        .execute(&mut conn)?;

    Ok(Json(profile))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    if id == actor.id {
        return Err(ApiError::Validation(
            "You cannot delete your own profile.".to_string(),
        ));
    }
    let mut conn = state.conn.get()?;

    let target: Profile = profiles::table
        .filter(profiles::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let allowed = match actor.role {
        Role::Superadmin => true,
        Role::Admin => {
            target.company_id == actor.company_id
                && actor.company_id.is_some()
                && target.role_id == Role::User.as_i32()
        }
        Role::User => false,
    };
    if !allowed {
        return Err(ApiError::Forbidden("Unauthorized".to_string()));
    }

    diesel::delete(profiles::table.filter(profiles::id.eq(id))).execute(&mut conn)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn get_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Profile>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;
    let profile: Profile = profiles::table
        .filter(profiles::id.eq(actor.id))
        .first(&mut conn)?;
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role, company_id: Option<Uuid>) -> ActorContext {
        ActorContext {
            id: Uuid::new_v4(),
            email: "actor@example.com".to_string(),
            role,
            company_id,
        }
    }

    #[test]
    fn superadmin_creates_any_tier_anywhere() {
        let a = actor(Role::Superadmin, None);
        let company = Uuid::new_v4();
        let (role, cid) = admissible_new_profile(&a, Role::Admin, Some(company)).unwrap();
        assert_eq!(role, Role::Admin);
        assert_eq!(cid, Some(company));
    }

    #[test]
    fn admin_creates_users_in_own_company_only() {
        let company = Uuid::new_v4();
        let a = actor(Role::Admin, Some(company));
        let elsewhere = Uuid::new_v4();
        let (role, cid) = admissible_new_profile(&a, Role::User, Some(elsewhere)).unwrap();
        assert_eq!(role, Role::User);
        // The requested company is overridden with the admin's own.
        assert_eq!(cid, Some(company));
        assert!(admissible_new_profile(&a, Role::Admin, None).is_err());
    }

    #[test]
    fn ordinary_users_cannot_onboard() {
        let a = actor(Role::User, Some(Uuid::new_v4()));
        assert!(admissible_new_profile(&a, Role::User, None).is_err());
    }

    #[test]
    fn profile_management_tiers() {
        let company = Uuid::new_v4();
        let admin = actor(Role::Admin, Some(company));
        let user = actor(Role::User, Some(company));

        let mut target = Profile {
            id: user.id,
            name: "Dev Nair".to_string(),
            email: "dev@example.com".to_string(),
            phone: None,
            address: None,
            gender: None,
            role_id: Role::User.as_i32(),
            company_id: Some(company),
            custom_message: None,
            created_at: Utc::now(),
        };

        assert!(can_manage_profile(&admin, &target));
        assert!(can_manage_profile(&user, &target));
        assert!(can_manage_profile(&actor(Role::Superadmin, None), &target));

        target.company_id = Some(Uuid::new_v4());
        assert!(!can_manage_profile(&admin, &target));
        target.id = Uuid::new_v4();
        assert!(!can_manage_profile(&user, &target));
    }
}
