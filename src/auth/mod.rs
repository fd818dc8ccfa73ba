use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use diesel::prelude::*;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::errors::ApiError;
use crate::shared::models::{Profile, Role};
use crate::shared::schema::profiles;
use crate::shared::state::AppState;

/// The authenticated actor a request runs as.
///
/// Role and company are re-read from the actor's profile row on every request;
/// token claims only establish identity, never authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorContext {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub company_id: Option<Uuid>,
}

impl ActorContext {
    pub fn is_superadmin(&self) -> bool {
        self.role == Role::Superadmin
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_elevated(&self) -> bool {
        self.role >= Role::Admin
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    exp: usize,
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthenticated)
}

/// Resolves the request's `Authorization` header to a fresh `ActorContext`.
pub fn resolve_actor(state: &AppState, headers: &HeaderMap) -> Result<ActorContext, ApiError> {
    let token = bearer_token(headers)?;
    let key = DecodingKey::from_secret(state.config.auth.jwt_secret.as_bytes());
    let claims = decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))
        .map_err(|_| ApiError::Unauthenticated)?
        .claims;

    let mut conn = state.conn.get()?;
    let profile: Profile = profiles::table
        .filter(profiles::email.eq(&claims.email))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::Unauthenticated)?;

    actor_from_profile(&profile)
}

pub fn actor_from_profile(profile: &Profile) -> Result<ActorContext, ApiError> {
    let role = Role::try_from(profile.role_id).map_err(|_| ApiError::Unauthenticated)?;
    Ok(ActorContext {
        id: profile.id,
        email: profile.email.clone(),
        role,
        company_id: profile.company_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn profile(role_id: i32, company_id: Option<Uuid>) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            phone: None,
            address: None,
            gender: None,
            role_id,
            company_id,
            custom_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn actor_inherits_profile_role_and_company() {
        let company = Uuid::new_v4();
        let p = profile(1, Some(company));
        let actor = actor_from_profile(&p).unwrap();
        assert_eq!(actor.role, Role::Admin);
        assert_eq!(actor.company_id, Some(company));
        assert!(actor.is_elevated());
        assert!(!actor.is_superadmin());
    }

    #[test]
    fn unknown_role_id_is_rejected() {
        let p = profile(9, None);
        assert!(actor_from_profile(&p).is_err());
    }

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc"));
        assert!(bearer_token(&headers).is_err());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc");
    }
}
