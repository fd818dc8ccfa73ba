//! Broadcast notifications: Superadmin-written, globally readable.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use log::error;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::resolve_actor;
use crate::leads::normalized;
use crate::shared::errors::ApiError;
use crate::shared::models::{BroadcastNotification, ListResponse};
use crate::shared::schema::broadcast_notifications;
use crate::shared::state::AppState;

pub const NOTIFICATION_PAGE_SIZE: i64 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationListQuery {
    pub page: Option<i64>,
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<NotificationListQuery>,
) -> Result<Json<ListResponse<BroadcastNotification>>, ApiError> {
    resolve_actor(&state, &headers)?;
    let mut conn = state.conn.get()?;

    let page = params.page.unwrap_or(1);
    let mut load = || -> QueryResult<(Vec<BroadcastNotification>, i64)> {
        let items = broadcast_notifications::table
            .order(broadcast_notifications::created_at.desc())
            .limit(NOTIFICATION_PAGE_SIZE)
            .offset(crate::shared::utils::page_offset(
                page,
                NOTIFICATION_PAGE_SIZE,
            ))
            .load(&mut conn)?;
        let count = broadcast_notifications::table
            .count()
            .get_result(&mut conn)?;
        Ok((items, count))
    };
    match load() {
        Ok((items, count)) => Ok(Json(ListResponse { items, count })),
        Err(e) => {
            error!("Notification query failed: {e}");
            Ok(Json(ListResponse::empty()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub title: String,
    pub message: String,
}

pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateNotificationRequest>,
) -> Result<Json<BroadcastNotification>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    if !actor.is_superadmin() {
        return Err(ApiError::Forbidden("Unauthorized".to_string()));
    }
    let mut conn = state.conn.get()?;

    let title = normalized(Some(req.title))
        .ok_or_else(|| ApiError::Validation("Field 'title' is required.".to_string()))?;
    let message = normalized(Some(req.message))
        .ok_or_else(|| ApiError::Validation("Field 'message' is required.".to_string()))?;

    let notification = BroadcastNotification {
        id: Uuid::new_v4(),
        title,
        message,
        created_by: actor.id,
        created_by_email: actor.email.clone(),
        created_at: Utc::now(),
    };
    diesel::insert_into(broadcast_notifications::table)
        .values(&notification)
        .execute(&mut conn)?;
    Ok(Json(notification))
}

pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    if !actor.is_superadmin() {
        return Err(ApiError::Forbidden("Unauthorized".to_string()));
    }
    let mut conn = state.conn.get()?;
    diesel::delete(broadcast_notifications::table.filter(broadcast_notifications::id.eq(id)))
        .execute(&mut conn)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
