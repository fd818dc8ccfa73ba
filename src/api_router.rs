//! Combines the REST endpoints of every feature module into a unified router.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // ===== Leads =====
        .route(
            "/api/leads",
            get(crate::leads::list_leads).post(crate::leads::create_lead),
        )
        .route("/api/leads/scheduled", get(crate::leads::list_scheduled_leads))
        .route(
            "/api/leads/:id",
            get(crate::leads::get_lead)
                .put(crate::leads::update_lead)
                .delete(crate::leads::delete_lead),
        )
        // ===== Comments =====
        .route(
            "/api/leads/:id/comments",
            get(crate::comments::list_lead_comments).post(crate::comments::add_comment),
        )
        .route("/api/comments", get(crate::comments::list_comments))
        .route("/api/comments/:id", delete(crate::comments::delete_comment))
        // ===== Purchase orders =====
        .route(
            "/api/orders",
            get(crate::orders::list_orders).post(crate::orders::create_order),
        )
        // ===== Users =====
        .route(
            "/api/users",
            get(crate::directory::users::list_users).post(crate::directory::users::create_user),
        )
        .route(
            "/api/users/:id",
            put(crate::directory::users::update_user)
                .delete(crate::directory::users::delete_user),
        )
        .route("/api/me", get(crate::directory::users::get_me))
        // ===== Companies =====
        .route(
            "/api/companies",
            get(crate::directory::companies::list_companies)
                .post(crate::directory::companies::create_company),
        )
        .route(
            "/api/companies/:id",
            put(crate::directory::companies::update_company)
                .delete(crate::directory::companies::delete_company),
        )
        // ===== Broadcast notifications =====
        .route(
            "/api/notifications",
            get(crate::notifications::list_notifications)
                .post(crate::notifications::create_notification),
        )
        .route(
            "/api/notifications/:id",
            delete(crate::notifications::delete_notification),
        )
        // ===== Scheduled alerts =====
        .route("/api/alerts", get(crate::alerts::list_alerts))
        .route("/api/alerts/subscribe", post(crate::alerts::subscribe_alerts))
        .route("/api/alerts/:id/dismiss", post(crate::alerts::dismiss_alert))
        // ===== Insights =====
        .route("/api/insights/leads", get(crate::insights::lead_insights))
        .route("/api/insights/my-leads", get(crate::insights::my_lead_insights))
        .route(
            "/api/insights/scheduled",
            get(crate::insights::scheduled_insights),
        )
        .route("/api/insights/users", get(crate::insights::user_insights))
        .route("/api/insights/totals", get(crate::insights::total_insights))
}
