//! Scheduled-lead alerting.
//!
//! A per-actor engine polls the scheduled-lead window on a fixed interval and
//! fires threshold alerts at most once per `(lead, threshold)` pair for the
//! lifetime of the process. Dismissing an alert removes it from the visible
//! queue without un-firing the key, so it never reappears.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use log::{error, info};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{resolve_actor, ActorContext};
use crate::scope::{alert_scope, RecordScope};
use crate::shared::errors::ApiError;
use crate::shared::models::{Lead, STATUS_SCHEDULED};
use crate::shared::schema::leads;
use crate::shared::state::AppState;

/// Minute offsets before the scheduled time at which an alert fires.
pub const ALERT_THRESHOLD_LADDER: [i64; 6] = [1440, 60, 30, 15, 5, 0];

/// Poll window: a little grace behind now, 25 hours ahead so the 1440-minute
/// threshold is always observable.
pub const WINDOW_BEHIND_MINUTES: i64 = 5;
pub const WINDOW_AHEAD_HOURS: i64 = 25;

pub const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Whole minutes until the scheduled time, rounded toward negative infinity.
pub fn diff_minutes(schedule_time: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (schedule_time - now).num_seconds().div_euclid(60)
}

/// Fired-key bookkeeping. Keys transition `unfired -> fired` exactly once and
/// never reset.
#[derive(Debug)]
pub struct AlertTracker {
    ladder: Vec<i64>,
    fired: HashSet<(Uuid, i64)>,
}

impl Default for AlertTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::with_ladder(ALERT_THRESHOLD_LADDER.to_vec())
    }

    pub fn with_ladder(ladder: Vec<i64>) -> Self {
        Self {
            ladder,
            fired: HashSet::new(),
        }
    }

    /// Returns the threshold to fire for this lead at `now`, if any, and
    /// marks it fired.
    pub fn check(
        &mut self,
        lead_id: Uuid,
        schedule_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        let diff = diff_minutes(schedule_time, now);
        for &threshold in &self.ladder {
            if diff >= threshold - 1
                && diff <= threshold
                && !self.fired.contains(&(lead_id, threshold))
            {
                self.fired.insert((lead_id, threshold));
                return Some(threshold);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledAlert {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub lead_id: Uuid,
    pub lead_name: String,
    pub schedule_time: DateTime<Utc>,
    pub threshold_minutes: i64,
    pub fired_at: DateTime<Utc>,
}

pub type AlertQueue = Arc<RwLock<Vec<ScheduledAlert>>>;

fn scheduled_window(
    conn: &mut PgConnection,
    scope: &RecordScope,
    now: DateTime<Utc>,
) -> QueryResult<Vec<Lead>> {
    crate::leads::visible_leads(scope)
        .filter(leads::status.eq(STATUS_SCHEDULED))
        .filter(leads::schedule_time.ge(now - Duration::minutes(WINDOW_BEHIND_MINUTES)))
        .filter(leads::schedule_time.le(now + Duration::hours(WINDOW_AHEAD_HOURS)))
        .order(leads::schedule_time.asc())
        .load(conn)
}

/// One polling engine per watching actor.
pub struct AlertEngine {
    state: Arc<AppState>,
    actor: ActorContext,
    tracker: AlertTracker,
    interval: std::time::Duration,
}

impl AlertEngine {
    pub fn new(state: Arc<AppState>, actor: ActorContext) -> Self {
        Self {
            state,
            actor,
            tracker: AlertTracker::new(),
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: std::time::Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One poll: fetch the scoped window and run every lead through the
    /// tracker. Failures skip the tick; the loop keeps going.
    pub fn tick(&mut self, now: DateTime<Utc>) -> anyhow::Result<Vec<ScheduledAlert>> {
        let mut conn = self.state.conn.get()?;
        let scope = alert_scope(&mut conn, &self.actor)?;
        if scope.is_deny() {
            return Ok(Vec::new());
        }

        let window = scheduled_window(&mut conn, &scope, now)?;
        let mut fired = Vec::new();
        for lead in window {
            let Some(schedule_time) = lead.schedule_time else {
                continue;
            };
            if let Some(threshold) = self.tracker.check(lead.id, schedule_time, now) {
                fired.push(ScheduledAlert {
                    id: Uuid::new_v4(),
                    actor_id: self.actor.id,
                    lead_id: lead.id,
                    lead_name: lead.lead_name.clone(),
                    schedule_time,
                    threshold_minutes: threshold,
                    fired_at: now,
                });
            }
        }
        Ok(fired)
    }

    pub async fn run(mut self) {
        let queue = self.state.alerts.clone();
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.tick(Utc::now()) {
                Ok(fired) => {
                    if fired.is_empty() {
                        continue;
                    }
                    for alert in &fired {
                        info!(
                            "Scheduled alert for lead '{}' ({} min threshold)",
                            alert.lead_name, alert.threshold_minutes
                        );
                    }
                    queue.write().await.extend(fired);
                }
                Err(e) => error!("Alert poll failed for {}: {e}", self.actor.email),
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Starts the actor's polling engine if it is not already running.
pub async fn subscribe_alerts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    if actor.is_superadmin() {
        // Superadmins are excluded from scheduled alerts.
        return Ok(Json(serde_json::json!({ "subscribed": false })));
    }

    let mut watchers = state.alert_watchers.write().await;
    if watchers.insert(actor.id) {
        let engine = AlertEngine::new(state.clone(), actor);
        tokio::spawn(engine.run());
    }
    Ok(Json(serde_json::json!({ "subscribed": true })))
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ScheduledAlert>>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let queue = state.alerts.read().await;
    let mine = queue
        .iter()
        .filter(|a| a.actor_id == actor.id)
        .cloned()
        .collect();
    Ok(Json(mine))
}

/// Removes the alert card from the visible queue. The fired key is untouched,
/// so the same threshold never fires again.
pub async fn dismiss_alert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let actor = resolve_actor(&state, &headers)?;
    let mut queue = state.alerts.write().await;
    let before = queue.len();
    queue.retain(|a| !(a.id == id && a.actor_id == actor.id));
    Ok(Json(serde_json::json!({ "dismissed": queue.len() < before })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes_ahead(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
        now + Duration::minutes(minutes)
    }

    #[test]
    fn diff_minutes_floors_toward_negative_infinity() {
        let now = Utc::now();
        assert_eq!(diff_minutes(now + Duration::seconds(90), now), 1);
        assert_eq!(diff_minutes(now + Duration::seconds(60), now), 1);
        assert_eq!(diff_minutes(now + Duration::seconds(59), now), 0);
        assert_eq!(diff_minutes(now - Duration::seconds(30), now), -1);
        assert_eq!(diff_minutes(now - Duration::seconds(61), now), -2);
    }

    #[test]
    fn threshold_fires_exactly_once_across_polls() {
        let mut tracker = AlertTracker::new();
        let now = Utc::now();
        let lead = Uuid::new_v4();
        let schedule = minutes_ahead(now, 30);

        assert_eq!(tracker.check(lead, schedule, now), Some(30));
        // Same poll window again, and again 30 seconds later.
        assert_eq!(tracker.check(lead, schedule, now), None);
        assert_eq!(
            tracker.check(lead, schedule, now + Duration::seconds(30)),
            None
        );
    }

    #[test]
    fn passed_thresholds_do_not_fire_late() {
        let mut tracker = AlertTracker::new();
        let now = Utc::now();
        let lead = Uuid::new_v4();
        // First observed 30 minutes out: the 60-minute threshold is already
        // past and must never fire.
        let schedule = minutes_ahead(now, 30);
        assert_eq!(tracker.check(lead, schedule, now), Some(30));
        assert_eq!(
            tracker.check(lead, schedule, now + Duration::minutes(10)),
            None
        );
    }

    #[test]
    fn each_threshold_fires_as_time_approaches() {
        let mut tracker = AlertTracker::new();
        let start = Utc::now();
        let lead = Uuid::new_v4();
        let schedule = minutes_ahead(start, 1440);

        assert_eq!(tracker.check(lead, schedule, start), Some(1440));
        for &threshold in &[60, 30, 15, 5, 0] {
            let poll_at = schedule - Duration::minutes(threshold);
            assert_eq!(tracker.check(lead, schedule, poll_at), Some(threshold));
        }
    }

    #[test]
    fn lower_boundary_of_window_fires() {
        let mut tracker = AlertTracker::new();
        let now = Utc::now();
        let lead = Uuid::new_v4();
        // diff_minutes = 29 is still within [29, 30].
        let schedule = now + Duration::minutes(29) + Duration::seconds(30);
        assert_eq!(tracker.check(lead, schedule, now), Some(30));
    }

    #[test]
    fn outside_every_window_nothing_fires() {
        let mut tracker = AlertTracker::new();
        let now = Utc::now();
        let lead = Uuid::new_v4();
        assert_eq!(tracker.check(lead, minutes_ahead(now, 31), now), None);
        assert_eq!(tracker.check(lead, minutes_ahead(now, 200), now), None);
        assert_eq!(tracker.check(lead, minutes_ahead(now, -3), now), None);
    }

    #[test]
    fn zero_threshold_covers_just_past_schedule() {
        let mut tracker = AlertTracker::new();
        let now = Utc::now();
        let lead = Uuid::new_v4();
        let schedule = now - Duration::seconds(30);
        assert_eq!(tracker.check(lead, schedule, now), Some(0));
    }

    #[test]
    fn leads_are_tracked_independently() {
        let mut tracker = AlertTracker::new();
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let schedule = minutes_ahead(now, 15);
        assert_eq!(tracker.check(a, schedule, now), Some(15));
        assert_eq!(tracker.check(b, schedule, now), Some(15));
        assert_eq!(tracker.check(a, schedule, now), None);
    }

    #[test]
    fn ladder_is_injectable() {
        let mut tracker = AlertTracker::with_ladder(vec![10]);
        let now = Utc::now();
        let lead = Uuid::new_v4();
        assert_eq!(tracker.check(lead, minutes_ahead(now, 30), now), None);
        assert_eq!(tracker.check(lead, minutes_ahead(now, 10), now), Some(10));
    }
}
