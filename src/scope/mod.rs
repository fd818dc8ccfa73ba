//! Scope policy engine.
//!
//! Turns `(actor, requested filters)` into a typed row-filter scope that the
//! entity modules lower onto their diesel queries. Construction is split into
//! a pure planning step (unit-testable) and a resolution step that looks up
//! company membership when the plan calls for it.

use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::ActorContext;
use crate::shared::models::Role;
use crate::shared::schema::profiles;

pub const SCOPE_MINE_OR_ASSIGNED: &str = "mine_or_assigned";

/// Row filter for ownership-scoped records (leads, comments, purchase orders).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordScope {
    /// No restriction (Superadmin default).
    Unrestricted,
    /// `created_by` must be one of the given profile ids (company scope).
    CreatedByAnyOf(Vec<Uuid>),
    /// `created_by = actor OR assigned_to = actor`.
    MineOrAssigned(Uuid),
    /// `created_by = actor` (mine-only narrowing).
    CreatedBy(Uuid),
    /// `assigned_to = actor` (assigned-only narrowing).
    AssignedTo(Uuid),
    /// Selects zero rows. A resolved-but-empty company must land here,
    /// never on an unscoped query.
    Deny,
}

impl RecordScope {
    pub fn is_deny(&self) -> bool {
        matches!(self, RecordScope::Deny)
    }

    /// Whether a single row with the given ownership columns is visible.
    pub fn allows(&self, created_by: Uuid, assigned_to: Option<Uuid>) -> bool {
        match self {
            RecordScope::Unrestricted => true,
            RecordScope::CreatedByAnyOf(ids) => ids.contains(&created_by),
            RecordScope::MineOrAssigned(actor) => {
                created_by == *actor || assigned_to == Some(*actor)
            }
            RecordScope::CreatedBy(actor) => created_by == *actor,
            RecordScope::AssignedTo(actor) => assigned_to == Some(*actor),
            RecordScope::Deny => false,
        }
    }
}

/// Row filter for profile listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileScope {
    All,
    Company(Uuid),
    Deny,
}

/// Caller-supplied scope knobs, deserialized straight from query parameters.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ScopeParams {
    pub scope: Option<String>,
    pub mine_only: Option<bool>,
    pub assigned_only: Option<bool>,
    pub company_id: Option<Uuid>,
}

impl ScopeParams {
    fn wants_mine_or_assigned(&self) -> bool {
        self.scope.as_deref() == Some(SCOPE_MINE_OR_ASSIGNED)
    }
}

/// Intermediate plan: either the scope is already known, or it needs the
/// member set of one company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopePlan {
    Direct(RecordScope),
    MembersOf(Uuid),
}

/// Pure construction of the record scope.
///
/// Precedence: explicit `scope` override > role default > mine/assigned
/// narrowing. Status/date/search filters are applied downstream and always
/// ANDed with the result.
pub fn plan_record_scope(actor: &ActorContext, params: &ScopeParams) -> ScopePlan {
    match actor.role {
        Role::Superadmin => match params.company_id {
            Some(company) => ScopePlan::MembersOf(company),
            None => ScopePlan::Direct(RecordScope::Unrestricted),
        },
        Role::Admin => {
            if params.wants_mine_or_assigned() {
                return ScopePlan::Direct(RecordScope::MineOrAssigned(actor.id));
            }
            match actor.company_id {
                Some(company) => ScopePlan::MembersOf(company),
                None => ScopePlan::Direct(RecordScope::Deny),
            }
        }
        Role::User => {
            if params.wants_mine_or_assigned() {
                return ScopePlan::Direct(RecordScope::MineOrAssigned(actor.id));
            }
            if params.mine_only.unwrap_or(false) {
                return ScopePlan::Direct(RecordScope::CreatedBy(actor.id));
            }
            if params.assigned_only.unwrap_or(false) {
                return ScopePlan::Direct(RecordScope::AssignedTo(actor.id));
            }
            match actor.company_id {
                Some(company) => ScopePlan::MembersOf(company),
                None => ScopePlan::Direct(RecordScope::Deny),
            }
        }
    }
}

/// An empty member set short-circuits to `Deny`.
pub fn scope_from_members(members: Vec<Uuid>) -> RecordScope {
    if members.is_empty() {
        RecordScope::Deny
    } else {
        RecordScope::CreatedByAnyOf(members)
    }
}

pub fn company_member_ids(
    conn: &mut PgConnection,
    company: Uuid,
) -> QueryResult<Vec<Uuid>> {
    profiles::table
        .filter(profiles::company_id.eq(company))
        .select(profiles::id)
        .load(conn)
}

/// Resolves the plan against the store.
pub fn record_scope(
    conn: &mut PgConnection,
    actor: &ActorContext,
    params: &ScopeParams,
) -> QueryResult<RecordScope> {
    match plan_record_scope(actor, params) {
        ScopePlan::Direct(scope) => Ok(scope),
        ScopePlan::MembersOf(company) => {
            Ok(scope_from_members(company_member_ids(conn, company)?))
        }
    }
}

/// Who may list user profiles: Admins see their own company, Superadmins see
/// everything (optionally narrowed to one company), ordinary users nobody.
pub fn profile_scope(actor: &ActorContext, requested_company: Option<Uuid>) -> ProfileScope {
    match actor.role {
        Role::Superadmin => match requested_company {
            Some(company) => ProfileScope::Company(company),
            None => ProfileScope::All,
        },
        Role::Admin => match actor.company_id {
            Some(company) => ProfileScope::Company(company),
            None => ProfileScope::Deny,
        },
        Role::User => ProfileScope::Deny,
    }
}

/// Scope for the scheduled-alert window. Superadmins are excluded from alerts
/// outright; Admins watch their company, Users their own or assigned leads.
pub fn alert_plan(actor: &ActorContext) -> ScopePlan {
    match actor.role {
        Role::Superadmin => ScopePlan::Direct(RecordScope::Deny),
        Role::Admin => match actor.company_id {
            Some(company) => ScopePlan::MembersOf(company),
            None => ScopePlan::Direct(RecordScope::Deny),
        },
        Role::User => ScopePlan::Direct(RecordScope::MineOrAssigned(actor.id)),
    }
}

pub fn alert_scope(conn: &mut PgConnection, actor: &ActorContext) -> QueryResult<RecordScope> {
    match alert_plan(actor) {
        ScopePlan::Direct(scope) => Ok(scope),
        ScopePlan::MembersOf(company) => {
            Ok(scope_from_members(company_member_ids(conn, company)?))
        }
    }
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

    fn mine_or_assigned_params() -> ScopeParams {
        ScopeParams {
            scope: Some(SCOPE_MINE_OR_ASSIGNED.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn superadmin_defaults_to_unrestricted() {
        let a = actor(Role::Superadmin, None);
        assert_eq!(
            plan_record_scope(&a, &ScopeParams::default()),
            ScopePlan::Direct(RecordScope::Unrestricted)
        );
    }

    #[test]
    fn superadmin_company_filter_resolves_members() {
        let a = actor(Role::Superadmin, None);
        let company = Uuid::new_v4();
        let params = ScopeParams {
            company_id: Some(company),
            ..Default::default()
        };
        assert_eq!(plan_record_scope(&a, &params), ScopePlan::MembersOf(company));
    }

    #[test]
    fn admin_defaults_to_company_members() {
        let company = Uuid::new_v4();
        let a = actor(Role::Admin, Some(company));
        assert_eq!(
            plan_record_scope(&a, &ScopeParams::default()),
            ScopePlan::MembersOf(company)
        );
    }

    #[test]
    fn admin_without_company_is_denied() {
        let a = actor(Role::Admin, None);
        assert_eq!(
            plan_record_scope(&a, &ScopeParams::default()),
            ScopePlan::Direct(RecordScope::Deny)
        );
    }

    #[test]
    fn user_defaults_to_company_wide_visibility() {
        let company = Uuid::new_v4();
        let a = actor(Role::User, Some(company));
        assert_eq!(
            plan_record_scope(&a, &ScopeParams::default()),
            ScopePlan::MembersOf(company)
        );
    }

    #[test]
    fn mine_only_narrows_to_created_by() {
        let a = actor(Role::User, Some(Uuid::new_v4()));
        let params = ScopeParams {
            mine_only: Some(true),
            ..Default::default()
        };
        assert_eq!(
            plan_record_scope(&a, &params),
            ScopePlan::Direct(RecordScope::CreatedBy(a.id))
        );
    }

    #[test]
    fn assigned_only_narrows_to_assigned_to() {
        let a = actor(Role::User, Some(Uuid::new_v4()));
        let params = ScopeParams {
            assigned_only: Some(true),
            ..Default::default()
        };
        assert_eq!(
            plan_record_scope(&a, &params),
            ScopePlan::Direct(RecordScope::AssignedTo(a.id))
        );
    }

    #[test]
    fn scope_override_beats_narrowing_flags() {
        let a = actor(Role::User, Some(Uuid::new_v4()));
        let params = ScopeParams {
            scope: Some(SCOPE_MINE_OR_ASSIGNED.to_string()),
            mine_only: Some(true),
            assigned_only: Some(true),
            ..Default::default()
        };
        assert_eq!(
            plan_record_scope(&a, &params),
            ScopePlan::Direct(RecordScope::MineOrAssigned(a.id))
        );
    }

    #[test]
    fn scope_override_applies_to_admins_too() {
        let a = actor(Role::Admin, Some(Uuid::new_v4()));
        assert_eq!(
            plan_record_scope(&a, &mine_or_assigned_params()),
            ScopePlan::Direct(RecordScope::MineOrAssigned(a.id))
        );
    }

    #[test]
    fn empty_member_set_short_circuits_to_deny() {
        assert_eq!(scope_from_members(vec![]), RecordScope::Deny);
        let id = Uuid::new_v4();
        assert_eq!(
            scope_from_members(vec![id]),
            RecordScope::CreatedByAnyOf(vec![id])
        );
    }

    #[test]
    fn ordinary_users_cannot_list_profiles() {
        let a = actor(Role::User, Some(Uuid::new_v4()));
        assert_eq!(profile_scope(&a, None), ProfileScope::Deny);
        assert_eq!(profile_scope(&a, Some(Uuid::new_v4())), ProfileScope::Deny);
    }

    #[test]
    fn admin_lists_only_own_company() {
        let company = Uuid::new_v4();
        let a = actor(Role::Admin, Some(company));
        // A requested company id is ignored for Admins.
        assert_eq!(
            profile_scope(&a, Some(Uuid::new_v4())),
            ProfileScope::Company(company)
        );
    }

    #[test]
    fn superadmin_lists_all_or_one_company() {
        let a = actor(Role::Superadmin, None);
        assert_eq!(profile_scope(&a, None), ProfileScope::All);
        let company = Uuid::new_v4();
        assert_eq!(
            profile_scope(&a, Some(company)),
            ProfileScope::Company(company)
        );
    }

    #[test]
    fn superadmins_never_receive_alerts() {
        let a = actor(Role::Superadmin, None);
        assert_eq!(alert_plan(&a), ScopePlan::Direct(RecordScope::Deny));
    }

    #[test]
    fn alert_scope_per_role() {
        let company = Uuid::new_v4();
        let admin = actor(Role::Admin, Some(company));
        assert_eq!(alert_plan(&admin), ScopePlan::MembersOf(company));
        let user = actor(Role::User, Some(company));
        assert_eq!(
            alert_plan(&user),
            ScopePlan::Direct(RecordScope::MineOrAssigned(user.id))
        );
    }
}
