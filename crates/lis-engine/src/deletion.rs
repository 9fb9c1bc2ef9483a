//! Guarded deletion of hierarchy nodes
//!
//! ```text
//! Idle → CheckingConstraints → Deletable ─────────────────────────────┐
//!                            ↘ Blocked → FetchingCascadeSummary        │ acknowledge
//!                                       → CascadeConfirmable ──────────┤
//!                                                                      ↓
//!                                              Confirmed → Deleting → Deleted
//! ```
//!
//! - A blocked node offers a cascade path only when the actor is an
//!   administrator *and* the server's `isAdmin` flag agrees
//! - Both confirm paths need an explicit acknowledgement
//! - A failed delete returns to the last stable state with an error message

use crate::api::{CanDeleteResponse, CascadeSummary, StorageApi};
use crate::error::{ApiError, DeletionError, EngineError};
use crate::scope::ViewScope;
use lis_model::{LocationType, NodeId};
use std::fmt;
use std::sync::Arc;

/// Shown when a 403 carries no message
pub const FORBIDDEN_FALLBACK: &str = "Only Global Administrators can delete locations";
/// Shown when a delete fails for any other reason
pub const DELETE_FAILED_MESSAGE: &str = "Failed to delete location";
/// Shown when a location check blocks without a message
pub const CANNOT_DELETE_FALLBACK: &str = "Cannot delete location";
/// Shown when a box check blocks without a message
pub const BOX_BLOCKED_FALLBACK: &str = "This box cannot be deleted.";
/// Shown when a DELETE is refused with 409 and no message
pub const CONSTRAINT_CONFLICT_MESSAGE: &str = "Cannot delete location due to constraints";
/// Shown when a box check fails and the box is treated as blocked
pub const CHECK_FAILED_MESSAGE: &str = "Unable to verify deletion constraints";

/// Phase of a deletion workflow, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionPhase {
    Idle,
    CheckingConstraints,
    Deletable,
    Blocked,
    FetchingCascadeSummary,
    CascadeConfirmable,
    Confirmed,
    Deleting,
    Deleted,
}

impl DeletionPhase {
    /// Lowercase name for messages
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CheckingConstraints => "checking constraints",
            Self::Deletable => "deletable",
            Self::Blocked => "blocked",
            Self::FetchingCascadeSummary => "fetching cascade summary",
            Self::CascadeConfirmable => "awaiting cascade confirmation",
            Self::Confirmed => "confirmed",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for DeletionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phases reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: DeletionPhase) -> Vec<DeletionPhase> {
    use DeletionPhase::*;
    match from {
        Idle => vec![CheckingConstraints],
        CheckingConstraints => vec![Deletable, Blocked, Idle],
        Deletable => vec![Confirmed, Idle],
        Blocked => vec![FetchingCascadeSummary, Idle],
        FetchingCascadeSummary => vec![CascadeConfirmable, Blocked, Idle],
        CascadeConfirmable => vec![Confirmed, Idle],
        Confirmed => vec![Deleting, Idle],
        Deleting => vec![Deleted, Blocked, Deletable, CascadeConfirmable],
        Deleted => vec![Idle],
    }
}

/// Check a phase change against [`allowed_transitions`]
///
/// Staying in the same phase is always allowed.
///
/// # Errors
/// `DeletionError::IllegalTransition` naming both ends
pub fn validate_transition(from: DeletionPhase, to: DeletionPhase) -> Result<(), DeletionError> {
    if from == to || allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(DeletionError::IllegalTransition {
            state: from.as_str(),
            event: to.as_str(),
        })
    }
}

/// What to assume when the `can-delete` check itself fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckFailurePolicy {
    /// Let the DELETE re-validate server-side
    AssumeDeletable,
    /// Refuse until a check succeeds
    AssumeBlocked,
}

impl CheckFailurePolicy {
    /// Policy used for a location type
    #[must_use]
    pub fn for_kind(kind: LocationType) -> Self {
        match kind {
            LocationType::Box => Self::AssumeBlocked,
            _ => Self::AssumeDeletable,
        }
    }
}

fn blocked_fallback(kind: LocationType) -> &'static str {
    match kind {
        LocationType::Box => BOX_BLOCKED_FALLBACK,
        _ => CANNOT_DELETE_FALLBACK,
    }
}

/// Workflow state with payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionState {
    Idle,
    CheckingConstraints,
    Deletable {
        acknowledged: bool,
    },
    Blocked {
        message: String,
        server_admin: bool,
    },
    FetchingCascadeSummary {
        message: String,
    },
    CascadeConfirmable {
        message: String,
        summary: CascadeSummary,
        acknowledged: bool,
    },
    Confirmed {
        cascade: bool,
    },
    Deleting {
        cascade: bool,
    },
    Deleted,
}

impl DeletionState {
    /// Payload-free phase
    #[must_use]
    pub fn phase(&self) -> DeletionPhase {
        match self {
            Self::Idle => DeletionPhase::Idle,
            Self::CheckingConstraints => DeletionPhase::CheckingConstraints,
            Self::Deletable { .. } => DeletionPhase::Deletable,
            Self::Blocked { .. } => DeletionPhase::Blocked,
            Self::FetchingCascadeSummary { .. } => DeletionPhase::FetchingCascadeSummary,
            Self::CascadeConfirmable { .. } => DeletionPhase::CascadeConfirmable,
            Self::Confirmed { .. } => DeletionPhase::Confirmed,
            Self::Deleting { .. } => DeletionPhase::Deleting,
            Self::Deleted => DeletionPhase::Deleted,
        }
    }
}

/// Operator and server inputs to the workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionEvent {
    /// Dialog opened; the check starts
    Open,
    /// `can-delete` answered (200 or a folded 409)
    CheckCompleted(CanDeleteResponse),
    /// `can-delete` failed outright
    CheckFailed(String),
    /// Fetch the cascade summary for a blocked node
    SummaryRequested,
    /// Cascade summary arrived
    SummaryLoaded(CascadeSummary),
    /// Cascade summary unavailable
    SummaryFailed,
    /// Acknowledgement checkbox toggled
    Acknowledge(bool),
    /// Confirm button pressed
    Confirm,
    /// DELETE sent
    DeleteStarted,
    /// 204 or other 2xx
    DeleteSucceeded,
    /// 403, with the server's message if any
    DeleteForbidden(Option<String>),
    /// 409 with the constraint message
    DeleteConflict(String),
    /// Any other failure
    DeleteFailed,
    /// Dialog closed
    Cancel,
}

impl DeletionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::CheckCompleted(_) => "check completed",
            Self::CheckFailed(_) => "check failed",
            Self::SummaryRequested => "cascade summary request",
            Self::SummaryLoaded(_) => "cascade summary",
            Self::SummaryFailed => "cascade summary failure",
            Self::Acknowledge(_) => "acknowledge",
            Self::Confirm => "confirm",
            Self::DeleteStarted => "delete",
            Self::DeleteSucceeded => "delete success",
            Self::DeleteForbidden(_) => "delete forbidden",
            Self::DeleteConflict(_) => "delete conflict",
            Self::DeleteFailed => "delete failure",
            Self::Cancel => "cancel",
        }
    }
}

/// Actions the dialog may offer in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionAction {
    Cancel,
    Acknowledge,
    Confirm,
    ViewCascadeSummary,
}

/// Deletion workflow for one node
#[derive(Debug, Clone)]
pub struct DeletionGuard {
    kind: LocationType,
    id: NodeId,
    actor_admin: bool,
    server_admin: bool,
    policy: CheckFailurePolicy,
    state: DeletionState,
    stable: DeletionState,
    error: Option<String>,
}

impl DeletionGuard {
    /// Guard for `kind/id` on behalf of an actor
    #[must_use]
    pub fn new(kind: LocationType, id: impl Into<NodeId>, actor_admin: bool) -> Self {
        Self {
            kind,
            id: id.into(),
            actor_admin,
            server_admin: false,
            policy: CheckFailurePolicy::for_kind(kind),
            state: DeletionState::Idle,
            stable: DeletionState::Idle,
            error: None,
        }
    }

    /// With explicit check-failure policy
    #[must_use]
    pub fn with_policy(mut self, policy: CheckFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Location type
    #[must_use]
    pub fn kind(&self) -> LocationType {
        self.kind
    }

    /// Node id
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &DeletionState {
        &self.state
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> DeletionPhase {
        self.state.phase()
    }

    /// Error from the last failed delete, if any
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Constraint message while blocked or confirming a cascade
    #[must_use]
    pub fn constraint_message(&self) -> Option<&str> {
        match &self.state {
            DeletionState::Blocked { message, .. }
            | DeletionState::FetchingCascadeSummary { message }
            | DeletionState::CascadeConfirmable { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether a blocked node may take the cascade path
    #[must_use]
    pub fn can_request_summary(&self) -> bool {
        matches!(&self.state, DeletionState::Blocked { server_admin: true, .. }) && self.actor_admin
    }

    /// Whether the confirm button is enabled
    #[must_use]
    pub fn can_confirm(&self) -> bool {
        matches!(
            self.state,
            DeletionState::Deletable { acknowledged: true }
                | DeletionState::CascadeConfirmable { acknowledged: true, .. }
        )
    }

    /// Actions to render
    #[must_use]
    pub fn available_actions(&self) -> Vec<DeletionAction> {
        let mut actions = Vec::new();
        match &self.state {
            DeletionState::Deletable { .. } | DeletionState::CascadeConfirmable { .. } => {
                actions.push(DeletionAction::Acknowledge);
                actions.push(DeletionAction::Confirm);
            }
            DeletionState::Blocked { .. } if self.can_request_summary() => {
                actions.push(DeletionAction::ViewCascadeSummary);
            }
            _ => {}
        }
        if self.phase() != DeletionPhase::Deleting {
            actions.push(DeletionAction::Cancel);
        }
        actions
    }

    /// Apply an event
    ///
    /// The state is left untouched on error.
    ///
    /// # Errors
    /// - `DeletionError::IllegalTransition` when the event does not apply
    /// - `DeletionError::NotAcknowledged` when confirming without the checkbox
    /// - `DeletionError::Blocked` when confirming a blocked node
    pub fn apply(&mut self, event: DeletionEvent) -> Result<(), DeletionError> {
        let illegal = |state: &DeletionState, event: &DeletionEvent| DeletionError::IllegalTransition {
            state: state.phase().as_str(),
            event: event.name(),
        };

        let next = match (&self.state, &event) {
            (DeletionState::Deleting { .. }, DeletionEvent::Cancel) => {
                return Err(illegal(&self.state, &event));
            }
            (_, DeletionEvent::Cancel) => DeletionState::Idle,

            (DeletionState::Idle, DeletionEvent::Open) => DeletionState::CheckingConstraints,

            (DeletionState::CheckingConstraints, DeletionEvent::CheckCompleted(response)) => {
                if response.is_blocked(self.kind) {
                    DeletionState::Blocked {
                        message: response.reason().unwrap_or(blocked_fallback(self.kind)).to_string(),
                        server_admin: response.is_admin,
                    }
                } else {
                    DeletionState::Deletable { acknowledged: false }
                }
            }
            (DeletionState::CheckingConstraints, DeletionEvent::CheckFailed(message)) => match self.policy {
                CheckFailurePolicy::AssumeDeletable => DeletionState::Deletable { acknowledged: false },
                CheckFailurePolicy::AssumeBlocked => DeletionState::Blocked {
                    message: message.clone(),
                    server_admin: false,
                },
            },

            (DeletionState::Blocked { message, .. }, DeletionEvent::SummaryRequested)
                if self.can_request_summary() =>
            {
                DeletionState::FetchingCascadeSummary {
                    message: message.clone(),
                }
            }
            (DeletionState::FetchingCascadeSummary { message }, DeletionEvent::SummaryLoaded(summary)) => {
                DeletionState::CascadeConfirmable {
                    message: message.clone(),
                    summary: summary.clone(),
                    acknowledged: false,
                }
            }
            (DeletionState::FetchingCascadeSummary { message }, DeletionEvent::SummaryFailed) => {
                DeletionState::Blocked {
                    message: message.clone(),
                    server_admin: false,
                }
            }

            (DeletionState::Deletable { .. }, DeletionEvent::Acknowledge(ack)) => {
                DeletionState::Deletable { acknowledged: *ack }
            }
            (DeletionState::CascadeConfirmable { message, summary, .. }, DeletionEvent::Acknowledge(ack)) => {
                DeletionState::CascadeConfirmable {
                    message: message.clone(),
                    summary: summary.clone(),
                    acknowledged: *ack,
                }
            }

            (DeletionState::Deletable { acknowledged }, DeletionEvent::Confirm) => {
                if !acknowledged {
                    return Err(DeletionError::NotAcknowledged);
                }
                DeletionState::Confirmed { cascade: false }
            }
            (DeletionState::CascadeConfirmable { acknowledged, .. }, DeletionEvent::Confirm) => {
                if !acknowledged {
                    return Err(DeletionError::NotAcknowledged);
                }
                DeletionState::Confirmed { cascade: true }
            }
            (DeletionState::Blocked { message, .. }, DeletionEvent::Confirm) => {
                return Err(DeletionError::Blocked(message.clone()));
            }

            (DeletionState::Confirmed { cascade }, DeletionEvent::DeleteStarted) => {
                DeletionState::Deleting { cascade: *cascade }
            }
            (DeletionState::Deleting { .. }, DeletionEvent::DeleteSucceeded) => DeletionState::Deleted,
            (DeletionState::Deleting { .. }, DeletionEvent::DeleteForbidden(message)) => DeletionState::Blocked {
                message: message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| FORBIDDEN_FALLBACK.to_string()),
                server_admin: false,
            },
            (DeletionState::Deleting { .. }, DeletionEvent::DeleteConflict(message)) => DeletionState::Blocked {
                message: message.clone(),
                server_admin: self.server_admin,
            },
            (DeletionState::Deleting { .. }, DeletionEvent::DeleteFailed) => self.stable.clone(),

            _ => return Err(illegal(&self.state, &event)),
        };

        validate_transition(self.phase(), next.phase())?;
        match &event {
            DeletionEvent::Open | DeletionEvent::CheckFailed(_) => self.server_admin = false,
            DeletionEvent::CheckCompleted(response) => self.server_admin = response.is_admin,
            _ => {}
        }
        self.error = match &event {
            DeletionEvent::DeleteFailed => Some(DELETE_FAILED_MESSAGE.to_string()),
            DeletionEvent::Acknowledge(_) | DeletionEvent::Confirm | DeletionEvent::DeleteStarted => {
                self.error.take()
            }
            _ => None,
        };
        if matches!(
            next,
            DeletionState::Deletable { .. } | DeletionState::CascadeConfirmable { .. }
        ) {
            self.stable = next.clone();
        }
        self.state = next;
        Ok(())
    }
}

/// Final result of a delete attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// Node removed; listings and metrics must be refreshed
    Deleted,
    /// Server refused with a constraint or privilege message
    Blocked(String),
    /// Generic failure; the confirm state is kept for a manual retry
    Failed(String),
}

/// Async driver for a [`DeletionGuard`]
pub struct DeletionWorkflow {
    api: Arc<dyn StorageApi>,
    scope: ViewScope,
}

impl DeletionWorkflow {
    /// Create a workflow bound to a view scope
    #[must_use]
    pub fn new(api: Arc<dyn StorageApi>, scope: ViewScope) -> Self {
        Self { api, scope }
    }

    /// Run the constraint check, and the cascade summary when permitted
    ///
    /// # Errors
    /// - `EngineError::Deletion` if the guard is not idle
    /// - `EngineError::Stale` if the view closed meanwhile
    pub async fn check(&self, guard: &mut DeletionGuard) -> Result<(), EngineError> {
        guard.apply(DeletionEvent::Open)?;
        let ticket = self.scope.ticket();
        let result = self.api.can_delete(guard.kind(), guard.id()).await;
        let result = ticket.accept(result)?;

        match result {
            Ok(response) => {
                tracing::info!(
                    kind = %guard.kind(),
                    id = %guard.id(),
                    can_delete = ?response.can_delete,
                    is_admin = response.is_admin,
                    "deletion constraints checked"
                );
                guard.apply(DeletionEvent::CheckCompleted(response))?;
            }
            Err(e) => {
                tracing::warn!(kind = %guard.kind(), id = %guard.id(), error = %e, "constraint check failed");
                guard.apply(DeletionEvent::CheckFailed(e.user_message(CHECK_FAILED_MESSAGE)))?;
            }
        }

        if guard.can_request_summary() {
            self.fetch_summary(guard).await?;
        }
        Ok(())
    }

    /// Fetch the cascade summary for a blocked node
    ///
    /// A failed fetch leaves the node blocked without a cascade path.
    ///
    /// # Errors
    /// - `EngineError::Deletion` if the actor has no cascade path
    /// - `EngineError::Stale` if the view closed meanwhile
    pub async fn fetch_summary(&self, guard: &mut DeletionGuard) -> Result<(), EngineError> {
        guard.apply(DeletionEvent::SummaryRequested)?;
        let ticket = self.scope.ticket();
        let result = self.api.cascade_delete_summary(guard.kind(), guard.id()).await;
        match ticket.accept(result)? {
            Ok(summary) => {
                tracing::info!(
                    kind = %guard.kind(),
                    id = %guard.id(),
                    children = summary.child_location_count,
                    samples = summary.sample_count,
                    "cascade summary loaded"
                );
                guard.apply(DeletionEvent::SummaryLoaded(summary))?;
            }
            Err(e) => {
                tracing::warn!(kind = %guard.kind(), id = %guard.id(), error = %e, "cascade summary unavailable");
                guard.apply(DeletionEvent::SummaryFailed)?;
            }
        }
        Ok(())
    }

    /// Send the DELETE for a confirmed guard
    ///
    /// # Errors
    /// - `EngineError::Deletion` if the guard is not confirmed
    /// - `EngineError::Stale` if the view closed meanwhile
    pub async fn delete(&self, guard: &mut DeletionGuard) -> Result<DeletionOutcome, EngineError> {
        guard.apply(DeletionEvent::DeleteStarted)?;
        let ticket = self.scope.ticket();
        let result = self.api.delete_location(guard.kind(), guard.id()).await;
        let result = ticket.accept(result)?;

        let outcome = match result {
            Ok(()) => {
                guard.apply(DeletionEvent::DeleteSucceeded)?;
                tracing::info!(kind = %guard.kind(), id = %guard.id(), "location deleted");
                DeletionOutcome::Deleted
            }
            Err(ApiError::Forbidden(body)) => {
                guard.apply(DeletionEvent::DeleteForbidden(body.text().map(str::to_string)))?;
                DeletionOutcome::Blocked(guard.constraint_message().unwrap_or(FORBIDDEN_FALLBACK).to_string())
            }
            Err(ApiError::Conflict(body)) => {
                let message = body.text_or(CONSTRAINT_CONFLICT_MESSAGE);
                guard.apply(DeletionEvent::DeleteConflict(message.clone()))?;
                DeletionOutcome::Blocked(message)
            }
            Err(e) => {
                tracing::error!(kind = %guard.kind(), id = %guard.id(), error = %e, "delete failed");
                guard.apply(DeletionEvent::DeleteFailed)?;
                DeletionOutcome::Failed(DELETE_FAILED_MESSAGE.to_string())
            }
        };

        if let DeletionOutcome::Blocked(message) = &outcome {
            tracing::warn!(kind = %guard.kind(), id = %guard.id(), %message, "delete refused");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocked_response(is_admin: bool) -> CanDeleteResponse {
        CanDeleteResponse {
            can_delete: Some(false),
            is_admin,
            error: Some("Cannot delete room".into()),
            message: Some("Cannot delete room: contains 8 device(s)".into()),
        }
    }

    fn summary() -> CascadeSummary {
        CascadeSummary {
            child_location_count: 8,
            child_location_type: "device".into(),
            sample_count: 40,
        }
    }

    #[test]
    fn transition_table() {
        assert!(validate_transition(DeletionPhase::Idle, DeletionPhase::CheckingConstraints).is_ok());
        assert!(validate_transition(DeletionPhase::Blocked, DeletionPhase::Deleting).is_err());
        assert!(validate_transition(DeletionPhase::Deletable, DeletionPhase::Deleting).is_err());
        assert!(allowed_transitions(DeletionPhase::Deleting).contains(&DeletionPhase::Deleted));
    }

    #[test]
    fn unconstrained_node_needs_acknowledgement() {
        let mut guard = DeletionGuard::new(LocationType::Shelf, 20u64, false);
        guard.apply(DeletionEvent::Open).unwrap();
        guard
            .apply(DeletionEvent::CheckCompleted(CanDeleteResponse::deletable(false)))
            .unwrap();
        assert!(!guard.can_confirm());
        assert_eq!(guard.apply(DeletionEvent::Confirm), Err(DeletionError::NotAcknowledged));

        guard.apply(DeletionEvent::Acknowledge(true)).unwrap();
        guard.apply(DeletionEvent::Confirm).unwrap();
        assert_eq!(guard.state(), &DeletionState::Confirmed { cascade: false });
    }

    #[test]
    fn non_admin_blocked_has_only_cancel() {
        let mut guard = DeletionGuard::new(LocationType::Room, 1u64, false);
        guard.apply(DeletionEvent::Open).unwrap();
        guard.apply(DeletionEvent::CheckCompleted(blocked_response(false))).unwrap();

        assert_eq!(guard.constraint_message(), Some("Cannot delete room: contains 8 device(s)"));
        assert_eq!(guard.available_actions(), vec![DeletionAction::Cancel]);
        assert!(guard.apply(DeletionEvent::SummaryRequested).is_err());
        assert!(matches!(guard.apply(DeletionEvent::Confirm), Err(DeletionError::Blocked(_))));
        assert!(guard.apply(DeletionEvent::DeleteStarted).is_err());
        assert_eq!(guard.phase(), DeletionPhase::Blocked);
    }

    #[test]
    fn admin_needs_server_flag_for_cascade() {
        let mut guard = DeletionGuard::new(LocationType::Room, 1u64, true);
        guard.apply(DeletionEvent::Open).unwrap();
        guard.apply(DeletionEvent::CheckCompleted(blocked_response(false))).unwrap();
        assert!(!guard.can_request_summary());
    }

    #[test]
    fn admin_cascade_path() {
        let mut guard = DeletionGuard::new(LocationType::Room, 1u64, true);
        guard.apply(DeletionEvent::Open).unwrap();
        guard.apply(DeletionEvent::CheckCompleted(blocked_response(true))).unwrap();
        assert_eq!(
            guard.available_actions(),
            vec![DeletionAction::ViewCascadeSummary, DeletionAction::Cancel]
        );
        guard.apply(DeletionEvent::SummaryRequested).unwrap();
        guard.apply(DeletionEvent::SummaryLoaded(summary())).unwrap();
        assert_eq!(guard.phase(), DeletionPhase::CascadeConfirmable);
        assert_eq!(guard.apply(DeletionEvent::Confirm), Err(DeletionError::NotAcknowledged));

        guard.apply(DeletionEvent::Acknowledge(true)).unwrap();
        guard.apply(DeletionEvent::Confirm).unwrap();
        guard.apply(DeletionEvent::DeleteStarted).unwrap();
        assert_eq!(guard.available_actions(), Vec::<DeletionAction>::new());
        guard.apply(DeletionEvent::DeleteSucceeded).unwrap();
        assert_eq!(guard.phase(), DeletionPhase::Deleted);
    }

    #[test]
    fn summary_failure_stays_blocked() {
        let mut guard = DeletionGuard::new(LocationType::Room, 1u64, true);
        guard.apply(DeletionEvent::Open).unwrap();
        guard.apply(DeletionEvent::CheckCompleted(blocked_response(true))).unwrap();
        guard.apply(DeletionEvent::SummaryRequested).unwrap();
        guard.apply(DeletionEvent::SummaryFailed).unwrap();
        assert_eq!(guard.phase(), DeletionPhase::Blocked);
        assert!(!guard.can_request_summary());
    }

    #[test]
    fn check_failure_policies() {
        let mut location = DeletionGuard::new(LocationType::Device, 4u64, false);
        location.apply(DeletionEvent::Open).unwrap();
        location.apply(DeletionEvent::CheckFailed("timeout".into())).unwrap();
        assert_eq!(location.phase(), DeletionPhase::Deletable);

        let mut storage_box = DeletionGuard::new(LocationType::Box, 4u64, false);
        storage_box.apply(DeletionEvent::Open).unwrap();
        storage_box.apply(DeletionEvent::CheckFailed("timeout".into())).unwrap();
        assert_eq!(storage_box.phase(), DeletionPhase::Blocked);
    }

    fn confirmed(admin: bool) -> DeletionGuard {
        let mut guard = DeletionGuard::new(LocationType::Rack, 3u64, admin);
        guard.apply(DeletionEvent::Open).unwrap();
        guard
            .apply(DeletionEvent::CheckCompleted(CanDeleteResponse::deletable(admin)))
            .unwrap();
        guard.apply(DeletionEvent::Acknowledge(true)).unwrap();
        guard.apply(DeletionEvent::Confirm).unwrap();
        guard.apply(DeletionEvent::DeleteStarted).unwrap();
        guard
    }

    #[test]
    fn forbidden_uses_fallback_message() {
        let mut guard = confirmed(false);
        guard.apply(DeletionEvent::DeleteForbidden(None)).unwrap();
        assert_eq!(guard.constraint_message(), Some(FORBIDDEN_FALLBACK));
    }

    #[test]
    fn generic_failure_restores_stable_state() {
        let mut guard = confirmed(false);
        guard.apply(DeletionEvent::DeleteFailed).unwrap();
        assert_eq!(guard.state(), &DeletionState::Deletable { acknowledged: true });
        assert_eq!(guard.error(), Some(DELETE_FAILED_MESSAGE));

        guard.apply(DeletionEvent::Confirm).unwrap();
        assert_eq!(guard.error(), Some(DELETE_FAILED_MESSAGE));
    }

    #[test]
    fn acknowledgement_toggles_in_place() {
        let mut guard = DeletionGuard::new(LocationType::Shelf, 20u64, false);
        guard.apply(DeletionEvent::Cancel).unwrap();
        assert_eq!(guard.phase(), DeletionPhase::Idle);

        guard.apply(DeletionEvent::Open).unwrap();
        guard
            .apply(DeletionEvent::CheckCompleted(CanDeleteResponse::deletable(false)))
            .unwrap();
        guard.apply(DeletionEvent::Acknowledge(true)).unwrap();
        assert!(guard.can_confirm());
        guard.apply(DeletionEvent::Acknowledge(false)).unwrap();
        assert!(!guard.can_confirm());
        assert_eq!(guard.state(), &DeletionState::Deletable { acknowledged: false });
        assert!(validate_transition(DeletionPhase::CascadeConfirmable, DeletionPhase::CascadeConfirmable).is_ok());
    }

    #[test]
    fn blocked_without_message_uses_fallback() {
        let mut rack = DeletionGuard::new(LocationType::Rack, 3u64, false);
        rack.apply(DeletionEvent::Open).unwrap();
        rack.apply(DeletionEvent::CheckCompleted(CanDeleteResponse {
            can_delete: Some(false),
            ..CanDeleteResponse::default()
        }))
        .unwrap();
        assert_eq!(rack.constraint_message(), Some(CANNOT_DELETE_FALLBACK));

        let mut storage_box = DeletionGuard::new(LocationType::Box, 9u64, false);
        storage_box.apply(DeletionEvent::Open).unwrap();
        storage_box
            .apply(DeletionEvent::CheckCompleted(CanDeleteResponse::default()))
            .unwrap();
        assert_eq!(storage_box.constraint_message(), Some(BOX_BLOCKED_FALLBACK));
    }

    #[test]
    fn plain_ok_answer_is_deletable_for_locations() {
        let mut shelf = DeletionGuard::new(LocationType::Shelf, 20u64, true);
        shelf.apply(DeletionEvent::Open).unwrap();
        shelf
            .apply(DeletionEvent::CheckCompleted(CanDeleteResponse {
                is_admin: true,
                ..CanDeleteResponse::default()
            }))
            .unwrap();
        assert_eq!(shelf.phase(), DeletionPhase::Deletable);
    }

    fn conflicted(actor_admin: bool, server_admin: bool) -> DeletionGuard {
        let mut guard = DeletionGuard::new(LocationType::Room, 1u64, actor_admin);
        guard.apply(DeletionEvent::Open).unwrap();
        guard
            .apply(DeletionEvent::CheckCompleted(CanDeleteResponse::deletable(server_admin)))
            .unwrap();
        guard.apply(DeletionEvent::Acknowledge(true)).unwrap();
        guard.apply(DeletionEvent::Confirm).unwrap();
        guard.apply(DeletionEvent::DeleteStarted).unwrap();
        guard
            .apply(DeletionEvent::DeleteConflict("Cannot delete room: contains 1 device(s)".into()))
            .unwrap();
        guard
    }

    #[test]
    fn conflict_keeps_server_admin_flag() {
        let refused = conflicted(true, false);
        assert_eq!(refused.phase(), DeletionPhase::Blocked);
        assert!(!refused.can_request_summary());

        let confirmed_by_server = conflicted(true, true);
        assert!(confirmed_by_server.can_request_summary());
    }

    #[test]
    fn cancel_not_allowed_mid_delete() {
        let mut guard = confirmed(false);
        assert!(guard.apply(DeletionEvent::Cancel).is_err());
        guard.apply(DeletionEvent::DeleteSucceeded).unwrap();
        guard.apply(DeletionEvent::Cancel).unwrap();
        assert_eq!(guard.phase(), DeletionPhase::Idle);
    }
}
