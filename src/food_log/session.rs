//! Per-entry editing session.
//!
//! A session holds a working copy of one persisted entry. Local edits make it
//! dirty; while dirty, upstream changes to the persisted entry are not copied
//! in. It ends with [`EditSession::commit`] or [`EditSession::discard`].

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::InvalidImage;
use crate::estimation::{EstimationRequest, EstimationResult};
use crate::food_log::entry::{EntryState, FoodComponent, FoodLogEntry, NutrientField};
use crate::food_log::reconcile::reconcile;

/// Target slot of a component edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentIndex {
    New,
    At(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "component", rename_all = "snake_case")]
pub enum ComponentEditAction {
    Save(FoodComponent),
    Delete,
}

/// An ingredient edit produced outside the session, e.g. by an ingredient editor screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingComponentEdit {
    pub log_id: String,
    pub index: ComponentIndex,
    pub action: ComponentEditAction,
}

impl PendingComponentEdit {
    pub fn save(log_id: impl Into<String>, index: ComponentIndex, component: FoodComponent) -> Self {
        Self {
            log_id: log_id.into(),
            index,
            action: ComponentEditAction::Save(component),
        }
    }

    pub fn delete(log_id: impl Into<String>, index: usize) -> Self {
        Self {
            log_id: log_id.into(),
            index: ComponentIndex::At(index),
            action: ComponentEditAction::Delete,
        }
    }
}

type ComponentChangeHook = Box<dyn FnMut(&[FoodComponent]) + Send>;

pub struct EditSession {
    persisted: FoodLogEntry,
    edited_entry: FoodLogEntry,
    is_dirty: bool,
    has_unsaved_changes: bool,
    changes_count: u32,
    has_reestimated: bool,
    on_component_change: Option<ComponentChangeHook>,
}

impl fmt::Debug for EditSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditSession")
            .field("log_id", &self.edited_entry.id)
            .field("state", &self.edited_entry.state)
            .field("is_dirty", &self.is_dirty)
            .field("has_unsaved_changes", &self.has_unsaved_changes)
            .field("changes_count", &self.changes_count)
            .field("has_reestimated", &self.has_reestimated)
            .finish_non_exhaustive()
    }
}

impl EditSession {
    /// Opens a session on a persisted entry. An entry flagged for review starts
    /// dirty, since the review has to be acknowledged first.
    pub fn open(persisted: FoodLogEntry) -> Self {
        let mut session = Self {
            edited_entry: persisted.clone(),
            persisted,
            is_dirty: false,
            has_unsaved_changes: false,
            changes_count: 0,
            has_reestimated: false,
            on_component_change: None,
        };
        session.force_dirty_if_review_pending();
        session
    }

    /// Registers the callback fired after every structural component change.
    pub fn with_component_change_hook(
        mut self,
        hook: impl FnMut(&[FoodComponent]) + Send + 'static,
    ) -> Self {
        self.on_component_change = Some(Box::new(hook));
        self
    }

    pub fn log_id(&self) -> &str {
        &self.edited_entry.id
    }

    pub fn edited_entry(&self) -> &FoodLogEntry {
        &self.edited_entry
    }

    pub fn state(&self) -> EntryState {
        self.edited_entry.state
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.has_unsaved_changes
    }

    pub fn changes_count(&self) -> u32 {
        self.changes_count
    }

    pub fn has_reestimated(&self) -> bool {
        self.has_reestimated
    }

    fn force_dirty_if_review_pending(&mut self) {
        if self.edited_entry.needs_user_review {
            debug!(log_id = %self.edited_entry.id, "Entry needs review, session starts dirty");
            self.is_dirty = true;
            self.has_unsaved_changes = true;
            self.edited_entry.state = EntryState::Dirty;
        }
    }

    fn mark_dirty(&mut self) {
        if !self.is_dirty {
            debug!(log_id = %self.edited_entry.id, "Session became dirty");
        }
        self.is_dirty = true;
        self.has_unsaved_changes = true;
        self.changes_count += 1;
        self.edited_entry.state = EntryState::Dirty;
    }

    /// Copies a newer persisted entry into the session unless local edits are pending.
    ///
    /// Returns whether the working copy was reseeded.
    pub fn sync_upstream(&mut self, upstream: &FoodLogEntry) -> bool {
        self.persisted = upstream.clone();
        if self.is_dirty {
            debug!(log_id = %upstream.id, "Ignoring upstream change, session is dirty");
            return false;
        }
        self.edited_entry = upstream.clone();
        self.force_dirty_if_review_pending();
        true
    }

    pub fn update_title(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.edited_entry.user_supplied.title = Some(text.clone());
        self.edited_entry.title = text;
        self.mark_dirty();
    }

    /// Records a nutrient typed by the user; it outranks any later estimate.
    pub fn override_nutrient(&mut self, field: NutrientField, value: f32) {
        let value = value.max(0.0);
        self.edited_entry.user_supplied.set(field, Some(value));
        self.edited_entry.set_nutrient(field, value);
        self.mark_dirty();
    }

    /// Applies a structural change to the component list.
    ///
    /// Any such change makes the nutrition totals stale, so the change hook fires.
    pub fn update_components(&mut self, updater: impl FnOnce(&mut Vec<FoodComponent>)) {
        updater(&mut self.edited_entry.food_components);
        self.mark_dirty();
        if let Some(hook) = self.on_component_change.as_mut() {
            hook(&self.edited_entry.food_components);
        }
    }

    /// Removes a component. Stale indices are a no-op and return `false`.
    pub fn delete_component(&mut self, index: usize) -> bool {
        if index >= self.edited_entry.food_components.len() {
            debug!(log_id = %self.edited_entry.id, index, "Delete for missing component ignored");
            return false;
        }
        self.update_components(|components| {
            components.remove(index);
        });
        true
    }

    /// Replaces a component's amount and unit with its recommended measurement.
    pub fn accept_recommendation(&mut self, index: usize) -> bool {
        let recommendation = self
            .edited_entry
            .food_components
            .get(index)
            .and_then(|component| component.recommended_measurement);
        let Some(measurement) = recommendation else {
            debug!(log_id = %self.edited_entry.id, index, "No recommendation to accept");
            return false;
        };
        self.update_components(|components| {
            let component = &mut components[index];
            component.amount = measurement.amount;
            component.unit = measurement.unit;
            component.recommended_measurement = None;
        });
        true
    }

    /// Applies an edit addressed to this session's entry.
    ///
    /// Consuming the edit is what clears it. An edit for another entry is handed
    /// back unapplied; a stale index is consumed without effect and yields `Ok(false)`.
    pub fn apply_pending_component_edit(
        &mut self,
        edit: PendingComponentEdit,
    ) -> Result<bool, PendingComponentEdit> {
        if edit.log_id != self.edited_entry.id {
            return Err(edit);
        }

        let len = self.edited_entry.food_components.len();
        match (edit.index, edit.action) {
            (ComponentIndex::New, ComponentEditAction::Save(mut component)) => {
                component.recommended_measurement = None;
                self.update_components(|components| components.push(component));
                Ok(true)
            }
            (ComponentIndex::At(index), ComponentEditAction::Save(mut component)) if index < len => {
                component.recommended_measurement = None;
                self.update_components(|components| components[index] = component);
                Ok(true)
            }
            (ComponentIndex::At(index), ComponentEditAction::Delete) => Ok(self.delete_component(index)),
            (index, action) => {
                debug!(log_id = %edit.log_id, ?index, ?action, "Pending component edit had nothing to apply");
                Ok(false)
            }
        }
    }

    /// Enters `AwaitingReestimate` and returns the inputs for the estimator.
    pub fn request_reestimate(&mut self) -> EstimationRequest {
        self.edited_entry.state = EntryState::AwaitingReestimate;
        info!(log_id = %self.edited_entry.id, changes = self.changes_count, "Re-estimation requested");
        EstimationRequest::from_entry(&self.edited_entry)
    }

    /// Leaves `AwaitingReestimate` after a failed call, keeping every local edit.
    pub fn reestimate_failed(&mut self) {
        warn!(log_id = %self.edited_entry.id, "Re-estimation failed, keeping local edits");
        self.edited_entry.state = if self.is_dirty {
            EntryState::Dirty
        } else {
            self.persisted.state
        };
    }

    /// Reconciles a fresh estimate into the working copy and marks it re-estimated.
    ///
    /// # Errors
    /// Returns [`InvalidImage`] and keeps the edits when the estimator refused the image.
    pub fn apply_reestimate(&mut self, result: &EstimationResult) -> Result<(), InvalidImage> {
        match reconcile(&self.edited_entry, result) {
            Ok(merged) => {
                self.edited_entry = merged;
                self.mark_reestimated();
                Ok(())
            }
            Err(invalid) => {
                self.reestimate_failed();
                Err(invalid)
            }
        }
    }

    /// Called once a new estimate has been reconciled into the working copy.
    pub fn mark_reestimated(&mut self) {
        self.is_dirty = false;
        self.changes_count = 0;
        self.has_reestimated = true;
        if matches!(
            self.edited_entry.state,
            EntryState::Dirty | EntryState::AwaitingReestimate
        ) {
            self.edited_entry.state = EntryState::Estimated;
        }
    }

    /// Ends the session, returning the entry to persist.
    ///
    /// Editing states do not outlive the session: the entry goes back to
    /// `Estimated` if an estimate ever landed, otherwise to `Draft`.
    pub fn commit(self) -> FoodLogEntry {
        let mut entry = self.edited_entry;
        entry.needs_user_review = false;
        if matches!(entry.state, EntryState::Dirty | EntryState::AwaitingReestimate) {
            entry.state = entry.settled_state();
        }
        info!(log_id = %entry.id, state = ?entry.state, "Edit session committed");
        entry
    }

    /// Ends the session without keeping local edits.
    pub fn discard(self) -> FoodLogEntry {
        info!(log_id = %self.persisted.id, changes = self.changes_count, "Edit session discarded");
        self.persisted
    }
}
