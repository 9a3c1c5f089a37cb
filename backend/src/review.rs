//! Administrator review flow.
//!
//! `ReviewBoard` is a snapshot of all registrations and field definitions.
//! Reads (filter, search, sort, counts) are served from the snapshot;
//! writes go to the store first and then patch the snapshot with what the
//! store returned.

use std::sync::Arc;

use portal_common::{
    FieldDefinition, FieldDefinitionPatch, NewFieldDefinition, Registration, RegistrationPatch,
    RegistrationStatus,
};
use serde::Serialize;

use crate::clock::Clock;
use crate::fields::{
    matches_search, merge_custom_values, sort_records, validate_definition_patch,
    validate_new_definition, FieldError, SortState, StatusFilter,
};
use crate::registration::validate_url;
use crate::store::{RecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Registration {0} was not found, reload the list")]
    NotFound(i64),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn not_found_as_review(id: i64) -> impl FnOnce(StoreError) -> ReviewError {
    move |e| match e {
        StoreError::NotFound(_) => ReviewError::NotFound(id),
        other => ReviewError::Store(other),
    }
}

/// Record counts shown above the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub banned: usize,
}

pub struct ReviewBoard {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    records: Vec<Registration>,
    definitions: Vec<FieldDefinition>,
}

impl ReviewBoard {
    /// Fetch records (newest first) and definitions.
    pub async fn load(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Result<Self, ReviewError> {
        let records = store.list_records().await?;
        let definitions = store.list_field_definitions().await?;
        tracing::debug!(
            "Loaded review board: {} records, {} field definitions",
            records.len(),
            definitions.len()
        );
        Ok(Self {
            store,
            clock,
            records,
            definitions,
        })
    }

    pub fn records(&self) -> &[Registration] {
        &self.records
    }

    pub fn definitions(&self) -> &[FieldDefinition] {
        &self.definitions
    }

    pub fn record(&self, id: i64) -> Option<&Registration> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Records passing the status filter and search term, in sort order.
    pub fn visible(&self, filter: StatusFilter, term: &str, sort: &SortState) -> Vec<Registration> {
        let mut rows: Vec<Registration> = self
            .records
            .iter()
            .filter(|r| filter.matches(r) && matches_search(r, term))
            .cloned()
            .collect();
        sort_records(&mut rows, sort, &self.definitions);
        rows
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            match record.status {
                RegistrationStatus::Pending => counts.pending += 1,
                RegistrationStatus::Approved => counts.approved += 1,
                RegistrationStatus::Rejected => counts.rejected += 1,
                RegistrationStatus::Banned => counts.banned += 1,
            }
        }
        counts
    }

    fn replace(&mut self, updated: Registration) {
        match self.records.iter_mut().find(|r| r.id == updated.id) {
            Some(slot) => *slot = updated,
            None => self.records.insert(0, updated),
        }
    }

    /// Move a record to `status`. Approval stamps the date and approver,
    /// every other status clears them. Re-selecting the current status
    /// leaves the record untouched.
    pub async fn change_status(
        &mut self,
        id: i64,
        status: RegistrationStatus,
        approver: &str,
    ) -> Result<Registration, ReviewError> {
        let current = self
            .store
            .get_record(id)
            .await?
            .ok_or(ReviewError::NotFound(id))?;
        if current.status == status {
            tracing::debug!("Registration {} is already {}", id, status);
            self.replace(current.clone());
            return Ok(current);
        }

        let mut patch = RegistrationPatch {
            status: Some(status),
            ..Default::default()
        };
        self.stamp_approval(&mut patch, approver);

        let updated = self
            .store
            .update_record(id, &patch)
            .await
            .map_err(not_found_as_review(id))?;

        tracing::info!("Registration {} is now {} (by {})", id, status, approver);
        self.replace(updated.clone());
        Ok(updated)
    }

    fn stamp_approval(&self, patch: &mut RegistrationPatch, approver: &str) {
        if patch.status == Some(RegistrationStatus::Approved) {
            patch.approval_date = Some(Some(self.clock.now()));
            patch.approved_by = Some(Some(approver.to_string()));
        } else if patch.status.is_some() {
            patch.approval_date = Some(None);
            patch.approved_by = Some(None);
        }
    }

    /// Apply an administrator's edit. Only the keys that actually change
    /// are sent to the store.
    pub async fn edit(
        &mut self,
        id: i64,
        mut patch: RegistrationPatch,
        approver: &str,
    ) -> Result<Registration, ReviewError> {
        for (value, name) in [
            (&mut patch.profile, "profile"),
            (&mut patch.whatsapp, "whatsapp"),
            (&mut patch.country, "country"),
        ] {
            if let Some(v) = value {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    return Err(ReviewError::MissingField(name));
                }
                *v = trimmed.to_string();
            }
        }
        if let Some(url) = patch.url.take() {
            let normalized = validate_url(url.as_deref())
                .map_err(|_| ReviewError::InvalidUrl(url.clone().unwrap_or_default()))?;
            patch.url = Some(normalized);
        }

        let current = self
            .store
            .get_record(id)
            .await?
            .ok_or(ReviewError::NotFound(id))?;

        if let Some(edited) = &patch.custom_fields {
            patch.custom_fields = Some(merge_custom_values(
                &self.definitions,
                &current.custom_fields,
                edited,
            )?);
        }

        // Approval bookkeeping follows the status, never the caller.
        patch.approval_date = None;
        patch.approved_by = None;
        patch.retain_changes(&current);
        self.stamp_approval(&mut patch, approver);

        if patch.is_empty() {
            tracing::debug!("Edit of registration {} changed nothing", id);
            self.replace(current.clone());
            return Ok(current);
        }

        let updated = self
            .store
            .update_record(id, &patch)
            .await
            .map_err(not_found_as_review(id))?;

        tracing::info!("Registration {} edited", id);
        self.replace(updated.clone());
        Ok(updated)
    }

    /// Remove a record from the store, then from the snapshot.
    pub async fn delete(&mut self, id: i64) -> Result<(), ReviewError> {
        self.store.delete_record(id).await?;
        self.records.retain(|r| r.id != id);
        tracing::info!("Registration {} deleted", id);
        Ok(())
    }

    async fn refresh_definitions(&mut self) -> Result<(), ReviewError> {
        self.definitions = self.store.list_field_definitions().await?;
        Ok(())
    }

    pub async fn create_field(&mut self, definition: NewFieldDefinition) -> Result<FieldDefinition, ReviewError> {
        let definition = validate_new_definition(&definition, &self.definitions)?;
        let created = self.store.create_field_definition(&definition).await?;
        tracing::info!("Field '{}' ({}) created", created.name, created.kind);
        self.refresh_definitions().await?;
        Ok(created)
    }

    pub async fn update_field(
        &mut self,
        id: &str,
        patch: FieldDefinitionPatch,
    ) -> Result<FieldDefinition, ReviewError> {
        let patch = validate_definition_patch(id, &patch, &self.definitions)?;
        let updated = self.store.update_field_definition(id, &patch).await?;
        tracing::info!("Field '{}' updated", updated.name);
        self.refresh_definitions().await?;
        Ok(updated)
    }

    /// Remove a definition. Values already stored under its name stay on
    /// the records.
    pub async fn delete_field(&mut self, id: &str) -> Result<(), ReviewError> {
        self.store.delete_field_definition(id).await?;
        tracing::info!("Field {} deleted", id);
        self.refresh_definitions().await
    }
}
