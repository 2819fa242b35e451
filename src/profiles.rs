//! Named, organization-scoped mapping profiles.

use chrono::Utc;
use log::{debug, info};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    mapping::{self, ColumnMapping},
    store::{MappingProfile, MappingRepository, StoreError},
};

pub const MAX_LISTED_PROFILES: usize = 50;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Profile name cannot be empty")]
    EmptyName,
    #[error("Profile has no mapped columns")]
    EmptyMapping,
    #[error("No mapping profile with id {0}")]
    UnknownProfile(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct MappingStore<'a> {
    repository: &'a dyn MappingRepository,
}

impl<'a> MappingStore<'a> {
    pub fn new(repository: &'a dyn MappingRepository) -> Self {
        Self { repository }
    }

    /// Saves under `name`, replacing the mapping of a same-named profile.
    pub fn save(
        &self,
        name: &str,
        organization_id: &str,
        mapping: &ColumnMapping,
    ) -> Result<MappingProfile, ProfileError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if mapping.is_empty() {
            return Err(ProfileError::EmptyMapping);
        }
        let profile = MappingProfile {
            id: Uuid::new_v4(),
            organization_id: organization_id.to_string(),
            name: name.to_string(),
            mapping: mapping.clone(),
            usage_count: 0,
            last_used_at: None,
            created_at: Utc::now().naive_utc(),
        };
        let saved = self.repository.save_mapping(profile)?;
        info!("Saved mapping profile '{}' ({})", saved.name, saved.id);
        Ok(saved)
    }

    /// Most used first, then by name; capped at [`MAX_LISTED_PROFILES`].
    pub fn list(&self, organization_id: &str) -> Result<Vec<MappingProfile>, ProfileError> {
        let mut profiles = self.repository.list_mappings(organization_id)?;
        profiles.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        profiles.truncate(MAX_LISTED_PROFILES);
        Ok(profiles)
    }

    pub fn find(
        &self,
        organization_id: &str,
        name: &str,
    ) -> Result<Option<MappingProfile>, ProfileError> {
        let name = name.trim();
        Ok(self
            .repository
            .list_mappings(organization_id)?
            .into_iter()
            .find(|profile| profile.name == name))
    }

    pub fn record_use(&self, id: Uuid) -> Result<MappingProfile, ProfileError> {
        let touched = self
            .repository
            .touch_mapping(id, Utc::now().naive_utc())?
            .ok_or(ProfileError::UnknownProfile(id))?;
        debug!("Profile '{}' used {} time(s)", touched.name, touched.usage_count);
        Ok(touched)
    }

    /// Restricts `profile` to `columns`; missing columns are dropped.
    pub fn apply(profile: &MappingProfile, columns: &[String]) -> ColumnMapping {
        mapping::apply_profile(&profile.mapping, columns)
    }
}
