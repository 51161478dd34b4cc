//! Storage policy placement resolution
//!
//! Resolves a storage policy name to the datastores vSphere reports as
//! compatible with it:
//! 1. Find exactly one requirement profile by name (or by id as a fallback)
//! 2. Enumerate every datastore reachable from the root folder
//! 3. Ask policy-based management which of them satisfy the profile
//! 4. Map the compatible hubs back to datastore names
//!
//! Every remote call is bounded by its own timeout.

use crate::domain::ports::{PlacementHub, StorageProfile, StorageProfileId, VSphereSession};
use crate::error::{Error, Result};
use crate::vsphere;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Profile Lookup
// =============================================================================

/// Outcome of looking a storage policy up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLookup {
    NotFound,
    /// More than one distinct profile matched
    Ambiguous(usize),
    Resolved(StorageProfile),
}

impl ProfileLookup {
    /// Classify candidate profiles; duplicates of the same id count once
    pub fn from_matches(matches: Vec<StorageProfile>) -> Self {
        let mut distinct: Vec<StorageProfile> = Vec::with_capacity(matches.len());
        for profile in matches {
            if !distinct.iter().any(|p| p.id == profile.id) {
                distinct.push(profile);
            }
        }
        match distinct.len() {
            0 => ProfileLookup::NotFound,
            1 => ProfileLookup::Resolved(distinct.remove(0)),
            n => ProfileLookup::Ambiguous(n),
        }
    }

    /// The resolved profile, or the matching policy error
    pub fn into_profile(self, policy: &str) -> Result<StorageProfile> {
        match self {
            ProfileLookup::Resolved(profile) => Ok(profile),
            ProfileLookup::NotFound => Err(Error::PolicyNotFound {
                policy: policy.to_string(),
            }),
            ProfileLookup::Ambiguous(count) => Err(Error::PolicyAmbiguous {
                policy: policy.to_string(),
                count,
            }),
        }
    }
}

// =============================================================================
// Placement Resolver
// =============================================================================

/// Resolves storage policies against a live vSphere session
pub struct PlacementResolver<'a> {
    session: &'a dyn VSphereSession,
    timeout: Duration,
}

impl<'a> PlacementResolver<'a> {
    pub fn new(session: &'a dyn VSphereSession, timeout: Duration) -> Self {
        Self { session, timeout }
    }

    /// Names of the datastores compatible with `policy_name`, in the order
    /// the placement service reported them.
    pub async fn resolve_compatible_datastores(&self, policy_name: &str) -> Result<Vec<String>> {
        let profile = self.lookup_profile(policy_name).await?.into_profile(policy_name)?;
        let datastores = self.compatible_datastores(&profile.id).await?;
        debug!(
            "Policy {:?} is compatible with datastores {:?}",
            policy_name, datastores
        );
        Ok(datastores)
    }

    /// Find the requirement profile named `policy_name`.
    ///
    /// Falls back to treating the name as a profile id when no profile has
    /// that name.
    pub async fn lookup_profile(&self, policy_name: &str) -> Result<ProfileLookup> {
        let ids = vsphere::call(
            self.timeout,
            "query storage profiles",
            self.session.query_storage_profiles(),
        )
        .await?;

        let profiles = vsphere::call(
            self.timeout,
            "retrieve storage profiles",
            self.session.retrieve_storage_profiles(&ids),
        )
        .await?;

        let named: Vec<StorageProfile> = profiles
            .into_iter()
            .filter(|p| p.name == policy_name)
            .collect();
        if !named.is_empty() {
            return Ok(ProfileLookup::from_matches(named));
        }

        debug!(
            "No storage profile named {:?}, trying it as a profile id",
            policy_name
        );
        let by_id = vsphere::call(
            self.timeout,
            "retrieve storage profiles",
            self.session
                .retrieve_storage_profiles(&[StorageProfileId(policy_name.to_string())]),
        )
        .await?;
        Ok(ProfileLookup::from_matches(by_id))
    }

    /// Names of all datastores compatible with a profile
    pub async fn compatible_datastores(&self, profile: &StorageProfileId) -> Result<Vec<String>> {
        let datastores = vsphere::call(
            self.timeout,
            "list datastores",
            self.session.list_datastores(),
        )
        .await?;

        let mut names: HashMap<String, String> = HashMap::with_capacity(datastores.len());
        let mut hubs = Vec::with_capacity(datastores.len());
        for ds in &datastores {
            hubs.push(PlacementHub::from(&ds.reference));
            names.insert(ds.reference.value.clone(), ds.name.clone());
        }

        let compatible = vsphere::call(
            self.timeout,
            "check placement compatibility",
            self.session.check_placement(profile, &hubs),
        )
        .await?;

        let mut result = Vec::with_capacity(compatible.len());
        for hub in compatible {
            match names.get(&hub.hub_id) {
                Some(name) => result.push(name.clone()),
                None => debug!("Compatible hub {} is not a known datastore", hub.hub_id),
            }
        }
        Ok(result)
    }
}
