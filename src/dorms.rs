//! Read-only dorm catalog.

use crate::error::ApiError;
use crate::http::SecureClient;
use crate::models::{Dorm, DormFilters, Listing};
use std::sync::Arc;
use tracing::debug;

pub struct DormCatalog {
    client: Arc<SecureClient>,
}

impl DormCatalog {
    pub fn new(client: Arc<SecureClient>) -> Self {
        Self { client }
    }

    /// List dorms matching `filters`.
    ///
    /// The walking-distance bound is also passed to the server, which
    /// understands it as `max_walk_time`; every filter is re-applied locally
    /// because the server ignores price and amenities.
    pub fn list(&self, filters: &DormFilters) -> Result<Vec<Dorm>, ApiError> {
        let path = match filters.max_distance {
            Some(minutes) => format!("/dorms/?max_walk_time={}-minute", minutes),
            None => "/dorms/".to_string(),
        };
        let response = self.client.get(&path)?;
        if !response.is_ok() {
            return Err(response.into_error("Failed to load dorms"));
        }

        let all = response.json::<Listing<Dorm>>()?.into_items();
        let total = all.len();
        let matching: Vec<Dorm> = all.into_iter().filter(|d| filters.matches(d)).collect();
        debug!(total, matching = matching.len(), "listed dorms");
        Ok(matching)
    }

    pub fn get(&self, id: &str) -> Result<Dorm, ApiError> {
        let response = self.client.get(&format!("/dorms/{}/", id))?;
        if !response.is_ok() {
            return Err(response.into_error("Dorm not found"));
        }
        response.json()
    }
}
