//! Capability contract of the remote tree API.

use std::{collections::BTreeMap, future::Future};

use thiserror::Error;

use crate::{Entity, EntityCandidate, LocationId, Species, TreeId};

/// Failures reported by the remote API.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The server refused a submitted record.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Field that failed validation.
        field: &'static str,
        /// Server-provided explanation.
        message: String,
    },
    /// The request never completed.
    #[error("request failed: {0}")]
    Network(String),
}

/// Remote API consumed at startup and by the mutation orchestrator.
pub trait RemoteApi {
    /// Fetches every entity known to the server.
    fn fetch_entities(&self) -> impl Future<Output = Result<Vec<Entity>, RemoteError>>;

    /// Fetches the species reference catalog.
    fn fetch_species(&self)
        -> impl Future<Output = Result<BTreeMap<TreeId, Species>, RemoteError>>;

    /// Submits a candidate and returns the server-confirmed record.
    fn create_entity(
        &self,
        candidate: &EntityCandidate,
    ) -> impl Future<Output = Result<Entity, RemoteError>>;

    /// Deletes an entity on behalf of the confirming person.
    fn delete_entity(
        &self,
        location_id: LocationId,
        confirmed_by: &str,
    ) -> impl Future<Output = Result<(), RemoteError>>;
}
