#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Writes to the remote tree API and translates the outcome into world
//! commands.
//!
//! The orchestrator never touches the entity collection directly: a
//! successful add or remove yields the matching [`Command`] together with a
//! notice, and failures yield only a notice. The collection therefore only
//! ever holds server-confirmed records.

use canopy_core::{Command, EntityCandidate, LocationId, Notice, RemoteApi, RemoteError, Species};
use futures::future::join;
use thiserror::Error;
use tracing::{info, warn};

/// Failures surfaced by [`MutationOrchestrator`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MutationError {
    /// A removal was requested without naming who confirmed it.
    #[error("removal requires a confirming name")]
    ConfirmationMissing,
    /// The remote API refused or failed the request.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Adds and removes entities through the remote API.
#[derive(Debug)]
pub struct MutationOrchestrator<'r, R> {
    remote: &'r R,
}

impl<R> Clone for MutationOrchestrator<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for MutationOrchestrator<'_, R> {}

impl<'r, R: RemoteApi> MutationOrchestrator<'r, R> {
    /// Creates an orchestrator writing through the provided remote.
    #[must_use]
    pub const fn new(remote: &'r R) -> Self {
        Self { remote }
    }

    /// Fetches the species catalog and every entity concurrently.
    ///
    /// On success the world receives [`Command::LoadSpecies`] followed by
    /// [`Command::LoadEntities`]. When either request fails nothing is loaded
    /// and a network notice is posted.
    pub async fn load(&self, out: &mut Vec<Command>) -> Result<(), MutationError> {
        let (species, entities) =
            join(self.remote.fetch_species(), self.remote.fetch_entities()).await;
        let loaded = species.and_then(|species| entities.map(|entities| (species, entities)));

        match loaded {
            Ok((species, entities)) => {
                info!(
                    species = species.len(),
                    entities = entities.len(),
                    "loaded tree inventory"
                );
                out.push(Command::LoadSpecies {
                    species: species.into_values().collect::<Vec<Species>>(),
                });
                out.push(Command::LoadEntities { entities });
                Ok(())
            }
            Err(error) => Err(Self::report(error, out)),
        }
    }

    /// Submits a candidate and, once the server confirms it, inserts it.
    ///
    /// Returns the identity assigned by the server.
    pub async fn add(
        &self,
        candidate: &EntityCandidate,
        out: &mut Vec<Command>,
    ) -> Result<LocationId, MutationError> {
        match self.remote.create_entity(candidate).await {
            Ok(entity) => {
                let location_id = entity.location_id;
                info!(%location_id, category = %entity.category, "tree added");
                out.push(Command::InsertEntity { entity });
                out.push(Command::PostNotice {
                    notice: Notice::EntityAdded { location_id },
                });
                Ok(location_id)
            }
            Err(error) => Err(Self::report(error, out)),
        }
    }

    /// Deletes an entity once someone has confirmed the removal by name.
    ///
    /// A confirmation that is empty after trimming cancels the removal
    /// without contacting the server.
    pub async fn remove(
        &self,
        location_id: LocationId,
        confirmed_by: &str,
        out: &mut Vec<Command>,
    ) -> Result<(), MutationError> {
        let confirmed_by = confirmed_by.trim();
        if confirmed_by.is_empty() {
            info!(%location_id, "removal cancelled without confirmation");
            out.push(Command::PostNotice {
                notice: Notice::RemovalCancelled { location_id },
            });
            return Err(MutationError::ConfirmationMissing);
        }

        match self.remote.delete_entity(location_id, confirmed_by).await {
            Ok(()) => {
                info!(%location_id, confirmed_by, "tree removed");
                out.push(Command::RemoveEntity { location_id });
                out.push(Command::PostNotice {
                    notice: Notice::EntityRemoved { location_id },
                });
                Ok(())
            }
            Err(error) => Err(Self::report(error, out)),
        }
    }

    fn report(error: RemoteError, out: &mut Vec<Command>) -> MutationError {
        warn!(%error, "remote request failed");
        let notice = match &error {
            RemoteError::Validation { message, .. } => Notice::ValidationFailed {
                message: message.clone(),
            },
            RemoteError::Network(message) => Notice::NetworkFailed {
                message: message.clone(),
            },
        };
        out.push(Command::PostNotice { notice });
        MutationError::Remote(error)
    }
}
