#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Resolves rendered clusters into the entities they stand for.

use canopy_core::{ClusterExpansionError, ClusterId, Entity, Feature, LeafLimit, MapEngine};
use tracing::debug;

/// Adapter over the engine's cluster index.
///
/// Cluster identifiers are only meaningful for the index snapshot that
/// produced them, so nothing is cached between calls.
#[derive(Debug)]
pub struct ClusterExpander<'e, E> {
    engine: &'e E,
}

impl<'e, E: MapEngine> ClusterExpander<'e, E> {
    /// Creates an expander reading from the provided engine.
    #[must_use]
    pub const fn new(engine: &'e E) -> Self {
        Self { engine }
    }

    /// Engine the expander reads from.
    #[must_use]
    pub const fn engine(&self) -> &'e E {
        self.engine
    }

    /// Resolves every descendant leaf of a cluster.
    pub async fn expand(&self, cluster: ClusterId) -> Result<Vec<Entity>, ClusterExpansionError> {
        let leaves = self
            .engine
            .cluster_leaves(cluster, LeafLimit::Unbounded)
            .await?;
        Ok(leaves.into_iter().filter_map(Feature::into_entity).collect())
    }

    /// Resolves a cluster, treating a stale identifier as an empty cluster.
    pub async fn expand_or_empty(&self, cluster: ClusterId) -> Vec<Entity> {
        match self.expand(cluster).await {
            Ok(members) => members,
            Err(error) => {
                debug!(%cluster, %error, "cluster vanished before expansion");
                Vec::new()
            }
        }
    }
}

impl<E> Clone for ClusterExpander<'_, E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for ClusterExpander<'_, E> {}
