//! Source and layer catalog shared by every system that talks to the engine.

use crate::{Color, LayerId, LayerKind, PaintSpec, Predicate, SourceId};

/// Clustered source holding the entity collection.
pub const TREES: SourceId = SourceId::from_static("trees");

/// Base layer drawing cluster markers.
pub const CLUSTERS: LayerId = LayerId::from_static("clusters");
/// Base layer drawing cluster member counts.
pub const CLUSTER_COUNT: LayerId = LayerId::from_static("cluster-count");
/// Base layer drawing individual trees.
pub const POINTS: LayerId = LayerId::from_static("unclustered-points");
/// Overlay marking trees of the highlighted category.
pub const HIGHLIGHTED_POINTS: LayerId = LayerId::from_static("highlighted-points");
/// Overlay marking clusters containing the highlighted category.
pub const HIGHLIGHTED_CLUSTERS: LayerId = LayerId::from_static("highlighted-clusters");

/// Layers whose features count as "something under the pointer".
pub const INTERACTIVE: [LayerId; 2] = [CLUSTERS, POINTS];

const CLUSTER_COLOR: Color = Color::from_rgb_u8(81, 187, 214);
const COUNT_COLOR: Color = Color::from_rgb_u8(255, 255, 255);
const POINT_COLOR: Color = Color::from_rgb_u8(17, 180, 107);
const HIGHLIGHT_COLOR: Color = Color::from_rgb_u8(241, 105, 54);

/// Paint specifications installed on startup, in drawing order.
///
/// Overlays start with the empty-match filter and sit above the base layers.
#[must_use]
pub fn catalog() -> Vec<PaintSpec> {
    vec![
        paint(CLUSTERS, LayerKind::Circle, CLUSTER_COLOR, 20.0, Predicate::Clustered),
        paint(CLUSTER_COUNT, LayerKind::Label, COUNT_COLOR, 12.0, Predicate::Clustered),
        paint(POINTS, LayerKind::Circle, POINT_COLOR, 6.0, Predicate::Unclustered),
        paint(
            HIGHLIGHTED_CLUSTERS,
            LayerKind::Circle,
            HIGHLIGHT_COLOR,
            24.0,
            Predicate::MatchNone,
        ),
        paint(
            HIGHLIGHTED_POINTS,
            LayerKind::Circle,
            HIGHLIGHT_COLOR,
            8.0,
            Predicate::MatchNone,
        ),
    ]
}

fn paint(
    layer: LayerId,
    kind: LayerKind,
    color: Color,
    radius_px: f32,
    filter: Predicate,
) -> PaintSpec {
    PaintSpec {
        layer,
        source: TREES,
        kind,
        color,
        radius_px,
        filter,
    }
}
