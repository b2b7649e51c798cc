//! Structure catalog: immutable placement templates, shape math, and the
//! placed [`Structure`] instance type.
//!
//! The catalog is read-only after load and needs no synchronization.

use crate::types::{PlayerId, Position, StructureId, TeamId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Kinds & effects
// ---------------------------------------------------------------------------

/// Closed set of placeable structure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Basic,
    Wall,
    Outpost,
    Tower,
    Fortress,
}

impl StructureKind {
    pub const fn all() -> [Self; 5] {
        [
            Self::Basic,
            Self::Wall,
            Self::Outpost,
            Self::Tower,
            Self::Fortress,
        ]
    }
}

impl std::fmt::Display for StructureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Basic => "basic",
            Self::Wall => "wall",
            Self::Outpost => "outpost",
            Self::Tower => "tower",
            Self::Fortress => "fortress",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Vision,
    Damage,
    Shield,
    Harvest,
}

/// Read-only effect data, interpreted by gameplay systems outside this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureEffect {
    pub kind: EffectKind,
    pub magnitude: u32,
    pub radius: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Shape math
// ---------------------------------------------------------------------------

/// Translate a set of offsets so the minimum offset is `(0, 0)`, and sort
/// for set comparison.
pub fn normalize_shape(offsets: &[Position]) -> Vec<Position> {
    if offsets.is_empty() {
        return Vec::new();
    }
    let min_x = offsets.iter().map(|p| p.x).min().unwrap_or(0);
    let min_y = offsets.iter().map(|p| p.y).min().unwrap_or(0);
    let mut out: Vec<Position> = offsets
        .iter()
        .map(|p| Position::new(p.x - min_x, p.y - min_y))
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Rotate a normalized shape by `rotation` quarter-turns clockwise and
/// re-normalize. Rotation values outside 0–3 wrap.
pub fn rotate_shape(offsets: &[Position], rotation: u8) -> Vec<Position> {
    let mut out: Vec<Position> = offsets.to_vec();
    for _ in 0..(rotation % 4) {
        for p in out.iter_mut() {
            *p = Position::new(p.y, -p.x);
        }
    }
    normalize_shape(&out)
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Immutable catalog entry a placed structure is instantiated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureTemplate {
    pub kind: StructureKind,
    pub name: String,
    pub value: u64,
    pub cost: u64,
    pub health: u32,
    /// Relative cell offsets, normalized so the minimum offset is `(0, 0)`.
    pub shape: Vec<Position>,
    pub effects: Vec<StructureEffect>,
    pub description: String,
}

impl StructureTemplate {
    fn new(
        kind: StructureKind,
        name: &str,
        value: u64,
        cost: u64,
        health: u32,
        shape: &[(i32, i32)],
        effects: Vec<StructureEffect>,
        description: &str,
    ) -> Self {
        let shape: Vec<Position> = shape.iter().map(|&(x, y)| Position::new(x, y)).collect();
        Self {
            kind,
            name: name.into(),
            value,
            cost,
            health,
            shape: normalize_shape(&shape),
            effects,
            description: description.into(),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.shape.len()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Static registry of placeable structures, keyed by kind.
#[derive(Debug, Clone)]
pub struct StructureCatalog {
    templates: HashMap<StructureKind, StructureTemplate>,
}

impl StructureCatalog {
    /// The standard template set.
    pub fn standard() -> Self {
        let entries = [
            StructureTemplate::new(
                StructureKind::Basic,
                "Claim Marker",
                10,
                5,
                50,
                &[(0, 0)],
                vec![],
                "Single-cell territory claim.",
            ),
            StructureTemplate::new(
                StructureKind::Wall,
                "Wall",
                6,
                12,
                120,
                &[(0, 0), (1, 0), (2, 0)],
                vec![],
                "Three-cell barrier line.",
            ),
            StructureTemplate::new(
                StructureKind::Outpost,
                "Outpost",
                30,
                30,
                150,
                &[(0, 0), (1, 0), (0, 1), (1, 1)],
                vec![StructureEffect {
                    kind: EffectKind::Vision,
                    magnitude: 1,
                    radius: 4,
                    duration_ms: None,
                }],
                "Forward post revealing nearby cells.",
            ),
            StructureTemplate::new(
                StructureKind::Tower,
                "Watch Tower",
                45,
                40,
                100,
                &[(1, 0), (0, 1), (1, 1), (2, 1), (1, 2)],
                vec![StructureEffect {
                    kind: EffectKind::Damage,
                    magnitude: 5,
                    radius: 3,
                    duration_ms: None,
                }],
                "Cross-shaped tower projecting pressure around itself.",
            ),
            StructureTemplate::new(
                StructureKind::Fortress,
                "Fortress",
                120,
                100,
                400,
                &[
                    (0, 0),
                    (1, 0),
                    (2, 0),
                    (0, 1),
                    (1, 1),
                    (2, 1),
                    (0, 2),
                    (1, 2),
                    (2, 2),
                ],
                vec![StructureEffect {
                    kind: EffectKind::Shield,
                    magnitude: 10,
                    radius: 2,
                    duration_ms: None,
                }],
                "Heavy nine-cell stronghold shielding its surroundings.",
            ),
        ];

        Self {
            templates: entries.into_iter().map(|t| (t.kind, t)).collect(),
        }
    }

    pub fn get(&self, kind: StructureKind) -> Option<&StructureTemplate> {
        self.templates.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn templates(&self) -> impl Iterator<Item = &StructureTemplate> {
        self.templates.values()
    }
}

impl Default for StructureCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

// ---------------------------------------------------------------------------
// Placed structure
// ---------------------------------------------------------------------------

/// A placed structure instance.
///
/// Owned by the game state's structures map for its whole lifetime; grid
/// cells only reference it by id. Removal from the structures map is the
/// single deletion point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub id: StructureId,
    pub kind: StructureKind,
    pub player: PlayerId,
    pub team: TeamId,
    /// Absolute world cells this structure occupies.
    pub positions: Vec<Position>,
    pub value: u64,
    pub health: u32,
    pub max_health: u32,
    pub effects: Vec<StructureEffect>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Structure {
    pub fn from_template(
        id: impl Into<StructureId>,
        template: &StructureTemplate,
        player: impl Into<PlayerId>,
        team: impl Into<TeamId>,
        positions: Vec<Position>,
        now: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: template.kind,
            player: player.into(),
            team: team.into(),
            positions,
            value: template.value,
            health: template.health,
            max_health: template.health,
            effects: template.effects.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}
