//! Formation geometry: slot generators for every layout kind.

use std::{
    f32::consts::{PI, TAU},
    fmt,
    str::FromStr,
};

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Geometric arrangement used to lay out formation members.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationKind {
    /// Single centered row along the x axis.
    Line,
    /// Half circle opening toward negative y.
    Arc,
    /// Near-square block of rows and columns.
    Square,
    /// Triangular rows widening behind a single point.
    Wedge,
    /// Full ring around the center.
    Circle,
    /// Seeded uniform scatter inside a square.
    Scatter,
}

impl FormationKind {
    /// Every kind in declaration order.
    pub const ALL: [FormationKind; 6] = [
        FormationKind::Line,
        FormationKind::Arc,
        FormationKind::Square,
        FormationKind::Wedge,
        FormationKind::Circle,
        FormationKind::Scatter,
    ];

    /// Lowercase name used in configuration and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            FormationKind::Line => "line",
            FormationKind::Arc => "arc",
            FormationKind::Square => "square",
            FormationKind::Wedge => "wedge",
            FormationKind::Circle => "circle",
            FormationKind::Scatter => "scatter",
        }
    }

    fn pattern(self) -> &'static dyn SlotPattern {
        match self {
            FormationKind::Line => &LinePattern,
            FormationKind::Arc => &ArcPattern,
            FormationKind::Square => &SquarePattern,
            FormationKind::Wedge => &WedgePattern,
            FormationKind::Circle => &CirclePattern,
            FormationKind::Scatter => &ScatterPattern,
        }
    }
}

impl fmt::Display for FormationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a formation kind name is not recognised.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown formation kind `{0}`")]
pub struct ParseFormationKindError(String);

impl FromStr for FormationKind {
    type Err = ParseFormationKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        FormationKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .or_else(|| (normalized == "random").then_some(FormationKind::Scatter))
            .ok_or_else(|| ParseFormationKindError(value.to_owned()))
    }
}

/// Placement parameters of a formation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FormationLayout {
    /// Arrangement used for the slots.
    pub kind: FormationKind,
    /// World-space center the slots are arranged around.
    pub center: Vec2,
    /// Distance between neighbouring slots.
    pub spacing: f32,
    /// Rotation about the center in radians. Scatter ignores it.
    pub rotation: f32,
    /// Seed for scatter offsets. Other kinds ignore it.
    pub seed: u64,
}

impl FormationLayout {
    /// Creates an unrotated layout.
    #[must_use]
    pub const fn new(kind: FormationKind, center: Vec2, spacing: f32) -> Self {
        Self {
            kind,
            center,
            spacing,
            rotation: 0.0,
            seed: 0,
        }
    }

    /// Overrides the rotation applied about the center.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    /// Overrides the scatter seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// World-space slot positions for `count` members.
    ///
    /// The same layout always yields the same slots. Line, square and wedge
    /// slots average out to the center.
    #[must_use]
    pub fn positions(&self, count: usize) -> Vec<Vec2> {
        if count == 0 {
            return Vec::new();
        }

        let pattern = self.kind.pattern();
        let mut offsets = pattern.offsets(count, self.spacing, self.seed);
        if pattern.recenters() {
            recenter(&mut offsets);
        }

        let rotation = pattern
            .rotates()
            .then(|| Vec2::from_angle(self.rotation))
            .filter(|_| self.rotation != 0.0);

        offsets
            .into_iter()
            .map(|offset| match rotation {
                Some(rotation) => self.center + rotation.rotate(offset),
                None => self.center + offset,
            })
            .collect()
    }
}

trait SlotPattern {
    /// Offsets relative to the formation center, before rotation.
    fn offsets(&self, count: usize, spacing: f32, seed: u64) -> Vec<Vec2>;

    fn recenters(&self) -> bool {
        false
    }

    fn rotates(&self) -> bool {
        true
    }
}

struct LinePattern;

impl SlotPattern for LinePattern {
    fn offsets(&self, count: usize, spacing: f32, _seed: u64) -> Vec<Vec2> {
        let start = -(count as f32 - 1.0) * spacing / 2.0;
        (0..count)
            .map(|index| Vec2::new(start + index as f32 * spacing, 0.0))
            .collect()
    }

    fn recenters(&self) -> bool {
        true
    }
}

struct ArcPattern;

impl SlotPattern for ArcPattern {
    fn offsets(&self, count: usize, spacing: f32, _seed: u64) -> Vec<Vec2> {
        let radius = spacing * count as f32 / PI;
        let step = PI / count.saturating_sub(1).max(1) as f32;
        (0..count)
            .map(|index| Vec2::from_angle(step * index as f32) * radius)
            .collect()
    }
}

struct SquarePattern;

impl SlotPattern for SquarePattern {
    fn offsets(&self, count: usize, spacing: f32, _seed: u64) -> Vec<Vec2> {
        let columns = (count as f32).sqrt().ceil().max(1.0) as usize;
        (0..count)
            .map(|index| {
                let column = index % columns;
                let row = index / columns;
                Vec2::new(column as f32 * spacing, row as f32 * spacing)
            })
            .collect()
    }

    fn recenters(&self) -> bool {
        true
    }
}

struct WedgePattern;

impl SlotPattern for WedgePattern {
    fn offsets(&self, count: usize, spacing: f32, _seed: u64) -> Vec<Vec2> {
        let mut offsets = Vec::with_capacity(count);
        let mut row = 0usize;
        while offsets.len() < count {
            for slot in 0..=row {
                if offsets.len() == count {
                    break;
                }
                let x = (slot as f32 - row as f32 / 2.0) * spacing;
                let y = -(row as f32) * spacing;
                offsets.push(Vec2::new(x, y));
            }
            row += 1;
        }
        offsets
    }

    fn recenters(&self) -> bool {
        true
    }
}

struct CirclePattern;

impl SlotPattern for CirclePattern {
    fn offsets(&self, count: usize, spacing: f32, _seed: u64) -> Vec<Vec2> {
        let radius = spacing * count as f32 / TAU;
        let step = TAU / count as f32;
        (0..count)
            .map(|index| Vec2::from_angle(step * index as f32) * radius)
            .collect()
    }
}

struct ScatterPattern;

impl SlotPattern for ScatterPattern {
    fn offsets(&self, count: usize, spacing: f32, seed: u64) -> Vec<Vec2> {
        let half_extent = (spacing * count as f32 / 2.0).abs();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                Vec2::new(
                    rng.gen_range(-half_extent..=half_extent),
                    rng.gen_range(-half_extent..=half_extent),
                )
            })
            .collect()
    }

    fn rotates(&self) -> bool {
        false
    }
}

fn recenter(offsets: &mut [Vec2]) {
    if offsets.is_empty() {
        return;
    }
    let mean = offsets.iter().copied().sum::<Vec2>() / offsets.len() as f32;
    for offset in offsets {
        *offset -= mean;
    }
}
