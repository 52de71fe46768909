//! Read-only catalog of unit archetypes keyed by type name.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Attributes shared by every unit created from one catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    /// Width and height of the unit footprint in world units.
    pub size: Vec2,
    /// Hit points granted to new units.
    pub health: u32,
    /// Damage dealt per attack.
    pub damage: u32,
    /// Travel speed in world units per second.
    pub speed: f32,
    /// Resource cost to field the unit.
    pub cost: u32,
}

/// Catalog mapping unit type names onto their stats.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitCatalog {
    entries: BTreeMap<String, UnitStats>,
}

impl UnitCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the warrior, archer and mage archetypes.
    #[must_use]
    pub fn standard() -> Self {
        Self::new()
            .with_entry(
                "warrior",
                UnitStats {
                    size: Vec2::splat(1.0),
                    health: 100,
                    damage: 10,
                    speed: 1.0,
                    cost: 50,
                },
            )
            .with_entry(
                "archer",
                UnitStats {
                    size: Vec2::splat(0.8),
                    health: 70,
                    damage: 15,
                    speed: 1.2,
                    cost: 75,
                },
            )
            .with_entry(
                "mage",
                UnitStats {
                    size: Vec2::splat(0.8),
                    health: 50,
                    damage: 25,
                    speed: 0.9,
                    cost: 100,
                },
            )
    }

    /// Adds or replaces an entry, returning the updated catalog.
    #[must_use]
    pub fn with_entry(mut self, unit_type: impl Into<String>, stats: UnitStats) -> Self {
        self.insert(unit_type, stats);
        self
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, unit_type: impl Into<String>, stats: UnitStats) {
        let _ = self.entries.insert(unit_type.into(), stats);
    }

    /// Stats registered for the unit type.
    #[must_use]
    pub fn get(&self, unit_type: &str) -> Option<&UnitStats> {
        self.entries.get(unit_type)
    }

    /// Registered type names in lexical order.
    pub fn unit_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered unit types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
