//! Formation records owned by the world.

use glam::Vec2;
use warband_core::{FormationLayout, UnitId};

/// Named group of units laid out by a shared geometry.
///
/// The member list is the only record of membership; slot `i` of the
/// layout belongs to the member at index `i`.
#[derive(Clone, Debug)]
pub struct Formation {
    name: String,
    layout: FormationLayout,
    members: Vec<UnitId>,
}

impl Formation {
    pub(crate) fn new(name: String, layout: FormationLayout) -> Self {
        Self {
            name,
            layout,
            members: Vec::new(),
        }
    }

    /// Unique name of the formation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Geometry parameters of the formation.
    #[must_use]
    pub const fn layout(&self) -> &FormationLayout {
        &self.layout
    }

    /// Current center of the formation.
    #[must_use]
    pub const fn center(&self) -> Vec2 {
        self.layout.center
    }

    /// Members in slot order.
    #[must_use]
    pub fn members(&self) -> &[UnitId] {
        &self.members
    }

    /// Reports whether the unit is listed as a member.
    #[must_use]
    pub fn contains(&self, unit: UnitId) -> bool {
        self.members.contains(&unit)
    }

    /// Slot positions for the current members, in member order.
    #[must_use]
    pub fn slots(&self) -> Vec<Vec2> {
        self.layout.positions(self.members.len())
    }

    /// Slot assigned to the unit under the current layout.
    #[must_use]
    pub fn slot_of(&self, unit: UnitId) -> Option<Vec2> {
        let index = self.members.iter().position(|member| *member == unit)?;
        self.slots().get(index).copied()
    }

    pub(crate) fn push_member(&mut self, unit: UnitId) {
        if !self.contains(unit) {
            self.members.push(unit);
        }
    }

    pub(crate) fn remove_member(&mut self, unit: UnitId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| *member != unit);
        self.members.len() != before
    }

    pub(crate) fn set_center(&mut self, center: Vec2) {
        self.layout.center = center;
    }
}
