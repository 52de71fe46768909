//! Recoverable failures reported by placement, routing and movement commands.

use thiserror::Error;

/// Reasons a route could not be produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RouteError {
    /// Start point lies outside the grid.
    #[error("route start lies outside the grid")]
    StartOutOfBounds,
    /// End point lies outside the grid.
    #[error("route end lies outside the grid")]
    EndOutOfBounds,
    /// Start point lies on a blocked cell.
    #[error("route start lies on a blocked cell")]
    StartBlocked,
    /// End point lies on a blocked cell.
    #[error("route end lies on a blocked cell")]
    EndBlocked,
    /// No walkable connection joins start and end.
    #[error("no route connects start and end")]
    Unreachable,
}

/// Reasons a unit or formation could not be created or updated.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PlacementError {
    /// Unit type is missing from the catalog.
    #[error("unit type `{0}` is not in the catalog")]
    UnknownUnitType(String),
    /// Neither the requested position nor any sampled alternative is free.
    #[error("no free position near the requested point")]
    NoFreePosition,
    /// Formation handle is stale or was never issued.
    #[error("formation does not exist")]
    UnknownFormation,
    /// Unit handle is stale or was never issued.
    #[error("unit does not exist")]
    UnknownUnit,
    /// Another formation already uses the name.
    #[error("formation name `{0}` is already taken")]
    DuplicateFormationName(String),
}

/// Reasons a movement command was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Unit handle is stale or was never issued.
    #[error("unit does not exist")]
    UnknownUnit,
    /// Formation handle is stale or was never issued.
    #[error("formation does not exist")]
    UnknownFormation,
    /// The unit's effective speed is zero, so it can never advance.
    #[error("unit cannot move")]
    Immobile,
    /// No route could be planned toward the target.
    #[error("no route toward the target: {0}")]
    Route(#[from] RouteError),
    /// The world refused the placement the command required.
    #[error("placement failed: {0}")]
    Placement(PlacementError),
}

impl From<PlacementError> for CommandError {
    fn from(error: PlacementError) -> Self {
        match error {
            PlacementError::UnknownUnit => Self::UnknownUnit,
            PlacementError::UnknownFormation => Self::UnknownFormation,
            other => Self::Placement(other),
        }
    }
}
