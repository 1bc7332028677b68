use std::fmt;

use engine::{EntityId, TileCoord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub(crate) const GO_TO_KIND: &str = "go-to";

/// Loosely typed command as it arrives from input, scripts or the bus.
///
/// `{ "type": "go-to", "args": [{ "x": 3, "y": 4 }] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ActionDescriptor {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) args: Vec<Value>,
}

impl ActionDescriptor {
    pub(crate) fn go_to(target: TileCoord) -> Self {
        Self {
            kind: GO_TO_KIND.to_string(),
            args: vec![serde_json::json!({ "x": target.x, "y": target.y })],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionKind {
    GoTo,
}

impl ActionKind {
    pub(crate) fn as_token(self) -> &'static str {
        match self {
            Self::GoTo => GO_TO_KIND,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            GO_TO_KIND => Some(Self::GoTo),
            _ => None,
        }
    }
}

/// Validated command consumed by exactly one action queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    GoTo { target: TileCoord },
}

impl Action {
    pub(crate) fn kind(self) -> ActionKind {
        match self {
            Self::GoTo { .. } => ActionKind::GoTo,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoTo { target } => write!(f, "{GO_TO_KIND} {target}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum ActionError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("invalid action '{kind}': {reason}")]
    InvalidAction { kind: String, reason: String },
    #[error("entity {0} is not selectable")]
    NotSelectable(EntityId),
}

impl ActionError {
    fn invalid(kind: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TileArg {
    Object { x: u32, y: u32 },
    Pair([u32; 2]),
}

impl From<TileArg> for TileCoord {
    fn from(value: TileArg) -> Self {
        match value {
            TileArg::Object { x, y } => TileCoord { x, y },
            TileArg::Pair([x, y]) => TileCoord { x, y },
        }
    }
}

impl TryFrom<&ActionDescriptor> for Action {
    type Error = ActionError;

    fn try_from(descriptor: &ActionDescriptor) -> Result<Self, Self::Error> {
        let kind = ActionKind::parse(&descriptor.kind)
            .ok_or_else(|| ActionError::invalid(&descriptor.kind, "unrecognized action kind"))?;
        match kind {
            ActionKind::GoTo => {
                let [target] = descriptor.args.as_slice() else {
                    return Err(ActionError::invalid(
                        &descriptor.kind,
                        format!("expected 1 argument, got {}", descriptor.args.len()),
                    ));
                };
                let tile = TileArg::deserialize(target).map_err(|error| {
                    ActionError::invalid(&descriptor.kind, format!("target tile: {error}"))
                })?;
                Ok(Self::GoTo {
                    target: tile.into(),
                })
            }
        }
    }
}
