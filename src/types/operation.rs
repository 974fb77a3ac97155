//! Operations the engine submits to a target.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumDiscriminants};

use super::attributes::{AttributeChanges, UserAttributes};

/// A single change for one user on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(name(OperationKind), derive(Display, Hash, PartialOrd, Ord))]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create {
        attributes: UserAttributes,
        groups: BTreeSet<String>,
    },
    UpdateAttributes(AttributeChanges),
    AddGroups(BTreeSet<String>),
    RemoveGroups(BTreeSet<String>),
    RemoveFromOrg,
    Delete,
    Disentitle,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        OperationKind::from(self)
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Operation::Create { attributes, groups } => {
                write!(f, "Create({attributes}, groups=[{}])", groups.iter().join(", "))
            }
            Operation::UpdateAttributes(changes) => write!(
                f,
                "UpdateAttributes({})",
                changes.iter().map(|(k, v)| format!("{k}='{v}'")).join(", ")
            ),
            Operation::AddGroups(groups) => write!(f, "AddGroups([{}])", groups.iter().join(", ")),
            Operation::RemoveGroups(groups) => {
                write!(f, "RemoveGroups([{}])", groups.iter().join(", "))
            }
            other => write!(f, "{}", other.kind()),
        }
    }
}
