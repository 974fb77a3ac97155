//! Identity types understood by the targets.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// The kind of account a [`UserKey`](super::UserKey) refers to.
///
/// Parsing is case-insensitive; rendering always yields the canonical spelling,
/// which is also the first column of a serialized user key.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[strum(ascii_case_insensitive)]
pub enum IdentityType {
    #[default]
    #[strum(serialize = "federatedID")]
    #[serde(rename = "federatedID")]
    Federated,
    #[strum(serialize = "enterpriseID")]
    #[serde(rename = "enterpriseID")]
    Enterprise,
    #[strum(serialize = "adobeID")]
    #[serde(rename = "adobeID")]
    Adobe,
}
