#![forbid(unsafe_code)]

//! E-waste value types: items, material/category components and the
//! custody lifecycle status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Custody lifecycle stage recorded on every transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EWasteStatus {
    Collected,
    Sorted,
    Dismantled,
    Processed,
    Recycled,
}

impl EWasteStatus {
    /// Position in the nominal lifecycle (collected = 0 .. recycled = 4).
    ///
    /// Admission does not enforce this order; callers that want to flag
    /// regressions in an item history can compare stages.
    pub fn stage(self) -> u8 {
        match self {
            EWasteStatus::Collected => 0,
            EWasteStatus::Sorted => 1,
            EWasteStatus::Dismantled => 2,
            EWasteStatus::Processed => 3,
            EWasteStatus::Recycled => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EWasteStatus::Collected => "collected",
            EWasteStatus::Sorted => "sorted",
            EWasteStatus::Dismantled => "dismantled",
            EWasteStatus::Processed => "processed",
            EWasteStatus::Recycled => "recycled",
        }
    }
}

impl fmt::Display for EWasteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! components {
    ($($variant:ident => $tag:literal),* $(,)?) => {
        /// A component tag on an item: either a reward category or a raw
        /// material. Unknown tags are kept verbatim in `Other`.
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Component {
            $($variant,)*
            Other(String),
        }

        impl Component {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Component::$variant => $tag,)*
                    Component::Other(tag) => tag.as_str(),
                }
            }
        }

        impl FromStr for Component {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $($tag => Component::$variant,)*
                    other => Component::Other(other.to_string()),
                })
            }
        }
    };
}

components! {
    // reward categories
    CircuitBoards => "CIRCUIT_BOARDS",
    Batteries => "BATTERIES",
    Screens => "SCREENS",
    Plastics => "PLASTICS",
    Metals => "METALS",
    Hazardous => "HAZARDOUS",
    // materials
    Aluminum => "Aluminum",
    Silicon => "Silicon",
    Oxygen => "Oxygen",
    Copper => "Copper",
    Iron => "Iron",
    Carbon => "Carbon",
    Nickel => "Nickel",
    Lithium => "Lithium",
    Cobalt => "Cobalt",
    Gold => "Gold",
    Silver => "Silver",
    Tantalum => "Tantalum",
    Tin => "Tin",
    Neodymium => "Neodymium",
    Palladium => "Palladium",
    Platinum => "Platinum",
    Yttrium => "Yttrium",
    Indium => "Indium",
    Gallium => "Gallium",
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(c) => c,
            Err(never) => match never {},
        }
    }
}

impl Serialize for Component {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Component {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Component::from(tag.as_str()))
    }
}

/// A physical unit of electronic waste.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EWasteItem {
    pub item_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Grams.
    pub weight: f64,
    pub components: Vec<Component>,
    pub manufacturer: String,
    pub year: i32,
}

impl EWasteItem {
    /// Convenience constructor used by tests and the CLI.
    pub fn new(item_id: &str, kind: &str, weight: f64, components: &[&str]) -> Self {
        Self {
            item_id: item_id.to_string(),
            kind: kind.to_string(),
            weight,
            components: components.iter().map(|c| Component::from(*c)).collect(),
            manufacturer: String::new(),
            year: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_tags_roundtrip_verbatim() {
        assert_eq!(Component::from("METALS"), Component::Metals);
        assert_eq!(Component::from("Copper"), Component::Copper);
        assert_eq!(
            Component::from("Unobtainium"),
            Component::Other("Unobtainium".into())
        );
        // Case matters: "metals" is not the reward category.
        assert_eq!(Component::from("metals").as_str(), "metals");
    }

    #[test]
    fn test_item_json_shape() {
        let item = EWasteItem::new("p-1", "phone", 120.5, &["BATTERIES", "Lithium"]);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "phone");
        assert_eq!(json["components"][0], "BATTERIES");
        let back: EWasteItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&EWasteStatus::Dismantled).unwrap(),
            "\"dismantled\""
        );
        assert!(EWasteStatus::Collected.stage() < EWasteStatus::Recycled.stage());
    }
}
