#![forbid(unsafe_code)]

//! Reward and environmental-impact calculator.
//!
//! Two independent lookup tables keyed by [`Component`]: reward rates by
//! category (points per gram) and impact factors by material (per gram).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::round3;
use crate::ewaste::{Component, EWasteItem};

/// Per-gram impact factors of one material.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactFactors {
    pub energy: f64,
    pub toxicity: f64,
    pub water: f64,
    pub carbon_emissions: f64,
}

impl ImpactFactors {
    const fn new(energy: f64, toxicity: f64, water: f64, carbon_emissions: f64) -> Self {
        Self { energy, toxicity, water, carbon_emissions }
    }
}

/// Factors used for components missing from the material table.
pub const DEFAULT_FACTORS: ImpactFactors = ImpactFactors::new(0.5, 0.3, 0.4, 1.0);

/// Reward points per gram for a category; zero for anything else.
pub fn reward_rate(component: &Component) -> f64 {
    match component {
        Component::CircuitBoards => 2.0,
        Component::Batteries => 1.5,
        Component::Screens => 1.0,
        Component::Plastics => 0.5,
        Component::Metals => 1.0,
        Component::Hazardous => 3.0,
        _ => 0.0,
    }
}

/// Impact factors for a material, if it is in the table.
pub fn material_factors(component: &Component) -> Option<ImpactFactors> {
    use Component::*;
    let f = match component {
        Aluminum => ImpactFactors::new(0.7, 0.2, 0.5, 1.5),
        Silicon => ImpactFactors::new(0.6, 0.1, 0.4, 1.0),
        Oxygen => ImpactFactors::new(0.1, 0.0, 0.1, 0.2),
        Copper => ImpactFactors::new(0.8, 0.6, 0.7, 2.0),
        Iron => ImpactFactors::new(0.4, 0.1, 0.3, 0.8),
        Carbon => ImpactFactors::new(0.5, 0.3, 0.3, 1.2),
        Nickel => ImpactFactors::new(1.0, 0.9, 0.8, 2.5),
        Lithium => ImpactFactors::new(0.9, 0.8, 1.0, 2.2),
        Cobalt => ImpactFactors::new(1.2, 1.0, 1.1, 2.8),
        Gold => ImpactFactors::new(1.5, 0.5, 1.2, 3.0),
        Silver => ImpactFactors::new(1.3, 0.6, 1.1, 2.6),
        Tantalum => ImpactFactors::new(1.2, 0.7, 0.9, 2.4),
        Tin => ImpactFactors::new(0.8, 0.4, 0.5, 1.8),
        Neodymium => ImpactFactors::new(1.4, 0.6, 1.0, 2.7),
        Palladium => ImpactFactors::new(1.5, 0.5, 1.0, 2.9),
        Platinum => ImpactFactors::new(1.5, 0.6, 1.1, 3.1),
        Yttrium => ImpactFactors::new(1.2, 0.5, 0.8, 2.3),
        Indium => ImpactFactors::new(1.3, 0.5, 0.9, 2.6),
        Gallium => ImpactFactors::new(1.1, 0.4, 0.8, 2.0),
        _ => return None,
    };
    Some(f)
}

/// Aggregated impact of one batch of items. Every figure is rounded to
/// three decimals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub energy_saved: f64,
    pub toxicity_prevented: f64,
    pub water_preserved: f64,
    pub carbon_emissions_prevented: f64,
    pub total_weight_recycled: f64,
    /// Grams recovered per component tag.
    pub materials_recovered: BTreeMap<String, f64>,
}

/// Σ rate(tag) × weight over every component of every item.
pub fn calculate_rewards(items: &[EWasteItem]) -> f64 {
    items
        .iter()
        .flat_map(|item| item.components.iter().map(move |c| reward_rate(c) * item.weight))
        .sum()
}

/// Split each item's weight evenly across its components and accumulate the
/// per-gram factors of each.
pub fn compute_environmental_impact(items: &[EWasteItem]) -> ImpactReport {
    let mut report = ImpactReport::default();

    for item in items {
        report.total_weight_recycled += item.weight;
        if item.components.is_empty() {
            continue;
        }
        let share = item.weight / item.components.len() as f64;
        for component in &item.components {
            let f = material_factors(component).unwrap_or(DEFAULT_FACTORS);
            report.energy_saved += share * f.energy;
            report.toxicity_prevented += share * f.toxicity;
            report.water_preserved += share * f.water;
            report.carbon_emissions_prevented += share * f.carbon_emissions;
            *report
                .materials_recovered
                .entry(component.as_str().to_string())
                .or_insert(0.0) += share;
        }
    }

    report.energy_saved = round3(report.energy_saved);
    report.toxicity_prevented = round3(report.toxicity_prevented);
    report.water_preserved = round3(report.water_preserved);
    report.carbon_emissions_prevented = round3(report.carbon_emissions_prevented);
    report.total_weight_recycled = round3(report.total_weight_recycled);
    for grams in report.materials_recovered.values_mut() {
        *grams = round3(*grams);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metals_reward() {
        let items = vec![EWasteItem::new("a", "laptop", 100.0, &["METALS"])];
        assert_eq!(calculate_rewards(&items), 100.0);
    }

    #[test]
    fn test_reward_mixes_categories_and_ignores_unknown() {
        let items = vec![
            EWasteItem::new("a", "phone", 10.0, &["CIRCUIT_BOARDS", "BATTERIES", "Copper"]),
            EWasteItem::new("b", "tv", 4.0, &["HAZARDOUS", "glitter"]),
        ];
        // 10*2 + 10*1.5 + 0 + 4*3 + 0
        assert_eq!(calculate_rewards(&items), 47.0);
        assert_eq!(calculate_rewards(&[]), 0.0);
    }

    #[test]
    fn test_impact_splits_weight_evenly() {
        let items = vec![EWasteItem::new("a", "cable", 10.0, &["Aluminum", "Copper"])];
        let r = compute_environmental_impact(&items);
        assert_eq!(r.energy_saved, 7.5);
        assert_eq!(r.toxicity_prevented, 4.0);
        assert_eq!(r.water_preserved, 6.0);
        assert_eq!(r.carbon_emissions_prevented, 17.5);
        assert_eq!(r.total_weight_recycled, 10.0);
        assert_eq!(r.materials_recovered["Aluminum"], 5.0);
        assert_eq!(r.materials_recovered["Copper"], 5.0);
    }

    #[test]
    fn test_unknown_components_use_default_factors() {
        let items = vec![EWasteItem::new("a", "misc", 3.0, &["METALS"])];
        let r = compute_environmental_impact(&items);
        assert_eq!(r.energy_saved, 1.5);
        assert_eq!(r.toxicity_prevented, 0.9);
        assert_eq!(r.water_preserved, 1.2);
        assert_eq!(r.carbon_emissions_prevented, 3.0);
        assert_eq!(r.materials_recovered["METALS"], 3.0);
    }

    #[test]
    fn test_impact_rounds_to_three_decimals() {
        let items = vec![EWasteItem::new("a", "chip", 1.0, &["Gold", "Silver", "Tin"])];
        let r = compute_environmental_impact(&items);
        // (1.5 + 1.3 + 0.8) / 3 = 1.2
        assert_eq!(r.energy_saved, 1.2);
        assert_eq!(r.materials_recovered["Gold"], 0.333);
    }

    #[test]
    fn test_componentless_item_only_counts_weight() {
        let items = vec![EWasteItem::new("a", "shell", 42.0, &[])];
        let r = compute_environmental_impact(&items);
        assert_eq!(r.total_weight_recycled, 42.0);
        assert_eq!(r.energy_saved, 0.0);
        assert!(r.materials_recovered.is_empty());
    }
}
