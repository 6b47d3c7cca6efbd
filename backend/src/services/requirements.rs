//! Raw-material requirement aggregation for event menus

use std::collections::{BTreeMap, HashMap, HashSet};

use rust_decimal::Decimal;
use shared::{to_ledger_scale, IngredientRatio, MaterialRequirement, MenuSelection};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

fn out_of_range() -> AppError {
    AppError::validation("menu_items", "Material requirement is out of range")
}

/// Total requirement per material, keyed (and therefore ordered) by
/// material id. The ordering doubles as the canonical lock order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Requirements {
    by_material: BTreeMap<Uuid, MaterialRequirement>,
    /// Selected dishes that have no ingredient ratios on file
    pub dishes_without_ratios: Vec<Uuid>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.by_material.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_material.len()
    }

    pub fn get(&self, material_id: &Uuid) -> Option<&MaterialRequirement> {
        self.by_material.get(material_id)
    }

    /// Material ids in ascending order
    pub fn material_ids(&self) -> Vec<Uuid> {
        self.by_material.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialRequirement> {
        self.by_material.values()
    }

    fn add(&mut self, ratio: &IngredientRatio, quantity: Decimal) -> AppResult<()> {
        match self.by_material.get_mut(&ratio.inventory_item_id) {
            Some(existing) => {
                existing.required = existing
                    .required
                    .checked_add(quantity)
                    .ok_or_else(out_of_range)?;
            }
            None => {
                self.by_material.insert(
                    ratio.inventory_item_id,
                    MaterialRequirement {
                        inventory_item_id: ratio.inventory_item_id,
                        name: ratio.material_name.clone(),
                        unit: ratio.material_unit.clone(),
                        required: quantity,
                    },
                );
            }
        }
        Ok(())
    }

    /// Round every total to the ledger scale; totals that round to zero
    /// are dropped
    fn quantize(&mut self) {
        for requirement in self.by_material.values_mut() {
            requirement.required = to_ledger_scale(requirement.required);
        }
        self.by_material.retain(|_, r| !r.required.is_zero());
    }
}

/// Sum `quantity_per_serving × guest_count` per material across all
/// selected dishes.
///
/// Every ratio of a selected dish counts once per selection. A dish without
/// ratios contributes nothing and is listed in `dishes_without_ratios`.
/// Totals are rounded to the ledger scale once, after summing, so the
/// quantity written to the movement log is exactly what leaves the balance.
pub fn aggregate_requirements(
    selections: &[MenuSelection],
    guest_count: i32,
    ratios: &[IngredientRatio],
) -> AppResult<Requirements> {
    let mut by_dish: HashMap<Uuid, Vec<&IngredientRatio>> = HashMap::new();
    for ratio in ratios {
        by_dish.entry(ratio.menu_item_id).or_default().push(ratio);
    }

    let guests = Decimal::from(guest_count);
    let mut requirements = Requirements::default();
    let mut missing = HashSet::new();

    for selection in selections {
        match by_dish.get(&selection.menu_item_id) {
            Some(dish_ratios) => {
                for ratio in dish_ratios {
                    let quantity = ratio
                        .quantity_per_serving
                        .checked_mul(guests)
                        .ok_or_else(out_of_range)?;
                    requirements.add(ratio, quantity)?;
                }
            }
            None => {
                if missing.insert(selection.menu_item_id) {
                    requirements.dishes_without_ratios.push(selection.menu_item_id);
                }
            }
        }
    }

    requirements.quantize();
    Ok(requirements)
}
