//! Grouping parsed keys into entity instances.

use indexmap::IndexMap;
use kvx_core::{EntityObject, ParsedKey, PatternLabel};

/// Group parsed pairs by `(entity, id)` and assemble one entity instance per
/// group, preserving first-seen order.
pub fn group_into_objects(keys: Vec<ParsedKey>) -> Vec<EntityObject> {
    let mut groups: IndexMap<(String, String), Vec<ParsedKey>> = IndexMap::new();
    for parsed in keys {
        let entity = parsed.components.entity.clone();
        let id = parsed.components.id.clone().unwrap_or_default();
        groups.entry((entity, id)).or_default().push(parsed);
    }

    groups
        .into_iter()
        .map(|((entity, id), group)| assemble_object(&entity, &id, group))
        .collect()
}

/// Dispatch each pair of a group by its label: direct attribute, 1:1
/// aggregate attribute, or aggregate-array slot keyed by `"{id}.{index}"`.
fn assemble_object(entity: &str, id: &str, group: Vec<ParsedKey>) -> EntityObject {
    let mut object = EntityObject::new(entity, id);
    object.synthetic_id = group.iter().any(|k| k.components.synthetic_id);

    for parsed in group {
        let comps = parsed.components;
        let property = comps.property.unwrap_or_default();
        match parsed.label {
            PatternLabel::ArrProp => {
                let slot = format!("{}.{}", id, comps.index.unwrap_or_default());
                object.add_aggregate_array_attribute(
                    &property,
                    &slot,
                    comps.aggregate_property,
                    parsed.value,
                );
            }
            PatternLabel::Arr => {
                let slot = format!("{}.{}", id, comps.index.unwrap_or_default());
                object.add_aggregate_array_attribute(&property, &slot, None, parsed.value);
            }
            PatternLabel::AggProp => {
                object.add_aggregate_attribute(&property, comps.aggregate_property, parsed.value);
            }
            PatternLabel::Prop | PatternLabel::Primitive => {
                object.add_entity_attribute(Some(property), parsed.value);
            }
        }
    }

    object
}
