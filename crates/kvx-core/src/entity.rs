//! Entity instances assembled from parsed key/value pairs.

use crate::value::Value;
use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A named attribute of an entity or aggregate.
///
/// The name is `None` for reference-list slots, where the flat key carries
/// only an array index and the value is a bare reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: Option<String>,
    pub value: Value,
}

impl Attribute {
    pub fn new(name: Option<String>, value: Value) -> Self {
        Self { name, value }
    }
}

/// One entity instance: direct attributes, 1:1 aggregates, and repeated
/// aggregate arrays keyed by their instance-scoped slot (`"{id}.{index}"`).
#[derive(Debug, Clone, Default)]
pub struct EntityObject {
    pub name: String,
    pub object_id: String,
    /// True when the id was invented because the key carried none.
    pub synthetic_id: bool,
    pub attributes: Vec<Attribute>,
    pub aggregates: IndexMap<String, Vec<Attribute>>,
    pub aggregate_arrays: IndexMap<String, IndexMap<String, Vec<Attribute>>>,
}

impl EntityObject {
    pub fn new(name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object_id: object_id.into(),
            ..Default::default()
        }
    }

    /// entity.attrib -> value
    pub fn add_entity_attribute(&mut self, name: Option<String>, value: Value) {
        self.attributes.push(Attribute::new(name, value));
    }

    /// entity.aggregate.attrib -> value
    pub fn add_aggregate_attribute(
        &mut self,
        aggregate_name: &str,
        name: Option<String>,
        value: Value,
    ) {
        self.aggregates
            .entry(aggregate_name.to_string())
            .or_default()
            .push(Attribute::new(name, value));
    }

    /// entity.aggregate[index].attrib -> value
    pub fn add_aggregate_array_attribute(
        &mut self,
        array_name: &str,
        index_key: &str,
        name: Option<String>,
        value: Value,
    ) {
        self.aggregate_arrays
            .entry(array_name.to_string())
            .or_default()
            .entry(index_key.to_string())
            .or_default()
            .push(Attribute::new(name, value));
    }
}

/// Deterministic source of synthetic numeric ids.
///
/// Ids are drawn from `[100, 10^9)`. The generator is injected into the
/// stages that need it so a seeded run reproduces the same ids for the same
/// input order.
#[derive(Debug)]
pub struct SyntheticIds {
    rng: StdRng,
}

impl SyntheticIds {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn next_id(&mut self) -> String {
        self.rng.gen_range(100u64..1_000_000_000).to_string()
    }
}
