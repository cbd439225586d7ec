//! Entity state records
//!
//! An `EntityState` is the unit of content held by a shared state store:
//! a typed record with a property map, an ordered child-entry list and a
//! modification count assigned by the store on every committed change.
//!
//! `NodeReferences` carries the back-references (and therefore the
//! reference count) of a single target entity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityId;

/// A single property value.
///
/// `Reference` values participate in referential integrity;
/// `WeakReference` values do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Free text
    String(String),
    /// Signed integer
    Long(i64),
    /// Flag
    Boolean(bool),
    /// UTC timestamp
    Date(DateTime<Utc>),
    /// Qualified name
    Name(String),
    /// Integrity-checked reference to another entity
    Reference(EntityId),
    /// Unchecked reference to another entity
    WeakReference(EntityId),
}

impl PropertyValue {
    /// Returns the referenced id for either reference flavour.
    pub fn as_id(&self) -> Option<EntityId> {
        match self {
            PropertyValue::Reference(id) | PropertyValue::WeakReference(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the timestamp of a date value.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the text of a string or name value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) | PropertyValue::Name(s) => Some(s),
            _ => None,
        }
    }
}

/// A named child entry pointing at another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntry {
    /// Entry name, unique within the parent
    pub name: String,
    /// Child entity
    pub id: EntityId,
}

/// A mutable entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    id: EntityId,
    kind: String,
    #[serde(default)]
    properties: BTreeMap<String, Vec<PropertyValue>>,
    #[serde(default)]
    children: Vec<ChildEntry>,
    #[serde(default)]
    mod_count: u64,
}

impl EntityState {
    /// Creates an empty state of the given kind.
    pub fn new(id: EntityId, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            properties: BTreeMap::new(),
            children: Vec::new(),
            mod_count: 0,
        }
    }

    /// Builder form of `set_property`.
    pub fn with_property(mut self, name: impl Into<String>, values: Vec<PropertyValue>) -> Self {
        self.set_property(name, values);
        self
    }

    /// Builder form of `add_child`.
    pub fn with_child(mut self, name: impl Into<String>, id: EntityId) -> Self {
        self.add_child(name, id);
        self
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Number of committed modifications, maintained by the store.
    #[inline]
    pub fn mod_count(&self) -> u64 {
        self.mod_count
    }

    pub(crate) fn set_mod_count(&mut self, mod_count: u64) {
        self.mod_count = mod_count;
    }

    /// Returns the values of a property, if set.
    pub fn property(&self, name: &str) -> Option<&[PropertyValue]> {
        self.properties.get(name).map(Vec::as_slice)
    }

    /// Returns whether a property is set.
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Replaces the values of a property.
    pub fn set_property(&mut self, name: impl Into<String>, values: Vec<PropertyValue>) {
        self.properties.insert(name.into(), values);
    }

    /// Removes a property, returning its previous values.
    pub fn remove_property(&mut self, name: &str) -> Option<Vec<PropertyValue>> {
        self.properties.remove(name)
    }

    /// Iterates over all properties in name order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &[PropertyValue])> {
        self.properties
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Returns the child entries in insertion order.
    pub fn children(&self) -> &[ChildEntry] {
        &self.children
    }

    /// Returns the child entry with the given name.
    pub fn child(&self, name: &str) -> Option<&ChildEntry> {
        self.children.iter().find(|entry| entry.name == name)
    }

    /// Appends a child entry, replacing any entry with the same name.
    pub fn add_child(&mut self, name: impl Into<String>, id: EntityId) {
        let name = name.into();
        self.children.retain(|entry| entry.name != name);
        self.children.push(ChildEntry { name, id });
    }

    /// Removes the child entry pointing at `id`.
    pub fn remove_child(&mut self, id: &EntityId) -> bool {
        let before = self.children.len();
        self.children.retain(|entry| entry.id != *id);
        before != self.children.len()
    }

    /// Iterates over integrity-checked reference targets held by this state.
    pub fn reference_targets(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.properties.values().flatten().filter_map(|value| match value {
            PropertyValue::Reference(id) => Some(*id),
            _ => None,
        })
    }
}

/// Back-references to a single target entity.
///
/// The number of referrers is the target's reference count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReferences {
    target: EntityId,
    #[serde(default)]
    referrers: Vec<EntityId>,
}

impl NodeReferences {
    /// Creates an empty references record.
    pub fn new(target: EntityId) -> Self {
        Self {
            target,
            referrers: Vec::new(),
        }
    }

    #[inline]
    pub fn target(&self) -> EntityId {
        self.target
    }

    /// Returns the referring entities; duplicates count separately.
    pub fn referrers(&self) -> &[EntityId] {
        &self.referrers
    }

    /// Returns the reference count.
    #[inline]
    pub fn count(&self) -> usize {
        self.referrers.len()
    }

    #[inline]
    pub fn has_references(&self) -> bool {
        !self.referrers.is_empty()
    }

    /// Records one more reference from `referrer`.
    pub fn add_referrer(&mut self, referrer: EntityId) {
        self.referrers.push(referrer);
    }

    /// Drops one reference from `referrer`.
    pub fn remove_referrer(&mut self, referrer: &EntityId) -> bool {
        match self.referrers.iter().position(|r| r == referrer) {
            Some(pos) => {
                self.referrers.remove(pos);
                true
            }
            None => false,
        }
    }
}
