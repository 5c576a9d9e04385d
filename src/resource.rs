use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of repository resource a handle may be bound to.
///
/// The numeric tags are the ones persisted in the handle table and must not
/// be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Bitstream,
    Bundle,
    Item,
    Collection,
    Community,
    Site,
    Group,
    EPerson,
}

impl ResourceType {
    /// Stable numeric code used in storage and task arguments.
    pub fn tag(self) -> i32 {
        match self {
            Self::Bitstream => 0,
            Self::Bundle => 1,
            Self::Item => 2,
            Self::Collection => 3,
            Self::Community => 4,
            Self::Site => 5,
            Self::Group => 6,
            Self::EPerson => 7,
        }
    }

    /// Inverse of [`tag`](Self::tag). `None` for codes outside `0..=7`.
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::Bitstream),
            1 => Some(Self::Bundle),
            2 => Some(Self::Item),
            3 => Some(Self::Collection),
            4 => Some(Self::Community),
            5 => Some(Self::Site),
            6 => Some(Self::Group),
            7 => Some(Self::EPerson),
            _ => None,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::Bitstream => "BITSTREAM",
            Self::Bundle => "BUNDLE",
            Self::Item => "ITEM",
            Self::Collection => "COLLECTION",
            Self::Community => "COMMUNITY",
            Self::Site => "SITE",
            Self::Group => "GROUP",
            Self::EPerson => "EPERSON",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// A lightweight reference to a resource owned by the content model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: Uuid,
    pub resource_type: ResourceType,
}

impl ResourceRef {
    pub fn new(id: Uuid, resource_type: ResourceType) -> Self {
        Self { id, resource_type }
    }
}

/// What the resolver needs from a content object.
///
/// `handles_mut` exposes the object's own handle list; the resolver appends
/// to it when binding and drains it when unbinding.
pub trait HandleTarget {
    fn id(&self) -> Uuid;

    fn resource_type(&self) -> ResourceType;

    fn handles(&self) -> &[String];

    fn handles_mut(&mut self) -> &mut Vec<String>;

    fn to_ref(&self) -> ResourceRef {
        ResourceRef::new(self.id(), self.resource_type())
    }
}

/// Plain in-memory resource, used by callers without a richer content model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    id: Uuid,
    resource_type: ResourceType,
    handles: Vec<String>,
}

impl Resource {
    pub fn new(resource_type: ResourceType) -> Self {
        Self::with_id(Uuid::new_v4(), resource_type)
    }

    pub fn with_id(id: Uuid, resource_type: ResourceType) -> Self {
        Self {
            id,
            resource_type,
            handles: Vec::new(),
        }
    }
}

impl HandleTarget for Resource {
    fn id(&self) -> Uuid {
        self.id
    }

    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn handles(&self) -> &[String] {
        &self.handles
    }

    fn handles_mut(&mut self) -> &mut Vec<String> {
        &mut self.handles
    }
}
