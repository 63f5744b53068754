//! Stored directory object definition.

use std::collections::HashMap;

use groupwalk_domain::{DirectoryObjectRef, MembershipFilter, ObjectKind};
use uuid::Uuid;

use crate::filter::AttributeSource;

/// An object held by a [`MemoryDirectory`](crate::MemoryDirectory).
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub object: DirectoryObjectRef,
    /// Extra attributes matched by recipient filters, keyed by lowercased name.
    pub attributes: HashMap<String, String>,
    /// Member references (key or DN) of a static group.
    pub members: Vec<String>,
}

impl DirectoryEntry {
    /// Creates an entry with a freshly generated key.
    pub fn new(distinguished_name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            object: DirectoryObjectRef::new(Uuid::new_v4().to_string(), distinguished_name, kind),
            attributes: HashMap::new(),
            members: Vec::new(),
        }
    }

    pub fn user(distinguished_name: impl Into<String>) -> Self {
        Self::new(distinguished_name, ObjectKind::User)
    }

    pub fn group(distinguished_name: impl Into<String>) -> Self {
        Self::new(distinguished_name, ObjectKind::StaticGroup)
    }

    pub fn dynamic_group(distinguished_name: impl Into<String>, filter: MembershipFilter) -> Self {
        let mut entry = Self::new(distinguished_name, ObjectKind::DynamicGroup);
        entry.object.membership_filter = Some(filter);
        entry
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.object.key = key.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.object.primary_address = Some(address.into());
        self
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members.extend(members.into_iter().map(Into::into));
        self
    }

    pub fn key(&self) -> &str {
        &self.object.key
    }

    pub fn kind(&self) -> ObjectKind {
        self.object.kind
    }
}

impl AttributeSource for DirectoryEntry {
    fn attribute(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "objectclass" => Some(match self.object.kind {
                ObjectKind::User => "user",
                ObjectKind::StaticGroup | ObjectKind::DynamicGroup => "group",
            }),
            "recipienttype" => Some(match self.object.kind {
                ObjectKind::User => "UserMailbox",
                ObjectKind::StaticGroup => "MailUniversalDistributionGroup",
                ObjectKind::DynamicGroup => "DynamicDistributionGroup",
            }),
            "distinguishedname" => Some(&self.object.distinguished_name),
            "guid" | "objectguid" => Some(&self.object.key),
            "primarysmtpaddress" | "windowsemailaddress" | "mail" => {
                self.object.primary_address.as_deref()
            }
            _ => self.attributes.get(&name).map(String::as_str),
        }
    }
}
