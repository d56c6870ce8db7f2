//! Bus messages the hub fans out to clients.
//!
//! Each message is published on the bus as an `EventEnvelope` and pushed to
//! clients verbatim (camelCase JSON) under its client event name.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::foundation::{BusEvent, EventEnvelope, OrganizationId, UserId};

/// Entity type tag that marks an `EntityChanged` as being about a user.
pub const USER_ENTITY_TYPE: &str = "User";

/// Kind of change carried by entity and membership notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Saved,
    Removed,
}

/// An entity was added, saved or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityChanged {
    /// Entity type tag, e.g. "User", "Project", "Stack".
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Identifier of the changed entity.
    pub id: String,

    #[serde(
        default,
        deserialize_with = "optional_organization_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub organization_id: Option<OrganizationId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,

    pub change_type: ChangeType,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, JsonValue>,
}

impl EntityChanged {
    pub const EVENT_TYPE: &'static str = "entity.changed.v1";
    pub const CLIENT_EVENT: &'static str = "entityChanged";

    /// Returns true if the changed entity is a user account.
    pub fn is_user_entity(&self) -> bool {
        self.entity_type == USER_ENTITY_TYPE
    }
}

impl BusEvent for EntityChanged {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn aggregate_id(&self) -> String {
        self.id.clone()
    }

    fn aggregate_type(&self) -> &'static str {
        "Entity"
    }
}

/// An organization's billing plan changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanChanged {
    pub organization_id: OrganizationId,
}

impl PlanChanged {
    pub const EVENT_TYPE: &'static str = "plan.changed.v1";
    pub const CLIENT_EVENT: &'static str = "planChanged";
}

impl BusEvent for PlanChanged {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn aggregate_id(&self) -> String {
        self.organization_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Organization"
    }
}

/// An organization exceeded its plan limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOverage {
    pub organization_id: OrganizationId,

    /// True when the overage is against the hourly rather than monthly limit.
    #[serde(default)]
    pub is_hourly: bool,
}

impl PlanOverage {
    pub const EVENT_TYPE: &'static str = "plan.overage.v1";
    pub const CLIENT_EVENT: &'static str = "planOverage";
}

impl BusEvent for PlanOverage {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn aggregate_id(&self) -> String {
        self.organization_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Organization"
    }
}

/// A user joined or left an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMembershipChanged {
    pub change_type: ChangeType,

    pub user_id: UserId,

    #[serde(
        default,
        deserialize_with = "optional_organization_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub organization_id: Option<OrganizationId>,
}

impl UserMembershipChanged {
    pub const EVENT_TYPE: &'static str = "user_membership.changed.v1";
    pub const CLIENT_EVENT: &'static str = "userMembershipChanged";
}

impl BusEvent for UserMembershipChanged {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn aggregate_id(&self) -> String {
        self.user_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "User"
    }
}

/// Tagged union of every message the hub routes.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    EntityChanged(EntityChanged),
    PlanChanged(PlanChanged),
    PlanOverage(PlanOverage),
    UserMembershipChanged(UserMembershipChanged),
}

impl DomainEvent {
    /// Bus event types the hub subscribes to, one per variant.
    pub const EVENT_TYPES: [&'static str; 4] = [
        EntityChanged::EVENT_TYPE,
        PlanChanged::EVENT_TYPE,
        PlanOverage::EVENT_TYPE,
        UserMembershipChanged::EVENT_TYPE,
    ];

    /// Decodes an envelope into a typed event.
    ///
    /// Returns `Ok(None)` for event types the hub does not route.
    pub fn from_envelope(envelope: &EventEnvelope) -> Result<Option<Self>, serde_json::Error> {
        let event = match envelope.event_type.as_str() {
            EntityChanged::EVENT_TYPE => Self::EntityChanged(envelope.payload_as()?),
            PlanChanged::EVENT_TYPE => Self::PlanChanged(envelope.payload_as()?),
            PlanOverage::EVENT_TYPE => Self::PlanOverage(envelope.payload_as()?),
            UserMembershipChanged::EVENT_TYPE => {
                Self::UserMembershipChanged(envelope.payload_as()?)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    /// Name of the message pushed to clients for this event.
    pub fn client_event(&self) -> &'static str {
        match self {
            Self::EntityChanged(_) => EntityChanged::CLIENT_EVENT,
            Self::PlanChanged(_) => PlanChanged::CLIENT_EVENT,
            Self::PlanOverage(_) => PlanOverage::CLIENT_EVENT,
            Self::UserMembershipChanged(_) => UserMembershipChanged::CLIENT_EVENT,
        }
    }
}

/// Producers often send an empty string for "no organization".
fn optional_organization_id<'de, D>(deserializer: D) -> Result<Option<OrganizationId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(OrganizationId::from_optional(raw.as_deref()))
}
