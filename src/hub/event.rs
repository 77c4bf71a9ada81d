//! Business events fanned out by the hub.

use serde_json::{json, Value};

use crate::protocol::Notification;

/// `notifications/resources/updated`
pub const RESOURCE_UPDATED: &str = "notifications/resources/updated";
/// `notifications/resources/list_changed`
pub const RESOURCE_LIST_CHANGED: &str = "notifications/resources/list_changed";
/// `notifications/tools/list_changed`
pub const TOOL_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// `notifications/prompts/list_changed`
pub const PROMPT_LIST_CHANGED: &str = "notifications/prompts/list_changed";

/// Event published to subscribed listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// Contents of one resource changed.
    ResourceUpdated {
        /// Resource URI.
        uri: String,
    },
    /// The set of resources changed.
    ResourceListChanged,
    /// The set of tools changed.
    ToolListChanged,
    /// The set of prompts changed.
    PromptListChanged,
}

impl HubEvent {
    /// `ResourceUpdated` for `uri`.
    pub fn resource_updated(uri: impl Into<String>) -> Self {
        Self::ResourceUpdated { uri: uri.into() }
    }

    /// Notification method name.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Self::ResourceUpdated { .. } => RESOURCE_UPDATED,
            Self::ResourceListChanged => RESOURCE_LIST_CHANGED,
            Self::ToolListChanged => TOOL_LIST_CHANGED,
            Self::PromptListChanged => PROMPT_LIST_CHANGED,
        }
    }

    /// URI the event is scoped to, if any.
    #[must_use]
    pub fn resource_uri(&self) -> Option<&str> {
        match self {
            Self::ResourceUpdated { uri } => Some(uri),
            _ => None,
        }
    }

    /// Wire notification for this event.
    #[must_use]
    pub fn to_notification(&self) -> Notification {
        let params = match self {
            Self::ResourceUpdated { uri } => json!({ "uri": uri }),
            _ => Value::Null,
        };
        Notification {
            method: self.method().to_owned(),
            params,
        }
    }

    /// Recognise a hub event in an inbound notification.
    ///
    /// Returns `None` for other methods and for `resources/updated` without a
    /// string `uri`.
    #[must_use]
    pub fn from_notification(notification: &Notification) -> Option<Self> {
        match notification.method.as_str() {
            RESOURCE_UPDATED => notification
                .params
                .get("uri")
                .and_then(Value::as_str)
                .map(Self::resource_updated),
            RESOURCE_LIST_CHANGED => Some(Self::ResourceListChanged),
            TOOL_LIST_CHANGED => Some(Self::ToolListChanged),
            PROMPT_LIST_CHANGED => Some(Self::PromptListChanged),
            _ => None,
        }
    }
}
