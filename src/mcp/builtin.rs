//! Built-in catalog entries so a bare server can be exercised end to end.

use std::sync::Arc;

use serde_json::{json, Value};

use super::catalog::Catalog;
use super::model::{
    CallToolResult, Content, GetPromptResult, PromptArgument, PromptDescriptor, PromptMessage,
    ReadResourceResult, ResourceContents, ResourceDescriptor, Role, ToolDescriptor,
};
use crate::hub::NotificationHub;
use crate::protocol::ErrorInfo;

/// URI of the live status resource.
pub const STATUS_URI: &str = "switchboard://status";

/// Register the `echo` tool, the `greeting` prompt and the status resource.
pub fn install(catalog: &Catalog, hub: &Arc<NotificationHub>) {
    catalog.add_tool(
        ToolDescriptor::new("echo", "Return the `text` argument unchanged").with_schema(json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"],
        })),
        |arguments| async move {
            let text = arguments
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ErrorInfo::invalid_params("echo requires a string `text` argument")
                })?;
            Ok::<_, ErrorInfo>(CallToolResult::text(text))
        },
    );

    catalog.add_prompt(
        PromptDescriptor {
            name: "greeting".into(),
            description: Some("Greet someone by name".into()),
            arguments: vec![PromptArgument {
                name: "name".into(),
                description: Some("Who to greet".into()),
                required: true,
            }],
        },
        |arguments| async move {
            let name = arguments.get("name").map_or("there", String::as_str);
            Ok::<_, ErrorInfo>(GetPromptResult {
                description: Some("A friendly greeting".into()),
                messages: vec![PromptMessage {
                    role: Role::User,
                    content: Content::text(format!("Hello, {name}!")),
                }],
            })
        },
    );

    let status_hub = Arc::clone(hub);
    catalog.add_resource(
        ResourceDescriptor {
            uri: STATUS_URI.into(),
            name: "status".into(),
            description: Some("Live listener count".into()),
            mime_type: Some("application/json".into()),
        },
        move |uri| {
            let body = json!({
                "listeners": status_hub.listener_count(),
                "topics": status_hub.topic_count(),
            });
            async move {
                Ok::<_, ErrorInfo>(ReadResourceResult {
                    contents: vec![ResourceContents {
                        uri,
                        mime_type: Some("application/json".into()),
                        text: body.to_string(),
                    }],
                })
            }
        },
    );
}
