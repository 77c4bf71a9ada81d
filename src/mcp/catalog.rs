//! Registry of the tools, prompts and resources this server exposes.
//!
//! Entries can be added and removed while connections are live; every
//! mutation publishes the matching list-changed event on the hub.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::info;

use super::model::{
    CallToolResult, GetPromptResult, PromptDescriptor, ReadResourceResult, ResourceDescriptor,
    ToolDescriptor,
};
use crate::hub::{HubEvent, NotificationHub, PublishReport};
use crate::protocol::{ErrorInfo, RpcResult};

type ToolHandler =
    Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, RpcResult<CallToolResult>> + Send + Sync>;
type PromptHandler = Arc<
    dyn Fn(BTreeMap<String, String>) -> BoxFuture<'static, RpcResult<GetPromptResult>>
        + Send
        + Sync,
>;
type ResourceReader =
    Arc<dyn Fn(String) -> BoxFuture<'static, RpcResult<ReadResourceResult>> + Send + Sync>;

struct Entry<D, H> {
    descriptor: D,
    handler: H,
}

type Table<D, H> = RwLock<BTreeMap<String, Entry<D, H>>>;

/// Live tool/prompt/resource registry.
pub struct Catalog {
    hub: Arc<NotificationHub>,
    tools: Table<ToolDescriptor, ToolHandler>,
    prompts: Table<PromptDescriptor, PromptHandler>,
    resources: Table<ResourceDescriptor, ResourceReader>,
}

impl Catalog {
    /// Empty catalog publishing changes on `hub`.
    #[must_use]
    pub fn new(hub: Arc<NotificationHub>) -> Self {
        Self {
            hub,
            tools: RwLock::new(BTreeMap::new()),
            prompts: RwLock::new(BTreeMap::new()),
            resources: RwLock::new(BTreeMap::new()),
        }
    }

    // ── Tools ─────────────────────────────────────────────────────────────────

    /// Add or replace a tool and publish `tools/list_changed`.
    pub fn add_tool<F, Fut>(&self, descriptor: ToolDescriptor, handler: F)
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<CallToolResult>> + Send + 'static,
    {
        let name = descriptor.name.clone();
        let handler: ToolHandler = Arc::new(move |args| Box::pin(handler(args)));
        write(&self.tools).insert(name.clone(), Entry { descriptor, handler });
        info!(tool = %name, "tool registered");
        self.hub.publish(&HubEvent::ToolListChanged);
    }

    /// Remove a tool. Publishes `tools/list_changed` only if it existed.
    pub fn remove_tool(&self, name: &str) -> bool {
        let removed = write(&self.tools).remove(name).is_some();
        if removed {
            info!(tool = name, "tool removed");
            self.hub.publish(&HubEvent::ToolListChanged);
        }
        removed
    }

    /// Every tool descriptor, sorted by name.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        read(&self.tools).values().map(|e| e.descriptor.clone()).collect()
    }

    /// Invoke a tool.
    ///
    /// # Errors
    ///
    /// `not_found` for an unknown tool; otherwise whatever the handler returns.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> RpcResult<CallToolResult> {
        let handler = read(&self.tools)
            .get(name)
            .map(|e| Arc::clone(&e.handler))
            .ok_or_else(|| ErrorInfo::not_found(format!("unknown tool: {name}")))?;
        handler(arguments).await
    }

    // ── Prompts ───────────────────────────────────────────────────────────────

    /// Add or replace a prompt and publish `prompts/list_changed`.
    pub fn add_prompt<F, Fut>(&self, descriptor: PromptDescriptor, handler: F)
    where
        F: Fn(BTreeMap<String, String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<GetPromptResult>> + Send + 'static,
    {
        let name = descriptor.name.clone();
        let handler: PromptHandler = Arc::new(move |args| Box::pin(handler(args)));
        write(&self.prompts).insert(name.clone(), Entry { descriptor, handler });
        info!(prompt = %name, "prompt registered");
        self.hub.publish(&HubEvent::PromptListChanged);
    }

    /// Remove a prompt. Publishes `prompts/list_changed` only if it existed.
    pub fn remove_prompt(&self, name: &str) -> bool {
        let removed = write(&self.prompts).remove(name).is_some();
        if removed {
            info!(prompt = name, "prompt removed");
            self.hub.publish(&HubEvent::PromptListChanged);
        }
        removed
    }

    /// Every prompt descriptor, sorted by name.
    #[must_use]
    pub fn prompts(&self) -> Vec<PromptDescriptor> {
        read(&self.prompts).values().map(|e| e.descriptor.clone()).collect()
    }

    /// Render a prompt.
    ///
    /// # Errors
    ///
    /// - `not_found` for an unknown prompt.
    /// - `invalid_params` if a required argument is missing.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: BTreeMap<String, String>,
    ) -> RpcResult<GetPromptResult> {
        let (descriptor, handler) = read(&self.prompts)
            .get(name)
            .map(|e| (e.descriptor.clone(), Arc::clone(&e.handler)))
            .ok_or_else(|| ErrorInfo::not_found(format!("unknown prompt: {name}")))?;

        if let Some(missing) = descriptor
            .arguments
            .iter()
            .find(|arg| arg.required && !arguments.contains_key(&arg.name))
        {
            return Err(ErrorInfo::invalid_params(format!(
                "missing required argument `{}` for prompt {name}",
                missing.name
            )));
        }

        handler(arguments).await
    }

    // ── Resources ─────────────────────────────────────────────────────────────

    /// Add or replace a resource and publish `resources/list_changed`.
    pub fn add_resource<F, Fut>(&self, descriptor: ResourceDescriptor, reader: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<ReadResourceResult>> + Send + 'static,
    {
        let uri = descriptor.uri.clone();
        let handler: ResourceReader = Arc::new(move |uri| Box::pin(reader(uri)));
        write(&self.resources).insert(uri.clone(), Entry { descriptor, handler });
        info!(uri = %uri, "resource registered");
        self.hub.publish(&HubEvent::ResourceListChanged);
    }

    /// Remove a resource. Publishes `resources/list_changed` only if it existed.
    pub fn remove_resource(&self, uri: &str) -> bool {
        let removed = write(&self.resources).remove(uri).is_some();
        if removed {
            info!(uri, "resource removed");
            self.hub.publish(&HubEvent::ResourceListChanged);
        }
        removed
    }

    /// Every resource descriptor, sorted by URI.
    #[must_use]
    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        read(&self.resources).values().map(|e| e.descriptor.clone()).collect()
    }

    /// Read a resource.
    ///
    /// # Errors
    ///
    /// `not_found` for an unknown URI; otherwise whatever the reader returns.
    pub async fn read_resource(&self, uri: &str) -> RpcResult<ReadResourceResult> {
        let reader = read(&self.resources)
            .get(uri)
            .map(|e| Arc::clone(&e.handler))
            .ok_or_else(|| ErrorInfo::not_found(format!("unknown resource: {uri}")))?;
        reader(uri.to_owned()).await
    }

    /// Announce that the contents of `uri` changed.
    pub fn resource_updated(&self, uri: &str) -> PublishReport {
        self.hub.publish(&HubEvent::resource_updated(uri))
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
