//! MCP server handler, shared application state, and tool router.

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::{
    tool::{ToolCallContext, ToolRoute, ToolRouter},
    ServerHandler,
};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use tracing::info_span;

use crate::api::security::RateLimiter;
use crate::config::ConfigStore;
use crate::notification::NotificationDispatcher;
use crate::queue::TaskQueue;
use crate::rendezvous::RendezvousRegistry;
use crate::scheduler::ResubmitScheduler;

/// Shared application state accessible by the HTTP surface and all MCP
/// tool handlers. The queue and rendezvous registry are the only shared
/// mutable pieces; each owns its own lock.
pub struct AppState {
    /// Config store with the live snapshot and change fan-out.
    pub config: Arc<ConfigStore>,
    /// Task queue owning all live tasks.
    pub queue: Arc<TaskQueue>,
    /// Completion hand-off registry for blocked RPC callers.
    pub rendezvous: Arc<RendezvousRegistry>,
    /// Auto-resubmit deadline timers.
    pub scheduler: Arc<ResubmitScheduler>,
    /// Fire-and-forget notification front end.
    pub notifier: NotificationDispatcher,
    /// Per-client request budgets for the HTTP surface.
    pub limiter: RateLimiter,
}

/// MCP server implementation exposing the `interactive_feedback` tool.
pub struct InterventionServer {
    state: Arc<AppState>,
}

impl InterventionServer {
    /// Create a new MCP server bound to shared application state.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Access the shared application state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    fn tool_router() -> ToolRouter<Self> {
        let mut router = ToolRouter::new();
        for tool in Self::all_tools() {
            match tool.name.as_ref() {
                "interactive_feedback" => {
                    router.add_route(ToolRoute::new_dyn(tool, |context| {
                        Box::pin(crate::mcp::tools::interactive_feedback::handle(context))
                    }));
                }
                _ => {
                    router.add_route(ToolRoute::new_dyn(tool, |_context| {
                        Box::pin(async {
                            Err(rmcp::ErrorData::internal_error("tool not implemented", None))
                        })
                    }));
                }
            }
        }
        router
    }

    /// Convert a `serde_json::Value::Object` into the `Arc<Map>` expected by `Tool`.
    fn schema(value: serde_json::Value) -> Arc<serde_json::Map<String, serde_json::Value>> {
        match value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::default()),
        }
    }

    fn all_tools() -> Vec<Tool> {
        vec![Tool {
            name: "interactive_feedback".into(),
            description: Some(
                "Pause and request feedback from a human through the local web UI. \
                 Blocks until the human submits, the auto-resubmit deadline fires, \
                 or the overall timeout elapses."
                    .into(),
            ),
            input_schema: Self::schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The specific question to show the human"
                    },
                    "predefined_options": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Predefined choices the UI may offer (optional)"
                    },
                    "auto_resubmit_timeout": {
                        "type": "integer",
                        "default": 0,
                        "description": "Seconds before a canned reply is auto-submitted; 0 disables"
                    }
                },
                "required": ["prompt"]
            })),
            annotations: None,
        }]
    }
}

impl ServerHandler for InterventionServer {
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, rmcp::ErrorData>> + Send + '_ {
        let router = Self::tool_router();
        let _span = info_span!("call_tool", tool = %request.name).entered();

        async move {
            router
                .call(ToolCallContext::new(self, request, context))
                .await
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, rmcp::ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(Self::all_tools())))
    }
}
