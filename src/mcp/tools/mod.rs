//! MCP tool handlers.

pub mod interactive_feedback;
