pub mod tool;
pub mod choice;
pub mod schema;
pub mod structured;


pub use tool::{ToolDescription, ToolBox, ContainsTool};
pub use choice::{chat_tool, function_tool, FunctionCallingBuilder};
pub use schema::{function_schema, strict_schema, validate, SchemaError};
pub use structured::{json_schema_format, refusal_flag, schema_of, StructuredReply};
