pub mod types;
pub mod weather;


pub use relay_macros::tool;
pub use types::{Tool, ToolResult, ToolFailure, ToolCapability, AnyTool, AnyToolBox, ToolLookup, ToolEmptyParams};

pub use weather::{WeatherTool, WeatherParams};
