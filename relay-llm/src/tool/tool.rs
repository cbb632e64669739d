use std::sync::Arc;

/// Name, description and JSON schema of the arguments, as declared to the model
pub trait ToolDescription: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn parameters_schema(&self) -> serde_json::Value;
}

pub type ToolBox = Vec<Arc<dyn ToolDescription>>;

/// Name based lookup over a set of declared tools
pub trait ContainsTool {
    fn find_tool(&self, name: &str) -> Option<Arc<dyn ToolDescription>>;

    fn contains_tool(&self, name: &str) -> bool {
        self.find_tool(name).is_some()
    }
}

impl ContainsTool for [Arc<dyn ToolDescription>] {
    fn find_tool(&self, name: &str) -> Option<Arc<dyn ToolDescription>> {
        self.iter().find(|tool| tool.name() == name).cloned()
    }
}
