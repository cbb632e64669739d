use openai_dive::v1::resources::chat::{
    ChatCompletionFunction, ChatCompletionParametersBuilder, ChatCompletionTool,
    ChatCompletionToolChoice, ChatCompletionToolType,
};

use crate::provider::LlmError;
use crate::responses::{HostedTool, ToolChoice};
use crate::tool::{ContainsTool, ToolBox, ToolDescription};

/// Chat Completions declaration of a tool
pub fn chat_tool(tool: &dyn ToolDescription) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: ChatCompletionFunction {
            name: tool.name().to_string(),
            description: Some(tool.description().to_string()),
            parameters: tool.parameters_schema(),
        },
    }
}

/// Responses API declaration of a tool
pub fn function_tool(tool: &dyn ToolDescription) -> HostedTool {
    HostedTool::Function {
        name: tool.name().to_string(),
        description: Some(tool.description().to_string()),
        parameters: tool.parameters_schema(),
        strict: false,
    }
}

pub trait FunctionCallingBuilder {
    /// Declare the toolbox and translate the tool choice to Chat Completions
    ///
    /// Chat Completions has no way to force a hosted tool. Forcing a function
    /// narrows the catalog to that function and requires a call.
    fn with_function_calling(&mut self, tools: &ToolBox, choice: &ToolChoice) -> Result<&mut Self, LlmError>;
}

impl FunctionCallingBuilder for ChatCompletionParametersBuilder {
    fn with_function_calling(&mut self, tools: &ToolBox, choice: &ToolChoice) -> Result<&mut Self, LlmError> {
        if tools.is_empty() || *choice == ToolChoice::None {
            return Ok(self);
        }

        let builder = match choice {
            ToolChoice::Auto => self
                .tools(tools.iter().map(|t| chat_tool(t.as_ref())).collect::<Vec<_>>())
                .tool_choice(ChatCompletionToolChoice::Auto),
            ToolChoice::Required => self
                .tools(tools.iter().map(|t| chat_tool(t.as_ref())).collect::<Vec<_>>())
                .tool_choice(ChatCompletionToolChoice::Required),
            ToolChoice::Function(name) => {
                let tool = tools
                    .find_tool(name)
                    .ok_or_else(|| LlmError::from(format!("forced tool '{}' is not declared", name)))?;
                self.tools(vec![chat_tool(tool.as_ref())])
                    .tool_choice(ChatCompletionToolChoice::Required)
            }
            ToolChoice::Hosted(kind) => {
                return Err(LlmError::from(format!("chat completions cannot force hosted tool '{}'", kind)));
            }
            ToolChoice::None => self,
        };

        Ok(builder)
    }
}
