//! Tool Definitions
//!
//! Converts capability descriptors into OpenAI-style function schemas.

use std::collections::{HashMap, HashSet};

use parley_core::Capability;
use parley_llm::types::{ParameterSchema, ToolDefinition};

/// Name of the always-present general search tool
pub const WEB_SEARCH_TOOL: &str = "web_search";

/// Schema for a tool-enabled capability.
///
/// Every capability takes a single required string argument; its name comes
/// from the capability's primary argument.
pub fn capability_tool(capability: &Capability) -> ToolDefinition {
    let argument = capability.argument_name().to_string();
    let description = match capability.examples.first() {
        Some(example) => format!("{} Example request: \"{}\".", capability.description, example),
        None => capability.description.clone(),
    };

    ToolDefinition {
        name: capability.name.clone(),
        description,
        input_schema: ParameterSchema::object(
            None,
            HashMap::from([(
                argument.clone(),
                ParameterSchema::string(Some("What the user asked for, in their own words")),
            )]),
            vec![argument],
        ),
    }
}

/// Schema for the general web search tool
pub fn web_search_tool() -> ToolDefinition {
    ToolDefinition {
        name: WEB_SEARCH_TOOL.to_string(),
        description: "Search the web for current information the other tools cannot answer."
            .to_string(),
        input_schema: ParameterSchema::object(
            None,
            HashMap::from([(
                "query".to_string(),
                ParameterSchema::string(Some("Search query")),
            )]),
            vec!["query".to_string()],
        ),
    }
}

/// Tool list offered for one request: the selected capabilities in order,
/// followed by the general search tool. Duplicate names are dropped.
pub fn build_tool_list<'a>(
    capabilities: impl IntoIterator<Item = &'a Capability>,
) -> Vec<ToolDefinition> {
    let mut seen = HashSet::new();
    let mut tools: Vec<ToolDefinition> = capabilities
        .into_iter()
        .filter(|c| c.name != WEB_SEARCH_TOOL && seen.insert(c.name.clone()))
        .map(capability_tool)
        .collect();
    tools.push(web_search_tool());
    tools
}
