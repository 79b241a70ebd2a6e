//! System prompt builder implementation.

use crate::tool::ToolRegistry;

/// Reference for the structured query language, shown to the model verbatim.
pub const QUERY_LANGUAGE_GUIDE: &str = include_str!("query_language.md");

const IDENTITY: &str = "You are an AI assistant providing data analytics for designs hosted in Autodesk Construction Cloud. \
You use the Model Properties Query Language and API to retrieve relevant information from individual designs.";

const PROPERTY_HINTS: &[&str] = &[
    "When asked about a (Revit) category of elements, look for the property called \"_RC\".",
    "When asked about a (Revit) family type of elements, look for the property called \"_RFT\".",
    "When asked about a name of an element, look for the property called \"__name__\".",
];

/// A tool summary for prompt generation.
#[derive(Debug, Clone)]
pub struct ToolSummary {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
}

/// Builder for the design assistant's system prompt.
///
/// Sections, in order: identity, property hints, tools, query language guide,
/// working design. Sections are joined with double newlines.
#[derive(Debug, Clone)]
pub struct SystemPromptBuilder {
    identity: String,
    property_hints: bool,
    tools: Option<Vec<ToolSummary>>,
    query_guide: bool,
    design: Option<String>,
}

impl Default for SystemPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPromptBuilder {
    /// Create a builder with the standard identity, hints and query guide.
    pub fn new() -> Self {
        Self {
            identity: IDENTITY.to_string(),
            property_hints: true,
            tools: None,
            query_guide: true,
            design: None,
        }
    }

    /// Replace the identity statement.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Omit the property vocabulary hints.
    pub fn without_property_hints(mut self) -> Self {
        self.property_hints = false;
        self
    }

    /// Omit the query language guide.
    pub fn without_query_guide(mut self) -> Self {
        self.query_guide = false;
        self
    }

    /// List the tools of a registry.
    pub fn with_tools(mut self, registry: &ToolRegistry) -> Self {
        let summaries = registry
            .iter()
            .map(|tool| ToolSummary {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect();
        self.tools = Some(summaries);
        self
    }

    /// Set the design version the conversation is about.
    pub fn with_design(mut self, version_urn: impl Into<String>) -> Self {
        self.design = Some(version_urn.into());
        self
    }

    /// Build the final system prompt string.
    pub fn build(self) -> String {
        let mut sections: Vec<String> = Vec::new();

        if !self.identity.is_empty() {
            sections.push(self.identity.clone());
        }

        if self.property_hints {
            sections.push(PROPERTY_HINTS.join("\n"));
        }

        if let Some(tools) = self.build_tools_section() {
            sections.push(tools);
        }

        if self.query_guide {
            sections.push(QUERY_LANGUAGE_GUIDE.trim().to_string());
        }

        if let Some(design) = &self.design {
            sections.push(format!(
                "Unless specified otherwise, you are working with design ID \"{}\"",
                design
            ));
        }

        sections.join("\n\n")
    }

    fn build_tools_section(&self) -> Option<String> {
        let tools = self.tools.as_ref()?;
        if tools.is_empty() {
            return None;
        }

        let mut lines = vec!["# Available Tools".to_string()];
        for tool in tools {
            lines.push(format!("- **{}**: {}", tool.name, tool.description));
        }
        Some(lines.join("\n"))
    }
}
