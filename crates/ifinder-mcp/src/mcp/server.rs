use super::calls::Capabilities;
use super::envelope::Outcome;
use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct FetchArgs {
    /// Portal path (`/barbacena/contato`) or absolute URL.
    #[serde(default)]
    pub reference: Option<String>,
    /// `text` (default) for visible text plus links, `raw` for parsed markup.
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct ReferenceArgs {
    /// Portal path, absolute URL, or (for documents) a local file path.
    #[serde(default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct SearchSimpleArgs {
    #[serde(default)]
    pub term: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct SearchFilteredArgs {
    #[serde(default)]
    pub term: Option<String>,
    /// Free words such as `notícias`, `editais`, `eventos`; unknown words are ignored.
    #[serde(default)]
    pub item_types: Option<Vec<String>>,
    /// `ontem`, `última semana`, `último mês` (or English equivalents).
    #[serde(default)]
    pub date_range: Option<String>,
    /// `relevância`, `data`, or `alfabética`.
    #[serde(default)]
    pub sort: Option<String>,
}

fn tool_result(outcome: Outcome) -> CallToolResult {
    // Structured envelope for the policy; the text mirrors what a person would read.
    let mut r = CallToolResult::structured(outcome.payload);
    r.content = vec![Content::text(outcome.text)];
    r
}

#[derive(Clone)]
pub(crate) struct IfinderMcp {
    tool_router: RmcpToolRouter<Self>,
    caps: Capabilities,
}

#[tool_router]
impl IfinderMcp {
    pub(crate) fn new(caps: Capabilities) -> Self {
        Self {
            tool_router: Self::tool_router(),
            caps,
        }
    }

    #[tool(
        description = "Fetch a portal page over plain HTTP. Returns visible text plus links (mode=text) or parsed markup (mode=raw). PDFs are returned as text."
    )]
    async fn fetch(
        &self,
        params: Parameters<Option<FetchArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        let o = self
            .caps
            .fetch(args.reference.as_deref(), args.mode.as_deref())
            .await;
        Ok(tool_result(o))
    }

    #[tool(
        description = "Render a page in a headless browser and return the resulting HTML. Slow; use when fetch returns empty_content."
    )]
    async fn fetch_rendered(
        &self,
        params: Parameters<Option<ReferenceArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(self.caps.fetch_rendered(args.reference.as_deref()).await))
    }

    #[tool(description = "Extract the text of a PDF (URL or local path) as markdown, one section per page.")]
    async fn extract_document(
        &self,
        params: Parameters<Option<ReferenceArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(self.caps.extract_document(args.reference.as_deref()).await))
    }

    #[tool(description = "List the PDF documents linked from a portal page.")]
    async fn find_document_links(
        &self,
        params: Parameters<Option<ReferenceArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(self.caps.find_document_links(args.reference.as_deref()).await))
    }

    #[tool(description = "Search the portal for a term. At most ten results with title, URL and summary.")]
    async fn search_simple(
        &self,
        params: Parameters<Option<SearchSimpleArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(self.caps.search_simple(args.term.as_deref()).await))
    }

    #[tool(
        description = "Search the portal with content-type, date-range and sort filters given as free words."
    )]
    async fn search_filtered(
        &self,
        params: Parameters<Option<SearchFilteredArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        let o = self
            .caps
            .search_filtered(
                args.term.as_deref(),
                args.item_types.as_deref().unwrap_or_default(),
                args.date_range.as_deref(),
                args.sort.as_deref(),
            )
            .await;
        Ok(tool_result(o))
    }

    #[tool(description = "Links from a page's content column, side menu and the strip above the content.")]
    async fn extract_navigation(
        &self,
        params: Parameters<Option<ReferenceArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        Ok(tool_result(self.caps.extract_navigation(args.reference.as_deref()).await))
    }

    #[tool(description = "Up to five latest headlines from the campus news index.")]
    async fn get_highlights(&self) -> Result<CallToolResult, McpError> {
        Ok(tool_result(self.caps.get_highlights().await))
    }

    #[tool(description = "Server configuration, capability names, local tool availability and the escalation table.")]
    async fn ifinder_meta(&self) -> Result<CallToolResult, McpError> {
        let payload = self.caps.meta();
        let text = payload.to_string();
        Ok(tool_result(Outcome { payload, text }))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for IfinderMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Retrieval over the IF Sudeste MG portal. Every result is a schema-versioned envelope; on failure, error.code classifies it and `next` names the suggested next capability."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub(crate) async fn serve_stdio(caps: Capabilities) -> Result<(), McpError> {
    tracing::info!(base_url = %caps.config().base_url, "serving MCP over stdio");
    let svc = IfinderMcp::new(caps.clone());
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    let r = running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None));
    // Client gone: nothing may outlive the session.
    caps.shutdown();
    r.map(|_| ())
}
