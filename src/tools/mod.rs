//! 工具层：补全查询工具、注册表与带超时/拦截器的执行器

pub mod enrichment;
pub mod executor;
pub mod registry;

pub use enrichment::{
    demo_registry, register_enrichment_tools, FetchServiceHealthTool, KnownIssue,
    LookupRunbookTool, OpsCatalog, SearchKnownIssuesTool, ServiceHealth, FETCH_SERVICE_HEALTH,
    LOOKUP_RUNBOOK, SEARCH_KNOWN_ISSUES,
};
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
