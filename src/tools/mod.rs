//! 工具箱：注册表与内建工具（echo / file.* / fs.* / shell.run / http.request / tool.*）
//!
//! 动态发现被显式的编译期注册列表取代：builtin_tools 按配置构建全量注册表，
//! 重复名在该阶段静默跳过。

use std::sync::Arc;

pub mod echo;
pub mod filesystem;
pub mod http;
pub mod meta;
pub mod registry;
pub mod shell;

pub use echo::EchoTool;
pub use filesystem::{
    FileAppendTool, FileDeleteTool, FileReadTool, FileWriteTool, FsListTool, FsStatTool, SafeFs,
};
pub use http::HttpRequestTool;
pub use meta::{ToolInfoTool, ToolListTool};
pub use registry::{Tool, ToolError, ToolRegistry};
pub use shell::ShellTool;

use crate::config::ToolsSection;

/// 显式注册全部内建工具；重复名静默跳过
pub fn builtin_tools(cfg: &ToolsSection) -> Arc<ToolRegistry> {
    let root = cfg
        .filesystem_root
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("workspace"));
    let _ = std::fs::create_dir_all(&root);
    let fs = SafeFs::new(&root);

    let registry = Arc::new(ToolRegistry::new(cfg.tool_timeout_secs));
    registry.register_quiet(Arc::new(EchoTool));
    registry.register_quiet(Arc::new(FileReadTool::new(fs.clone())));
    registry.register_quiet(Arc::new(FileWriteTool::new(fs.clone())));
    registry.register_quiet(Arc::new(FileAppendTool::new(fs.clone())));
    registry.register_quiet(Arc::new(FileDeleteTool::new(fs.clone())));
    registry.register_quiet(Arc::new(FsListTool::new(fs.clone())));
    registry.register_quiet(Arc::new(FsStatTool::new(fs)));
    registry.register_quiet(Arc::new(ShellTool::new(
        cfg.shell.allowed_commands.clone(),
        cfg.tool_timeout_secs,
    )));
    registry.register_quiet(Arc::new(HttpRequestTool::new(
        cfg.http.allowed_domains.clone(),
        cfg.http.timeout_secs,
        cfg.http.max_result_chars,
    )));
    registry.register_quiet(Arc::new(ToolListTool::new(Arc::downgrade(&registry))));
    registry.register_quiet(Arc::new(ToolInfoTool::new(Arc::downgrade(&registry))));
    registry
}
