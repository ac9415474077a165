//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸）；
//! file.read / file.write / file.append / file.delete 与 fs.list / fs.stat
//! 均基于 SafeFs。写入类工具对尚不存在的目标只校验父目录。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root: PathBuf,
}

impl SafeFs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 校验已存在路径在沙箱内
    pub fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let path = path.trim_start_matches("./");
        let full = self.root.join(path);
        let canonical = full
            .canonicalize()
            .map_err(|_| format!("Path not found: {}", path))?;
        if canonical.starts_with(&self.root) {
            Ok(canonical)
        } else {
            Err(format!("Path escapes sandbox: {}", path)) // 如 ../../etc/passwd
        }
    }

    /// 校验可能尚不存在的目标：父目录必须存在且在沙箱内
    pub fn resolve_for_write(&self, path: &str) -> Result<PathBuf, String> {
        let path = path.trim_start_matches("./");
        let full = self.root.join(path);
        let parent = full
            .parent()
            .ok_or_else(|| format!("No parent directory: {}", path))?;
        let parent = parent
            .canonicalize()
            .map_err(|_| format!("Parent not found: {}", path))?;
        if !parent.starts_with(&self.root) {
            return Err(format!("Path escapes sandbox: {}", path));
        }
        let name = full
            .file_name()
            .ok_or_else(|| format!("No file name: {}", path))?;
        Ok(parent.join(name))
    }
}

fn arg_path(args: &Value) -> &str {
    args.get("path").and_then(|v| v.as_str()).unwrap_or("")
}

fn path_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "description": "Path relative to the sandbox root"}
        },
        "required": ["path"]
    })
}

fn path_content_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "description": "Path relative to the sandbox root"},
            "content": {"type": "string", "description": "Text content"}
        },
        "required": ["path", "content"]
    })
}

/// file.read：读取文件内容
pub struct FileReadTool {
    fs: SafeFs,
}

impl FileReadTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file.read"
    }

    fn description(&self) -> &str {
        "Read a text file inside the sandbox."
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = arg_path(&args);
        let resolved = self.fs.resolve(path)?;
        let content =
            std::fs::read_to_string(&resolved).map_err(|e| format!("Read failed: {}", e))?;
        Ok(serde_json::json!({ "path": path, "content": content }))
    }
}

/// file.write：覆盖写入
pub struct FileWriteTool {
    fs: SafeFs,
}

impl FileWriteTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file.write"
    }

    fn description(&self) -> &str {
        "Write (overwrite) a text file inside the sandbox."
    }

    fn parameters_schema(&self) -> Value {
        path_content_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = arg_path(&args);
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
        let resolved = self.fs.resolve_for_write(path)?;
        std::fs::write(&resolved, content).map_err(|e| format!("Write failed: {}", e))?;
        Ok(serde_json::json!({ "path": path, "bytes": content.len() }))
    }
}

/// file.append：追加写入
pub struct FileAppendTool {
    fs: SafeFs,
}

impl FileAppendTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FileAppendTool {
    fn name(&self) -> &str {
        "file.append"
    }

    fn description(&self) -> &str {
        "Append text to a file inside the sandbox (creates it if missing)."
    }

    fn parameters_schema(&self) -> Value {
        path_content_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        use std::io::Write;

        let path = arg_path(&args);
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
        let resolved = self.fs.resolve_for_write(path)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&resolved)
            .map_err(|e| format!("Open failed: {}", e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| format!("Append failed: {}", e))?;
        Ok(serde_json::json!({ "path": path, "appended": content.len() }))
    }
}

/// file.delete：删除文件
pub struct FileDeleteTool {
    fs: SafeFs,
}

impl FileDeleteTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FileDeleteTool {
    fn name(&self) -> &str {
        "file.delete"
    }

    fn description(&self) -> &str {
        "Delete a file inside the sandbox."
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = arg_path(&args);
        let resolved = self.fs.resolve(path)?;
        if !resolved.is_file() {
            return Err(format!("Not a file: {}", path));
        }
        std::fs::remove_file(&resolved).map_err(|e| format!("Delete failed: {}", e))?;
        Ok(serde_json::json!({ "path": path, "deleted": true }))
    }
}

/// fs.list：列出目录
pub struct FsListTool {
    fs: SafeFs,
}

impl FsListTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FsListTool {
    fn name(&self) -> &str {
        "fs.list"
    }

    fn description(&self) -> &str {
        "List a directory inside the sandbox."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory path, default '.'"}
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let base = if path.is_empty() || path == "." {
            self.fs.root().to_path_buf()
        } else {
            self.fs.resolve(path)?
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base).map_err(|e| format!("List failed: {}", e))? {
            let e = e.map_err(|e| e.to_string())?;
            let name = e.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let kind = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                "dir"
            } else {
                "file"
            };
            entries.push(serde_json::json!({ "name": name, "type": kind }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(serde_json::json!({ "path": path, "entries": entries }))
    }
}

/// fs.stat：查询路径元信息
pub struct FsStatTool {
    fs: SafeFs,
}

impl FsStatTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FsStatTool {
    fn name(&self) -> &str {
        "fs.stat"
    }

    fn description(&self) -> &str {
        "Stat a path inside the sandbox (existence, type, size)."
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = arg_path(&args);
        let resolved = match self.fs.resolve(path) {
            Ok(p) => p,
            Err(_) => {
                return Ok(serde_json::json!({ "path": path, "exists": false }));
            }
        };
        let meta = std::fs::metadata(&resolved).map_err(|e| format!("Stat failed: {}", e))?;
        let kind = if meta.is_dir() { "dir" } else { "file" };
        Ok(serde_json::json!({
            "path": path,
            "exists": true,
            "type": kind,
            "size": meta.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, SafeFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = SafeFs::new(dir.path());
        (dir, fs)
    }

    #[tokio::test]
    async fn test_write_read_roundtrip_and_stat() {
        let (_dir, fs) = setup();
        let write = FileWriteTool::new(fs.clone());
        write
            .execute(serde_json::json!({"path": "a.txt", "content": "hello"}))
            .await
            .unwrap();

        let read = FileReadTool::new(fs.clone());
        let out = read
            .execute(serde_json::json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(out["content"], "hello");

        let stat = FsStatTool::new(fs);
        let out = stat
            .execute(serde_json::json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert_eq!(out["exists"], true);
        assert_eq!(out["type"], "file");
        assert_eq!(out["size"], 5);
    }

    #[tokio::test]
    async fn test_escape_rejected() {
        let (_dir, fs) = setup();
        let read = FileReadTool::new(fs.clone());
        let err = read
            .execute(serde_json::json!({"path": "../../etc/passwd"}))
            .await
            .unwrap_err();
        assert!(err.contains("Path"));

        let write = FileWriteTool::new(fs);
        assert!(write
            .execute(serde_json::json!({"path": "../escape.txt", "content": "x"}))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (_dir, fs) = setup();
        let write = FileWriteTool::new(fs.clone());
        write
            .execute(serde_json::json!({"path": "b.txt", "content": "x"}))
            .await
            .unwrap();

        let list = FsListTool::new(fs.clone());
        let out = list.execute(serde_json::json!({})).await.unwrap();
        let names: Vec<&str> = out["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"b.txt"));

        let delete = FileDeleteTool::new(fs.clone());
        delete
            .execute(serde_json::json!({"path": "b.txt"}))
            .await
            .unwrap();
        let stat = FsStatTool::new(fs);
        let out = stat
            .execute(serde_json::json!({"path": "b.txt"}))
            .await
            .unwrap();
        assert_eq!(out["exists"], false);
    }
}
