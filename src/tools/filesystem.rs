//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸，含尚不存在的目标路径）；
//! file_reader / file_writer / file_lister / directory_creator / file_mover 基于 SafeFs 实现；按行编辑见 file_editor。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolError};

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析相对路径（目标可以不存在，不接受绝对路径）；词法规整后必须仍在根下，已存在的路径再按真实路径校验（防符号链接逃逸）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let trimmed = path.trim();
        let relative = Path::new(trimmed.trim_start_matches("./"));
        let mut full = self.root_dir.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => full.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if full == self.root_dir || !full.pop() {
                        return Err(escape(path));
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape(path)),
            }
        }
        if let Ok(canonical) = full.canonicalize() {
            if !canonical.starts_with(&self.root_dir) {
                return Err(escape(path));
            }
        }
        Ok(full)
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string()
    }
}

fn escape(path: &str) -> ToolError {
    ToolError::Execution(format!("Path escapes workspace: {path}"))
}

pub(crate) fn io_err(action: &str, path: &str, e: std::io::Error) -> ToolError {
    ToolError::Execution(format!("Error {action} '{path}': {e}"))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileReaderArgs {
    /// Path to the file to read, relative to the workspace
    pub filename: String,
}

/// 读取单个文件
pub struct FileReaderTool {
    fs: SafeFs,
}

impl FileReaderTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FileReaderTool {
    fn name(&self) -> &str {
        "file_reader"
    }

    fn description(&self) -> &str {
        "Reads a single text file from the workspace."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FileReaderArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: FileReaderArgs = parse_args(args)?;
        let path = self.fs.resolve(&args.filename)?;
        tracing::info!(path = %path.display(), "file_reader execute");
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_err("reading file", &args.filename, e))?;
        Ok(format!("content of {}: {}", args.filename, content))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileWriterArgs {
    /// Path of the file to write, relative to the workspace
    pub filename: String,
    /// Plain text content (short content only)
    #[serde(default)]
    pub content: Option<String>,
    /// Base64-encoded content; use this for long or multi-line text to avoid JSON escaping issues
    #[serde(default)]
    pub content_base64: Option<String>,
    /// Append instead of overwrite
    #[serde(default)]
    pub append: bool,
}

impl FileWriterArgs {
    /// 取出待写入内容；content_base64 优先
    pub fn payload(&self) -> Result<Vec<u8>, ToolError> {
        match (&self.content_base64, &self.content) {
            (Some(encoded), _) => base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| ToolError::validation("content_base64", format!("invalid base64: {e}"))),
            (None, Some(text)) => Ok(text.clone().into_bytes()),
            (None, None) => Err(ToolError::validation(
                "content",
                "either content or content_base64 is required",
            )),
        }
    }
}

/// 写入文件（自动创建父目录）
pub struct FileWriterTool {
    fs: SafeFs,
}

impl FileWriterTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FileWriterTool {
    fn name(&self) -> &str {
        "file_writer"
    }

    fn description(&self) -> &str {
        "Writes (or appends) text to a file in the workspace. For long text, pass it base64-encoded in content_base64."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FileWriterArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        use tokio::io::AsyncWriteExt;

        let args: FileWriterArgs = parse_args(args)?;
        let bytes = args.payload()?;
        let path = self.fs.resolve(&args.filename)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("creating parent directories for", &args.filename, e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(args.append)
            .truncate(!args.append)
            .open(&path)
            .await
            .map_err(|e| io_err("opening file", &args.filename, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| io_err("writing file", &args.filename, e))?;
        file.flush()
            .await
            .map_err(|e| io_err("writing file", &args.filename, e))?;
        let verb = if args.append { "appended" } else { "wrote" };
        Ok(format!("Successfully {verb} {} bytes to {}", bytes.len(), args.filename))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileListerArgs {
    /// Directory to list, relative to the workspace ('.' for the root)
    pub directory: String,
    /// Optional glob pattern inside the directory, default '*'
    #[serde(default)]
    pub pattern: Option<String>,
}

/// 按通配符列出目录下的文件
pub struct FileListerTool {
    fs: SafeFs,
}

impl FileListerTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FileListerTool {
    fn name(&self) -> &str {
        "file_lister"
    }

    fn description(&self) -> &str {
        "Lists files in a workspace directory, optionally filtered by a glob pattern."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FileListerArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: FileListerArgs = parse_args(args)?;
        let pattern = args.pattern.as_deref().unwrap_or("*");
        if pattern.contains("..") || Path::new(pattern).is_absolute() {
            return Err(ToolError::validation("pattern", "pattern must stay inside the directory"));
        }
        let dir = self.fs.resolve(&args.directory)?;
        let full = dir.join(pattern);
        let entries = glob::glob(&full.to_string_lossy())
            .map_err(|e| ToolError::validation("pattern", e.to_string()))?;
        let mut files: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|p| {
                let suffix = if p.is_dir() { "/" } else { "" };
                format!("{}{}", self.fs.display(&p), suffix)
            })
            .collect();
        files.sort();
        Ok(format!("Files in {}: {}", args.directory, files.join(", ")))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DirectoryCreatorArgs {
    /// Directory path to create, relative to the workspace
    pub directory_path: String,
    /// Create parent directories if they don't exist (default true)
    #[serde(default = "default_true")]
    pub parents: bool,
    /// Don't fail if the directory already exists (default true)
    #[serde(default = "default_true")]
    pub exist_ok: bool,
}

fn default_true() -> bool {
    true
}

pub struct DirectoryCreatorTool {
    fs: SafeFs,
}

impl DirectoryCreatorTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for DirectoryCreatorTool {
    fn name(&self) -> &str {
        "directory_creator"
    }

    fn description(&self) -> &str {
        "Create directories in the workspace."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<DirectoryCreatorArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: DirectoryCreatorArgs = parse_args(args)?;
        let path = self.fs.resolve(&args.directory_path)?;
        if path.exists() {
            return if args.exist_ok {
                Ok(format!("Directory '{}' already exists", args.directory_path))
            } else {
                Err(ToolError::Execution(format!(
                    "Directory '{}' already exists and exist_ok=false",
                    args.directory_path
                )))
            };
        }
        let created = if args.parents {
            tokio::fs::create_dir_all(&path).await
        } else {
            tokio::fs::create_dir(&path).await
        };
        created.map_err(|e| io_err("creating directory", &args.directory_path, e))?;
        Ok(format!("Successfully created directory '{}'", args.directory_path))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileMoverArgs {
    /// Source path, relative to the workspace
    pub source: String,
    /// Destination path, relative to the workspace
    pub destination: String,
    /// Replace the destination if it exists (default false)
    #[serde(default)]
    pub overwrite: bool,
}

/// 移动 / 重命名文件或目录
pub struct FileMoverTool {
    fs: SafeFs,
}

impl FileMoverTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for FileMoverTool {
    fn name(&self) -> &str {
        "file_mover"
    }

    fn description(&self) -> &str {
        "Move or rename a file or directory inside the workspace."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FileMoverArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: FileMoverArgs = parse_args(args)?;
        let source = self.fs.resolve(&args.source)?;
        let mut destination = self.fs.resolve(&args.destination)?;
        if !source.exists() {
            return Err(ToolError::Execution(format!(
                "Source '{}' does not exist",
                args.source
            )));
        }
        // 目标为已存在目录时移入其中
        if destination.is_dir() && !source.is_dir() {
            if let Some(name) = source.file_name() {
                destination = destination.join(name);
            }
        }
        if destination.exists() && !args.overwrite {
            return Err(ToolError::Execution(format!(
                "Destination '{}' already exists (set overwrite=true to replace)",
                self.fs.display(&destination)
            )));
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("creating parent directories for", &args.destination, e))?;
        }
        tokio::fs::rename(&source, &destination)
            .await
            .map_err(|e| io_err("moving", &args.source, e))?;
        Ok(format!(
            "Moved '{}' to '{}'",
            args.source,
            self.fs.display(&destination)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use serde_json::json;

    #[test]
    fn test_resolve_blocks_escape() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SafeFs::new(dir.path());
        assert!(fs.resolve("../etc/passwd").is_err());
        assert!(fs.resolve("a/../../b").is_err());
        assert!(fs.resolve("/etc/passwd").is_err());
        assert_eq!(fs.resolve("a/./b.txt").unwrap(), fs.root().join("a").join("b.txt"));
    }

    #[tokio::test]
    async fn test_write_read_roundtrip_with_base64() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SafeFs::new(dir.path());
        let encoded = base64::engine::general_purpose::STANDARD.encode("line 1\n\"quoted\"\n");
        FileWriterTool::new(fs.clone())
            .execute(json!({"filename": "notes/out.txt", "content_base64": encoded}))
            .await
            .unwrap();
        let out = FileReaderTool::new(fs)
            .execute(json!({"filename": "notes/out.txt"}))
            .await
            .unwrap();
        assert_eq!(out, "content of notes/out.txt: line 1\n\"quoted\"\n");
    }

    #[tokio::test]
    async fn test_writer_requires_content() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileWriterTool::new(SafeFs::new(dir.path()))
            .execute(json!({"filename": "x.txt"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation { ref field, .. } if field == "content"));
    }

    #[tokio::test]
    async fn test_lister_mkdir_and_move() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SafeFs::new(dir.path());
        DirectoryCreatorTool::new(fs.clone())
            .execute(json!({"directory_path": "archive"}))
            .await
            .unwrap();
        FileWriterTool::new(fs.clone())
            .execute(json!({"filename": "a.txt", "content": "x"}))
            .await
            .unwrap();
        FileMoverTool::new(fs.clone())
            .execute(json!({"source": "a.txt", "destination": "archive"}))
            .await
            .unwrap();
        let listing = FileListerTool::new(fs)
            .execute(json!({"directory": "archive"}))
            .await
            .unwrap();
        assert_eq!(listing, "Files in archive: archive/a.txt");
    }

    #[tokio::test]
    async fn test_mkdir_exist_ok_false() {
        let dir = tempfile::tempdir().unwrap();
        let tool = DirectoryCreatorTool::new(SafeFs::new(dir.path()));
        tool.execute(json!({"directory_path": "d"})).await.unwrap();
        assert!(tool
            .execute(json!({"directory_path": "d", "exist_ok": false}))
            .await
            .is_err());
    }
}
