//! 按行编辑文件：read / write / insert / append / replace / delete
//!
//! 行号从 1 开始；可对单个文件（filename）或一批文件（filenames）执行同一操作。
//! 批量模式下逐个文件汇总结果，单个文件失败不影响其余文件。

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::filesystem::{io_err, SafeFs};
use crate::tools::schema::{args_schema, parse_args};
use crate::tools::{Tool, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditOperation {
    Read,
    Write,
    Insert,
    Append,
    Replace,
    Delete,
}

impl EditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditOperation::Read => "read",
            EditOperation::Write => "write",
            EditOperation::Insert => "insert",
            EditOperation::Append => "append",
            EditOperation::Replace => "replace",
            EditOperation::Delete => "delete",
        }
    }
}

/// write 指定 line_number 时的写入方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// 覆盖该行
    #[default]
    Replace,
    /// 插到该行之前
    Insert,
    /// 插到该行之后
    Append,
}

/// 单个字符串或多行列表
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LineContent {
    Text(String),
    Lines(Vec<String>),
}

impl LineContent {
    /// 按行展开，每行带换行符
    fn to_lines(&self) -> Vec<String> {
        match self {
            LineContent::Text(text) => vec![format!("{text}\n")],
            LineContent::Lines(lines) => lines.iter().map(|l| format!("{l}\n")).collect(),
        }
    }

    /// 整文件写入时的文本
    fn to_text(&self) -> String {
        match self {
            LineContent::Text(text) => text.clone(),
            LineContent::Lines(lines) => lines.join("\n"),
        }
    }
}

/// 行选择：单个行号、行号列表、"all" 或 "start-end"
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LineSelection {
    One(usize),
    Many(Vec<usize>),
    Range(String),
}

fn out_of_range(line: usize, total: usize) -> ToolError {
    ToolError::Execution(format!(
        "Line number {line} is out of range (file has {total} lines)"
    ))
}

fn check_line(line: usize, total: usize) -> Result<usize, ToolError> {
    if line < 1 || line > total {
        return Err(out_of_range(line, total));
    }
    Ok(line)
}

impl LineSelection {
    /// 解析为有效行号；allow_all 控制是否接受 "all"
    fn resolve(&self, total: usize, allow_all: bool) -> Result<Vec<usize>, ToolError> {
        match self {
            LineSelection::One(line) => Ok(vec![check_line(*line, total)?]),
            LineSelection::Many(lines) => lines.iter().map(|l| check_line(*l, total)).collect(),
            LineSelection::Range(text) if allow_all && text.trim() == "all" => Ok((1..=total).collect()),
            LineSelection::Range(text) => {
                let Some((start, end)) = text.split_once('-') else {
                    return Err(ToolError::Execution(format!(
                        "Invalid line_numbers parameter: {text}"
                    )));
                };
                let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>())
                else {
                    return Err(ToolError::Execution(format!(
                        "Invalid range format '{text}'. Use format like '1-10'"
                    )));
                };
                if start < 1 || end > total || start > end {
                    return Err(ToolError::Execution(format!(
                        "Invalid range {start}-{end} (file has {total} lines)"
                    )));
                }
                Ok((start..=end).collect())
            }
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileEditorArgs {
    /// Operation to perform: 'read' (read file), 'write' (write content), 'insert' (insert lines), 'append' (append lines), 'replace' (replace specific lines), 'delete' (delete lines)
    pub operation: EditOperation,
    /// Path to a single file, relative to the workspace. Either filename or filenames must be provided.
    #[serde(default)]
    pub filename: Option<String>,
    /// List of file paths to operate on; the operation is applied to each file
    #[serde(default)]
    pub filenames: Option<Vec<String>>,
    /// Content for write/insert/append: a string, or a list of lines
    #[serde(default)]
    pub content: Option<LineContent>,
    /// Line number (1-indexed) for insert, or for write to target one line
    #[serde(default)]
    pub line_number: Option<usize>,
    /// Lines for read or delete: a number, a list of numbers, 'all' (read only), or a range like '1-10'
    #[serde(default)]
    pub line_numbers: Option<LineSelection>,
    /// Map of line number (1-indexed) to new content, for replace
    #[serde(default)]
    pub replacements: Option<BTreeMap<usize, String>>,
    /// Mode for write with line_number: 'replace' (overwrite line), 'insert' (before line), 'append' (after line)
    #[serde(default)]
    pub mode: WriteMode,
}

impl FileEditorArgs {
    /// 操作与目标文件的组合校验
    pub fn check(&self) -> Result<(), ToolError> {
        match self.operation {
            EditOperation::Read => {}
            EditOperation::Write if self.content.is_none() => {
                return Err(ToolError::validation("content", "content required for write"));
            }
            EditOperation::Insert if self.content.is_none() || self.line_number.is_none() => {
                let field = if self.content.is_none() { "content" } else { "line_number" };
                return Err(ToolError::validation(
                    field,
                    "content and line_number required for insert",
                ));
            }
            EditOperation::Append if self.content.is_none() => {
                return Err(ToolError::validation("content", "content required for append"));
            }
            EditOperation::Replace if self.replacements.is_none() => {
                return Err(ToolError::validation(
                    "replacements",
                    "replacements required for replace",
                ));
            }
            EditOperation::Delete if self.line_numbers.is_none() => {
                return Err(ToolError::validation(
                    "line_numbers",
                    "line_numbers required for delete",
                ));
            }
            _ => {}
        }
        match (&self.filename, &self.filenames) {
            (None, None) => Err(ToolError::validation(
                "filename",
                "Either filename or filenames must be provided",
            )),
            (Some(_), Some(_)) => Err(ToolError::validation(
                "filename",
                "Cannot provide both filename and filenames",
            )),
            (None, Some(names)) if names.is_empty() => Err(ToolError::validation(
                "filenames",
                "filenames list cannot be empty",
            )),
            _ => Ok(()),
        }
    }

    fn content_lines(&self) -> Vec<String> {
        self.content.as_ref().map(LineContent::to_lines).unwrap_or_default()
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

/// 拼回文本；中间缺少换行的行补上换行
fn join_lines(lines: &[String]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        out.push_str(line);
        if i + 1 < lines.len() && !line.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// 按行编辑文件
pub struct FileEditorTool {
    fs: SafeFs,
}

impl FileEditorTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }

    async fn read_lines(&self, filename: &str) -> Result<Vec<String>, ToolError> {
        let path = self.fs.resolve(filename)?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_err("reading file", filename, e))?;
        Ok(split_lines(&text))
    }

    async fn write_text(&self, filename: &str, text: &str) -> Result<(), ToolError> {
        let path = self.fs.resolve(filename)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("creating parent directories for", filename, e))?;
        }
        tokio::fs::write(&path, text)
            .await
            .map_err(|e| io_err("writing file", filename, e))
    }

    async fn apply(&self, args: &FileEditorArgs, filename: &str) -> Result<String, ToolError> {
        match args.operation {
            EditOperation::Read => self.read(args, filename).await,
            EditOperation::Write => self.write(args, filename).await,
            EditOperation::Insert => self.insert(args, filename).await,
            EditOperation::Append => self.append(args, filename).await,
            EditOperation::Replace => self.replace(args, filename).await,
            EditOperation::Delete => self.delete(args, filename).await,
        }
    }

    async fn read(&self, args: &FileEditorArgs, filename: &str) -> Result<String, ToolError> {
        let lines = self.read_lines(filename).await?;
        let total = lines.len();
        let selected: Vec<usize> = match &args.line_numbers {
            None => (1..=total).collect(),
            Some(selection) => selection.resolve(total, true)?,
        };
        let body: Vec<String> = selected
            .iter()
            .map(|n| format!("Line {n}: {}", lines[n - 1].trim_end()))
            .collect();
        Ok(format!(
            "File: {filename}\nTotal lines: {total}\n{}",
            body.join("\n")
        ))
    }

    async fn write(&self, args: &FileEditorArgs, filename: &str) -> Result<String, ToolError> {
        let Some(line) = args.line_number else {
            let text = args.content.as_ref().map(LineContent::to_text).unwrap_or_default();
            self.write_text(filename, &text).await?;
            return Ok(format!("Successfully wrote to {filename}"));
        };

        let mut lines = self.read_lines(filename).await?;
        let total = lines.len();
        if line < 1 || line > total + 1 {
            return Err(out_of_range(line, total));
        }
        let new_lines = args.content_lines();
        let count = new_lines.len();
        let summary = match args.mode {
            WriteMode::Replace => {
                if line <= total {
                    lines.splice(line - 1..line, new_lines);
                } else {
                    lines.extend(new_lines);
                }
                format!("Replaced line {line}")
            }
            WriteMode::Insert => {
                lines.splice(line - 1..line - 1, new_lines);
                format!("Inserted {count} line(s) before line {line}")
            }
            WriteMode::Append => {
                let at = line.min(lines.len());
                lines.splice(at..at, new_lines);
                format!("Appended {count} line(s) after line {line}")
            }
        };
        self.write_text(filename, &join_lines(&lines)).await?;
        Ok(format!("Successfully modified {filename}: {summary}"))
    }

    async fn insert(&self, args: &FileEditorArgs, filename: &str) -> Result<String, ToolError> {
        let line = args
            .line_number
            .ok_or_else(|| ToolError::validation("line_number", "line_number required for insert"))?;
        let mut lines = self.read_lines(filename).await?;
        let total = lines.len();
        if line < 1 || line > total + 1 {
            return Err(out_of_range(line, total));
        }
        let new_lines = args.content_lines();
        let count = new_lines.len();
        lines.splice(line - 1..line - 1, new_lines);
        self.write_text(filename, &join_lines(&lines)).await?;
        Ok(format!(
            "Successfully inserted {count} line(s) before line {line} in {filename}"
        ))
    }

    async fn append(&self, args: &FileEditorArgs, filename: &str) -> Result<String, ToolError> {
        let path = self.fs.resolve(filename)?;
        let mut lines = match tokio::fs::read_to_string(&path).await {
            Ok(text) => split_lines(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_err("reading file", filename, e)),
        };
        let new_lines = args.content_lines();
        let count = new_lines.len();
        lines.extend(new_lines);
        self.write_text(filename, &join_lines(&lines)).await?;
        Ok(format!("Successfully appended {count} line(s) to {filename}"))
    }

    async fn replace(&self, args: &FileEditorArgs, filename: &str) -> Result<String, ToolError> {
        let replacements = args
            .replacements
            .as_ref()
            .ok_or_else(|| ToolError::validation("replacements", "replacements required for replace"))?;
        let mut lines = self.read_lines(filename).await?;
        let total = lines.len();
        for line in replacements.keys() {
            check_line(*line, total)?;
        }
        for (line, text) in replacements {
            lines[line - 1] = format!("{text}\n");
        }
        self.write_text(filename, &join_lines(&lines)).await?;
        Ok(format!(
            "Successfully replaced {} line(s) in {filename}",
            replacements.len()
        ))
    }

    async fn delete(&self, args: &FileEditorArgs, filename: &str) -> Result<String, ToolError> {
        let selection = args
            .line_numbers
            .as_ref()
            .ok_or_else(|| ToolError::validation("line_numbers", "line_numbers required for delete"))?;
        let mut lines = self.read_lines(filename).await?;
        let doomed: BTreeSet<usize> = selection.resolve(lines.len(), false)?.into_iter().collect();
        for line in doomed.iter().rev() {
            lines.remove(line - 1);
        }
        self.write_text(filename, &join_lines(&lines)).await?;
        Ok(format!(
            "Successfully deleted {} line(s) from {filename}",
            doomed.len()
        ))
    }
}

#[async_trait]
impl Tool for FileEditorTool {
    fn name(&self) -> &str {
        "file_editor"
    }

    fn description(&self) -> &str {
        "Line-level file editor: read, write, insert, append, replace and delete lines in one file (filename) or the same operation across several files (filenames). Line numbers are 1-indexed."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FileEditorArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: FileEditorArgs = parse_args(args)?;
        args.check()?;
        tracing::info!(operation = args.operation.as_str(), "file_editor execute");

        let Some(filenames) = &args.filenames else {
            let filename = args.filename.as_deref().unwrap_or_default();
            return self.apply(&args, filename).await;
        };

        let mut results = Vec::with_capacity(filenames.len());
        let mut failed = 0;
        for filename in filenames {
            match self.apply(&args, filename).await {
                Ok(out) => results.push(format!("{filename}: {out}")),
                Err(e) => {
                    failed += 1;
                    results.push(format!("{filename}: Error: {e}"));
                }
            }
        }
        Ok(format!(
            "Batch operation '{}' completed.\nTotal files processed: {}\nSuccessful: {}, Failed: {}\n\nDetailed results:\n{}",
            args.operation.as_str(),
            filenames.len(),
            filenames.len() - failed,
            failed,
            results.join("\n")
        ))
    }
}
