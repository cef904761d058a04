//! 工具箱：注册表、参数 Schema、执行器与标准工具集

pub mod answer;
pub mod calculator;
pub mod datetime;
pub mod executor;
pub mod file_editor;
pub mod filesystem;
pub mod registry;
pub mod schema;

pub use answer::{FinalAnswerTool, RequestUserInteractionTool, ThoughtTool};
pub use calculator::CalculatorTool;
pub use datetime::DateTimeTool;
pub use executor::ToolExecutor;
pub use file_editor::FileEditorTool;
pub use filesystem::{
    DirectoryCreatorTool, FileListerTool, FileMoverTool, FileReaderTool, FileWriterTool, SafeFs,
};
pub use registry::{Tool, ToolError, ToolRegistry, ToolRole};
pub use schema::{args_schema, parse_args};
