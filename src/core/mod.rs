//! 核心控制层：错误类型、运行控制信号、执行控制器

pub mod controller;
pub mod error;
pub mod signals;

pub use controller::AgentController;
pub use error::{AgentError, ControllerError};
pub use signals::{ControlSignals, RunControl};
