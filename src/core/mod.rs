//! 核心层：错误分类、会话级任务串行、优雅关闭

pub mod error;
pub mod serializer;
pub mod shutdown;

pub use error::{BotError, ToolError, TransportError};
pub use serializer::TaskSerializer;
pub use shutdown::{ShutdownManager, ShutdownReason};
