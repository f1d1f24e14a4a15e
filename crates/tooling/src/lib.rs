pub mod handlers;
pub mod math;
pub mod registry;
pub mod tool;

pub use handlers::{HandlerRegistry, SharedHandler};
pub use math::MathTools;
pub use registry::{RegistryError, ToolGroupRegistry, ToolGroups};
pub use tool::{ToolError, ToolHandler, ToolInput, ToolSpec};
