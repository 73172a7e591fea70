//! Built-in tools.

mod display;
mod execute_query;

pub use display::{DISPLAY_IN_BROWSER, DisplayTool, RenderedView};
pub use execute_query::{EXECUTE_SQL_QUERY, ExecuteQueryTool};
