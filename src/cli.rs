//! CLI domain: parse, route and the JSON-lines host.

pub mod host;
mod parse;
mod route;

pub use host::{Host, HostEvent, HostOutput, JsonLinesSurface};
pub use parse::{Cli, Commands};
pub use route::RunContext;
