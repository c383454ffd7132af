//! Built-in path handlers.

mod echo;
mod static_json;

pub use echo::EchoHandler;
pub use static_json::StaticJsonHandler;
