pub mod handler;
pub mod logging;
pub mod resolver;

pub use handler::{handle, HttpResponse};
pub use resolver::{Engine, Settings};
