mod lead;
mod webhook_event;

pub use lead::*;
pub use webhook_event::*;
