mod collectors;
mod threads;

pub use collectors::{CollectorRegistry, MAX_COLLECTORS};
pub use threads::{MAX_THREADS, ThreadData, ThreadRegistry};
