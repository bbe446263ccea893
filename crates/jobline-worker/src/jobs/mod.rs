//! Built-in job handler implementations.

pub mod delay;
pub mod echo;

pub use delay::DelayJobHandler;
pub use echo::EchoJobHandler;
