pub mod doa;
pub mod engine;
pub mod features;
pub mod gates;
pub mod stats;

pub use engine::{DetectionEngine, EngineConfig, EngineStatus};
pub use gates::{Gate, GateChain, GateOutcome, TickContext};
