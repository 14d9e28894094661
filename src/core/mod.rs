//! 核心层：错误、时钟、两阶段工具调用编排

pub mod clock;
pub mod error;
pub mod orchestrator;

pub use clock::{format_date, Clock, FixedClock, SystemClock};
pub use error::AgentError;
pub use orchestrator::{Orchestrator, TurnOutcome};
