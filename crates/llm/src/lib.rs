pub mod config;
pub mod error;
pub mod http;
pub mod judge;
pub mod mock;

pub use config::JudgeConfig;
pub use error::JudgeError;
pub use http::HttpJudge;
pub use judge::{Judgement, JudgeClient};
pub use mock::{FailingJudge, StaticJudge};
