//! 朋辈咨询预约核心领域模型
//!
//! 包含顾问、时段、预约、反馈、结算等核心实体，以及预约状态机规则。

pub mod booking;
pub mod counsellor;
pub mod errors;
pub mod feedback;
pub mod payment;
pub mod payout;
pub mod schedule;
pub mod value_objects;

// 重新导出常用类型
pub use booking::*;
pub use counsellor::*;
pub use errors::*;
pub use feedback::*;
pub use payment::*;
pub use payout::*;
pub use schedule::*;
pub use value_objects::*;
