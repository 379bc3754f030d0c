//! 基础设施层实现。
//!
//! 提供内存账本存储与外部协作方的本地适配器，实现应用层定义的接口。

pub mod builder;
pub mod collaborators;
pub mod memory;

pub use builder::{Infrastructure, InfrastructureError};
pub use collaborators::{
    InMemoryCalendar, LinkMeetingProvider, ManualPaymentGateway, SentMessage, TracingMessenger,
};
pub use memory::MemoryStorage;
