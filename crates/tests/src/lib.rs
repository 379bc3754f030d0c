//! 跨 crate 集成测试框架
//!
//! 提供手动时钟驱动的测试环境与测试数据工厂

pub mod test_data_factory;
pub mod test_environment;

// 重新导出常用类型
pub use test_data_factory::*;
pub use test_environment::*;
