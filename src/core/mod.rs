//! 核心层：存储抽象、后端抽象与开通编排

pub mod backend;
pub mod provisioner;
pub mod store;
