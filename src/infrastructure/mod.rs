//! 基础设施层：外部系统交互
//!
//! 提供与外部系统（媒体服务器、数据库、HTTP、日志）的交互能力

pub mod logger;
pub mod media;
pub mod store;
pub mod web;
