//! 应用层：面向表现层的业务编排

pub mod redemption;
