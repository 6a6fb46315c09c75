// 分层结构：domain ← application ← infrastructure / interfaces
// 所有模块公开，供二进制文件、集成测试和基准测试使用
pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod interfaces;
pub mod shared;
