//! # Comma CSV
//!
//! 机器人数据流的 ascii/binary CSV 记录编解码核心（无 I/O 依赖）
//!
//! ## 模块
//!
//! - `types`: 线上类型定义（类型标签、字节宽度、转换类别）
//! - `time`: 时间戳类型与 ISO 8601 basic 解析/渲染
//! - `format`: 类型描述符（布局语言）解析与单字段文本/二进制互转
//! - `record`: 结构体遍历协议（`Record` trait 与访问器）
//! - `fields`: 字段名解析与列映射计划
//! - `ascii`: ascii 编解码器（文本 token 向量 <-> 结构体）
//! - `binary`: binary 编解码器（定长字节缓冲 <-> 结构体）
//! - `options`: 编解码器共享配置
//!
//! ## 数据流
//!
//! ```text
//! 描述符字符串 + 字段名列表
//!     ↓ 构造期（每个结构体类型一次）
//! Format + Plan（不可变）
//!     ↓ 逐记录应用
//! 文本 token / 字节缓冲 <-> 结构体实例
//! ```
//!
//! ## 字节序
//!
//! 二进制线格式使用本机字节序，编解码器内部不做网络字节序转换。
//!
//! ## 线程模型
//!
//! 编解码器每次调用无状态；计划在构造后只读。多线程使用时每个线程
//! 持有自己的编解码器实例，跨线程共享需要调用方自行同步。

pub mod ascii;
pub mod binary;
pub mod fields;
pub mod format;
pub mod options;
pub mod record;
pub mod time;
pub mod types;

pub use ascii::AsciiCodec;
pub use binary::BinaryCodec;
pub use fields::Plan;
pub use format::{ElementView, Format};
pub use options::CsvOptions;
pub use record::{Leaf, LeafMut, Record, Visitor, VisitorMut};
pub use time::Timestamp;
pub use types::WireType;

use thiserror::Error;

/// 编解码错误类型
///
/// 所有错误都是同步的、局部于单条记录的转换，编解码器内部没有重试
/// 或部分成功：第一个错误立即向调用方传播，是否跳过坏记录由外层
/// 流循环决定。
#[derive(Error, Debug)]
pub enum CsvError {
    /// 描述符语法错误（解析期，处理任何记录之前）
    #[error("Invalid format descriptor: {0}")]
    BadDescriptor(String),

    /// 逻辑字段下标越界
    #[error("Field index {index} out of range (field count: {count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// 记录的字段数与要求不符
    #[error("Too few fields: expected {expected}, got {actual} in line: {line}")]
    FieldCount {
        expected: usize,
        actual: usize,
        line: String,
    },

    /// 文本转二进制时数值超出声明范围
    #[error("Value out of range for {target}: {value}")]
    OutOfRange { target: &'static str, value: String },

    /// 文本值无法解析为目标类型
    #[error("Invalid value for {target}: {value}")]
    InvalidValue { target: &'static str, value: String },

    /// 二进制类型转换语义不兼容（数值 <-> 字符串 / 数值 <-> 时间）
    #[error("Cannot cast {from} to {to}")]
    InvalidCast { from: String, to: String },

    /// 二进制缓冲区长度与描述符不一致
    #[error("Buffer size mismatch: expected {expected}, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    /// 时间值无法解析或超出可表示范围
    #[error("Invalid time value: {0}")]
    InvalidTime(String),
}
