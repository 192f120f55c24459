//! 编解码器共享配置
//!
//! ascii 与 binary 编解码器都从同一份 [`CsvOptions`] 构造。
//! 启用 `serde` feature 后可直接从 TOML/JSON 配置文件反序列化。

/// 编解码器配置
///
/// | 字段 | 缺省值 | 说明 |
/// |------|--------|------|
/// | `fields` | `""` | 逗号分隔字段列表，空为全选 |
/// | `delimiter` | `,` | ascii 记录分隔符 |
/// | `format` | `""` | binary 描述符，空为按结构体派生 |
/// | `full_path_as_name` | `true` | 字段名按全路径匹配 |
/// | `precision` | `None` | 浮点输出精度覆盖 |
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CsvOptions {
    /// 逗号分隔的字段名列表；空段为列占位符
    pub fields: String,

    /// ascii 记录的分隔符
    pub delimiter: char,

    /// binary 类型描述符字符串；空时从选中叶子的固有类型派生
    pub format: String,

    /// 真：字段名按全路径匹配；假：允许尾部子路径匹配
    pub full_path_as_name: bool,

    /// 浮点输出精度覆盖；`None` 用各调用路径自己的缺省值
    pub precision: Option<usize>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            fields: String::new(),
            delimiter: ',',
            format: String::new(),
            full_path_as_name: true,
            precision: None,
        }
    }
}

impl CsvOptions {
    /// 以字段列表构造，其余取缺省值
    pub fn with_fields(fields: &str) -> Self {
        Self {
            fields: fields.to_string(),
            ..Self::default()
        }
    }

    /// 以字段列表和描述符构造
    pub fn with_fields_and_format(fields: &str, format: &str) -> Self {
        Self {
            fields: fields.to_string(),
            format: format.to_string(),
            ..Self::default()
        }
    }
}
