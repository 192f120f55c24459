//! 结构体遍历协议
//!
//! 编解码器对结构体的全部认知来自这里：一个稳定的深度优先遍历，
//! 按声明顺序报告每个标量叶子的名字和类型。结构体通过手写
//! [`Record`] 实现注册自己的字段描述，嵌套结构、`Option` 包装与
//! 数组分别由 [`visit_nested`]、[`visit_optional`] 等辅助函数展开，
//! 数组元素使用下标后缀的合成名（`name[i]`）。
//!
//! 同一个实现同时服务四种用途：形状收集（构造计划）、ascii 读写、
//! binary 读写。遍历必须恒定地覆盖完整的静态形状，`None` 的
//! Option 也按内层类型的缺省实例走完，否则叶子计数会漂移。
//!
//! # 示例
//!
//! ```
//! use comma_csv::{Leaf, LeafMut, Record, Visitor, VisitorMut};
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Position {
//!     x: f64,
//!     y: f64,
//! }
//!
//! impl Record for Position {
//!     fn visit(&self, v: &mut dyn Visitor) {
//!         v.field("x", Leaf::F64(&self.x));
//!         v.field("y", Leaf::F64(&self.y));
//!     }
//!
//!     fn visit_mut(&mut self, v: &mut dyn VisitorMut) {
//!         v.field("x", LeafMut::F64(&mut self.x));
//!         v.field("y", LeafMut::F64(&mut self.y));
//!     }
//! }
//! ```

use crate::time::Timestamp;
use crate::types::WireType;

/// 标量叶子的只读借用
#[derive(Debug)]
pub enum Leaf<'a> {
    Bool(&'a bool),
    I8(&'a i8),
    U8(&'a u8),
    I16(&'a i16),
    U16(&'a u16),
    I32(&'a i32),
    U32(&'a u32),
    I64(&'a i64),
    U64(&'a u64),
    F32(&'a f32),
    F64(&'a f64),
    Char(&'a char),
    Time(&'a Timestamp),
    Str(&'a String),
}

/// 标量叶子的可变借用
#[derive(Debug)]
pub enum LeafMut<'a> {
    Bool(&'a mut bool),
    I8(&'a mut i8),
    U8(&'a mut u8),
    I16(&'a mut i16),
    U16(&'a mut u16),
    I32(&'a mut i32),
    U32(&'a mut u32),
    I64(&'a mut i64),
    U64(&'a mut u64),
    F32(&'a mut f32),
    F64(&'a mut f64),
    Char(&'a mut char),
    Time(&'a mut Timestamp),
    Str(&'a mut String),
}

impl Leaf<'_> {
    /// 叶子的固有线上类型
    ///
    /// bool 映射到 `b`；字符串的固有宽度取自当前值的字节长度
    /// （形状从样本实例收集，宽度随样本确定一次）。
    pub fn kind(&self) -> WireType {
        match self {
            Leaf::Bool(_) => WireType::Int8,
            Leaf::I8(_) => WireType::Int8,
            Leaf::U8(_) => WireType::Uint8,
            Leaf::I16(_) => WireType::Int16,
            Leaf::U16(_) => WireType::Uint16,
            Leaf::I32(_) => WireType::Int32,
            Leaf::U32(_) => WireType::Uint32,
            Leaf::I64(_) => WireType::Int64,
            Leaf::U64(_) => WireType::Uint64,
            Leaf::F32(_) => WireType::Float32,
            Leaf::F64(_) => WireType::Float64,
            Leaf::Char(_) => WireType::Char,
            Leaf::Time(_) => WireType::TimeMicros,
            Leaf::Str(s) => WireType::FixedString(s.len().max(1)),
        }
    }
}

impl LeafMut<'_> {
    /// 叶子的固有线上类型（与 [`Leaf::kind`] 一致）
    pub fn kind(&self) -> WireType {
        match self {
            LeafMut::Bool(_) => WireType::Int8,
            LeafMut::I8(_) => WireType::Int8,
            LeafMut::U8(_) => WireType::Uint8,
            LeafMut::I16(_) => WireType::Int16,
            LeafMut::U16(_) => WireType::Uint16,
            LeafMut::I32(_) => WireType::Int32,
            LeafMut::U32(_) => WireType::Uint32,
            LeafMut::I64(_) => WireType::Int64,
            LeafMut::U64(_) => WireType::Uint64,
            LeafMut::F32(_) => WireType::Float32,
            LeafMut::F64(_) => WireType::Float64,
            LeafMut::Char(_) => WireType::Char,
            LeafMut::Time(_) => WireType::TimeMicros,
            LeafMut::Str(s) => WireType::FixedString(s.len().max(1)),
        }
    }
}

/// 只读遍历的访问器
pub trait Visitor {
    /// 进入一个命名的嵌套作用域
    fn begin_struct(&mut self, _name: &str) {}

    /// 离开嵌套作用域
    fn end_struct(&mut self) {}

    /// 进入 Option 包装作用域（命名与嵌套作用域一致）
    fn begin_optional(&mut self, name: &str) {
        self.begin_struct(name);
    }

    /// 离开 Option 包装作用域
    fn end_optional(&mut self) {
        self.end_struct();
    }

    /// 报告一个标量叶子
    fn field(&mut self, name: &str, leaf: Leaf<'_>);
}

/// 可变遍历的访问器
pub trait VisitorMut {
    /// 进入一个命名的嵌套作用域
    fn begin_struct(&mut self, _name: &str) {}

    /// 离开嵌套作用域
    fn end_struct(&mut self) {}

    /// 进入 Option 包装作用域
    fn begin_optional(&mut self, name: &str) {
        self.begin_struct(name);
    }

    /// 离开 Option 包装作用域
    ///
    /// 返回作用域内是否有叶子被实际写入；[`visit_optional_mut`]
    /// 据此决定保留还是丢弃物化的内层值。
    fn end_optional(&mut self) -> bool {
        self.end_struct();
        false
    }

    /// 报告一个标量叶子
    fn field(&mut self, name: &str, leaf: LeafMut<'_>);
}

/// 可被编解码器遍历的结构体
///
/// `visit` 与 `visit_mut` 必须以相同的顺序报告相同的叶子；
/// `Default` 提供形状收集所需的样本兜底。
pub trait Record: Default {
    /// 只读遍历
    fn visit(&self, v: &mut dyn Visitor);

    /// 可变遍历
    fn visit_mut(&mut self, v: &mut dyn VisitorMut);
}

/// 遍历一个嵌套结构体字段
pub fn visit_nested<T: Record>(v: &mut dyn Visitor, name: &str, value: &T) {
    v.begin_struct(name);
    value.visit(v);
    v.end_struct();
}

/// 可变遍历一个嵌套结构体字段
pub fn visit_nested_mut<T: Record>(v: &mut dyn VisitorMut, name: &str, value: &mut T) {
    v.begin_struct(name);
    value.visit_mut(v);
    v.end_struct();
}

/// 遍历一个 `Option` 包装的嵌套结构体
///
/// `None` 时以内层类型的缺省实例走完形状，保证叶子计数恒定，
/// 未置位的 Option 因此序列化为内层缺省值。
pub fn visit_optional<T: Record>(v: &mut dyn Visitor, name: &str, value: &Option<T>) {
    v.begin_optional(name);
    match value {
        Some(inner) => inner.visit(v),
        None => T::default().visit(v),
    }
    v.end_optional();
}

/// 可变遍历一个 `Option` 包装的嵌套结构体
///
/// 遍历期间物化一个内层值；作用域内没有任何叶子被写入时恢复为
/// `None`。读入一条记录之后，Option 的置位与否只反映这条记录。
pub fn visit_optional_mut<T: Record>(v: &mut dyn VisitorMut, name: &str, value: &mut Option<T>) {
    v.begin_optional(name);
    let mut inner = value.take().unwrap_or_default();
    inner.visit_mut(v);
    *value = if v.end_optional() { Some(inner) } else { None };
}

/// 遍历一个定长元素序列，元素名为 `name[i]`
pub fn visit_elements<T: Record>(v: &mut dyn Visitor, name: &str, items: &[T]) {
    for (i, item) in items.iter().enumerate() {
        v.begin_struct(&format!("{}[{}]", name, i));
        item.visit(v);
        v.end_struct();
    }
}

/// 可变遍历一个定长元素序列
pub fn visit_elements_mut<T: Record>(v: &mut dyn VisitorMut, name: &str, items: &mut [T]) {
    for (i, item) in items.iter_mut().enumerate() {
        v.begin_struct(&format!("{}[{}]", name, i));
        item.visit_mut(v);
        v.end_struct();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Inner {
        a: i32,
        b: i32,
    }

    impl Record for Inner {
        fn visit(&self, v: &mut dyn Visitor) {
            v.field("a", Leaf::I32(&self.a));
            v.field("b", Leaf::I32(&self.b));
        }

        fn visit_mut(&mut self, v: &mut dyn VisitorMut) {
            v.field("a", LeafMut::I32(&mut self.a));
            v.field("b", LeafMut::I32(&mut self.b));
        }
    }

    #[derive(Debug, Default)]
    struct Outer {
        id: u32,
        inner: Inner,
        extra: Option<Inner>,
    }

    impl Record for Outer {
        fn visit(&self, v: &mut dyn Visitor) {
            v.field("id", Leaf::U32(&self.id));
            visit_nested(v, "inner", &self.inner);
            visit_optional(v, "extra", &self.extra);
        }

        fn visit_mut(&mut self, v: &mut dyn VisitorMut) {
            v.field("id", LeafMut::U32(&mut self.id));
            visit_nested_mut(v, "inner", &mut self.inner);
            visit_optional_mut(v, "extra", &mut self.extra);
        }
    }

    /// 记录路径序列的访问器
    #[derive(Default)]
    struct PathCollector {
        stack: Vec<String>,
        paths: Vec<String>,
    }

    impl Visitor for PathCollector {
        fn begin_struct(&mut self, name: &str) {
            self.stack.push(name.to_string());
        }

        fn end_struct(&mut self) {
            self.stack.pop();
        }

        fn field(&mut self, name: &str, _leaf: Leaf<'_>) {
            let mut path = self.stack.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(name);
            self.paths.push(path);
        }
    }

    /// 测试深度优先遍历顺序与合成路径
    #[test]
    fn test_traversal_order() {
        let mut collector = PathCollector::default();
        Outer::default().visit(&mut collector);
        assert_eq!(
            collector.paths,
            vec!["id", "inner/a", "inner/b", "extra/a", "extra/b"]
        );
    }

    /// 测试 None 的 Option 也覆盖完整形状
    #[test]
    fn test_optional_shape_constant() {
        let mut with = PathCollector::default();
        Outer {
            extra: Some(Inner::default()),
            ..Outer::default()
        }
        .visit(&mut with);

        let mut without = PathCollector::default();
        Outer::default().visit(&mut without);
        assert_eq!(with.paths, without.paths);
    }

    /// 测试数组元素的下标后缀名
    #[test]
    fn test_element_names() {
        struct Pair {
            items: [Inner; 2],
        }
        impl Default for Pair {
            fn default() -> Self {
                Self {
                    items: [Inner::default(), Inner::default()],
                }
            }
        }
        impl Record for Pair {
            fn visit(&self, v: &mut dyn Visitor) {
                visit_elements(v, "items", &self.items);
            }
            fn visit_mut(&mut self, v: &mut dyn VisitorMut) {
                visit_elements_mut(v, "items", &mut self.items);
            }
        }

        let mut collector = PathCollector::default();
        Pair::default().visit(&mut collector);
        assert_eq!(
            collector.paths,
            vec!["items[0]/a", "items[0]/b", "items[1]/a", "items[1]/b"]
        );
    }

    /// 测试 Option 的保留/丢弃由 end_optional 的返回值决定
    #[test]
    fn test_optional_keep_drop() {
        struct FillAll;
        impl VisitorMut for FillAll {
            fn end_optional(&mut self) -> bool {
                true
            }
            fn field(&mut self, _name: &str, leaf: LeafMut<'_>) {
                if let LeafMut::I32(x) = leaf {
                    *x = 7;
                }
            }
        }

        struct FillNone;
        impl VisitorMut for FillNone {
            fn field(&mut self, _name: &str, _leaf: LeafMut<'_>) {}
        }

        let mut outer = Outer::default();
        outer.visit_mut(&mut FillAll);
        assert_eq!(outer.extra.as_ref().map(|e| e.a), Some(7));

        outer.visit_mut(&mut FillNone);
        assert!(outer.extra.is_none());
    }
}
