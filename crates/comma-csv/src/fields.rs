//! 字段名解析与列映射计划
//!
//! 给定结构体的静态形状（深度优先遍历产生的叶子全路径序列）和调用方
//! 的逗号分隔字段列表，为每个叶子解出 `Option<列下标>`。计划按
//! （结构体类型, 字段列表）对构造一次，之后对所有记录复用。
//!
//! 字段列表语法：
//! - 空列表选中全部叶子，按遍历序取列下标（全路径形式）；
//! - 空段是列占位符（该列由外层消费，如 block/id 列）；
//! - 全路径用 `/` 分隔嵌套、`name[i]` 表示数组元素；
//! - 指向分支的名字展开为该分支的全部叶子，占据连续的列；
//! - `full_path_as_name` 为假时，名字还可按尾部子路径匹配；
//! - 与任何叶子都不对应的名字静默忽略（允许比结构体更宽的列表）。

use crate::record::{Leaf, Record, Visitor};
use crate::types::WireType;
use std::collections::HashMap;

/// 形状节点类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Branch,
    Leaf,
}

/// 结构体的静态形状：遍历序的节点（分支 + 叶子）列表
#[derive(Debug, Default)]
struct Shape {
    /// (全路径, 类别)，遍历序
    nodes: Vec<(String, NodeKind)>,
    /// 叶子全路径与固有线上类型，遍历序
    leaves: Vec<(String, WireType)>,
}

impl Shape {
    fn of<S: Record>(sample: &S) -> Shape {
        let mut collector = ShapeCollector::default();
        sample.visit(&mut collector);
        collector.shape
    }

    /// 分支前缀下的叶子全路径，遍历序
    fn leaves_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.leaves.iter().filter_map(move |(path, _)| {
            path.strip_prefix(prefix)
                .filter(|rest| rest.starts_with('/'))
                .map(|_| path.as_str())
        })
    }
}

#[derive(Default)]
struct ShapeCollector {
    stack: Vec<String>,
    shape: Shape,
}

impl ShapeCollector {
    fn path_of(&self, name: &str) -> String {
        if self.stack.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.stack.join("/"), name)
        }
    }
}

impl Visitor for ShapeCollector {
    fn begin_struct(&mut self, name: &str) {
        let path = self.path_of(name);
        self.shape.nodes.push((path, NodeKind::Branch));
        self.stack.push(name.to_string());
    }

    fn end_struct(&mut self) {
        self.stack.pop();
    }

    fn field(&mut self, name: &str, leaf: Leaf<'_>) {
        let path = self.path_of(name);
        self.shape.nodes.push((path.clone(), NodeKind::Leaf));
        self.shape.leaves.push((path, leaf.kind()));
    }
}

/// 计划中的一个叶子条目
#[derive(Debug, Clone)]
pub struct PlanLeaf {
    /// 叶子全路径（错误消息与调试用）
    pub path: String,

    /// 叶子的固有线上类型
    pub kind: WireType,

    /// 选中时为外部列下标（ascii 的 token 下标 / binary 的逻辑
    /// 字段下标），未选中为 `None`（保持缺省值）
    pub index: Option<usize>,
}

/// 列映射计划
///
/// 长度恒等于结构体静态形状的叶子数；构造后只读。
#[derive(Debug, Clone)]
pub struct Plan {
    leaves: Vec<PlanLeaf>,
    max_index: Option<usize>,
}

impl Plan {
    /// 从样本实例和字段列表构造计划
    ///
    /// 形状取自样本实例，向量长度与字符串宽度因此在构造期固定。
    pub fn build<S: Record>(sample: &S, fields: &str, full_path_as_name: bool) -> Plan {
        let shape = Shape::of(sample);
        let selection: Option<HashMap<String, usize>> = if fields.is_empty() {
            None
        } else {
            Some(build_selection(&shape, fields, full_path_as_name))
        };

        let mut leaves = Vec::with_capacity(shape.leaves.len());
        let mut max_index = None;
        for (ordinal, (path, kind)) in shape.leaves.iter().enumerate() {
            let index = match &selection {
                None => Some(ordinal),
                Some(map) => map.get(path).copied(),
            };
            if let Some(i) = index {
                max_index = Some(max_index.map_or(i, |m: usize| m.max(i)));
            }
            leaves.push(PlanLeaf {
                path: path.clone(),
                kind: *kind,
                index,
            });
        }
        Plan { leaves, max_index }
    }

    /// 叶子条目，遍历序
    pub fn leaves(&self) -> &[PlanLeaf] {
        &self.leaves
    }

    /// 叶子总数（等于结构体形状的叶子数）
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// 是否没有叶子
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// 选中叶子引用的最大列下标
    pub fn max_index(&self) -> Option<usize> {
        self.max_index
    }

    /// 是否为恒等映射：所有叶子选中且列下标等于遍历序号
    ///
    /// binary 编解码器以此作为快路径的前提之一。
    pub fn is_identity(&self) -> bool {
        self.leaves
            .iter()
            .enumerate()
            .all(|(ordinal, leaf)| leaf.index == Some(ordinal))
    }
}

/// 展开字段列表并建立叶子全路径到列下标的映射
fn build_selection(shape: &Shape, fields: &str, full_path_as_name: bool) -> HashMap<String, usize> {
    let mut expanded: Vec<String> = Vec::new();
    for segment in fields.split(',') {
        if segment.is_empty() {
            expanded.push(String::new());
            continue;
        }
        match resolve(shape, segment, full_path_as_name) {
            Some((path, NodeKind::Leaf)) => expanded.push(path),
            Some((path, NodeKind::Branch)) => {
                for leaf in shape.leaves_under(&path) {
                    expanded.push(leaf.to_string());
                }
            }
            None => {
                // 比结构体更宽的字段列表是合法的，该列由外层消费
                tracing::debug!(field = segment, "field name matches no leaf, ignored");
                expanded.push(segment.to_string());
            }
        }
    }

    let mut selection = HashMap::new();
    for (index, name) in expanded.into_iter().enumerate() {
        if name.is_empty() {
            continue;
        }
        selection.entry(name).or_insert(index);
    }
    selection
}

/// 把一个请求的名字解析到形状节点
///
/// 全路径精确匹配优先；`full_path_as_name` 为假时再按尾部子路径
/// （以 `/` 为边界）匹配，遍历序首个命中生效。
fn resolve(shape: &Shape, segment: &str, full_path_as_name: bool) -> Option<(String, NodeKind)> {
    for (path, kind) in &shape.nodes {
        if path == segment {
            return Some((path.clone(), *kind));
        }
    }
    if !full_path_as_name {
        let suffix = format!("/{}", segment);
        for (path, kind) in &shape.nodes {
            if path.ends_with(&suffix) {
                return Some((path.clone(), *kind));
            }
        }
    }
    None
}
