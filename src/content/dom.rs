//! DOM 辅助函数
//!
//! 基于 `markup5ever_rcdom` 的节点查询与修改，以及一个只支持
//! 标签、class 和属性的简单选择器

use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};

use crate::error::{ChatlingoError, ChatlingoResult};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s: String = if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
        let (string, _, _) = encoding.decode(data);
        string.into_owned()
    } else {
        String::from_utf8_lossy(data).into_owned()
    };

    parse_html(&s)
}

/// 解析 HTML 字符串
pub fn parse_html(html: &str) -> RcDom {
    parse_document(RcDom::default(), Default::default()).one(html)
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 设置节点属性，`None` 表示删除
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut found_existing_attr = false;

        attrs_mut.retain_mut(|attr| {
            if &*attr.name.local != attr_name {
                return true;
            }
            found_existing_attr = true;
            match &attr_value {
                Some(value) => {
                    attr.value.clear();
                    attr.value.push_slice(value);
                    true
                }
                None => false,
            }
        });

        if !found_existing_attr {
            if let Some(value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: format_tendril!("{}", value),
                });
            }
        }
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// 判断节点 class 列表中是否包含指定 class
pub fn has_class(node: &Handle, class: &str) -> bool {
    get_node_attr(node, "class")
        .map(|value| value.split_ascii_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

/// 获取父节点
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 收集节点下的全部文本
pub fn text_content(node: &Handle) -> String {
    let mut text = String::new();
    collect_text(node, &mut text);
    text
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// 用单个文本节点替换节点的全部子节点
pub fn set_text_content(node: &Handle, text: &str) {
    for child in node.children.borrow().iter() {
        child.parent.set(None);
    }
    node.children.borrow_mut().clear();

    let text_node = Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    });
    append_child(node, text_node);
}

/// 创建元素节点
pub fn create_element(name: &str, attrs: &[(&str, &str)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: format_tendril!("{}", value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(name)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 追加子节点并设置父指针
pub fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 把节点从父节点中移除
pub fn detach(node: &Handle) {
    if let Some(parent) = get_parent_node(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

/// 元素子节点
pub fn element_children(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|child| is_element(child))
        .cloned()
        .collect()
}

/// 先序遍历全部后代元素（不含节点自身）
pub fn descendants(node: &Handle) -> Vec<Handle> {
    let mut found = Vec::new();
    let mut stack: Vec<Handle> = node.children.borrow().iter().rev().cloned().collect();

    while let Some(current) = stack.pop() {
        if is_element(&current) {
            found.push(current.clone());
        }
        stack.extend(current.children.borrow().iter().rev().cloned());
    }

    found
}

/// 简单选择器：`tag`、`.a.b`、`[attr]`、`[attr="value"]` 及其组合
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Selector {
    pub fn parse(input: &str) -> ChatlingoResult<Self> {
        let invalid = || ChatlingoError::Internal(format!("无法解析选择器: {}", input));
        let mut selector = Selector::default();
        let mut rest = input.trim();

        if rest.is_empty() {
            return Err(invalid());
        }

        let tag_end = rest.find(['.', '[']).unwrap_or(rest.len());
        if tag_end > 0 {
            selector.tag = Some(rest[..tag_end].to_ascii_lowercase());
        }
        rest = &rest[tag_end..];

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                if end == 0 {
                    return Err(invalid());
                }
                selector.classes.push(after[..end].to_string());
                rest = &after[end..];
            } else if let Some(after) = rest.strip_prefix('[') {
                let end = after.find(']').ok_or_else(invalid)?;
                let body = &after[..end];
                let attr = match body.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_string(),
                        Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string()),
                    ),
                    None => (body.trim().to_string(), None),
                };
                if attr.0.is_empty() {
                    return Err(invalid());
                }
                selector.attrs.push(attr);
                rest = &after[end + 1..];
            } else {
                return Err(invalid());
            }
        }

        Ok(selector)
    }

    /// 判断元素是否匹配
    pub fn matches(&self, node: &Handle) -> bool {
        let Some(name) = get_node_name(node) else {
            return false;
        };

        if let Some(tag) = &self.tag {
            if !name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        if !self.classes.iter().all(|class| has_class(node, class)) {
            return false;
        }

        self.attrs.iter().all(|(attr, expected)| match (get_node_attr(node, attr), expected) {
            (Some(actual), Some(expected)) => &actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }

    /// 第一个匹配的后代
    pub fn find_first(&self, root: &Handle) -> Option<Handle> {
        descendants(root).into_iter().find(|node| self.matches(node))
    }

    /// 全部匹配的后代
    pub fn find_all(&self, root: &Handle) -> Vec<Handle> {
        descendants(root).into_iter().filter(|node| self.matches(node)).collect()
    }
}

/// 解析一组选择器，跳过无法解析的项
pub fn compile_selectors(inputs: &[&str]) -> Vec<Selector> {
    inputs
        .iter()
        .filter_map(|input| match Selector::parse(input) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        })
        .collect()
}

/// 序列化整个文档
pub fn serialize_document(dom: &RcDom) -> ChatlingoResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = dom.document.clone().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// 序列化单个节点（含自身）
pub fn outer_html(node: &Handle) -> ChatlingoResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::IncludeNode,
        ..Default::default()
    };
    serialize(&mut buf, &serializable, opts)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
