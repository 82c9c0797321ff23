//! 译文显示
//!
//! 在消息容器末尾追加 `div.chatlingo-translation`；重复调用时原地更新。
//! 容器可能是多条消息共用的祖先节点，译文元素通过键值与所属消息对应

use std::cell::Cell;

use markup5ever_rcdom::Handle;

use super::dom::{self, Selector};
use crate::config::constants;
use crate::settings::DisplayStyle;

/// 译文渲染器
pub struct DisplayRenderer {
    containers: Vec<Selector>,
    annotation: Option<Selector>,
    next_key: Cell<u64>,
}

impl DisplayRenderer {
    pub fn new() -> Self {
        Self {
            containers: dom::compile_selectors(constants::MESSAGE_CONTAINER_SELECTORS),
            annotation: Selector::parse(&format!("div.{}", constants::TRANSLATION_CLASS)).ok(),
            next_key: Cell::new(0),
        }
    }

    /// 显示译文，返回译文元素
    pub fn display(&self, message: &Handle, translated_text: &str, style: &DisplayStyle) -> Handle {
        let container = self.find_container(message);
        let key = self.message_key(message);
        let text = format!("{}{}", style.prefix, translated_text);
        let css = format!(
            "{} font-size: 0.9em; margin-top: 2px; padding: 2px 0; word-break: break-word;",
            style.to_css()
        );

        if let Some(existing) = self.annotation_in(&container, &key) {
            dom::set_node_attr(&existing, "style", Some(css));
            dom::set_text_content(&existing, &text);
            return existing;
        }

        let element = dom::create_element(
            "div",
            &[
                ("class", constants::TRANSLATION_CLASS),
                (constants::ANNOTATION_FOR_ATTR, &key),
                ("style", &css),
            ],
        );
        dom::set_text_content(&element, &text);
        dom::append_child(&container, element.clone());
        element
    }

    /// 该消息已有的译文元素
    pub fn existing_annotation(&self, message: &Handle) -> Option<Handle> {
        let key = dom::get_node_attr(message, constants::MESSAGE_KEY_ATTR)?;
        self.annotation_in(&self.find_container(message), &key)
    }

    fn annotation_in(&self, container: &Handle, key: &str) -> Option<Handle> {
        self.annotation
            .as_ref()?
            .find_all(container)
            .into_iter()
            .find(|node| {
                dom::get_node_attr(node, constants::ANNOTATION_FOR_ATTR).as_deref() == Some(key)
            })
    }

    /// 消息节点的键值，首次显示时分配
    fn message_key(&self, message: &Handle) -> String {
        if let Some(key) = dom::get_node_attr(message, constants::MESSAGE_KEY_ATTR) {
            return key;
        }

        let key = self.next_key.get() + 1;
        self.next_key.set(key);
        let key = key.to_string();
        dom::set_node_attr(message, constants::MESSAGE_KEY_ATTR, Some(key.clone()));
        key
    }

    /// 查找挂载位置：先找后代容器，再向上查找祖先，最后退回消息节点本身
    pub fn find_container(&self, message: &Handle) -> Handle {
        if let Some(found) = self
            .containers
            .iter()
            .find_map(|selector| selector.find_first(message))
        {
            return found;
        }

        let mut current = dom::get_parent_node(message);
        for _ in 0..constants::MAX_ANCESTOR_DEPTH {
            let Some(node) = current else {
                break;
            };
            if constants::ANCESTOR_CONTAINER_CLASSES
                .iter()
                .any(|class| dom::has_class(&node, class))
            {
                return node;
            }
            current = dom::get_parent_node(&node);
        }

        message.clone()
    }
}

impl Default for DisplayRenderer {
    fn default() -> Self {
        Self::new()
    }
}
