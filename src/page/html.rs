//! HTML 解析辅助
//!
//! 解析交给 `scraper`（html5ever），这里只补充页面提取需要的几个便捷方法。

use scraper::node::Node;
pub use scraper::{ElementRef, Html, Selector};

/// 编译期常量选择器，首次使用时解析并缓存
macro_rules! css {
    ($selector:literal) => {{
        static SELECTOR: std::sync::OnceLock<scraper::Selector> = std::sync::OnceLock::new();
        SELECTOR.get_or_init(|| scraper::Selector::parse($selector).expect("css selector"))
    }};
}
pub(crate) use css;

/// 解析 HTML 文档
pub fn parse(input: &str) -> Html {
    Html::parse_document(input)
}

/// 除解析器自动补全的 `html` / `head` / `body` 外是否还有元素
pub fn has_content_elements(doc: &Html) -> bool {
    doc.root_element()
        .select(css!("*"))
        .any(|e| !matches!(e.value().name(), "head" | "body"))
}

/// HTML 片段的可见文本（空白折叠），用于比较两段内容是否相同
pub fn fragment_text(fragment: &str) -> String {
    Html::parse_fragment(fragment).root_element().collapsed_text()
}

/// `ElementRef` 上的便捷方法
pub trait ElementExt<'a> {
    /// 小写标签名
    fn name(&self) -> &'a str;
    fn has_attr(&self, key: &str) -> bool;
    fn has_class(&self, class: &str) -> bool;
    /// 祖先元素（由近及远）
    fn ancestor_elements(&self) -> impl Iterator<Item = ElementRef<'a>>;
    /// 直接子元素
    fn element_children(&self) -> impl Iterator<Item = ElementRef<'a>>;
    fn is_inside(&self, ancestor: &ElementRef<'a>) -> bool;
    /// 原始文本内容（不折叠空白）
    fn raw_text(&self) -> String;
    /// 文本内容，空白折叠为单个空格
    fn collapsed_text(&self) -> String;
    /// 文本内容，跳过满足条件的子树
    fn text_without(&self, skip: impl Fn(&ElementRef<'a>) -> bool) -> String;
}

impl<'a> ElementExt<'a> for ElementRef<'a> {
    fn name(&self) -> &'a str {
        self.value().name()
    }

    fn has_attr(&self, key: &str) -> bool {
        self.value().attr(key).is_some()
    }

    fn has_class(&self, class: &str) -> bool {
        self.value().classes().any(|c| c == class)
    }

    fn ancestor_elements(&self) -> impl Iterator<Item = ElementRef<'a>> {
        self.ancestors().filter_map(ElementRef::wrap)
    }

    fn element_children(&self) -> impl Iterator<Item = ElementRef<'a>> {
        self.children().filter_map(ElementRef::wrap)
    }

    fn is_inside(&self, ancestor: &ElementRef<'a>) -> bool {
        self.ancestors().any(|a| a.id() == ancestor.id())
    }

    fn raw_text(&self) -> String {
        self.text().collect()
    }

    fn collapsed_text(&self) -> String {
        collapse_whitespace(&self.raw_text())
    }

    fn text_without(&self, skip: impl Fn(&ElementRef<'a>) -> bool) -> String {
        let mut out = String::new();
        collect_text(*self, &mut out, &skip);
        collapse_whitespace(&out)
    }
}

fn collect_text<'a>(
    element: ElementRef<'a>,
    out: &mut String,
    skip: &dyn Fn(&ElementRef<'a>) -> bool,
) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    if !skip(&child) {
                        collect_text(child, out, skip);
                    }
                }
            }
            _ => {}
        }
    }
}

/// 折叠空白（含不换行空格）
pub fn collapse_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
