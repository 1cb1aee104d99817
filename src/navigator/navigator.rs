//! 对象树导航
//!
//! 从仓库根节点开始，按声明顺序深度优先地解析路径。名称精确匹配（区分大小写），
//! 重名视为错误，不会静默选择第一个。

use super::object_ref::{ObjectKind, ObjectPath, ObjectRef};
use crate::error::{NavigationError, Result};
use crate::page::PageModel;
use crate::session::{Session, SessionManager};
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

/// 导航器
#[derive(Clone)]
pub struct Navigator {
    manager: SessionManager,
    root_path: String,
}

impl Navigator {
    pub fn new(manager: SessionManager, root_path: impl Into<String>) -> Self {
        Self {
            manager,
            root_path: root_path.into(),
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// 仓库根节点
    pub fn root(&self, session: &Session) -> ObjectRef {
        ObjectRef {
            kind: ObjectKind::Root,
            ref_id: Some("1".to_string()),
            name: String::new(),
            url: session.url(&self.root_path),
            path: ObjectPath::root(),
        }
    }

    /// 打开对象页面
    pub async fn open(&self, session: &mut Session, object: &ObjectRef) -> Result<PageModel> {
        self.manager.get_page(session, &object.url).await
    }

    /// 直接子对象（按页面顺序）
    pub async fn list_children(
        &self,
        session: &mut Session,
        parent: &ObjectRef,
    ) -> Result<Vec<ObjectRef>> {
        let page = self.open(session, parent).await?;
        Ok(children_of(parent, &page))
    }

    /// 解析从根节点开始的路径
    pub async fn resolve(&self, session: &mut Session, path: &ObjectPath) -> Result<ObjectRef> {
        let root = self.root(session);
        self.resolve_from(session, &root, path).await
    }

    /// 解析相对于 `base` 的路径
    pub async fn resolve_from(
        &self,
        session: &mut Session,
        base: &ObjectRef,
        path: &ObjectPath,
    ) -> Result<ObjectRef> {
        let mut current = base.clone();
        for segment in path.segments() {
            let children = self.list_children(session, &current).await?;
            let matches: Vec<ObjectRef> = children
                .into_iter()
                .filter(|c| c.name == *segment)
                .collect();
            current = match matches.len() {
                0 => {
                    return Err(NavigationError::NotFound {
                        segment: segment.clone(),
                        path: current.path.to_string(),
                    }
                    .into())
                }
                1 => matches.into_iter().next().unwrap_or(current),
                count => {
                    return Err(NavigationError::Ambiguous {
                        segment: segment.clone(),
                        path: current.path.to_string(),
                        count,
                    }
                    .into())
                }
            };
            debug!("导航: {}", current);
        }
        Ok(current)
    }

    /// 解析路径并检查对象类型
    pub async fn resolve_kind(
        &self,
        session: &mut Session,
        base: &ObjectRef,
        path: &ObjectPath,
        expected: ObjectKind,
    ) -> Result<ObjectRef> {
        let object = self.resolve_from(session, base, path).await?;
        if object.kind != expected {
            return Err(NavigationError::WrongKind {
                path: object.path.to_string(),
                expected: expected.to_string(),
                actual: object.kind.to_string(),
            }
            .into());
        }
        Ok(object)
    }

    /// 展开带 `*` / `?` 的路径
    ///
    /// 深度优先、按页面顺序；按 URL 去重（先出现者保留）。没有匹配时返回空列表。
    pub async fn expand_glob(
        &self,
        session: &mut Session,
        base: &ObjectRef,
        pattern: &ObjectPath,
    ) -> Result<Vec<ObjectRef>> {
        let matchers: Vec<SegmentMatcher> = pattern
            .segments()
            .iter()
            .map(|s| SegmentMatcher::new(s))
            .collect();
        let mut results = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(base.clone(), 0usize)];

        while let Some((node, depth)) = stack.pop() {
            if depth == matchers.len() {
                if seen.insert(node.url.clone()) {
                    results.push(node);
                }
                continue;
            }
            if !node.kind.is_container() {
                continue;
            }
            let children = self.list_children(session, &node).await?;
            let matched: Vec<ObjectRef> = children
                .into_iter()
                .filter(|c| matchers[depth].matches(&c.name))
                .collect();
            stack.extend(matched.into_iter().rev().map(|c| (c, depth + 1)));
        }
        Ok(results)
    }
}

/// 页面中的子对象
pub fn children_of(parent: &ObjectRef, page: &PageModel) -> Vec<ObjectRef> {
    page.children
        .iter()
        .map(|item| ObjectRef::from_link(&parent.path, &item.title, &item.url))
        .collect()
}

/// 单个路径段的匹配器
enum SegmentMatcher {
    Exact(String),
    Glob(Regex),
}

impl SegmentMatcher {
    fn new(segment: &str) -> Self {
        if !segment.contains('*') && !segment.contains('?') {
            return SegmentMatcher::Exact(segment.to_string());
        }
        let mut pattern = String::from("^");
        for c in segment.chars() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');
        match Regex::new(&pattern) {
            Ok(re) => SegmentMatcher::Glob(re),
            Err(_) => SegmentMatcher::Exact(segment.to_string()),
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            SegmentMatcher::Exact(s) => s == name,
            SegmentMatcher::Glob(re) => re.is_match(name),
        }
    }
}
