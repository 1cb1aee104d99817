use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::sync::OnceLock;

/// 对象类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Root,
    Category,
    Course,
    Group,
    Folder,
    Test,
    Other,
}

impl ObjectKind {
    /// 能否包含子对象
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            ObjectKind::Root
                | ObjectKind::Category
                | ObjectKind::Course
                | ObjectKind::Group
                | ObjectKind::Folder
        )
    }

    fn from_type_prefix(prefix: &str) -> Self {
        match prefix {
            "root" => ObjectKind::Root,
            "cat" => ObjectKind::Category,
            "crs" => ObjectKind::Course,
            "grp" => ObjectKind::Group,
            "fold" => ObjectKind::Folder,
            "tst" => ObjectKind::Test,
            _ => ObjectKind::Other,
        }
    }

    fn from_gui_class(url: &str) -> Option<Self> {
        const HINTS: &[(&str, ObjectKind)] = &[
            ("ilobjtestgui", ObjectKind::Test),
            ("ilobjcoursegui", ObjectKind::Course),
            ("ilobjgroupgui", ObjectKind::Group),
            ("ilobjfoldergui", ObjectKind::Folder),
            ("ilobjcategorygui", ObjectKind::Category),
        ];
        HINTS
            .iter()
            .find(|(hint, _)| url.contains(hint))
            .map(|(_, kind)| kind.clone())
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Root => "root",
            ObjectKind::Category => "category",
            ObjectKind::Course => "course",
            ObjectKind::Group => "group",
            ObjectKind::Folder => "folder",
            ObjectKind::Test => "test",
            ObjectKind::Other => "other",
        };
        f.write_str(name)
    }
}

fn target_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:target=|goto\.php/|goto_[a-z0-9]+_)([a-z]+)[_/](\d+)").expect("target regex")
    })
}

fn ref_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]ref_id=(\d+)").expect("ref_id regex"))
}

/// 从对象链接推断类型和 ref_id
pub fn classify_url(url: &str) -> (ObjectKind, Option<String>) {
    let lower = url.to_ascii_lowercase();
    if let Some(caps) = target_re().captures(&lower) {
        return (ObjectKind::from_type_prefix(&caps[1]), Some(caps[2].to_string()));
    }
    let ref_id = ref_id_re().captures(&lower).map(|c| c[1].to_string());
    let kind = ObjectKind::from_gui_class(&lower)
        .or_else(|| (ref_id.as_deref() == Some("1")).then_some(ObjectKind::Root))
        .unwrap_or(ObjectKind::Other);
    (kind, ref_id)
}

/// 对象路径，如 `CourseA/Tests/Midterm`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ObjectPath {
    segments: Vec<String>,
}

impl ObjectPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// 按 `/` 拆分，忽略空段和首尾空白
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self { segments }
    }

    pub fn join(&self, other: &ObjectPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn has_wildcards(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s.contains('*') || s.contains('?'))
    }
}

impl Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            f.write_str("/")
        } else {
            f.write_str(&self.segments.join("/"))
        }
    }
}

impl From<String> for ObjectPath {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for ObjectPath {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<ObjectPath> for String {
    fn from(value: ObjectPath) -> Self {
        value.segments.join("/")
    }
}

/// 已解析的对象引用，解析后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub ref_id: Option<String>,
    pub name: String,
    pub url: String,
    pub path: ObjectPath,
}

impl ObjectRef {
    pub fn from_link(parent: &ObjectPath, name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        let url = url.into();
        let (kind, ref_id) = classify_url(&url);
        Self {
            kind,
            ref_id,
            path: parent.child(name.clone()),
            name,
            url,
        }
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.path, self.kind)?;
        if let Some(id) = &self.ref_id {
            write!(f, " #{}", id)?;
        }
        f.write_str(")")
    }
}
