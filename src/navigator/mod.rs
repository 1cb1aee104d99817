//! 导航层：仓库对象树 → `ObjectRef`

#[allow(clippy::module_inception)]
pub mod navigator;
pub mod object_ref;

pub use navigator::{children_of, Navigator};
pub use object_ref::{classify_url, ObjectKind, ObjectPath, ObjectRef};
