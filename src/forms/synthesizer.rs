//! 表单合成
//!
//! 把调用方的 `Mutation` 映射到刚提取出的 `FormModel` 上，按浏览器语义生成提交内容：
//! 只覆盖指定字段，隐藏字段（含防伪令牌）原样保留，禁用字段不提交。

use super::mutation::{DesiredValue, FieldKey, FieldMutation, Mutation, Presence};
use super::payload::{PayloadValue, SubmissionPayload};
use crate::error::{MutationError, Result};
use crate::page::{FieldDescriptor, FieldKind, FormModel};

/// 单个字段将要发生的变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
}

enum Target<'f> {
    Existing(&'f FieldDescriptor),
    /// 表单中没有、需要附加的字段
    Appended { name: String },
}

struct Resolved<'f> {
    target: Target<'f>,
    values: Vec<PayloadValue>,
}

impl Resolved<'_> {
    fn name(&self) -> &str {
        match &self.target {
            Target::Existing(field) => &field.name,
            Target::Appended { name } => name,
        }
    }
}

/// 生成提交内容
///
/// 任一修改无法映射时返回错误，不生成任何提交内容。
pub fn synthesize_form(form: &FormModel, mutation: &Mutation) -> Result<SubmissionPayload> {
    let resolved = resolve(form, mutation)?;
    let mut fields: Vec<(String, PayloadValue)> = Vec::new();

    for field in &form.fields {
        if field.constraints.disabled {
            continue;
        }
        let desired = resolved.iter().rev().find(|r| match r.target {
            Target::Existing(f) => std::ptr::eq(f, field),
            Target::Appended { .. } => false,
        });
        match desired {
            Some(r) => fields.extend(r.values.iter().map(|v| (field.name.clone(), v.clone()))),
            None => fields.extend(
                current_values(field)
                    .into_iter()
                    .map(|v| (field.name.clone(), v)),
            ),
        }
    }

    for r in &resolved {
        if let Target::Appended { name } = &r.target {
            fields.retain(|(n, _)| n != name);
            fields.extend(r.values.iter().map(|v| (name.clone(), v.clone())));
        }
    }

    let button = match &mutation.submit {
        Some(name) => Some(form.button(name).ok_or_else(|| MutationError::MissingButton {
            button: name.clone(),
            form: form.describe(),
        })?),
        None => form.buttons.iter().find(|b| b.name.is_some()),
    };
    if let Some(button) = button {
        if let Some(name) = &button.name {
            fields.push((name.clone(), PayloadValue::Text(button.value.clone())));
        }
    }

    Ok(SubmissionPayload {
        url: form.action.clone(),
        method: form.method,
        encoding: form.encoding,
        fields,
    })
}

/// 计算修改会改变的字段；为空说明门户上的值已经符合预期
pub fn pending_changes(form: &FormModel, mutation: &Mutation) -> Result<Vec<FieldChange>> {
    let resolved = resolve(form, mutation)?;
    let mut changes = Vec::new();
    for r in &resolved {
        let to: Vec<String> = r
            .values
            .iter()
            .filter_map(|v| v.as_text().map(String::from))
            .collect();
        match &r.target {
            Target::Existing(field) => {
                if matches!(field.kind, FieldKind::File) {
                    continue;
                }
                let from = comparable_values(field);
                if from != to {
                    changes.push(FieldChange {
                        field: field.name.clone(),
                        from,
                        to,
                    });
                }
            }
            Target::Appended { .. } => changes.push(FieldChange {
                field: r.name().to_string(),
                from: Vec::new(),
                to,
            }),
        }
    }
    Ok(changes)
}

fn resolve<'f>(form: &'f FormModel, mutation: &Mutation) -> Result<Vec<Resolved<'f>>> {
    let mut resolved = Vec::new();
    for entry in &mutation.entries {
        let Some(target) = locate(form, entry)? else {
            continue;
        };
        let values = match &target {
            Target::Existing(field) => {
                check_writable(field)?;
                encode(&field.name, &field.kind, field, &entry.value)?
            }
            Target::Appended { name } => match &entry.presence {
                Presence::RowOf(template) => {
                    let template_field = form
                        .field(template)
                        .ok_or_else(|| MutationError::FieldAbsent {
                            field: template.clone(),
                            form: form.describe(),
                        })?;
                    encode(name, &template_field.kind, template_field, &entry.value)?
                }
                _ => encode_free(&entry.value),
            },
        };
        resolved.push(Resolved { target, values });
    }
    Ok(resolved)
}

fn locate<'f>(form: &'f FormModel, entry: &FieldMutation) -> Result<Option<Target<'f>>> {
    let found = match &entry.key {
        FieldKey::Name(name) => form.field(name),
        FieldKey::Label(label) => {
            let candidates = form.fields_by_label(label);
            if candidates.len() > 1 {
                return Err(MutationError::AmbiguousLabel {
                    label: label.clone(),
                    count: candidates.len(),
                }
                .into());
            }
            candidates.first().copied()
        }
    };
    if let Some(field) = found {
        if entry.presence == Presence::Default {
            return Ok(None);
        }
        return Ok(Some(Target::Existing(field)));
    }

    let key_name = match &entry.key {
        FieldKey::Name(name) => name.clone(),
        FieldKey::Label(label) => label.clone(),
    };
    match (&entry.presence, &entry.key) {
        (Presence::IfPresent, _) => Ok(None),
        (Presence::RowOf(_) | Presence::Extra | Presence::Default, FieldKey::Name(name)) => {
            Ok(Some(Target::Appended { name: name.clone() }))
        }
        _ => Err(MutationError::FieldAbsent {
            field: key_name,
            form: form.describe(),
        }
        .into()),
    }
}

fn check_writable(field: &FieldDescriptor) -> Result<()> {
    if field.constraints.disabled {
        return Err(MutationError::FieldDisabled {
            field: field.name.clone(),
        }
        .into());
    }
    if field.kind == FieldKind::Hidden || field.constraints.readonly {
        return Err(MutationError::ProtectedField {
            field: field.name.clone(),
        }
        .into());
    }
    Ok(())
}

/// 按字段类型编码期望值
fn encode(
    name: &str,
    kind: &FieldKind,
    shape: &FieldDescriptor,
    desired: &DesiredValue,
) -> Result<Vec<PayloadValue>> {
    let incompatible = || MutationError::IncompatibleValue {
        field: name.to_string(),
        kind: kind.to_string(),
        value: desired.to_string(),
    };

    let values = match (kind, desired) {
        (FieldKind::Hidden, _) => {
            return Err(MutationError::ProtectedField {
                field: name.to_string(),
            }
            .into())
        }
        (FieldKind::Checkbox { on_value }, DesiredValue::Flag(on)) => {
            vec![text(if *on { on_value.as_str() } else { "0" })]
        }
        (FieldKind::Checkbox { on_value }, DesiredValue::Text(t)) => {
            if t == on_value {
                vec![text(on_value)]
            } else if t.is_empty() || t == "0" {
                vec![text("0")]
            } else {
                return Err(incompatible().into());
            }
        }
        (FieldKind::Radio | FieldKind::Select, DesiredValue::Text(t)) => {
            vec![text(&offered(name, shape, t)?)]
        }
        (FieldKind::MultiSelect, DesiredValue::Text(t)) => vec![text(&offered(name, shape, t)?)],
        (FieldKind::MultiSelect, DesiredValue::Many(values)) => values
            .iter()
            .map(|v| offered(name, shape, v).map(|v| text(&v)))
            .collect::<Result<Vec<_>>>()?,
        (FieldKind::File, DesiredValue::EmptyFile) => vec![PayloadValue::empty_file()],
        (FieldKind::Number, DesiredValue::Text(t)) => {
            if !t.trim().is_empty() && t.trim().replace(',', ".").parse::<f64>().is_err() {
                return Err(incompatible().into());
            }
            vec![text(t)]
        }
        (
            FieldKind::Text | FieldKind::Password | FieldKind::TextArea | FieldKind::DateTime,
            DesiredValue::Text(t),
        ) => {
            if let Some(max) = shape.constraints.max_length {
                if t.chars().count() > max {
                    return Err(incompatible().into());
                }
            }
            vec![text(t)]
        }
        _ => return Err(incompatible().into()),
    };
    Ok(values)
}

/// 附加字段没有模板，按值本身编码
fn encode_free(desired: &DesiredValue) -> Vec<PayloadValue> {
    match desired {
        DesiredValue::Text(t) => vec![text(t)],
        DesiredValue::Flag(on) => vec![text(if *on { "1" } else { "0" })],
        DesiredValue::Many(values) => values.iter().map(|v| text(v)).collect(),
        DesiredValue::EmptyFile => vec![PayloadValue::empty_file()],
    }
}

/// 选项必须由页面提供；允许用选项文本代替选项值
fn offered(name: &str, field: &FieldDescriptor, wanted: &str) -> Result<String> {
    let options = &field.constraints.options;
    if let Some(o) = options.iter().find(|o| o.value == wanted) {
        return Ok(o.value.clone());
    }
    if let Some(o) = options.iter().find(|o| o.label == wanted) {
        return Ok(o.value.clone());
    }
    Err(MutationError::ValueNotOffered {
        field: name.to_string(),
        value: wanted.to_string(),
        options: options
            .iter()
            .map(|o| o.value.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    }
    .into())
}

/// 未修改字段按浏览器语义提交
fn current_values(field: &FieldDescriptor) -> Vec<PayloadValue> {
    match field.kind {
        FieldKind::File => vec![PayloadValue::empty_file()],
        FieldKind::Checkbox { .. } | FieldKind::Radio | FieldKind::MultiSelect => {
            field.values.iter().map(|v| text(v)).collect()
        }
        _ => vec![text(field.value().unwrap_or_default())],
    }
}

/// 与编码结果可比较的当前值
fn comparable_values(field: &FieldDescriptor) -> Vec<String> {
    match &field.kind {
        FieldKind::Checkbox { on_value } => {
            vec![if field.is_checked() {
                on_value.clone()
            } else {
                "0".to_string()
            }]
        }
        FieldKind::Radio | FieldKind::MultiSelect => field.values.clone(),
        _ => vec![field.value().unwrap_or_default().to_string()],
    }
}

fn text(value: &str) -> PayloadValue {
    PayloadValue::Text(value.to_string())
}
