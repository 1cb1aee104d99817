//! 页面模型提取
//!
//! `extract` 是纯函数：相同的输入总是得到相同的 `PageModel`。

use super::html::{self, css, ElementExt, ElementRef, Html};
use super::model::*;
use crate::error::{PageShapeError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

fn onclick_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"['"]([^'"]*\.php(?:\?[^'"]*)?)['"]"#).expect("onclick regex")
    })
}

/// 把原始 HTML 解析为页面模型
///
/// # 参数
/// - `raw`: 响应正文
/// - `url`: 页面的最终地址（用于解析相对链接）
pub fn extract(raw: &str, url: &str) -> Result<PageModel> {
    let page_url = Url::parse(url).map_err(|_| PageShapeError::InvalidUrl {
        url: url.to_string(),
    })?;
    let doc = html::parse(raw);
    if !html::has_content_elements(&doc) {
        return Err(PageShapeError::NotHtml {
            url: url.to_string(),
        }
        .into());
    }

    let base = doc
        .select(css!("base[href]"))
        .find_map(|b| b.value().attr("href").and_then(|h| page_url.join(h).ok()))
        .unwrap_or_else(|| page_url.clone());
    let resolver = Resolver { base };

    let title = doc
        .select(css!("title"))
        .next()
        .map(|t| t.collapsed_text())
        .unwrap_or_default();

    Ok(PageModel {
        url: page_url.to_string(),
        title,
        forms: extract_forms(&doc, &resolver, &page_url),
        links: extract_links(&doc, &resolver),
        actions: extract_actions(&doc, &resolver),
        alerts: extract_alerts(&doc),
        tabs: extract_tabs(&doc, &resolver),
        logged_in: detect_logged_in(&doc),
        children: extract_children(&doc, &resolver),
        question_rows: extract_question_rows(&doc, &resolver, url)?,
        editor: extract_editor(&doc, &resolver),
    })
}

struct Resolver {
    base: Url,
}

impl Resolver {
    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        self.base.join(href).ok().map(String::from)
    }
}

// ========== 表单 ==========

fn extract_forms(doc: &Html, resolver: &Resolver, page_url: &Url) -> Vec<FormModel> {
    let labels = collect_labels(doc);
    doc.select(css!("form"))
        .map(|form| build_form(doc, form, resolver, page_url, &labels))
        .collect()
}

fn build_form(
    doc: &Html,
    form: ElementRef<'_>,
    resolver: &Resolver,
    page_url: &Url,
    labels: &HashMap<String, String>,
) -> FormModel {
    let id = form.value().attr("id").map(String::from);
    let action = form
        .value()
        .attr("action")
        .and_then(|a| resolver.resolve(a))
        .unwrap_or_else(|| page_url.to_string());
    let method = match form.value().attr("method").map(str::to_ascii_lowercase).as_deref() {
        Some("post") => HttpMethod::Post,
        _ => HttpMethod::Get,
    };
    let encoding = match form.value().attr("enctype").map(str::to_ascii_lowercase).as_deref() {
        Some("multipart/form-data") => FormEncoding::Multipart,
        _ => FormEncoding::UrlEncoded,
    };

    let mut model = FormModel {
        id: id.clone(),
        name: form.value().attr("name").map(String::from),
        action,
        method,
        encoding,
        classes: form.value().classes().map(String::from).collect(),
        fields: Vec::new(),
        buttons: Vec::new(),
    };

    // 表单内部的控件，以及通过 form="id" 关联到该表单的控件
    let controls = doc.select(css!("input, select, textarea, button")).filter(|e| {
        e.is_inside(&form) || (id.is_some() && e.value().attr("form") == id.as_deref())
    });

    for control in controls {
        add_control(&mut model, control, labels);
    }
    model
}

fn add_control(model: &mut FormModel, control: ElementRef<'_>, labels: &HashMap<String, String>) {
    let name = control.value().attr("name").map(String::from);

    match control.name() {
        "button" => {
            let kind = control.value().attr("type").unwrap_or("submit").to_ascii_lowercase();
            if kind == "submit" {
                model.buttons.push(ButtonDescriptor {
                    name,
                    value: control.value().attr("value").unwrap_or_default().to_string(),
                    label: control.collapsed_text(),
                });
            }
        }
        "input" => {
            let input_type = control.value().attr("type").unwrap_or("text").to_ascii_lowercase();
            match input_type.as_str() {
                "submit" | "image" => {
                    let value = control.value().attr("value").unwrap_or_default().to_string();
                    model.buttons.push(ButtonDescriptor {
                        name,
                        label: value.clone(),
                        value,
                    });
                }
                "button" | "reset" => {}
                "radio" => {
                    let Some(name) = name else { return };
                    add_radio(model, control, name, labels);
                }
                other => {
                    let Some(name) = name else { return };
                    let value = control.value().attr("value").unwrap_or_default().to_string();
                    let (kind, values) = match other {
                        "hidden" => (FieldKind::Hidden, vec![value]),
                        "password" => (FieldKind::Password, vec![value]),
                        "number" => (FieldKind::Number, vec![value]),
                        "date" | "datetime-local" | "time" => (FieldKind::DateTime, vec![value]),
                        "file" => (FieldKind::File, Vec::new()),
                        "checkbox" => {
                            let on_value = control.value().attr("value").unwrap_or("on").to_string();
                            let values = if control.has_attr("checked") {
                                vec![on_value.clone()]
                            } else {
                                Vec::new()
                            };
                            (FieldKind::Checkbox { on_value }, values)
                        }
                        _ => (FieldKind::Text, vec![value]),
                    };
                    model.fields.push(FieldDescriptor {
                        label: label_for(control, labels),
                        id: control.value().attr("id").map(String::from),
                        name,
                        kind,
                        values,
                        constraints: constraints_of(control),
                    });
                }
            }
        }
        "textarea" => {
            let Some(name) = name else { return };
            model.fields.push(FieldDescriptor {
                label: label_for(control, labels),
                id: control.value().attr("id").map(String::from),
                name,
                kind: FieldKind::TextArea,
                values: vec![control.raw_text()],
                constraints: constraints_of(control),
            });
        }
        "select" => {
            let Some(name) = name else { return };
            let multiple = control.has_attr("multiple");
            let options: Vec<ElementRef<'_>> = control.select(css!("option")).collect();
            let mut constraints = constraints_of(control);
            constraints.options = options
                .iter()
                .map(|o| SelectOption {
                    value: option_value(o),
                    label: o.collapsed_text(),
                })
                .collect();
            let mut values: Vec<String> = options
                .iter()
                .filter(|o| o.has_attr("selected"))
                .map(option_value)
                .collect();
            if !multiple {
                // 浏览器语义：单选下拉框未显式选中时取第一个选项
                values.truncate(1);
                if values.is_empty() {
                    if let Some(first) = constraints.options.first() {
                        values.push(first.value.clone());
                    }
                }
            }
            model.fields.push(FieldDescriptor {
                label: label_for(control, labels),
                id: control.value().attr("id").map(String::from),
                name,
                kind: if multiple {
                    FieldKind::MultiSelect
                } else {
                    FieldKind::Select
                },
                values,
                constraints,
            });
        }
        _ => {}
    }
}

/// 同名单选按钮合并为一个字段
fn add_radio(
    model: &mut FormModel,
    control: ElementRef<'_>,
    name: String,
    labels: &HashMap<String, String>,
) {
    let value = control.value().attr("value").unwrap_or("on").to_string();
    let option = SelectOption {
        value: value.clone(),
        label: label_for(control, labels).unwrap_or_else(|| value.clone()),
    };
    let checked = control.has_attr("checked");

    if let Some(existing) = model
        .fields
        .iter_mut()
        .find(|f| f.name == name && f.kind == FieldKind::Radio)
    {
        existing.constraints.options.push(option);
        if checked {
            existing.values = vec![value];
        }
        return;
    }

    let mut constraints = constraints_of(control);
    constraints.options.push(option);
    let group_label = control
        .ancestor_elements()
        .find(|a| a.has_class("form-group"))
        .and_then(|g| g.select(css!("label:not([for])")).next())
        .map(|l| clean_label(&l));
    model.fields.push(FieldDescriptor {
        name,
        id: control.value().attr("id").map(String::from),
        label: group_label,
        kind: FieldKind::Radio,
        values: if checked { vec![value] } else { Vec::new() },
        constraints,
    });
}

fn option_value(option: &ElementRef<'_>) -> String {
    option
        .value()
        .attr("value")
        .map(String::from)
        .unwrap_or_else(|| option.collapsed_text())
}

fn constraints_of(control: ElementRef<'_>) -> FieldConstraints {
    let in_disabled_fieldset = control
        .ancestor_elements()
        .any(|a| a.name() == "fieldset" && a.has_attr("disabled"));
    FieldConstraints {
        required: control.has_attr("required"),
        disabled: control.has_attr("disabled") || in_disabled_fieldset,
        readonly: control.has_attr("readonly"),
        max_length: control.value().attr("maxlength").and_then(|m| m.trim().parse().ok()),
        options: Vec::new(),
    }
}

/// `label[for]` → 标签文本
fn collect_labels(doc: &Html) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    for label in doc.select(css!("label[for]")) {
        if let Some(target) = label.value().attr("for") {
            labels
                .entry(target.to_string())
                .or_insert_with(|| clean_label(&label));
        }
    }
    labels
}

fn label_for(control: ElementRef<'_>, labels: &HashMap<String, String>) -> Option<String> {
    control
        .value()
        .attr("id")
        .and_then(|id| labels.get(id).cloned())
        .or_else(|| {
            control
                .ancestor_elements()
                .find(|a| a.name() == "label")
                .map(|l| clean_label(&l))
        })
        .filter(|l| !l.is_empty())
}

/// 去掉必填星号和无障碍提示
fn clean_label(label: &ElementRef<'_>) -> String {
    label
        .text_without(|e| e.has_class("asterisk") || e.has_class("ilAccHidden"))
        .trim_end_matches('*')
        .trim()
        .to_string()
}

// ========== 链接与按钮 ==========

fn extract_links(doc: &Html, resolver: &Resolver) -> Vec<Link> {
    doc.select(css!("a[href]"))
        .filter_map(|a| {
            let url = resolver.resolve(a.value().attr("href")?)?;
            Some(Link {
                text: a.text_without(|e| e.has_class("ilAccHidden")),
                url,
                id: a.value().attr("id").map(String::from),
            })
        })
        .collect()
}

fn extract_actions(doc: &Html, resolver: &Resolver) -> Vec<PageAction> {
    doc.select(css!("[data-action], [onclick]"))
        .filter_map(|e| {
            let target = match e.value().attr("data-action") {
                Some(action) => action.to_string(),
                None => {
                    let onclick = e.value().attr("onclick")?;
                    onclick_url_re().captures(onclick)?.get(1)?.as_str().to_string()
                }
            };
            let url = resolver.resolve(&target)?;
            let label = match e.collapsed_text() {
                t if t.is_empty() => e.value().attr("value").unwrap_or_default().to_string(),
                t => t,
            };
            Some(PageAction { label, url })
        })
        .collect()
}

// ========== 提示信息 ==========

fn is_alert(e: &ElementRef<'_>) -> bool {
    matches!(e.value().attr("role"), Some("alert") | Some("status")) || e.has_class("alert")
}

fn extract_alerts(doc: &Html) -> Vec<Alert> {
    doc.select(css!("[role=alert], [role=status], .alert"))
        .filter(|e| !e.ancestor_elements().any(|a| is_alert(&a)))
        .filter_map(|e| {
            let kind = if e.has_class("alert-danger") || e.has_class("alert-failure") {
                AlertKind::Failure
            } else if e.has_class("alert-success") {
                AlertKind::Success
            } else if e.has_class("alert-warning") {
                AlertKind::Warning
            } else {
                AlertKind::Info
            };
            let text = e.text_without(|c| c.has_class("ilAccHidden") || c.name() == "button");
            (!text.is_empty()).then_some(Alert { kind, text })
        })
        .collect()
}

// ========== 导航相关 ==========

fn extract_tabs(doc: &Html, resolver: &Resolver) -> Vec<Tab> {
    doc.select(css!("#ilTab li[id^=tab_]"))
        .filter_map(|li| {
            let link = li.select(css!("a[href]")).next()?;
            Some(Tab {
                id: li.value().attr("id")?.to_string(),
                label: link.text_without(|e| e.has_class("ilAccHidden")),
                url: resolver.resolve(link.value().attr("href")?)?,
            })
        })
        .collect()
}

fn detect_logged_in(doc: &Html) -> bool {
    doc.select(css!("#userlog")).next().is_some()
        || doc.select(css!("a[href]")).any(|a| {
            a.value().attr("href").is_some_and(|h| {
                let h = h.to_ascii_lowercase();
                h.contains("logout.php") || h.contains("cmd=logout")
            })
        })
}

fn extract_children(doc: &Html, resolver: &Resolver) -> Vec<ChildItem> {
    doc.select(css!("a.il_ContainerItemTitle, .il_ContainerItemTitle a"))
        .filter_map(|a| {
            Some(ChildItem {
                title: a.collapsed_text(),
                url: resolver.resolve(a.value().attr("href")?)?,
            })
        })
        .collect()
}

fn extract_question_rows(
    doc: &Html,
    resolver: &Resolver,
    url: &str,
) -> Result<Option<Vec<QuestionRow>>> {
    let Some(table) = doc.select(css!("table[id^=tst_qst_lst]")).next() else {
        return Ok(None);
    };

    let mut rows = Vec::new();
    for row in table.select(css!("tr")) {
        let cells: Vec<_> = row.element_children().filter(|c| c.name() == "td").collect();
        // 表头行或 "没有题目" 提示行
        if cells.len() <= 1 {
            continue;
        }
        let malformed = || PageShapeError::MalformedElement {
            url: url.to_string(),
            what: format!("题目行 '{}'", row.collapsed_text()),
        };
        let order_field = cells
            .iter()
            .find_map(|c| c.value().attr("name").filter(|n| n.starts_with("order[")))
            .ok_or_else(malformed)?;
        let link = row.select(css!("a")).next().ok_or_else(malformed)?;
        let id = order_field
            .trim_start_matches("order[")
            .trim_end_matches(']')
            .trim()
            .to_string();
        rows.push(QuestionRow {
            id,
            title: link.collapsed_text(),
            url: link
                .value()
                .attr("href")
                .and_then(|h| resolver.resolve(h))
                .unwrap_or_default(),
            order_field: order_field.to_string(),
        });
    }
    Ok(Some(rows))
}

fn extract_editor(doc: &Html, resolver: &Resolver) -> Option<EditorInit> {
    let init = doc.select(css!("#il-copg-init")).next()?;
    Some(EditorInit {
        endpoint: resolver.resolve(init.value().attr("data-endpoint")?)?,
        form_action: init
            .value()
            .attr("data-formaction")
            .and_then(|a| resolver.resolve(a)),
        blocks: extract_content_blocks(doc),
    })
}

/// 编辑器中带 `data-pcid` 的最外层元素，每个对应一个内容块
fn extract_content_blocks(doc: &Html) -> Vec<ContentBlock> {
    doc.select(css!("[data-pcid]"))
        .filter(|e| !e.ancestor_elements().any(|a| a.has_attr("data-pcid")))
        .filter_map(|e| {
            let pcid = e.value().attr("data-pcid")?.trim().to_string();
            let paragraph = if e.has_class("ilc_Paragraph") {
                Some(e)
            } else {
                e.select(css!(".ilc_Paragraph")).next()
            };
            let kind = if let Some(p) = paragraph {
                ContentKind::Paragraph(p.inner_html().trim().to_string())
            } else if e.has_class("ilc_Code") || e.select(css!(".ilc_Code")).next().is_some() {
                ContentKind::Code
            } else if e.select(css!(".ilc_media_cont_MediaContainer, img, embed")).next().is_some() {
                ContentKind::Media
            } else {
                ContentKind::Other(e.value().classes().collect::<Vec<_>>().join(" "))
            };
            Some(ContentBlock { pcid, kind })
        })
        .collect()
}
