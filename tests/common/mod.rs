//! 测试用的内存门户
//!
//! 按 ILIAS 的页面结构渲染 HTML，跟踪登录状态、防伪令牌和提交记录，
//! 并能按需注入网络错误、会话过期和页面结构变化。

#![allow(dead_code)]

use async_trait::async_trait;
use ilias_tests::config::Config;
use ilias_tests::forms::SubmissionPayload;
use ilias_tests::infrastructure::{RawResponse, Transport};
use ilias_tests::models::PlanFile;
use ilias_tests::session::{Credentials, SessionManager, SessionSettings};
use ilias_tests::{App, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

pub const BASE: &str = "https://ilias.test/";
pub const USERNAME: &str = "tutor";
pub const PASSWORD: &str = "secret";

/// 预置测验 `CourseA/Tests/Midterm`
pub const MIDTERM: u32 = 42;
pub const COURSE_A_TESTS: u32 = 20;
pub const COURSE_B_TESTS: u32 = 21;

const SESSION_COOKIE: &str = "PHPSESSID=fake-session";

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Area,
    Check,
    Number,
    Select(&'static [&'static str]),
}

const SETTINGS_FIELDS: &[(&str, Kind)] = &[
    ("title", Kind::Text),
    ("description", Kind::Area),
    ("online", Kind::Check),
    ("duration_minutes", Kind::Number),
    (
        "question_set_type",
        Kind::Select(&["FIXED_QUEST_SET", "RANDOM_QUEST_SET"]),
    ),
    ("intro_enabled", Kind::Check),
    ("introduction", Kind::Area),
    ("starting_time", Kind::Text),
    ("ending_time", Kind::Text),
    ("limitPasses", Kind::Check),
    ("nr_of_tries", Kind::Number),
];

/// 门户收到的一次表单提交
#[derive(Debug, Clone)]
pub struct Submission {
    pub url: String,
    pub button: Option<String>,
    pub fields: Vec<(String, String)>,
    pub token: Option<String>,
    /// 令牌是否来自紧接着之前渲染的页面
    pub token_fresh: bool,
}

impl Submission {
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }
}

#[derive(Debug, Clone)]
pub struct FakeQuestion {
    pub id: u32,
    pub title: String,
    pub qtype: String,
    pub fields: Vec<(String, String)>,
    pub blocks: Vec<String>,
    /// 与 `blocks` 一一对应的段落 ID
    pub block_ids: Vec<String>,
}

impl FakeQuestion {
    pub fn field(&self, name: &str) -> Option<&str> {
        value(&self.fields, name)
    }
}

#[derive(Debug, Clone)]
pub struct FakeTest {
    pub settings: BTreeMap<String, String>,
    pub questions: Vec<FakeQuestion>,
    pub active_passes: bool,
}

impl FakeTest {
    fn new(title: &str, description: &str) -> Self {
        let mut settings = BTreeMap::new();
        for (name, kind) in SETTINGS_FIELDS {
            let value = match kind {
                Kind::Check => "0",
                Kind::Select(options) => options[0],
                Kind::Number => "0",
                Kind::Text | Kind::Area => "",
            };
            settings.insert(name.to_string(), value.to_string());
        }
        settings.insert("title".into(), title.into());
        settings.insert("description".into(), description.into());
        Self {
            settings,
            questions: Vec::new(),
            active_passes: false,
        }
    }

    pub fn setting(&self, name: &str) -> &str {
        self.settings.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn question_titles(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.title.clone()).collect()
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: &'static str,
    title: String,
    children: Vec<u32>,
    test: Option<FakeTest>,
}

struct State {
    nodes: BTreeMap<u32, Node>,
    next_ref: u32,
    next_question: u32,
    logged_in: bool,
    logins: u32,
    token_counter: u32,
    current_token: String,
    submissions: Vec<Submission>,
    editor_calls: Vec<serde_json::Value>,
    requests: u32,
    // 故障注入
    network_failures: u32,
    editor_failure_after: Option<u32>,
    expire_on_submit: u32,
    dropped_fields: Vec<String>,
    reject_settings: Option<String>,
    identity_provider: bool,
}

/// 内存门户
pub struct FakePortal {
    state: Mutex<State>,
}

impl FakePortal {
    /// 预置对象树：
    ///
    /// ```text
    /// CourseA/Tests/Midterm   (duration 60, 两道问答题, 有进行中的答题)
    /// CourseB/Tests
    /// ```
    pub fn new() -> Arc<Self> {
        let mut nodes = BTreeMap::new();
        nodes.insert(1, container("root", "", vec![10, 11]));
        nodes.insert(10, container("crs", "CourseA", vec![COURSE_A_TESTS]));
        nodes.insert(11, container("crs", "CourseB", vec![COURSE_B_TESTS]));
        nodes.insert(COURSE_A_TESTS, container("fold", "Tests", vec![MIDTERM]));
        nodes.insert(COURSE_B_TESTS, container("fold", "Tests", vec![]));

        let mut midterm = FakeTest::new("Midterm", "Zwischenprüfung");
        midterm.settings.insert("duration_minutes".into(), "60".into());
        let mut first = question(101, "Frage Eins", "8");
        first.blocks.push(FRAGE_EINS_BLOCK.to_string());
        first.block_ids.push(FRAGE_EINS_PCID.to_string());
        midterm.questions = vec![first, question(102, "Frage Zwei", "8")];
        midterm.active_passes = true;
        nodes.insert(
            MIDTERM,
            Node {
                kind: "tst",
                title: "Midterm".into(),
                children: Vec::new(),
                test: Some(midterm),
            },
        );

        Arc::new(Self {
            state: Mutex::new(State {
                nodes,
                next_ref: 100,
                next_question: 200,
                logged_in: false,
                logins: 0,
                token_counter: 0,
                current_token: String::new(),
                submissions: Vec::new(),
                editor_calls: Vec::new(),
                requests: 0,
                network_failures: 0,
                editor_failure_after: None,
                expire_on_submit: 0,
                dropped_fields: Vec::new(),
                reject_settings: None,
                identity_provider: false,
            }),
        })
    }

    pub fn transport(self: &Arc<Self>) -> Arc<dyn Transport> {
        self.clone()
    }

    // ---------- 故障注入 ----------

    /// 接下来的 `n` 个请求返回 503
    pub fn fail_next_requests(&self, n: u32) {
        self.state.lock().unwrap().network_failures = n;
    }

    /// 页面编辑器先成功处理 `successes` 次请求，下一次返回 503
    pub fn fail_editor_call_after(&self, successes: u32) {
        self.state.lock().unwrap().editor_failure_after = Some(successes);
    }

    /// 立即让会话失效
    pub fn expire_session(&self) {
        self.state.lock().unwrap().logged_in = false;
    }

    /// 接下来的 `n` 次表单提交发现会话已过期
    pub fn expire_on_next_submits(&self, n: u32) {
        self.state.lock().unwrap().expire_on_submit = n;
    }

    /// 设置页不再包含该字段
    pub fn drop_settings_field(&self, name: &str) {
        self.state.lock().unwrap().dropped_fields.push(name.to_string());
    }

    /// 保存设置时门户报告校验错误
    pub fn reject_settings(&self, message: &str) {
        self.state.lock().unwrap().reject_settings = Some(message.to_string());
    }

    /// 登录经过身份提供方的自动提交页
    pub fn use_identity_provider(&self) {
        self.state.lock().unwrap().identity_provider = true;
    }

    /// 在容器中新建对象（允许重名），返回 ref_id
    pub fn add_object(&self, parent: u32, kind: &'static str, title: &str) -> u32 {
        let mut state = self.state.lock().unwrap();
        let ref_id = state.next_ref;
        state.next_ref += 1;
        let test = (kind == "tst").then(|| FakeTest::new(title, ""));
        state.nodes.insert(
            ref_id,
            Node {
                kind,
                title: title.to_string(),
                children: Vec::new(),
                test,
            },
        );
        if let Some(folder) = state.nodes.get_mut(&parent) {
            folder.children.push(ref_id);
        }
        ref_id
    }

    pub fn set_setting(&self, ref_id: u32, name: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(test) = state.nodes.get_mut(&ref_id).and_then(|n| n.test.as_mut()) {
            test.settings.insert(name.to_string(), value.to_string());
        }
    }

    // ---------- 观察 ----------

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn submissions_with(&self, button: &str) -> Vec<Submission> {
        self.submissions()
            .into_iter()
            .filter(|s| s.button.as_deref() == Some(button))
            .collect()
    }

    pub fn editor_calls(&self) -> Vec<serde_json::Value> {
        self.state.lock().unwrap().editor_calls.clone()
    }

    pub fn logins(&self) -> u32 {
        self.state.lock().unwrap().logins
    }

    pub fn requests(&self) -> u32 {
        self.state.lock().unwrap().requests
    }

    pub fn test(&self, ref_id: u32) -> Option<FakeTest> {
        self.state
            .lock()
            .unwrap()
            .nodes
            .get(&ref_id)
            .and_then(|n| n.test.clone())
    }

    /// 容器中名为 `title` 的测验
    pub fn test_in(&self, folder: u32, title: &str) -> Option<FakeTest> {
        let state = self.state.lock().unwrap();
        state.nodes.get(&folder)?.children.iter().find_map(|id| {
            let node = state.nodes.get(id)?;
            (node.title == title).then(|| node.test.clone()).flatten()
        })
    }

    pub fn count_tests_in(&self, folder: u32, title: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .nodes
            .get(&folder)
            .map(|f| {
                f.children
                    .iter()
                    .filter_map(|id| state.nodes.get(id))
                    .filter(|n| n.kind == "tst" && n.title == title)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl Transport for FakePortal {
    async fn get(&self, url: &str) -> Result<RawResponse> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.network_failure(url) {
            return Ok(failure);
        }
        Ok(state.get(url))
    }

    async fn submit(&self, payload: &SubmissionPayload) -> Result<RawResponse> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.network_failure(&payload.url) {
            return Ok(failure);
        }
        Ok(state.submit(payload))
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<RawResponse> {
        let mut state = self.state.lock().unwrap();
        if let Some(failure) = state.network_failure(url) {
            return Ok(failure);
        }
        if let Some(remaining) = state.editor_failure_after {
            if remaining == 0 {
                state.editor_failure_after = None;
                return Ok(unavailable(url));
            }
            state.editor_failure_after = Some(remaining - 1);
        }
        Ok(state.post_json(url, body))
    }

    fn export_cookies(&self) -> Vec<String> {
        if self.state.lock().unwrap().logged_in {
            vec![SESSION_COOKIE.to_string()]
        } else {
            Vec::new()
        }
    }

    fn import_cookies(&self, cookies: &[String]) {
        if cookies.iter().any(|c| c == SESSION_COOKIE) {
            self.state.lock().unwrap().logged_in = true;
        }
    }
}

impl State {
    fn network_failure(&mut self, url: &str) -> Option<RawResponse> {
        self.requests += 1;
        if self.network_failures == 0 {
            return None;
        }
        self.network_failures -= 1;
        Some(unavailable(url))
    }

    fn next_token(&mut self) -> String {
        self.token_counter += 1;
        self.current_token = format!("tok{}", self.token_counter);
        self.current_token.clone()
    }

    // ---------- GET ----------

    fn get(&mut self, raw: &str) -> RawResponse {
        let Ok(url) = Url::parse(raw) else {
            return not_found(raw);
        };
        match url.path() {
            "/login.php" => return self.login_page(None),
            "/logout.php" => {
                self.logged_in = false;
                return self.login_page(None);
            }
            _ => {}
        }
        if !self.logged_in {
            return self.login_page(None);
        }
        self.next_token();
        let q = query(&url);
        match url.path() {
            "/goto.php" => {
                let ref_id = q
                    .get("target")
                    .and_then(|t| t.split('_').nth(1))
                    .and_then(|r| r.parse().ok());
                match ref_id {
                    Some(ref_id) => self.object_page(ref_id, raw),
                    None => not_found(raw),
                }
            }
            "/ilias.php" => self.ilias_get(raw, &q),
            _ => not_found(raw),
        }
    }

    fn ilias_get(&mut self, raw: &str, q: &HashMap<String, String>) -> RawResponse {
        let ref_id = ref_id(q);
        let cmd = q.get("cmd").map(String::as_str).unwrap_or_default();
        match q.get("baseClass").map(String::as_str) {
            Some("ilDashboardGUI") => ok(raw, shell("Dashboard", "<h1>Übersicht</h1>")),
            Some("ilRepositoryGUI") if cmd == "create" => self.create_form(ref_id, raw),
            Some("ilRepositoryGUI") => self.object_page(ref_id, raw),
            Some("ilObjTestGUI") => match cmd {
                "showForm" => self.settings_page(ref_id, raw, None),
                "questions" => self.questions_page(ref_id, raw, None),
                "addQuestion" => self.add_question_page(ref_id, raw),
                "previewQuestion" => self.preview_page(ref_id, q_id(q), raw, ""),
                "editQuestion" => self.existing_question_page(ref_id, q_id(q), raw),
                "edit" => self.design_page(ref_id, q, raw),
                "show" => self.dashboard_page(ref_id, raw),
                "finishAllUserPasses" => self.confirm_page(ref_id, raw),
                _ => self.object_page(ref_id, raw),
            },
            _ => not_found(raw),
        }
    }

    fn login_page(&self, alert: Option<&str>) -> RawResponse {
        let alert = alert
            .map(|a| format!(r#"<div class="alert alert-danger" role="alert">{}</div>"#, esc(a)))
            .unwrap_or_default();
        let body = format!(
            r#"<!DOCTYPE html><html><head><title>Anmelden</title></head><body>
{alert}
<form method="post" action="login.php?cmd=post&amp;baseClass=ilStartUpGUI">
  <label for="username">Benutzername</label><input type="text" id="username" name="username">
  <label for="password">Passwort</label><input type="password" id="password" name="password">
  <input type="submit" name="cmd[doStandardAuthentication]" value="Anmelden">
</form>
</body></html>"#
        );
        ok(&full("login.php?cmd=force_login"), body)
    }

    fn object_page(&mut self, ref_id: u32, raw: &str) -> RawResponse {
        let Some(node) = self.nodes.get(&ref_id) else {
            return not_found(raw);
        };
        if node.kind == "tst" {
            let body = format!("{}<h1>{}</h1>", tabs(ref_id), esc(&node.title));
            return ok(raw, shell(&node.title, &body));
        }
        let mut body = String::new();
        if node.kind != "root" {
            body.push_str(&format!(
                r#"<ul id="il-add-new-item"><li><a id="tst" href="{}">Test</a></li></ul>"#,
                esc(&format!(
                    "ilias.php?baseClass=ilRepositoryGUI&ref_id={}&cmd=create&new_type=tst",
                    ref_id
                ))
            ));
        }
        body.push_str(r#"<div class="ilContainerListItemOuter">"#);
        for child in &node.children {
            let Some(c) = self.nodes.get(child) else { continue };
            body.push_str(&format!(
                r#"<div class="il_ContainerListItem"><h3 class="il_ContainerItemTitle"><a href="goto.php?target={}_{}">{}</a></h3></div>"#,
                c.kind,
                child,
                esc(&c.title)
            ));
        }
        body.push_str("</div>");
        let title = if node.title.is_empty() {
            "Magazin"
        } else {
            node.title.as_str()
        };
        ok(raw, shell(title, &body))
    }

    fn create_form(&mut self, ref_id: u32, raw: &str) -> RawResponse {
        let action = format!(
            "ilias.php?baseClass=ilRepositoryGUI&ref_id={}&cmd=post&new_type=tst&rtoken={}",
            ref_id, self.current_token
        );
        let body = format!(
            r#"<form class="il-standard-form" method="post" action="{}">
  <label for="title">Titel</label><input type="text" id="title" name="title" value="" required>
  <label for="desc">Beschreibung</label><textarea id="desc" name="desc"></textarea>
  <input type="submit" name="cmd[save]" value="Test anlegen">
  <input type="submit" name="cmd[cancel]" value="Abbrechen">
</form>"#,
            esc(&action)
        );
        ok(raw, shell("Test anlegen", &body))
    }

    fn settings_page(&mut self, ref_id: u32, raw: &str, alert: Option<&str>) -> RawResponse {
        let Some(test) = self.nodes.get(&ref_id).and_then(|n| n.test.as_ref()) else {
            return not_found(raw);
        };
        let action = post_url(ref_id, "ilobjtestsettingsgeneralgui", &self.current_token);
        let mut form = format!(
            r#"<form class="il-standard-form form-horizontal" enctype="multipart/form-data" method="post" action="{}">"#,
            esc(&action)
        );
        for (name, kind) in SETTINGS_FIELDS {
            if self.dropped_fields.iter().any(|d| d.as_str() == *name) {
                continue;
            }
            let value = test.settings.get(*name).map(String::as_str).unwrap_or_default();
            form.push_str(&format!(
                r#"<div class="form-group"><label for="{0}">{0}</label>{1}</div>"#,
                name,
                render_field(name, *kind, value)
            ));
        }
        form.push_str(r#"<input type="hidden" name="ilfilehash" value="f1le">"#);
        form.push_str(r#"<button class="btn" name="cmd[saveForm]" value="Speichern">Speichern</button></form>"#);
        let body = format!("{}{}{}", tabs(ref_id), alert.unwrap_or_default(), form);
        ok(raw, shell("Einstellungen", &body))
    }

    fn questions_page(&mut self, ref_id: u32, raw: &str, alert: Option<&str>) -> RawResponse {
        let Some(test) = self.nodes.get(&ref_id).and_then(|n| n.test.as_ref()) else {
            return not_found(raw);
        };
        let mut rows = String::new();
        for (i, q) in test.questions.iter().enumerate() {
            rows.push_str(&format!(
                r#"<tr><td name="order[{id}]"><input type="text" name="order[{id}]" value="{pos}"></td><td><a href="{href}">{title}</a></td></tr>"#,
                id = q.id,
                pos = (i + 1) * 10,
                href = esc(&format!(
                    "ilias.php?baseClass=ilObjTestGUI&ref_id={}&q_id={}&cmd=previewQuestion",
                    ref_id, q.id
                )),
                title = esc(&q.title)
            ));
        }
        if test.questions.is_empty() {
            rows.push_str(r#"<tr><td colspan="2">Keine Fragen vorhanden</td></tr>"#);
        }
        let body = format!(
            r#"{tabs}{alert}
<div class="ilToolbar"><button class="btn" data-action="{add}">Frage erstellen</button></div>
<form method="post" action="{action}">
<table id="tst_qst_lst_{ref_id}"><thead><tr><th>Reihenfolge</th><th>Titel</th></tr></thead><tbody>{rows}</tbody></table>
<input type="submit" name="cmd[saveOrderAndObligations]" value="Sortierung abspeichern">
</form>"#,
            tabs = tabs(ref_id),
            alert = alert.unwrap_or_default(),
            add = esc(&format!(
                "ilias.php?baseClass=ilObjTestGUI&ref_id={}&cmd=addQuestion",
                ref_id
            )),
            action = esc(&post_url(ref_id, "ilobjtestgui", &self.current_token)),
        );
        ok(raw, shell("Fragen", &body))
    }

    fn add_question_page(&mut self, ref_id: u32, raw: &str) -> RawResponse {
        let body = format!(
            r#"{}<form method="post" action="{}">
<label for="qtype">Fragetyp</label>
<select id="qtype" name="qtype">
  <option value="1">Single Choice</option>
  <option value="2">Multiple Choice</option>
  <option value="8">Freitext</option>
  <option value="14">Datei hochladen</option>
</select>
<input type="submit" name="cmd[executeCreateQuestion]" value="Erstellen">
</form>"#,
            tabs(ref_id),
            esc(&post_url(ref_id, "ilobjtestgui", &self.current_token))
        );
        ok(raw, shell("Frage erstellen", &body))
    }

    fn find_question(&self, ref_id: u32, q_id: u32) -> Option<&FakeQuestion> {
        self.nodes
            .get(&ref_id)?
            .test
            .as_ref()?
            .questions
            .iter()
            .find(|q| q.id == q_id)
    }

    /// 题目预览页：页面设计按钮和编辑链接
    fn preview_page(&mut self, ref_id: u32, q_id: u32, raw: &str, alert: &str) -> RawResponse {
        let Some(question) = self.find_question(ref_id, q_id) else {
            return not_found(raw);
        };
        let body = format!(
            r#"{}{}<h1>{}</h1><button class="btn" data-action="{}">Seite gestalten</button><a href="{}">Bearbeiten</a>"#,
            tabs(ref_id),
            alert,
            esc(&question.title),
            esc(&format!(
                "ilias.php?baseClass=ilObjTestGUI&ref_id={}&q_id={}&cmdClass=ilAssQuestionPageGUI&cmd=edit",
                ref_id, q_id
            )),
            esc(&format!(
                "ilias.php?baseClass=ilObjTestGUI&ref_id={}&q_id={}&cmdClass={}&cmd=editQuestion",
                ref_id,
                q_id,
                type_class(&question.qtype)
            ))
        );
        let title = question.title.clone();
        ok(raw, shell(&title, &body))
    }

    fn existing_question_page(&mut self, ref_id: u32, q_id: u32, raw: &str) -> RawResponse {
        match self.find_question(ref_id, q_id).cloned() {
            Some(question) => self.edit_question_page(ref_id, &question.qtype, Some(&question)),
            None => not_found(raw),
        }
    }

    /// 题目编辑页；`existing` 为空时是新建题目的空表单
    fn edit_question_page(
        &mut self,
        ref_id: u32,
        qtype: &str,
        existing: Option<&FakeQuestion>,
    ) -> RawResponse {
        let class = type_class(qtype);
        let id_param = existing
            .map(|q| format!("&q_id={}", q.id))
            .unwrap_or_default();
        let url = full(&format!(
            "ilias.php?baseClass=ilObjTestGUI&ref_id={}{}&cmdClass={}&cmd=editQuestion&qtype={}",
            ref_id, id_param, class, qtype
        ));
        let action = format!(
            "ilias.php?baseClass=ilObjTestGUI&ref_id={}{}&cmdClass={}&cmd=post&qtype={}&rtoken={}",
            ref_id, id_param, class, qtype, self.current_token
        );
        let stored = |name: &str| existing.and_then(|q| q.field(name));
        let or = |name: &str, default: &str| esc(stored(name).unwrap_or(default));

        let lifecycle: String = [("draft", "Entwurf"), ("review", "Prüfung"), ("final", "Final")]
            .iter()
            .map(|(v, label)| {
                let selected = if stored("lifecycle") == Some(*v) { " selected" } else { "" };
                format!(r#"<option value="{}"{}>{}</option>"#, v, selected, label)
            })
            .collect();
        let mut form = format!(
            r#"<form class="il-standard-form" enctype="multipart/form-data" method="post" action="{}">
<label for="title">Titel</label><input type="text" id="title" name="title" value="{}" required>
<label for="author">Autor</label><input type="text" id="author" name="author" value="{}">
<label for="comment">Beschreibung</label><input type="text" id="comment" name="comment" value="{}">
<label for="lifecycle">Lebenszyklus</label><select id="lifecycle" name="lifecycle">{}</select>
<label for="question">Frage</label><textarea id="question" name="question">{}</textarea>"#,
            esc(&action),
            or("title", ""),
            or("author", USERNAME),
            or("comment", ""),
            lifecycle,
            or("question", ""),
        );
        if qtype == "1" || qtype == "2" {
            let shuffle = existing.is_none() || stored("shuffle") == Some("1");
            form.push_str(&format!(
                r#"<input type="checkbox" id="shuffle" name="shuffle" value="1"{}>"#,
                if shuffle { " checked" } else { "" }
            ));
            let rows = (0..)
                .take_while(|i| stored(&format!("choice[answer][{}]", i)).is_some())
                .count()
                .max(1);
            for i in 0..rows {
                form.push_str(&format!(
                    r#"<input type="text" name="choice[answer][{i}]" value="{}">
<input type="hidden" name="choice[answer_id][{i}]" value="-1">
<input type="file" name="choice[image][{i}]">
<input type="number" name="choice[points][{i}]" value="{}">"#,
                    or(&format!("choice[answer][{}]", i), ""),
                    or(&format!("choice[points][{}]", i), "0"),
                ));
                if qtype == "2" {
                    form.push_str(&format!(
                        r#"<input type="number" name="choice[points_unchecked][{i}]" value="{}">"#,
                        or(&format!("choice[points_unchecked][{}]", i), "0"),
                    ));
                }
            }
        }
        if qtype == "2" {
            form.push_str(&format!(
                r#"<input type="number" name="selection_limit" value="{}">"#,
                or("selection_limit", "")
            ));
        }
        if qtype == "8" {
            form.push_str(&format!(
                r#"<input type="number" name="non_keyword_points" value="{}">"#,
                or("non_keyword_points", "0")
            ));
        }
        if qtype == "14" {
            form.push_str(&format!(
                r#"<input type="number" name="points" value="{}">
<input type="number" name="maxsize" value="{}">
<input type="text" name="allowedextensions" value="{}">"#,
                or("points", "0"),
                or("maxsize", ""),
                or("allowedextensions", ""),
            ));
        }
        form.push_str(r#"<input type="submit" name="cmd[saveReturn]" value="Speichern und zurück"></form>"#);
        let body = format!("{}{}", tabs(ref_id), form);
        ok(&url, shell("Frage bearbeiten", &body))
    }

    fn design_page(&mut self, ref_id: u32, q: &HashMap<String, String>, raw: &str) -> RawResponse {
        let q_id = q.get("q_id").cloned().unwrap_or_default();
        let endpoint = format!(
            "ilias.php?baseClass=ilObjTestGUI&ref_id={}&q_id={}&cmdClass=ilAssQuestionPageGUI&cmd=invokeServer",
            ref_id, q_id
        );
        let blocks: String = q_id
            .parse()
            .ok()
            .and_then(|id| self.find_question(ref_id, id))
            .map(|question| {
                question
                    .block_ids
                    .iter()
                    .zip(&question.blocks)
                    .map(|(pcid, content)| {
                        format!(
                            r#"<div class="il_editarea" data-pcid="{}"><div class="ilc_Paragraph ilc_text_block_Standard">{}</div></div>"#,
                            esc(pcid),
                            content
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        let body = format!(
            r#"<div id="il-copg-init" data-endpoint="{}"></div><div id="il_center_col">{}</div>"#,
            esc(&endpoint),
            blocks
        );
        ok(raw, shell("Seite gestalten", &body))
    }

    fn dashboard_page(&mut self, ref_id: u32, raw: &str) -> RawResponse {
        let Some(test) = self.nodes.get(&ref_id).and_then(|n| n.test.as_ref()) else {
            return not_found(raw);
        };
        let mut body = tabs(ref_id);
        if test.active_passes {
            body.push_str(&format!(
                r#"<button class="btn" data-action="{}">Alle Testdurchläufe beenden</button>"#,
                esc(&format!(
                    "ilias.php?baseClass=ilObjTestGUI&ref_id={}&cmdClass=iltestparticipantsgui&cmd=finishAllUserPasses",
                    ref_id
                ))
            ));
        }
        body.push_str("<table><tr><td>Teilnehmer</td></tr></table>");
        ok(raw, shell("Dashboard", &body))
    }

    fn confirm_page(&mut self, ref_id: u32, raw: &str) -> RawResponse {
        let body = format!(
            r#"<div class="alert alert-warning" role="alert">Wollen Sie wirklich alle Testdurchläufe beenden?</div>
<form method="post" action="{}">
<input type="submit" name="cmd[confirmFinishTestPassForAllUser]" value="Beenden">
<input type="submit" name="cmd[participants]" value="Abbrechen">
</form>"#,
            esc(&post_url(ref_id, "iltestparticipantsgui", &self.current_token))
        );
        ok(raw, shell("Bestätigung", &body))
    }

    // ---------- POST ----------

    fn submit(&mut self, payload: &SubmissionPayload) -> RawResponse {
        let Ok(url) = Url::parse(&payload.url) else {
            return not_found(&payload.url);
        };
        let fields = payload.text_pairs();
        match url.path() {
            "/login.php" => return self.login_submit(&fields),
            "/saml/acs.php" => {
                self.logged_in = true;
                self.logins += 1;
                return ok(&full(DASHBOARD), shell("Dashboard", "<h1>Übersicht</h1>"));
            }
            _ => {}
        }
        if !self.logged_in {
            return self.login_page(None);
        }
        if self.expire_on_submit > 0 {
            self.expire_on_submit -= 1;
            self.logged_in = false;
            return self.login_page(None);
        }

        let q = query(&url);
        let token = q.get("rtoken").cloned();
        let token_fresh = token.as_deref() == Some(self.current_token.as_str());
        let button = fields
            .iter()
            .rev()
            .find(|(n, _)| n.starts_with("cmd["))
            .map(|(n, _)| n.clone());
        self.submissions.push(Submission {
            url: payload.url.clone(),
            button: button.clone(),
            fields: fields.clone(),
            token,
            token_fresh,
        });
        self.next_token();
        if !token_fresh {
            return ok(&payload.url, error_page("Ungültiges Sicherheitstoken."));
        }

        let ref_id = ref_id(&q);
        match button.as_deref() {
            Some("cmd[save]") => self.create_test(ref_id, &fields),
            Some("cmd[saveForm]") => self.save_settings(ref_id, &fields),
            Some("cmd[executeCreateQuestion]") => {
                let qtype = value(&fields, "qtype").unwrap_or("1").to_string();
                self.edit_question_page(ref_id, &qtype, None)
            }
            Some("cmd[saveReturn]") => {
                let qtype = q.get("qtype").cloned().unwrap_or_default();
                let q_id = q.get("q_id").and_then(|v| v.parse().ok());
                self.save_question(ref_id, &qtype, q_id, &fields)
            }
            Some("cmd[saveOrderAndObligations]") => self.save_order(ref_id, &fields),
            Some("cmd[confirmFinishTestPassForAllUser]") => self.finish_passes(ref_id),
            _ => ok(&payload.url, error_page("Unbekannter Befehl.")),
        }
    }

    fn login_submit(&mut self, fields: &[(String, String)]) -> RawResponse {
        let accepted = value(fields, "username") == Some(USERNAME)
            && value(fields, "password") == Some(PASSWORD);
        if !accepted {
            return self.login_page(Some("Ungültiger Benutzername oder Passwort."));
        }
        if self.identity_provider {
            let body = r#"<html><body onload="document.forms[0].submit()">
<form method="post" action="https://ilias.test/saml/acs.php">
<input type="hidden" name="SAMLResponse" value="PHNhbWw+">
<input type="hidden" name="RelayState" value="ilias">
</form></body></html>"#;
            return ok("https://idp.ilias.test/sso/redirect", body.to_string());
        }
        self.logged_in = true;
        self.logins += 1;
        ok(&full(DASHBOARD), shell("Dashboard", "<h1>Übersicht</h1>"))
    }

    fn create_test(&mut self, parent: u32, fields: &[(String, String)]) -> RawResponse {
        let title = value(fields, "title").unwrap_or_default().to_string();
        if title.is_empty() {
            return ok(&full("ilias.php"), error_page("Titel ist erforderlich."));
        }
        let description = value(fields, "desc").unwrap_or_default().to_string();
        let ref_id = self.next_ref;
        self.next_ref += 1;
        self.nodes.insert(
            ref_id,
            Node {
                kind: "tst",
                title: title.clone(),
                children: Vec::new(),
                test: Some(FakeTest::new(&title, &description)),
            },
        );
        if let Some(folder) = self.nodes.get_mut(&parent) {
            folder.children.push(ref_id);
        }
        self.settings_page(ref_id, &settings_url(ref_id), Some(SAVED))
    }

    fn save_settings(&mut self, ref_id: u32, fields: &[(String, String)]) -> RawResponse {
        if let Some(message) = self.reject_settings.clone() {
            let alert = format!(r#"<div class="alert alert-danger" role="alert">{}</div>"#, esc(&message));
            return self.settings_page(ref_id, &settings_url(ref_id), Some(&alert));
        }
        let dropped = self.dropped_fields.clone();
        let Some(node) = self.nodes.get_mut(&ref_id) else {
            return not_found(&settings_url(ref_id));
        };
        let Some(test) = node.test.as_mut() else {
            return not_found(&settings_url(ref_id));
        };
        for (name, kind) in SETTINGS_FIELDS {
            if dropped.iter().any(|d| d.as_str() == *name) {
                continue;
            }
            match kind {
                Kind::Check => {
                    let on = value(fields, name) == Some("1");
                    test.settings
                        .insert(name.to_string(), if on { "1" } else { "0" }.to_string());
                }
                _ => {
                    if let Some(v) = value(fields, name) {
                        test.settings.insert(name.to_string(), v.to_string());
                    }
                }
            }
        }
        node.title = test.settings.get("title").cloned().unwrap_or_default();
        self.settings_page(ref_id, &settings_url(ref_id), Some(SAVED))
    }

    /// 保存题目；带 `q_id` 时更新已有题目
    fn save_question(
        &mut self,
        ref_id: u32,
        qtype: &str,
        q_id: Option<u32>,
        fields: &[(String, String)],
    ) -> RawResponse {
        let title = value(fields, "title").unwrap_or_default().to_string();
        if title.is_empty() {
            return ok(&full("ilias.php"), error_page("Titel ist erforderlich."));
        }
        let next_question = self.next_question;
        let Some(test) = self.nodes.get_mut(&ref_id).and_then(|n| n.test.as_mut()) else {
            return not_found("ilias.php");
        };
        let id = match q_id.and_then(|id| test.questions.iter_mut().find(|q| q.id == id)) {
            Some(existing) => {
                existing.title = title;
                existing.fields = fields.to_vec();
                existing.id
            }
            None => {
                test.questions.push(FakeQuestion {
                    id: next_question,
                    title,
                    qtype: qtype.to_string(),
                    fields: fields.to_vec(),
                    blocks: Vec::new(),
                    block_ids: Vec::new(),
                });
                self.next_question += 1;
                next_question
            }
        };
        let url = full(&format!(
            "ilias.php?baseClass=ilObjTestGUI&ref_id={}&q_id={}&cmdClass=assQuestionGUI&cmd=preview",
            ref_id, id
        ));
        self.preview_page(ref_id, id, &url, SAVED)
    }

    fn save_order(&mut self, ref_id: u32, fields: &[(String, String)]) -> RawResponse {
        if let Some(test) = self.nodes.get_mut(&ref_id).and_then(|n| n.test.as_mut()) {
            let position = |q: &FakeQuestion| {
                value(fields, &format!("order[{}]", q.id))
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(u32::MAX)
            };
            test.questions.sort_by_key(|q| position(q));
        }
        let url = full(&format!(
            "ilias.php?baseClass=ilObjTestGUI&ref_id={}&cmdClass=ilobjtestgui&cmd=questions",
            ref_id
        ));
        self.questions_page(ref_id, &url, Some(SAVED))
    }

    fn finish_passes(&mut self, ref_id: u32) -> RawResponse {
        if let Some(test) = self.nodes.get_mut(&ref_id).and_then(|n| n.test.as_mut()) {
            test.active_passes = false;
        }
        let url = full(&format!(
            "ilias.php?baseClass=ilObjTestGUI&ref_id={}&cmdClass=iltestparticipantsgui&cmd=show",
            ref_id
        ));
        self.dashboard_page(ref_id, &url)
    }

    // ---------- 页面编辑器 ----------

    fn post_json(&mut self, raw: &str, body: &serde_json::Value) -> RawResponse {
        if !self.logged_in {
            return self.login_page(None);
        }
        self.editor_calls.push(body.clone());
        let q_id: Option<u32> = Url::parse(raw)
            .ok()
            .and_then(|u| query(&u).get("q_id").and_then(|v| v.parse().ok()));
        let data = &body["data"];
        let content = data["content"].as_str().unwrap_or_default().to_string();
        let pcid = data["pcid"].as_str().unwrap_or_default().to_string();
        let after = data["after_pcid"].as_str().unwrap_or_default();
        let question = self
            .nodes
            .values_mut()
            .filter_map(|n| n.test.as_mut())
            .flat_map(|t| t.questions.iter_mut())
            .find(|q| Some(q.id) == q_id);
        let Some(question) = question else {
            return ok(raw, r#"{"error":"Frage nicht gefunden"}"#.to_string());
        };
        let position = if after.is_empty() {
            Some(0)
        } else {
            question
                .block_ids
                .iter()
                .position(|id| id == after)
                .map(|i| i + 1)
        };
        let reply = match position {
            Some(i) => {
                question.blocks.insert(i, content);
                question.block_ids.insert(i, pcid);
                r#"{"error":null,"renderedContent":"<p>ok</p>"}"#
            }
            None => r#"{"error":"Unbekannter Absatz"}"#,
        };
        ok(raw, reply.to_string())
    }
}

// ========== 渲染辅助 ==========

const DASHBOARD: &str = "ilias.php?baseClass=ilDashboardGUI&cmd=show";
/// Frage Eins 预置的文本块
pub const FRAGE_EINS_BLOCK: &str = "<p>Bitte kurz antworten.</p>";
pub const FRAGE_EINS_PCID: &str = "10000000000000000001";
const SAVED: &str = r#"<div class="alert alert-success" role="status">Änderungen gespeichert.</div>"#;

fn container(kind: &'static str, title: &str, children: Vec<u32>) -> Node {
    Node {
        kind,
        title: title.to_string(),
        children,
        test: None,
    }
}

/// 预置的问答题，1 分
fn question(id: u32, title: &str, qtype: &str) -> FakeQuestion {
    let fields = [
        ("title", title.to_string()),
        ("author", USERNAME.to_string()),
        ("comment", String::new()),
        ("question", format!("<p>{}?</p>", title)),
        ("non_keyword_points", "1".to_string()),
    ];
    FakeQuestion {
        id,
        title: title.to_string(),
        qtype: qtype.to_string(),
        fields: fields
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .collect(),
        blocks: Vec::new(),
        block_ids: Vec::new(),
    }
}

/// 编辑页地址中的题型类名
fn type_class(qtype: &str) -> &'static str {
    match qtype {
        "2" => "assMultipleChoiceGUI",
        "8" => "assTextQuestionGUI",
        "14" => "assFileUploadGUI",
        _ => "assSingleChoiceGUI",
    }
}

fn full(path: &str) -> String {
    format!("{}{}", BASE, path)
}

fn settings_url(ref_id: u32) -> String {
    full(&format!(
        "ilias.php?baseClass=ilObjTestGUI&ref_id={}&cmdClass=ilobjtestsettingsgeneralgui&cmd=showForm",
        ref_id
    ))
}

fn post_url(ref_id: u32, class: &str, token: &str) -> String {
    format!(
        "ilias.php?baseClass=ilObjTestGUI&ref_id={}&cmdClass={}&cmd=post&rtoken={}",
        ref_id, class, token
    )
}

fn tabs(ref_id: u32) -> String {
    let link = |class: &str, cmd: &str| {
        esc(&format!(
            "ilias.php?baseClass=ilObjTestGUI&ref_id={}&cmdClass={}&cmd={}",
            ref_id, class, cmd
        ))
    };
    format!(
        r#"<div id="ilTab"><ul>
<li id="tab_info_short"><a href="{}">Info</a></li>
<li id="tab_settings"><a href="{}">Einstellungen</a></li>
<li id="tab_assQuestions"><a href="{}">Fragen</a></li>
<li id="tab_dashboard"><a href="{}">Dashboard</a></li>
</ul></div>"#,
        link("ilobjtestgui", "infoScreen"),
        link("ilobjtestsettingsgeneralgui", "showForm"),
        link("ilobjtestgui", "questions"),
        link("iltestparticipantsgui", "show"),
    )
}

fn render_field(name: &str, kind: Kind, value: &str) -> String {
    match kind {
        Kind::Text => format!(
            r#"<input type="text" id="{0}" name="{0}" value="{1}">"#,
            name,
            esc(value)
        ),
        Kind::Number => format!(
            r#"<input type="number" id="{0}" name="{0}" value="{1}">"#,
            name,
            esc(value)
        ),
        Kind::Area => format!(r#"<textarea id="{0}" name="{0}">{1}</textarea>"#, name, esc(value)),
        Kind::Check => format!(
            r#"<input type="checkbox" id="{0}" name="{0}" value="1"{1}>"#,
            name,
            if value == "1" { " checked" } else { "" }
        ),
        Kind::Select(options) => {
            let options: String = options
                .iter()
                .map(|o| {
                    let selected = if *o == value { r#" selected="selected""# } else { "" };
                    format!(r#"<option value="{0}"{1}>{0}</option>"#, o, selected)
                })
                .collect();
            format!(r#"<select id="{0}" name="{0}">{1}</select>"#, name, options)
        }
    }
}

/// 已登录页面的外壳
fn shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><title>{}</title></head><body>
<div id="userlog"><a href="logout.php?lang=de">Abmelden</a></div>
{}
</body></html>"#,
        esc(title),
        body
    )
}

fn error_page(message: &str) -> String {
    shell(
        "Fehler",
        &format!(r#"<div class="alert alert-danger" role="alert">{}</div>"#, esc(message)),
    )
}

fn ok(url: &str, body: String) -> RawResponse {
    RawResponse {
        url: url.to_string(),
        status: 200,
        body,
    }
}

fn unavailable(url: &str) -> RawResponse {
    RawResponse {
        url: url.to_string(),
        status: 503,
        body: "Service Unavailable".to_string(),
    }
}

fn not_found(url: &str) -> RawResponse {
    RawResponse {
        url: url.to_string(),
        status: 404,
        body: "<html><body>Not Found</body></html>".to_string(),
    }
}

fn esc(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn query(url: &Url) -> HashMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn ref_id(q: &HashMap<String, String>) -> u32 {
    q.get("ref_id").and_then(|r| r.parse().ok()).unwrap_or(0)
}

fn q_id(q: &HashMap<String, String>) -> u32 {
    q.get("q_id").and_then(|r| r.parse().ok()).unwrap_or(0)
}

fn value<'f>(fields: &'f [(String, String)], name: &str) -> Option<&'f str> {
    fields
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

// ========== 组装 ==========

pub fn credentials() -> Credentials {
    Credentials::new("default", USERNAME, PASSWORD)
}

/// 指向内存门户的配置，日志和失败文件写到 `dir`
pub fn config(dir: &Path) -> Config {
    Config {
        portal_base_url: BASE.to_string(),
        username: Some(USERNAME.to_string()),
        password: Some(PASSWORD.to_string()),
        backoff_base_ms: 0,
        backoff_max_ms: 0,
        output_log_file: dir.join("output.txt").to_string_lossy().into_owned(),
        failure_file: dir.join("failed_steps.txt").to_string_lossy().into_owned(),
        ..Config::default()
    }
}

pub fn manager() -> SessionManager {
    let config = Config {
        portal_base_url: BASE.to_string(),
        ..Config::default()
    };
    SessionManager::new(credentials(), SessionSettings::from_config(&config)).unwrap()
}

pub fn app(portal: &Arc<FakePortal>, config: Config, cancel: CancellationToken) -> App {
    app_with(portal, config, vec![credentials()], cancel)
}

/// 使用指定账号表
pub fn app_with(
    portal: &Arc<FakePortal>,
    config: Config,
    accounts: Vec<Credentials>,
    cancel: CancellationToken,
) -> App {
    let portal = portal.clone();
    App::with_transports(
        config,
        accounts,
        Arc::new(move |_: &Credentials| -> Result<Arc<dyn Transport>> {
            Ok(portal.transport())
        }),
        cancel,
    )
}

pub fn plan_file(text: &str) -> PlanFile {
    toml::from_str(text).unwrap()
}

pub fn init_logging() {
    ilias_tests::utils::logging::init(true);
}
