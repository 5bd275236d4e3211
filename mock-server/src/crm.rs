//! In-memory SuiteCRM state and the method handlers that act on it.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Map, Value};
use uuid::Uuid;

/// `21232f297a57a5a743894a0e4a801fc3` is MD5("admin").
pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD_MD5: &str = "21232f297a57a5a743894a0e4a801fc3";

/// Modules the mock knows about, with the fields `get_module_fields` reports.
const MODULES: &[(&str, &[&str])] = &[
    ("Accounts", &["id", "name", "industry", "date_entered", "date_modified"]),
    ("Contacts", &["id", "first_name", "last_name", "email1", "date_entered", "date_modified"]),
    ("Leads", &["id", "first_name", "last_name", "status", "date_entered", "date_modified"]),
    ("Notes", &["id", "name", "filename", "parent_type", "parent_id", "date_entered", "date_modified"]),
];

/// `(module, link)` to the module on the other side.
const LINKS: &[(&str, &str, &str)] = &[
    ("Accounts", "contacts", "Contacts"),
    ("Accounts", "notes", "Notes"),
    ("Contacts", "accounts", "Accounts"),
    ("Contacts", "notes", "Notes"),
];

const TEMPLATE_MODULE: &str = "AOS_PDF_Templates";

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone)]
struct Attachment {
    filename: String,
    file: String,
}

/// Everything the mock server remembers.
#[derive(Debug)]
pub struct Crm {
    username: String,
    password_md5: String,
    sessions: HashSet<String>,
    records: HashMap<String, Vec<Fields>>,
    links: HashMap<(String, String, String), Vec<String>>,
    attachments: HashMap<String, Attachment>,
    templates: HashMap<String, String>,
    calls: Vec<String>,
}

impl Default for Crm {
    fn default() -> Self {
        Self::new(DEFAULT_USERNAME, DEFAULT_PASSWORD_MD5)
    }
}

fn error(number: i64, name: &str, description: &str) -> Value {
    json!({"name": name, "description": description, "number": number})
}

fn invalid_session() -> Value {
    error(11, "Invalid Session ID", "The session ID is invalid")
}

fn module_missing() -> Value {
    error(20, "Module Does Not Exist", "This module is not available on this server")
}

fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Numbers arrive as JSON numbers, numeric strings, or `""` for "unset".
fn number_arg(args: &Value, key: &str) -> Option<usize> {
    match args.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_list(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn name_value_list(fields: &Fields, select: &[String]) -> Value {
    Value::Object(
        fields
            .iter()
            .filter(|(name, _)| select.is_empty() || select.contains(*name))
            .map(|(name, value)| (name.clone(), json!({"name": name, "value": value})))
            .collect(),
    )
}

fn now() -> String {
    // Fixed clock; tests compare server-assigned values.
    "2024-01-01 00:00:00".to_string()
}

impl Crm {
    pub fn new(username: &str, password_md5: &str) -> Self {
        Self {
            username: username.to_string(),
            password_md5: password_md5.to_string(),
            sessions: HashSet::new(),
            records: HashMap::new(),
            links: HashMap::new(),
            attachments: HashMap::new(),
            templates: HashMap::new(),
            calls: Vec::new(),
        }
    }

    /// Every method called so far, in order.
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.iter().filter(|m| *m == method).count()
    }

    /// Invalidate all sessions, as the server does after inactivity.
    pub fn expire_sessions(&mut self) {
        self.sessions.clear();
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Store a record directly and return its id.
    pub fn seed(&mut self, module: &str, fields: Value) -> String {
        let mut stored = fields.as_object().cloned().unwrap_or_default();
        let id = match stored.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        stored.insert("id".into(), json!(id));
        self.records.entry(module.to_string()).or_default().push(stored);
        id
    }

    /// Register a PDF template body; `{field}` placeholders are filled on render.
    pub fn add_template(&mut self, id: &str, body: &str) {
        self.templates.insert(id.to_string(), body.to_string());
    }

    pub fn handle(&mut self, method: &str, args: &Value) -> Value {
        self.calls.push(method.to_string());
        if method == "login" {
            return self.login(args);
        }
        if !self.sessions.contains(str_arg(args, "session")) {
            return invalid_session();
        }
        match method {
            "logout" => self.logout(args),
            "get_entry" => self.get_entry(args),
            "get_entry_list" => self.get_entry_list(args),
            "set_entry" => self.set_entry(args),
            "set_relationship" => self.set_relationship(args),
            "get_relationships" => self.get_relationships(args),
            "get_note_attachment" => self.get_note_attachment(args),
            "set_note_attachment" => self.set_note_attachment(args),
            "get_available_modules" => self.get_available_modules(),
            "get_module_fields" => self.get_module_fields(args),
            "get_pdf_template" => self.get_pdf_template(args),
            _ => error(1000, "Invalid Call", "The call was invalid"),
        }
    }

    fn login(&mut self, args: &Value) -> Value {
        let auth = args.get("user_auth").unwrap_or(&Value::Null);
        if str_arg(auth, "user_name") != self.username || str_arg(auth, "password") != self.password_md5 {
            return error(
                10,
                "Invalid Login",
                "Login attempt failed please check the username and password",
            );
        }
        let id = Uuid::new_v4().simple().to_string();
        self.sessions.insert(id.clone());
        json!({
            "id": id,
            "module_name": "Users",
            "name_value_list": {
                "user_id": {"name": "user_id", "value": "1"},
                "user_name": {"name": "user_name", "value": self.username},
            }
        })
    }

    fn logout(&mut self, args: &Value) -> Value {
        self.sessions.remove(str_arg(args, "session"));
        Value::Null
    }

    fn find(&self, module: &str, id: &str) -> Option<&Fields> {
        self.records
            .get(module)?
            .iter()
            .find(|fields| fields.get("id").and_then(Value::as_str) == Some(id))
    }

    fn related_ids(&self, module: &str, id: &str, link: &str) -> &[String] {
        self.links
            .get(&(module.to_string(), id.to_string(), link.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn link_target(module: &str, link: &str) -> Option<&'static str> {
        LINKS
            .iter()
            .find(|(m, l, _)| *m == module && *l == link)
            .map(|(_, _, target)| *target)
    }

    fn is_module(module: &str) -> bool {
        MODULES.iter().any(|(name, _)| *name == module)
    }

    fn entry(&self, module: &str, fields: &Fields, select: &[String]) -> Value {
        json!({
            "id": fields.get("id").cloned().unwrap_or(Value::Null),
            "module_name": module,
            "name_value_list": name_value_list(fields, select),
        })
    }

    /// The `{link_list: [...]}` element for one entry.
    fn link_list(&self, module: &str, fields: &Fields, links: &Value) -> Value {
        let id = fields.get("id").and_then(Value::as_str).unwrap_or("");
        let requested = links.as_array().map(Vec::as_slice).unwrap_or(&[]);
        let link_list: Vec<Value> = requested
            .iter()
            .filter_map(|link| {
                let name = link.get("name")?.as_str()?;
                let target = Self::link_target(module, name)?;
                let select = string_list(link, "value");
                let records: Vec<Value> = self
                    .related_ids(module, id, name)
                    .iter()
                    .filter_map(|related| self.find(target, related))
                    .map(|related| json!({"link_value": name_value_list(related, &select)}))
                    .collect();
                Some(json!({"name": name, "records": records}))
            })
            .collect();
        json!({"link_list": link_list})
    }

    fn get_entry(&self, args: &Value) -> Value {
        let module = str_arg(args, "module_name");
        if !Self::is_module(module) {
            return module_missing();
        }
        let select = string_list(args, "select_fields");
        let links = args.get("link_name_to_fields_array").unwrap_or(&Value::Null);
        match self.find(module, str_arg(args, "id")) {
            Some(fields) => json!({
                "entry_list": [self.entry(module, fields, &select)],
                "relationship_list": [self.link_list(module, fields, links)],
            }),
            None => json!({"entry_list": [], "relationship_list": []}),
        }
    }

    fn get_entry_list(&self, args: &Value) -> Value {
        let module = str_arg(args, "module_name");
        if !Self::is_module(module) {
            return module_missing();
        }
        let filter = parse_equality(str_arg(args, "query"));
        let matching: Vec<&Fields> = self
            .records
            .get(module)
            .map(|records| {
                records
                    .iter()
                    .filter(|fields| match &filter {
                        Some((field, value)) => {
                            fields.get(field).and_then(Value::as_str) == Some(value.as_str())
                        }
                        None => true,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total = matching.len();
        let offset = number_arg(args, "offset").unwrap_or(0).min(total);
        let limit = number_arg(args, "max_results").filter(|n| *n > 0).unwrap_or(20);
        let page = &matching[offset..offset.saturating_add(limit).min(total)];

        let select = string_list(args, "select_fields");
        let links = args.get("link_name_to_fields_array").unwrap_or(&Value::Null);
        let entry_list: Vec<Value> = page.iter().map(|f| self.entry(module, f, &select)).collect();
        let relationship_list: Vec<Value> =
            page.iter().map(|f| self.link_list(module, f, links)).collect();

        json!({
            "result_count": page.len(),
            "total_count": total.to_string(),
            "next_offset": offset + page.len(),
            "entry_list": entry_list,
            "relationship_list": relationship_list,
        })
    }

    fn set_entry(&mut self, args: &Value) -> Value {
        let module = str_arg(args, "module_name").to_string();
        if !Self::is_module(&module) {
            return module_missing();
        }
        let mut incoming = Fields::new();
        if let Some(items) = args.get("name_value_list").and_then(Value::as_array) {
            for item in items {
                if let Some(name) = item.get("name").and_then(Value::as_str) {
                    incoming.insert(name.to_string(), item.get("value").cloned().unwrap_or(Value::Null));
                }
            }
        }

        let id = incoming.get("id").and_then(Value::as_str).unwrap_or("").to_string();
        let records = self.records.entry(module).or_default();
        let position = records
            .iter()
            .position(|fields| !id.is_empty() && fields.get("id").and_then(Value::as_str) == Some(id.as_str()));
        let stored = match position {
            Some(index) => {
                let existing = &mut records[index];
                existing.extend(incoming);
                existing.insert("date_modified".into(), json!(now()));
                existing.clone()
            }
            None => {
                let mut created = Fields::new();
                let id = if id.is_empty() { Uuid::new_v4().to_string() } else { id };
                created.insert("id".into(), json!(id));
                created.extend(incoming.into_iter().filter(|(k, _)| k != "id"));
                created.insert("date_entered".into(), json!(now()));
                created.insert("date_modified".into(), json!(now()));
                records.push(created.clone());
                created
            }
        };

        json!({
            "id": stored.get("id").cloned().unwrap_or(Value::Null),
            "entry_list": name_value_list(&stored, &[]),
        })
    }

    fn set_relationship(&mut self, args: &Value) -> Value {
        let module = str_arg(args, "module_name").to_string();
        let id = str_arg(args, "module_id").to_string();
        let link = str_arg(args, "link_field_name").to_string();
        let Some(target) = Self::link_target(&module, &link) else {
            return error(31, "Relationship Not Supported", "This type of relationship is not supported");
        };
        if self.find(&module, &id).is_none() {
            return json!({"created": 0, "failed": 1, "deleted": 0});
        }
        let delete = number_arg(args, "delete").unwrap_or(0) == 1;

        let (mut created, mut failed, mut deleted) = (0, 0, 0);
        for related in string_list(args, "related_ids") {
            if self.find(target, &related).is_none() {
                failed += 1;
                continue;
            }
            let ids = self.links.entry((module.clone(), id.clone(), link.clone())).or_default();
            if delete {
                let before = ids.len();
                ids.retain(|existing| *existing != related);
                deleted += before - ids.len();
            } else if !ids.contains(&related) {
                ids.push(related);
                created += 1;
            }
        }
        json!({"created": created, "failed": failed, "deleted": deleted})
    }

    fn get_relationships(&self, args: &Value) -> Value {
        let module = str_arg(args, "module_name");
        let id = str_arg(args, "module_id");
        let link = str_arg(args, "link_field_name");
        let Some(target) = Self::link_target(module, link) else {
            return error(31, "Relationship Not Supported", "This type of relationship is not supported");
        };
        let select = string_list(args, "related_fields");
        let entry_list: Vec<Value> = self
            .related_ids(module, id, link)
            .iter()
            .filter_map(|related| self.find(target, related))
            .map(|fields| self.entry(target, fields, &select))
            .collect();
        json!({"entry_list": entry_list, "relationship_list": []})
    }

    fn set_note_attachment(&mut self, args: &Value) -> Value {
        let note = args.get("note").unwrap_or(&Value::Null);
        let id = str_arg(note, "id").to_string();
        let filename = str_arg(note, "filename").to_string();
        let Some(fields) = self
            .records
            .get_mut("Notes")
            .and_then(|notes| notes.iter_mut().find(|f| f.get("id").and_then(Value::as_str) == Some(id.as_str())))
        else {
            return error(51, "No Records", "No records were found");
        };
        fields.insert("filename".into(), json!(filename));
        self.attachments.insert(
            id.clone(),
            Attachment {
                filename,
                file: str_arg(note, "file").to_string(),
            },
        );
        json!({"id": id})
    }

    fn get_note_attachment(&self, args: &Value) -> Value {
        let id = str_arg(args, "id");
        let (Some(note), Some(attachment)) = (self.find("Notes", id), self.attachments.get(id)) else {
            return error(21, "File Does Not Exist", "The file does not exist");
        };
        json!({
            "note_attachment": {
                "id": id,
                "filename": attachment.filename,
                "file": attachment.file,
                "related_module_id": note.get("parent_id").cloned().unwrap_or(json!("")),
                "related_module_name": note.get("parent_type").cloned().unwrap_or(json!("")),
            }
        })
    }

    fn get_available_modules(&self) -> Value {
        let modules: Vec<Value> = MODULES
            .iter()
            .map(|(name, _)| json!({"module_key": name, "module_label": name, "favorite_enabled": false, "acls": []}))
            .collect();
        json!({"modules": modules})
    }

    fn get_module_fields(&self, args: &Value) -> Value {
        let module = str_arg(args, "module_name");
        let Some((_, fields)) = MODULES.iter().find(|(name, _)| *name == module) else {
            return module_missing();
        };
        let wanted = string_list(args, "fields");
        let module_fields: Map<String, Value> = fields
            .iter()
            .filter(|field| wanted.is_empty() || wanted.iter().any(|w| w == **field))
            .map(|field| {
                (
                    field.to_string(),
                    json!({"name": field, "type": "varchar", "label": field, "required": 0, "options": []}),
                )
            })
            .collect();
        let link_fields: Map<String, Value> = LINKS
            .iter()
            .filter(|(m, _, _)| *m == module)
            .map(|(_, link, target)| (link.to_string(), json!({"name": link, "module": target})))
            .collect();
        json!({
            "module_name": module,
            "table_name": module.to_lowercase(),
            "module_fields": module_fields,
            "link_fields": link_fields,
        })
    }

    fn get_pdf_template(&self, args: &Value) -> Value {
        let Some(body) = self.templates.get(str_arg(args, "template_id")) else {
            return error(51, "No Records", "No records were found");
        };
        let module = str_arg(args, "bean_module");
        let Some(fields) = self.find(module, str_arg(args, "bean_id")) else {
            return error(51, "No Records", "No records were found");
        };
        let mut html = body.clone();
        for (name, value) in fields {
            html = html.replace(&format!("{{{name}}}"), value.as_str().unwrap_or(""));
        }
        json!({"module_name": TEMPLATE_MODULE, "bean_module": module, "html": html})
    }
}

/// Understands `field = 'value'`, optionally table-qualified.
fn parse_equality(query: &str) -> Option<(String, String)> {
    let (field, value) = query.split_once('=')?;
    let field = field.trim();
    let field = field.rsplit_once('.').map(|(_, f)| f).unwrap_or(field);
    let value = value.trim().trim_matches('\'');
    Some((field.to_string(), value.to_string()))
}
