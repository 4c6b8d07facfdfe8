//! Add/edit forms
//!
//! Field specs are inferred from column metadata by [`infer_field_spec`],
//! then the configured overrides are merged on top. The same field list drives
//! rendering, validation, and the projection of submitted values onto the
//! columns that are written.

use crate::database::{DatabaseProvider, FieldValue, ResultRow};
use crate::error::ConfigError;
use crate::render::html::{escape, value_to_text};
use crate::schema::{ColumnDescriptor, TableColumns, TypeAffinity};
use crate::spec::CrudSpec;
use regex::Regex;
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Text,
    TextArea,
    Password,
    Select,
    Hidden,
}

impl InputType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "text" => Some(InputType::Text),
            "textarea" => Some(InputType::TextArea),
            "password" => Some(InputType::Password),
            "select" => Some(InputType::Select),
            "hidden" => Some(InputType::Hidden),
            _ => None,
        }
    }
}

/// Format check applied to non-empty submitted values
#[derive(Debug, Clone)]
pub enum FieldRule {
    Email,
    Integer,
    Number,
    Pattern(Regex),
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"))
}

impl FieldRule {
    /// `email`, `integer`, `number`, or else a regular expression
    pub fn parse(rule: &str) -> Result<Self, regex::Error> {
        Ok(match rule.to_ascii_lowercase().as_str() {
            "email" => FieldRule::Email,
            "integer" | "int" => FieldRule::Integer,
            "number" | "num" => FieldRule::Number,
            _ => FieldRule::Pattern(Regex::new(rule)?),
        })
    }

    pub fn check(&self, value: &str) -> bool {
        match self {
            FieldRule::Email => email_pattern().is_match(value),
            FieldRule::Integer => value.trim().parse::<i64>().is_ok(),
            FieldRule::Number => value.trim().parse::<f64>().is_ok_and(f64::is_finite),
            FieldRule::Pattern(pattern) => pattern.is_match(value),
        }
    }

    fn message(&self) -> &'static str {
        match self {
            FieldRule::Email => "must be a valid email address",
            FieldRule::Integer => "must be a whole number",
            FieldRule::Number => "must be a number",
            FieldRule::Pattern(_) => "is not in the expected format",
        }
    }
}

/// Everything needed to render and validate one form field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    pub input_type: InputType,
    pub required: bool,
    pub rule: Option<FieldRule>,
    /// Choices of a select widget
    pub options: Vec<String>,
    pub data_type: String,
    pub nullable: bool,
    pub affinity: TypeAffinity,
}

/// Field spec guessed from the column alone
pub fn infer_field_spec(column: &ColumnDescriptor) -> FieldSpec {
    let name = column.name.to_lowercase();
    let affinity = column.affinity();

    let rule = if name.contains("email") {
        Some(FieldRule::Email)
    } else {
        match affinity {
            TypeAffinity::Integer => Some(FieldRule::Integer),
            TypeAffinity::Real => Some(FieldRule::Number),
            _ => None,
        }
    };

    let (input_type, options) = if name.contains("password") || name.contains("passwd") {
        (InputType::Password, Vec::new())
    } else if let Some(values) = &column.enum_values {
        (InputType::Select, values.clone())
    } else if affinity == TypeAffinity::LongText {
        (InputType::TextArea, Vec::new())
    } else {
        (InputType::Text, Vec::new())
    };

    FieldSpec {
        name: column.name.clone(),
        label: column.name.clone(),
        input_type,
        required: !column.nullable,
        rule,
        options,
        data_type: column.data_type.clone(),
        nullable: column.nullable,
        affinity,
    }
}

/// Per-column form overrides of a `CrudSpec`, compiled once at setup
#[derive(Debug, Clone, Default)]
pub struct FormOverrides {
    rules: HashMap<String, FieldRule>,
    input_types: HashMap<String, InputType>,
}

impl FormOverrides {
    pub fn from_spec(spec: &CrudSpec) -> Result<Self, ConfigError> {
        let mut rules = HashMap::new();
        for (column, rule) in &spec.validation {
            let rule = FieldRule::parse(rule).map_err(|error| ConfigError::InvalidValidationRule {
                column: column.clone(),
                message: error.to_string(),
            })?;
            rules.insert(column.clone(), rule);
        }

        let mut input_types = HashMap::new();
        for (column, input_type) in &spec.input_types {
            let parsed = InputType::parse(input_type).ok_or_else(|| ConfigError::UnknownInputType {
                column: column.clone(),
                input_type: input_type.clone(),
            })?;
            input_types.insert(column.clone(), parsed);
        }

        Ok(Self { rules, input_types })
    }

    /// Fields of the add/edit form, in column order
    ///
    /// The editable set is `editable_columns`, else every column but the
    /// key, minus `not_editable_columns`. Binary columns are never part of
    /// it: the form only ever sees their size placeholder. Overrides are
    /// merged last.
    pub fn fields(&self, spec: &CrudSpec, columns: &TableColumns) -> Vec<FieldSpec> {
        let excluded: HashSet<&str> = spec.not_editable_columns.iter().map(String::as_str).collect();
        let required: HashSet<&str> = spec.required.iter().map(String::as_str).collect();

        let editable: Vec<&ColumnDescriptor> = match &spec.editable_columns {
            Some(names) => names.iter().filter_map(|name| columns.get(name)).collect(),
            None => columns
                .iter()
                .filter(|column| column.name != spec.key_column)
                .collect(),
        };

        editable
            .into_iter()
            .filter(|column| !excluded.contains(column.name.as_str()))
            .filter(|column| column.affinity() != TypeAffinity::Binary)
            .map(|column| {
                let mut field = infer_field_spec(column);
                let name = field.name.as_str();

                field.label = spec.label_for(name).into_owned();
                if required.contains(name) {
                    field.required = true;
                }
                if let Some(rule) = self.rules.get(name) {
                    field.rule = Some(rule.clone());
                }
                if let Some(values) = spec.acceptable_values.get(name) {
                    field.options = values.clone();
                    field.input_type = InputType::Select;
                }
                if let Some(input_type) = self.input_types.get(name) {
                    field.input_type = *input_type;
                }
                field
            })
            .collect()
    }
}

/// Read/write access to named form values
pub trait FieldValueSource {
    fn get(&self, name: &str) -> Option<&str>;

    fn set(&mut self, name: &str, value: String);
}

/// Form values of one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormParams {
    values: HashMap<String, String>,
}

impl FormParams {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    /// Values of a database row; NULL columns are left unset
    pub fn from_row(row: &ResultRow) -> Self {
        let values = row
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.to_string(), value_to_text(value)))
            .collect();
        Self { values }
    }
}

impl FieldValueSource for FormParams {
    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn set(&mut self, name: &str, value: String) {
        self.values.insert(name.to_string(), value);
    }
}

/// Values shown in the form
///
/// Per field, the first present of: stored record, resubmitted value,
/// configured default.
pub fn initial_values(
    fields: &[FieldSpec],
    record: Option<&dyn FieldValueSource>,
    submitted: Option<&dyn FieldValueSource>,
    defaults: &HashMap<String, String>,
) -> FormParams {
    let mut values = FormParams::default();
    for field in fields {
        let name = field.name.as_str();
        let value = record
            .and_then(|record| record.get(name))
            .or_else(|| submitted.and_then(|submitted| submitted.get(name)))
            .or_else(|| defaults.get(name).map(String::as_str));
        if let Some(value) = value {
            values.set(name, value.to_string());
        }
    }
    values
}

/// Field name → message
pub type ValidationErrors = BTreeMap<String, String>;

/// Check the submitted values and coerce them into typed column values
///
/// Only the listed fields are read; anything else in `submitted` is ignored.
pub fn validate(fields: &[FieldSpec], submitted: &dyn FieldValueSource) -> Result<Vec<FieldValue>, ValidationErrors> {
    let mut values = Vec::with_capacity(fields.len());
    let mut errors = ValidationErrors::new();

    for field in fields {
        let raw = submitted.get(&field.name).unwrap_or_default();

        if raw.is_empty() {
            if field.required {
                errors.insert(field.name.clone(), format!("{} is required", field.label));
                continue;
            }
            let value = if field.nullable {
                Value::Null
            } else {
                Value::String(String::new())
            };
            values.push(typed_field(field, value));
            continue;
        }

        if !field.options.is_empty() && !field.options.iter().any(|option| option == raw) {
            errors.insert(
                field.name.clone(),
                format!("{} must be one of the listed values", field.label),
            );
            continue;
        }

        if let Some(rule) = &field.rule {
            if !rule.check(raw) {
                errors.insert(field.name.clone(), format!("{} {}", field.label, rule.message()));
                continue;
            }
        }

        match coerce(field.affinity, raw) {
            Some(value) => values.push(typed_field(field, value)),
            None => {
                errors.insert(
                    field.name.clone(),
                    format!("{} is not a valid value for this column", field.label),
                );
            }
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

fn typed_field(field: &FieldSpec, value: Value) -> FieldValue {
    if field.data_type.is_empty() {
        FieldValue::new(field.name.clone(), value)
    } else {
        FieldValue::typed(field.name.clone(), value, field.data_type.clone())
    }
}

fn coerce(affinity: TypeAffinity, raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    match affinity {
        TypeAffinity::Integer => trimmed.parse::<i64>().ok().map(Value::from),
        TypeAffinity::Real => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        TypeAffinity::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "on" => Some(Value::Bool(true)),
            "0" | "false" | "f" | "no" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        TypeAffinity::Text | TypeAffinity::LongText => Some(Value::String(raw.to_string())),
        TypeAffinity::Binary => None,
    }
}

/// HTML form for the fields, with inline validation messages
pub fn render_form(
    fields: &[FieldSpec],
    values: &dyn FieldValueSource,
    errors: &ValidationErrors,
    action: &str,
    submit_label: &str,
) -> String {
    let mut html = format!("<form method=\"post\" action=\"{}\" class=\"crud\">\n", escape(action));

    for field in fields {
        let value = values.get(&field.name).unwrap_or_default();
        let name = escape(&field.name);

        if field.input_type == InputType::Hidden {
            html.push_str(&format!(
                "<input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
                name,
                escape(value)
            ));
            continue;
        }

        let id = format!("field_{}", name);
        let required = if field.required { " required" } else { "" };
        html.push_str(&format!(
            "<p class=\"field\"><label for=\"{}\">{}{}</label>\n",
            id,
            escape(&field.label),
            if field.required { " *" } else { "" }
        ));

        let widget = match field.input_type {
            InputType::TextArea => format!(
                "<textarea id=\"{}\" name=\"{}\"{}>{}</textarea>",
                id,
                name,
                required,
                escape(value)
            ),
            InputType::Select => {
                let mut select = format!("<select id=\"{}\" name=\"{}\"{}>", id, name, required);
                if !field.required {
                    select.push_str("<option value=\"\"></option>");
                }
                for option in &field.options {
                    select.push_str(&format!(
                        "<option value=\"{option}\"{selected}>{option}</option>",
                        option = escape(option),
                        selected = if option == value { " selected" } else { "" }
                    ));
                }
                select.push_str("</select>");
                select
            }
            InputType::Password | InputType::Text | InputType::Hidden => format!(
                "<input type=\"{}\" id=\"{}\" name=\"{}\" value=\"{}\"{}>",
                if field.input_type == InputType::Password { "password" } else { "text" },
                id,
                name,
                escape(value),
                required
            ),
        };
        html.push_str(&widget);

        if let Some(message) = errors.get(&field.name) {
            html.push_str(&format!(" <span class=\"error\">{}</span>", escape(message)));
        }
        html.push_str("</p>\n");
    }

    html.push_str(&format!(
        "<p><input type=\"submit\" value=\"{}\"></p>\n</form>\n",
        escape(submit_label)
    ));
    html
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    Create,
    Update,
}

/// What save hooks see and may change
#[derive(Debug, Clone)]
pub struct SaveContext {
    pub table: String,
    pub key_column: String,
    pub action: SaveAction,
    /// Key of the record being updated
    pub key: Option<Value>,
    /// Values about to be written; pre-save hooks may edit them
    pub fields: Vec<FieldValue>,
    /// Outcome of the write, set before post-save hooks run
    pub success: Option<bool>,
}

/// Run the hooks around an INSERT (no key) or UPDATE (keyed) of `fields`
///
/// A failed write is logged and reported as `false`, never as an error.
pub async fn save<DB: DatabaseProvider + ?Sized>(
    database: &DB,
    spec: &CrudSpec,
    key: Option<FieldValue>,
    fields: Vec<FieldValue>,
) -> bool {
    let mut context = SaveContext {
        table: spec.table.clone(),
        key_column: spec.key_column.clone(),
        action: if key.is_some() {
            SaveAction::Update
        } else {
            SaveAction::Create
        },
        key: key.as_ref().map(|key| key.value.clone()),
        fields,
        success: None,
    };

    for hook in &spec.pre_save_hooks {
        hook.call(&mut context);
    }

    let result = match &key {
        Some(key) => {
            database
                .update(&spec.table, std::slice::from_ref(key), &context.fields)
                .await
        }
        None => database.insert(&spec.table, &context.fields).await,
    };

    let success = match result {
        Ok(_) => true,
        Err(error) => {
            tracing::error!(table = %spec.table, action = ?context.action, %error, "write failed");
            false
        }
    };
    context.success = Some(success);

    for hook in &spec.post_save_hooks {
        hook.call(&mut context);
    }

    success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column;
    use serde_json::json;

    fn accounts() -> TableColumns {
        let mut mood = column("mood", 6, "mood", true);
        mood.enum_values = Some(vec!["happy".into(), "sad".into()]);
        TableColumns::new(vec![
            column("id", 1, "INTEGER", false),
            column("username", 2, "VARCHAR(32)", false),
            column("contact_email", 3, "VARCHAR(64)", true),
            column("passwd", 4, "VARCHAR(64)", false),
            column("bio", 5, "TEXT", true),
            mood,
            column("age", 7, "INTEGER", true),
            column("score", 8, "REAL", true),
        ])
    }

    fn params(pairs: &[(&str, &str)]) -> FormParams {
        FormParams::new(
            pairs
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_infer_field_spec() {
        let columns = accounts();
        let spec = |name: &str| infer_field_spec(columns.get(name).unwrap());

        let username = spec("username");
        assert!(username.required);
        assert_eq!(username.input_type, InputType::Text);
        assert!(username.rule.is_none());

        let email = spec("contact_email");
        assert!(!email.required);
        assert!(matches!(email.rule, Some(FieldRule::Email)));

        assert_eq!(spec("passwd").input_type, InputType::Password);
        assert_eq!(spec("bio").input_type, InputType::TextArea);

        let mood = spec("mood");
        assert_eq!(mood.input_type, InputType::Select);
        assert_eq!(mood.options, vec!["happy", "sad"]);

        assert!(matches!(spec("age").rule, Some(FieldRule::Integer)));
        assert!(matches!(spec("score").rule, Some(FieldRule::Number)));
    }

    #[test]
    fn test_overrides_win() {
        let mut spec = CrudSpec::new("/accounts", "accounts").label("bio", "About");
        spec.not_editable_columns = vec!["score".into()];
        spec.required = vec!["bio".into()];
        spec.validation.insert("username".into(), "^[a-z]+$".into());
        spec.input_types.insert("bio".into(), "text".into());
        spec.acceptable_values
            .insert("age".into(), vec!["18".into(), "21".into()]);

        let overrides = FormOverrides::from_spec(&spec).unwrap();
        let fields = overrides.fields(&spec, &accounts());

        let names: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["username", "contact_email", "passwd", "bio", "mood", "age"]
        );

        let bio = &fields[3];
        assert_eq!(bio.label, "About");
        assert!(bio.required);
        assert_eq!(bio.input_type, InputType::Text);

        assert!(matches!(&fields[0].rule, Some(FieldRule::Pattern(pattern)) if pattern.as_str() == "^[a-z]+$"));
        assert_eq!(fields[5].input_type, InputType::Select);
        assert_eq!(fields[5].options, vec!["18", "21"]);
    }

    #[test]
    fn test_binary_columns_are_not_editable() {
        let columns = TableColumns::new(vec![
            column("id", 1, "INTEGER", false),
            column("name", 2, "VARCHAR(32)", false),
            column("data", 3, "BLOB", true),
        ]);
        let mut spec = CrudSpec::new("/files", "files");
        let names = |spec: &CrudSpec| -> Vec<String> {
            FormOverrides::default()
                .fields(spec, &columns)
                .into_iter()
                .map(|field| field.name)
                .collect()
        };
        assert_eq!(names(&spec), vec!["name"]);

        spec.editable_columns = Some(vec!["name".into(), "data".into()]);
        assert_eq!(names(&spec), vec!["name"]);
    }

    #[test]
    fn test_editable_columns_override() {
        let mut spec = CrudSpec::new("/accounts", "accounts");
        spec.editable_columns = Some(vec!["age".into(), "username".into(), "ghost".into()]);
        let fields = FormOverrides::default().fields(&spec, &accounts());
        let names: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, vec!["age", "username"]);
    }

    #[test]
    fn test_bad_overrides_are_config_errors() {
        let mut spec = CrudSpec::new("/accounts", "accounts");
        spec.validation.insert("username".into(), "([unclosed".into());
        assert!(matches!(
            FormOverrides::from_spec(&spec),
            Err(ConfigError::InvalidValidationRule { .. })
        ));

        let mut spec = CrudSpec::new("/accounts", "accounts");
        spec.input_types.insert("bio".into(), "wysiwyg".into());
        assert!(matches!(
            FormOverrides::from_spec(&spec),
            Err(ConfigError::UnknownInputType { .. })
        ));
    }

    #[test]
    fn test_initial_value_precedence() {
        let spec = CrudSpec::new("/accounts", "accounts");
        let fields = FormOverrides::default().fields(&spec, &accounts());
        let record = params(&[("username", "stored")]);
        let submitted = params(&[("username", "typed"), ("bio", "typed bio")]);
        let defaults: HashMap<String, String> = [
            ("username".to_string(), "default".to_string()),
            ("bio".to_string(), "default bio".to_string()),
            ("age".to_string(), "30".to_string()),
        ]
        .into_iter()
        .collect();

        let values = initial_values(&fields, Some(&record), Some(&submitted), &defaults);
        assert_eq!(values.get("username"), Some("stored"));
        assert_eq!(values.get("bio"), Some("typed bio"));
        assert_eq!(values.get("age"), Some("30"));
        assert_eq!(values.get("score"), None);
    }

    #[test]
    fn test_validate_and_coerce() {
        let spec = CrudSpec::new("/accounts", "accounts");
        let fields = FormOverrides::default().fields(&spec, &accounts());

        let submitted = params(&[
            ("id", "99"),
            ("username", "sukria"),
            ("contact_email", ""),
            ("passwd", "X"),
            ("bio", "hello"),
            ("mood", "happy"),
            ("age", "42"),
            ("score", "1.5"),
            ("extraneous", "ignored"),
        ]);
        let values = validate(&fields, &submitted).unwrap();

        let by_name: HashMap<&str, &Value> =
            values.iter().map(|field| (field.column.as_str(), &field.value)).collect();
        assert_eq!(by_name.len(), 7);
        assert_eq!(by_name["username"], &json!("sukria"));
        assert_eq!(by_name["contact_email"], &Value::Null);
        assert_eq!(by_name["age"], &json!(42));
        assert_eq!(by_name["score"], &json!(1.5));
        assert!(!by_name.contains_key("id"));
        assert!(!by_name.contains_key("extraneous"));
        assert_eq!(values[0].data_type.as_deref(), Some("VARCHAR(32)"));
    }

    #[test]
    fn test_validation_messages() {
        let spec = CrudSpec::new("/accounts", "accounts");
        let fields = FormOverrides::default().fields(&spec, &accounts());

        let submitted = params(&[
            ("username", ""),
            ("contact_email", "not-an-email"),
            ("passwd", "X"),
            ("mood", "angry"),
            ("age", "forty"),
        ]);
        let errors = validate(&fields, &submitted).unwrap_err();

        assert_eq!(errors["username"], "username is required");
        assert_eq!(errors["contact_email"], "contact_email must be a valid email address");
        assert_eq!(errors["mood"], "mood must be one of the listed values");
        assert_eq!(errors["age"], "age must be a whole number");
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_render_form() {
        let spec = CrudSpec::new("/accounts", "accounts");
        let mut spec = spec;
        spec.input_types.insert("age".into(), "hidden".into());
        let overrides = FormOverrides::from_spec(&spec).unwrap();
        let fields = overrides.fields(&spec, &accounts());

        let values = params(&[("username", "<sukria>"), ("mood", "sad"), ("bio", "a & b"), ("age", "3")]);
        let mut errors = ValidationErrors::new();
        errors.insert("passwd".into(), "passwd is required".into());

        let html = render_form(&fields, &values, &errors, "/accounts/add", "Save");

        assert!(html.contains("action=\"/accounts/add\""));
        assert!(html.contains("name=\"username\" value=\"&lt;sukria&gt;\" required>"));
        assert!(html.contains("<input type=\"password\" id=\"field_passwd\""));
        assert!(html.contains("<span class=\"error\">passwd is required</span>"));
        assert!(html.contains("<textarea id=\"field_bio\" name=\"bio\">a &amp; b</textarea>"));
        assert!(html.contains("<option value=\"sad\" selected>sad</option>"));
        assert!(html.contains("<input type=\"hidden\" name=\"age\" value=\"3\">"));
    }

    #[test]
    fn test_rules() {
        assert!(FieldRule::Email.check("sukria@example.org"));
        assert!(!FieldRule::Email.check("sukria@"));
        assert!(FieldRule::Integer.check("-7"));
        assert!(!FieldRule::Integer.check("7.5"));
        assert!(FieldRule::Number.check("7.5"));
        assert!(!FieldRule::Number.check("NaN"));
        assert!(FieldRule::parse("^\\d{3}$").unwrap().check("123"));
    }
}
