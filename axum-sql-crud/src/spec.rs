//! Declarative configuration for one set of CRUD screens.
//!
//! A `CrudSpec` can be deserialized from JSON (or any serde format) for the
//! declarative parts; callbacks (custom column transforms, dynamic filters,
//! save hooks) are attached with the builder methods.

use crate::auth::AuthConfig;
use crate::database::ResultRow;
use crate::error::ConfigError;
use crate::form::SaveContext;
use axum::http::request::Parts;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Callback computing the HTML of a custom column cell from the raw value and the full row
#[derive(Clone)]
pub struct CellTransform(Arc<dyn Fn(&Value, &ResultRow) -> String + Send + Sync>);

impl CellTransform {
    pub fn new(transform: impl Fn(&Value, &ResultRow) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(transform))
    }

    pub fn apply(&self, value: &Value, row: &ResultRow) -> String {
        (self.0)(value, row)
    }
}

impl fmt::Debug for CellTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CellTransform(..)")
    }
}

/// Callback producing column = value restrictions from the current request
#[derive(Clone)]
pub struct DynamicFilter(Arc<dyn Fn(&Parts) -> BTreeMap<String, Value> + Send + Sync>);

impl fmt::Debug for DynamicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DynamicFilter(..)")
    }
}

/// Callback run before or after a record is written
#[derive(Clone)]
pub struct SaveHook(Arc<dyn Fn(&mut SaveContext) + Send + Sync>);

impl SaveHook {
    pub fn new(hook: impl Fn(&mut SaveContext) + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }

    pub fn call(&self, context: &mut SaveContext) {
        (self.0)(context)
    }
}

impl fmt::Debug for SaveHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SaveHook(..)")
    }
}

/// A computed column appended to the list view
#[derive(Clone, Debug, Deserialize)]
pub struct CustomColumn {
    /// Output name, also the header and the sort key
    pub name: String,

    /// Column selected for this cell, `column` or `table.column`
    pub source_column: String,

    /// Cell renderer; without one the raw value is shown
    #[serde(skip)]
    pub transform: Option<CellTransform>,

    /// CSS class for the cells of this column
    #[serde(default)]
    pub column_class: Option<String>,
}

impl CustomColumn {
    pub fn new(name: impl Into<String>, source_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_column: source_column.into(),
            transform: None,
            column_class: None,
        }
    }

    /// Render cells with `transform(value, row)`
    ///
    /// `row` is keyed by output alias. A displayed foreign key column holds
    /// its label under its header alias, and its raw value under
    /// `<column>_key` (e.g. `group_id_key`).
    pub fn transform(
        mut self,
        transform: impl Fn(&Value, &ResultRow) -> String + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(CellTransform::new(transform));
        self
    }

    pub fn column_class(mut self, class: impl Into<String>) -> Self {
        self.column_class = Some(class.into());
        self
    }
}

/// Related table whose label replaces a foreign key's raw id
#[derive(Clone, Debug, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    pub label_column: String,
}

impl ForeignKey {
    pub fn new(table: impl Into<String>, key_column: impl Into<String>, label_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_column: key_column.into(),
            label_column: label_column.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
}

impl JoinKind {
    pub fn sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// Extra table joined into the list query
#[derive(Clone, Debug, Deserialize)]
pub struct TableJoin {
    pub table: String,
    #[serde(default)]
    pub join_kind: JoinKind,
    pub selected_columns: Vec<String>,
    /// Column of the base table
    pub local_key: String,
    /// Column of the joined table
    pub remote_key: String,
}

/// Row restriction applied to every query
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum WhereFilter {
    /// Column = value equalities; `null` means IS NULL, an array means IN
    Static(BTreeMap<String, Value>),
    #[serde(skip)]
    Dynamic(DynamicFilter),
}

impl Default for WhereFilter {
    fn default() -> Self {
        WhereFilter::Static(BTreeMap::new())
    }
}

impl WhereFilter {
    pub fn dynamic(filter: impl Fn(&Parts) -> BTreeMap<String, Value> + Send + Sync + 'static) -> Self {
        WhereFilter::Dynamic(DynamicFilter(Arc::new(filter)))
    }

    /// Evaluate the filter for one request
    pub fn resolve(&self, parts: &Parts) -> Cow<'_, BTreeMap<String, Value>> {
        match self {
            WhereFilter::Static(filter) => Cow::Borrowed(filter),
            WhereFilter::Dynamic(filter) => Cow::Owned((filter.0)(parts)),
        }
    }
}

fn default_key_column() -> String {
    "id".to_string()
}

fn default_record_title() -> String {
    "record".to_string()
}

fn default_true() -> bool {
    true
}

/// Configuration of one CRUD endpoint set
#[derive(Clone, Debug, Deserialize)]
pub struct CrudSpec {
    /// URL path root, e.g. `/users`
    pub prefix: String,
    pub table: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Name of one record in titles and messages
    #[serde(default = "default_record_title")]
    pub record_title: String,

    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub addable: bool,
    #[serde(default)]
    pub deletable: bool,
    #[serde(default = "default_true")]
    pub sortable: bool,
    #[serde(default = "default_true")]
    pub searchable: bool,
    #[serde(default)]
    pub downloadable: bool,

    /// Columns shown in the list, in order; all columns when absent
    #[serde(default)]
    pub display_columns: Option<Vec<String>>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub prettify_headers: bool,
    #[serde(default)]
    pub custom_columns: Vec<CustomColumn>,
    #[serde(default)]
    pub column_classes: HashMap<String, String>,
    #[serde(default)]
    pub foreign_keys: HashMap<String, ForeignKey>,
    #[serde(default)]
    pub joins: Vec<TableJoin>,
    #[serde(default, rename = "where")]
    pub where_filter: WhereFilter,

    #[serde(default)]
    pub editable_columns: Option<Vec<String>>,
    #[serde(default)]
    pub not_editable_columns: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
    /// Column → `email`, `integer`, `number` or a regular expression
    #[serde(default)]
    pub validation: HashMap<String, String>,
    #[serde(default)]
    pub acceptable_values: HashMap<String, Vec<String>>,
    /// Column → `text`, `textarea`, `password`, `select` or `hidden`
    #[serde(default)]
    pub input_types: HashMap<String, String>,
    #[serde(default)]
    pub default_values: HashMap<String, String>,

    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub paginate_size: Option<u64>,
    #[serde(default)]
    pub table_css_class: Option<String>,
    /// Template handed to the `TemplateRenderer`; the built-in layout is used when absent
    #[serde(default)]
    pub template: Option<String>,

    #[serde(skip)]
    pub pre_save_hooks: Vec<SaveHook>,
    #[serde(skip)]
    pub post_save_hooks: Vec<SaveHook>,
}

impl CrudSpec {
    pub fn new(prefix: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            table: table.into(),
            key_column: default_key_column(),
            record_title: default_record_title(),
            editable: false,
            addable: false,
            deletable: false,
            sortable: true,
            searchable: true,
            downloadable: false,
            display_columns: None,
            labels: HashMap::new(),
            prettify_headers: false,
            custom_columns: Vec::new(),
            column_classes: HashMap::new(),
            foreign_keys: HashMap::new(),
            joins: Vec::new(),
            where_filter: WhereFilter::default(),
            editable_columns: None,
            not_editable_columns: Vec::new(),
            required: Vec::new(),
            validation: HashMap::new(),
            acceptable_values: HashMap::new(),
            input_types: HashMap::new(),
            default_values: HashMap::new(),
            auth: AuthConfig::default(),
            paginate_size: None,
            table_css_class: None,
            template: None,
            pre_save_hooks: Vec::new(),
            post_save_hooks: Vec::new(),
        }
    }

    pub fn key_column(mut self, key_column: impl Into<String>) -> Self {
        self.key_column = key_column.into();
        self
    }

    pub fn record_title(mut self, title: impl Into<String>) -> Self {
        self.record_title = title.into();
        self
    }

    pub fn editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn addable(mut self, addable: bool) -> Self {
        self.addable = addable;
        self
    }

    pub fn deletable(mut self, deletable: bool) -> Self {
        self.deletable = deletable;
        self
    }

    pub fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    pub fn downloadable(mut self, downloadable: bool) -> Self {
        self.downloadable = downloadable;
        self
    }

    pub fn paginate(mut self, size: u64) -> Self {
        self.paginate_size = Some(size);
        self
    }

    pub fn display_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.display_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn label(mut self, column: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(column.into(), label.into());
        self
    }

    pub fn custom_column(mut self, column: CustomColumn) -> Self {
        self.custom_columns.push(column);
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.insert(column.into(), foreign_key);
        self
    }

    pub fn join(mut self, join: TableJoin) -> Self {
        self.joins.push(join);
        self
    }

    pub fn where_filter(mut self, filter: WhereFilter) -> Self {
        self.where_filter = filter;
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn pre_save(mut self, hook: impl Fn(&mut SaveContext) + Send + Sync + 'static) -> Self {
        self.pre_save_hooks.push(SaveHook::new(hook));
        self
    }

    pub fn post_save(mut self, hook: impl Fn(&mut SaveContext) + Send + Sync + 'static) -> Self {
        self.post_save_hooks.push(SaveHook::new(hook));
        self
    }

    /// Display label of a column: explicit label, prettified name, or the raw name
    pub fn label_for<'a>(&'a self, column: &'a str) -> Cow<'a, str> {
        if let Some(label) = self.labels.get(column) {
            return Cow::Borrowed(label);
        }
        if self.prettify_headers {
            return Cow::Owned(prettify(column));
        }
        Cow::Borrowed(column)
    }

    /// Check every identifier and value that will reach SQL or routing
    /// Whether the list query has `table` in its FROM clause
    ///
    /// Foreign key tables are only joined while their column is displayed.
    fn selects_from(&self, table: &str) -> bool {
        table == self.table
            || self.joins.iter().any(|join| join.table == table)
            || self.foreign_keys.iter().any(|(column, foreign_key)| {
                foreign_key.table == table
                    && self
                        .display_columns
                        .as_ref()
                        .is_none_or(|displayed| displayed.contains(column))
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::MissingField("prefix"));
        }
        if self.table.is_empty() {
            return Err(ConfigError::MissingField("table"));
        }
        if !prefix_pattern().is_match(&self.prefix) {
            return Err(ConfigError::InvalidPrefix(self.prefix.clone()));
        }

        check_identifier("table", &self.table)?;
        check_identifier("key_column", &self.key_column)?;

        for column in self.display_columns.iter().flatten() {
            check_identifier("display_columns", column)?;
        }

        for (column, foreign_key) in &self.foreign_keys {
            check_identifier("foreign_keys", column)?;
            check_identifier("foreign_keys.table", &foreign_key.table)?;
            check_identifier("foreign_keys.key_column", &foreign_key.key_column)?;
            check_identifier("foreign_keys.label_column", &foreign_key.label_column)?;
        }

        for join in &self.joins {
            check_identifier("joins.table", &join.table)?;
            check_identifier("joins.local_key", &join.local_key)?;
            check_identifier("joins.remote_key", &join.remote_key)?;
            if join.selected_columns.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "joins.selected_columns",
                    message: format!("join on '{}' selects no columns", join.table),
                });
            }
            for column in &join.selected_columns {
                check_identifier("joins.selected_columns", column)?;
            }
        }

        for custom in &self.custom_columns {
            check_identifier("custom_columns.name", &custom.name)?;
            if !qualified_identifier_pattern().is_match(&custom.source_column) {
                return Err(ConfigError::InvalidIdentifier {
                    context: "custom_columns.source_column".into(),
                    value: custom.source_column.clone(),
                });
            }
            if let Some((table, _)) = custom.source_column.split_once('.') {
                if !self.selects_from(table) {
                    return Err(ConfigError::InvalidValue {
                        field: "custom_columns.source_column",
                        message: format!(
                            "'{}' reads from table '{}', which is neither '{}' nor joined",
                            custom.source_column, table, self.table
                        ),
                    });
                }
            }
        }

        if let WhereFilter::Static(filter) = &self.where_filter {
            for column in filter.keys() {
                check_identifier("where", column)?;
            }
        }

        let form_columns = self
            .editable_columns
            .iter()
            .flatten()
            .chain(&self.not_editable_columns)
            .chain(&self.required)
            .chain(self.validation.keys())
            .chain(self.acceptable_values.keys())
            .chain(self.input_types.keys())
            .chain(self.default_values.keys());
        for column in form_columns {
            check_identifier("form column", column)?;
        }

        if self.paginate_size == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "paginate_size",
                message: "must be at least 1".into(),
            });
        }

        Ok(())
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid identifier pattern"))
}

fn qualified_identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)?$").expect("valid qualified identifier pattern")
    })
}

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(/[A-Za-z0-9_.~-]+)+$").expect("valid prefix pattern"))
}

/// Whether `value` is safe to interpolate as a (quoted) identifier
pub fn is_safe_identifier(value: &str) -> bool {
    identifier_pattern().is_match(value)
}

fn check_identifier(context: &str, value: &str) -> Result<(), ConfigError> {
    if is_safe_identifier(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier {
            context: context.to_string(),
            value: value.to_string(),
        })
    }
}

/// `first_name` → `First Name`
pub fn prettify(column: &str) -> String {
    column
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_with_defaults() {
        let spec: CrudSpec = serde_json::from_value(json!({
            "prefix": "/users",
            "table": "users",
            "editable": true,
            "labels": { "username": "Login" },
            "foreign_keys": { "group_id": { "table": "groups", "label_column": "name" } },
            "joins": [{
                "table": "profiles",
                "join_kind": "inner",
                "selected_columns": ["bio"],
                "local_key": "id",
                "remote_key": "user_id"
            }],
            "where": { "active": 1 },
            "paginate_size": 5
        }))
        .unwrap();

        assert_eq!(spec.key_column, "id");
        assert!(spec.editable);
        assert!(spec.sortable);
        assert!(!spec.deletable);
        assert_eq!(spec.foreign_keys["group_id"].key_column, "id");
        assert_eq!(spec.joins[0].join_kind, JoinKind::Inner);
        assert!(matches!(&spec.where_filter, WhereFilter::Static(filter) if filter["active"] == json!(1)));
        assert_eq!(spec.paginate_size, Some(5));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let spec = CrudSpec::new("/users", "users; DROP TABLE users");
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::InvalidIdentifier { ref context, .. }) if context == "table"
        ));

        let spec = CrudSpec::new("/users", "users").key_column("id\"");
        assert!(spec.validate().is_err());

        let spec = CrudSpec::new("/users", "users")
            .custom_column(CustomColumn::new("shout", "upper(username)"));
        assert!(spec.validate().is_err());

        let spec = CrudSpec::new("/users", "users")
            .custom_column(CustomColumn::new("own_name", "users.username"));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_custom_column_source_must_be_selected() {
        let unjoined = CrudSpec::new("/users", "users")
            .custom_column(CustomColumn::new("owner", "groups.name"));
        assert!(matches!(
            unjoined.validate(),
            Err(ConfigError::InvalidValue { field: "custom_columns.source_column", .. })
        ));

        let through_foreign_key = CrudSpec::new("/users", "users")
            .foreign_key("group_id", ForeignKey::new("groups", "id", "name"))
            .custom_column(CustomColumn::new("owner", "groups.name"));
        assert!(through_foreign_key.validate().is_ok());

        // The foreign key table is only joined while its column is displayed
        let hidden = through_foreign_key.display_columns(["id", "username"]);
        assert!(hidden.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_prefix_and_page_size() {
        assert!(matches!(
            CrudSpec::new("users", "users").validate(),
            Err(ConfigError::InvalidPrefix(_))
        ));
        assert!(matches!(
            CrudSpec::new("/", "users").validate(),
            Err(ConfigError::InvalidPrefix(_))
        ));
        assert!(CrudSpec::new("/admin/users", "users").validate().is_ok());
        assert!(matches!(
            CrudSpec::new("/users", "users").paginate(0).validate(),
            Err(ConfigError::InvalidValue { field: "paginate_size", .. })
        ));
    }

    #[test]
    fn test_label_for() {
        let spec = CrudSpec::new("/users", "users").label("username", "Login");
        assert_eq!(spec.label_for("username"), "Login");
        assert_eq!(spec.label_for("first_name"), "first_name");

        let mut spec = spec;
        spec.prettify_headers = true;
        assert_eq!(spec.label_for("first_name"), "First Name");
        assert_eq!(spec.label_for("username"), "Login");
    }

    #[test]
    fn test_dynamic_filter_resolves_per_request() {
        let filter = WhereFilter::dynamic(|parts| {
            let mut filter = BTreeMap::new();
            if let Some(owner) = parts.headers.get("x-owner").and_then(|value| value.to_str().ok()) {
                filter.insert("owner".to_string(), json!(owner));
            }
            filter
        });

        let (parts, _) = axum::http::Request::builder()
            .header("x-owner", "sukria")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(filter.resolve(&parts)["owner"], json!("sukria"));
    }
}
