//! Compiles a `CrudSpec` and the request state into one SELECT statement
//!
//! The select list is built in output order: displayed base columns (with
//! foreign keys replaced in place by their label), join columns, custom
//! columns, the raw foreign key values and finally the `actions` sentinel.
//! Every identifier goes through the dialect's quoting; every user-supplied
//! value becomes a bind.

use crate::database::{Dialect, Statement};
use crate::error::CrudError;
use crate::query::state::{RequestState, SearchType, SortDirection};
use crate::schema::{ColumnDescriptor, TableColumns};
use crate::spec::{CrudSpec, JoinKind};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashSet};

/// Name of the sentinel column carrying the key for action links
pub const ACTIONS_COLUMN: &str = "actions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Column of the base table
    Base,
    /// Label of the row referenced by a foreign key
    ForeignLabel,
    /// Column selected from a declared join
    Joined,
    /// Custom column, by index into `CrudSpec::custom_columns`
    Custom(usize),
    /// Raw value of a foreign key column whose label is displayed; never shown
    ForeignKeyValue,
    Actions,
}

/// One entry of the select list
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    /// Logical name: base column, `table.column` for joins, custom name
    pub key: String,
    /// Unique output alias
    pub alias: String,
    pub header: String,
    /// Quoted SQL expression, also used for ordering
    pub expression: String,
    /// Selected as `CAST(expression AS TEXT)` so the driver can decode it
    pub text_cast: bool,
    pub kind: ColumnKind,
    pub css_class: Option<String>,
}

impl OutputColumn {
    fn select_expression(&self) -> String {
        if self.text_cast {
            format!("CAST({} AS TEXT)", self.expression)
        } else {
            self.expression.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    /// Quoted ON condition
    pub condition: String,
}

/// The sort actually applied, after fallback
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSort {
    pub column: String,
    pub direction: SortDirection,
}

/// A compiled list query
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub dialect: Dialect,
    pub table: String,
    pub columns: Vec<OutputColumn>,
    pub joins: Vec<JoinClause>,
    pub where_fragments: Vec<String>,
    pub order_by: Vec<String>,
    pub limit_clause: Option<String>,
    /// Positional binds: WHERE binds in emission order, then LIMIT and OFFSET
    pub binds: Vec<Value>,
    /// `None` when sorting is disabled
    pub active_sort: Option<ActiveSort>,
}

impl QueryPlan {
    pub fn to_sql(&self) -> String {
        let select_list: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                format!(
                    "{} AS {}",
                    column.select_expression(),
                    self.dialect.quote_identifier(&column.alias)
                )
            })
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_list.join(", "),
            self.dialect.quote_identifier(&self.table)
        );

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join.kind.sql());
            sql.push(' ');
            sql.push_str(&self.dialect.quote_identifier(&join.table));
            if join.alias != join.table {
                sql.push_str(" AS ");
                sql.push_str(&self.dialect.quote_identifier(&join.alias));
            }
            sql.push_str(" ON ");
            sql.push_str(&join.condition);
        }

        if !self.where_fragments.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_fragments.join(" AND "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some(limit_clause) = &self.limit_clause {
            sql.push(' ');
            sql.push_str(limit_clause);
        }

        sql
    }

    /// Columns shown in the list, with their index in the result row
    pub fn visible_columns(&self) -> impl Iterator<Item = (usize, &OutputColumn)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.kind != ColumnKind::ForeignKeyValue)
    }

    /// Visible columns holding data, without the actions sentinel
    pub fn data_columns(&self) -> impl Iterator<Item = (usize, &OutputColumn)> {
        self.visible_columns()
            .filter(|(_, column)| column.kind != ColumnKind::Actions)
    }
}

/// Accumulates WHERE fragments and their binds in lockstep
struct Conditions<'a> {
    dialect: Dialect,
    table: &'a str,
    fragments: Vec<String>,
    binds: Vec<Value>,
}

impl<'a> Conditions<'a> {
    fn new(dialect: Dialect, table: &'a str) -> Self {
        Self {
            dialect,
            table,
            fragments: Vec::new(),
            binds: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.binds.push(value);
        self.dialect.placeholder(self.binds.len())
    }

    fn qualified(&self, column: &str) -> String {
        qualify(self.dialect, self.table, column)
    }

    /// Column = value restrictions; `null` becomes IS NULL and arrays become IN
    fn filter(&mut self, filter: &BTreeMap<String, Value>) {
        for (column, value) in filter {
            let qualified = self.qualified(column);
            let fragment = match value {
                Value::Null => format!("{} IS NULL", qualified),
                Value::Array(values) if values.is_empty() => "1 = 0".to_string(),
                Value::Array(values) => {
                    let placeholders: Vec<String> =
                        values.iter().map(|value| self.bind(value.clone())).collect();
                    format!("{} IN ({})", qualified, placeholders.join(", "))
                }
                value => format!("{} = {}", qualified, self.bind(value.clone())),
            };
            self.fragments.push(fragment);
        }
    }

    fn search(&mut self, column: &ColumnDescriptor, search_type: SearchType, text: &str) {
        let qualified = self.qualified(&column.name);
        let operator = search_type.operator();

        let fragment = if search_type.is_pattern() {
            let placeholder = self.bind(Value::String(format!("%{}%", text)));
            format!("CAST({} AS TEXT) {} {}", qualified, operator, placeholder)
        } else if let Some(number) = column.is_numeric().then(|| parse_number(text)).flatten() {
            let placeholder = self.bind(number);
            format!("{} {} {}", qualified, operator, placeholder)
        } else {
            let placeholder = self.bind(Value::String(text.to_string()));
            format!("CAST({} AS TEXT) {} {}", qualified, operator, placeholder)
        };
        self.fragments.push(fragment);
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Value::from(integer));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn qualify(dialect: Dialect, table: &str, column: &str) -> String {
    format!(
        "{}.{}",
        dialect.quote_identifier(table),
        dialect.quote_identifier(column)
    )
}

/// Hands out names that have not been used yet, appending `_2`, `_3`, ...
#[derive(Default)]
struct UniqueNames {
    used: HashSet<String>,
}

impl UniqueNames {
    fn claim(&mut self, candidate: &str) -> String {
        let mut name = candidate.to_string();
        let mut suffix = 2;
        while !self.used.insert(name.to_lowercase()) {
            name = format!("{}_{}", candidate, suffix);
            suffix += 1;
        }
        name
    }
}

fn key_descriptor<'a>(spec: &CrudSpec, columns: &'a TableColumns) -> Result<&'a ColumnDescriptor, CrudError> {
    columns.get(&spec.key_column).ok_or_else(|| {
        CrudError::Schema(format!(
            "key column '{}' not found in table '{}'",
            spec.key_column, spec.table
        ))
    })
}

/// Compile the list (or single-record) query for one request
///
/// # Arguments
///
/// * `spec` - Endpoint configuration
/// * `columns` - Live columns of the base table
/// * `dialect` - Dialect of the target database
/// * `state` - Parsed query-string state
/// * `filter` - Resolved where filter for this request
/// * `include_actions` - Whether to append the `actions` sentinel column
pub fn compile(
    spec: &CrudSpec,
    columns: &TableColumns,
    dialect: Dialect,
    state: &RequestState,
    filter: &BTreeMap<String, Value>,
    include_actions: bool,
) -> Result<QueryPlan, CrudError> {
    let base = spec.table.as_str();
    let key = key_descriptor(spec, columns)?;

    let mut aliases = UniqueNames::default();
    let mut tables = UniqueNames::default();
    tables.claim(base);

    let mut output = Vec::new();
    let mut joins = Vec::new();
    let mut foreign_key_values = Vec::new();

    let displayed: Vec<&ColumnDescriptor> = match &spec.display_columns {
        Some(names) => names.iter().filter_map(|name| columns.get(name)).collect(),
        None => columns.iter().collect(),
    };

    for column in displayed {
        let header = spec.label_for(&column.name).into_owned();
        let css_class = spec.column_classes.get(&column.name).cloned();

        match spec.foreign_keys.get(&column.name) {
            Some(foreign_key) => {
                let alias = tables.claim(&foreign_key.table);
                joins.push(JoinClause {
                    kind: JoinKind::Left,
                    table: foreign_key.table.clone(),
                    condition: format!(
                        "{} = {}",
                        qualify(dialect, &alias, &foreign_key.key_column),
                        qualify(dialect, base, &column.name)
                    ),
                    alias: alias.clone(),
                });
                output.push(OutputColumn {
                    key: column.name.clone(),
                    alias: aliases.claim(&header),
                    header,
                    expression: qualify(dialect, &alias, &foreign_key.label_column),
                    text_cast: false,
                    kind: ColumnKind::ForeignLabel,
                    css_class,
                });
                foreign_key_values.push(column);
            }
            None => output.push(OutputColumn {
                key: column.name.clone(),
                alias: aliases.claim(&column.name),
                header,
                expression: qualify(dialect, base, &column.name),
                text_cast: dialect.needs_text_cast(column),
                kind: ColumnKind::Base,
                css_class,
            }),
        }
    }

    for join in &spec.joins {
        let alias = tables.claim(&join.table);
        for selected in &join.selected_columns {
            let join_key = format!("{}.{}", alias, selected);
            let header = match spec.labels.get(&format!("{}.{}", join.table, selected)) {
                Some(label) => label.clone(),
                None => spec.label_for(selected).into_owned(),
            };
            output.push(OutputColumn {
                alias: aliases.claim(selected),
                header,
                expression: qualify(dialect, &alias, selected),
                text_cast: false,
                kind: ColumnKind::Joined,
                css_class: spec.column_classes.get(&join_key).cloned(),
                key: join_key,
            });
        }
        joins.push(JoinClause {
            kind: join.join_kind,
            table: join.table.clone(),
            condition: format!(
                "{} = {}",
                qualify(dialect, &alias, &join.remote_key),
                qualify(dialect, base, &join.local_key)
            ),
            alias,
        });
    }

    for (index, custom) in spec.custom_columns.iter().enumerate() {
        let (table, column) = match custom.source_column.split_once('.') {
            Some((table, column)) => (table, column),
            None => (base, custom.source_column.as_str()),
        };
        let (expression, text_cast) = if table == base {
            let text_cast = columns
                .get(column)
                .is_some_and(|descriptor| dialect.needs_text_cast(descriptor));
            (qualify(dialect, base, column), text_cast)
        } else {
            // Refer to the first alias the table was joined under
            let alias = joins
                .iter()
                .find(|join| join.table == table)
                .map(|join| join.alias.as_str())
                .ok_or_else(|| {
                    CrudError::Schema(format!(
                        "custom column '{}' reads from table '{}', which is not joined",
                        custom.name, table
                    ))
                })?;
            (qualify(dialect, alias, column), false)
        };
        output.push(OutputColumn {
            key: custom.name.clone(),
            alias: aliases.claim(&custom.name),
            header: spec.label_for(&custom.name).into_owned(),
            expression,
            text_cast,
            kind: ColumnKind::Custom(index),
            css_class: custom
                .column_class
                .clone()
                .or_else(|| spec.column_classes.get(&custom.name).cloned()),
        });
    }

    for column in foreign_key_values {
        output.push(OutputColumn {
            key: column.name.clone(),
            alias: aliases.claim(&format!("{}_key", column.name)),
            header: column.name.clone(),
            expression: qualify(dialect, base, &column.name),
            text_cast: dialect.needs_text_cast(column),
            kind: ColumnKind::ForeignKeyValue,
            css_class: None,
        });
    }

    if include_actions {
        output.push(OutputColumn {
            key: ACTIONS_COLUMN.to_string(),
            alias: aliases.claim(ACTIONS_COLUMN),
            header: spec.label_for(ACTIONS_COLUMN).into_owned(),
            expression: qualify(dialect, base, &key.name),
            text_cast: dialect.needs_text_cast(key),
            kind: ColumnKind::Actions,
            css_class: spec.column_classes.get(ACTIONS_COLUMN).cloned(),
        });
    }

    let mut conditions = Conditions::new(dialect, base);
    conditions.filter(filter);
    if let Some(text) = &state.query_text {
        let field = state
            .search_field
            .as_deref()
            .and_then(|name| columns.get(name))
            .unwrap_or(key);
        conditions.search(field, state.search_type, text);
    }

    let key_expression = qualify(dialect, base, &key.name);
    let (order_by, active_sort) = if spec.sortable {
        let requested = state.order_column.as_deref().and_then(|requested| {
            sort_expression(&output, columns, dialect, base, requested)
                .map(|expression| (requested.to_string(), expression, state.order_direction))
        });
        let (column, expression, direction) =
            requested.unwrap_or_else(|| (key.name.clone(), key_expression.clone(), SortDirection::Asc));

        let mut order_by = vec![format!("{} {}", expression, direction.sql())];
        if expression != key_expression {
            // Stable order across pages
            order_by.push(format!("{} ASC", key_expression));
        }
        (order_by, Some(ActiveSort { column, direction }))
    } else {
        (vec![format!("{} ASC", key_expression)], None)
    };

    let Conditions {
        fragments: where_fragments,
        mut binds,
        ..
    } = conditions;

    let limit_clause = spec.paginate_size.map(|size| {
        let offset = size.saturating_mul(state.page_number).min(i64::MAX as u64);
        binds.push(Value::from(size.min(i64::MAX as u64)));
        let limit_placeholder = dialect.placeholder(binds.len());
        binds.push(Value::from(offset));
        let offset_placeholder = dialect.placeholder(binds.len());
        format!("LIMIT {} OFFSET {}", limit_placeholder, offset_placeholder)
    });

    let plan = QueryPlan {
        dialect,
        table: spec.table.clone(),
        columns: output,
        joins,
        where_fragments,
        order_by,
        limit_clause,
        binds,
        active_sort,
    };

    tracing::debug!(sql = %plan.to_sql(), binds = plan.binds.len(), table = %spec.table, "compiled list query");
    Ok(plan)
}

/// Expression to order by for a requested sort key, if the key is sortable
fn sort_expression(
    output: &[OutputColumn],
    columns: &TableColumns,
    dialect: Dialect,
    base: &str,
    requested: &str,
) -> Option<String> {
    output
        .iter()
        .find(|column| {
            !matches!(column.kind, ColumnKind::Actions | ColumnKind::ForeignKeyValue) && column.key == requested
        })
        .map(|column| column.expression.clone())
        .or_else(|| {
            columns
                .contains(requested)
                .then(|| qualify(dialect, base, requested))
        })
}

/// Every column of the record whose key is `id`, restricted by the where filter
///
/// Used to load a record for editing and to check a record is reachable
/// before it is changed.
pub fn record_statement(
    spec: &CrudSpec,
    columns: &TableColumns,
    dialect: Dialect,
    id: &str,
    filter: &BTreeMap<String, Value>,
) -> Result<Statement, CrudError> {
    let key = key_descriptor(spec, columns)?;

    let mut conditions = Conditions::new(dialect, &spec.table);
    conditions.search(key, SearchType::Equals, id);
    conditions.filter(filter);

    let select_list: Vec<String> = columns
        .iter()
        .map(|column| {
            let qualified = qualify(dialect, &spec.table, &column.name);
            let expression = if dialect.needs_text_cast(column) {
                format!("CAST({} AS TEXT)", qualified)
            } else {
                qualified
            };
            format!("{} AS {}", expression, dialect.quote_identifier(&column.name))
        })
        .collect();

    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_list.join(", "),
        dialect.quote_identifier(&spec.table),
        conditions.fragments.join(" AND ")
    );
    tracing::debug!(sql = %sql, binds = conditions.binds.len(), "compiled record query");

    Ok(Statement {
        sql,
        binds: conditions.binds,
    })
}

/// Key value bound for `id`: a number for numeric key columns, text otherwise
pub fn key_value(key: &ColumnDescriptor, id: &str) -> Value {
    if key.is_numeric() {
        if let Some(number) = parse_number(id) {
            return number;
        }
    }
    Value::String(id.to_string())
}
