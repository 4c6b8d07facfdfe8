//! List query state and compilation

pub mod compiler;
pub mod state;

pub use compiler::{
    compile, key_value, record_statement, ActiveSort, ColumnKind, JoinClause, OutputColumn,
    QueryPlan, ACTIONS_COLUMN,
};
pub use state::{ListParams, RequestState, SearchType, SortDirection};
