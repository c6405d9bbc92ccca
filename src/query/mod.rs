// Submodules for separation of concerns
pub(crate) mod builder;
pub(crate) mod compile;
pub(crate) mod cursor;
pub(crate) mod eval;
pub(crate) mod parse;
pub(crate) mod path;
pub(crate) mod types;

pub(crate) use cursor::StoredRow;

// Public API re-exports
pub use builder::{
    CompiledProjection, PlanMode, QueryBuilder, RowKey, RowPredicate, SelectPlan, WhereClause,
};
pub use compile::{CompiledPredicate, SqlBuilder, compile_filter, render_condition};
pub use cursor::Cursor;
pub use eval::{apply_update, compare_docs, compare_values, eval_condition};
pub use parse::{parse_match, parse_update, validate_replacement};
pub use path::{FieldPath, compile_path};
pub use types::{
    CmpOp, Condition, DeleteReport, Filter, FindOptions, MatchDocument, Order, PredicateFn,
    Projection, Scalar, SortSpec, UpdateReport, UpdateSpec, ValueKind,
};
