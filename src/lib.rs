//! Query and mutate nested JSON values with compact path expressions.
//!
//! ```
//! use json_path_tree::Tree;
//! use serde_json::json;
//!
//! let mut tree = Tree::new(json!({"books": [{"title": "A", "cost": 5}, {"title": "B", "cost": 15}]}));
//! assert_eq!(tree.find_values("books.[0..-1]($cost > 10).title").unwrap(), vec![json!("B")]);
//!
//! tree.bridge([("meta.tags.[0]", json!("new"))]).unwrap();
//! assert_eq!(tree.find_values("meta.tags").unwrap(), vec![json!(["new"])]);
//! ```

pub mod errors;
pub mod context;
pub mod engine;
pub mod functions;
pub mod split;
pub mod tree;
pub mod path;
pub mod formula;
mod parser;
mod mutate;
mod flatten;
mod comparison;

pub use context::{Context, Diagnostic};
pub use errors::{Error, Result};
pub use flatten::{expand, squish};
pub use functions::{Operation, Registry};
pub use path::{PathExpression, PathSegment, Selector};
pub use tree::{Key, Kind, NodeId, Tree};

/// Re-export the most-used helpers for users who work on plain values.
pub use engine::{
    bridge, copy, copy_all, delete, find, find_join, find_join_hash, find_multi, first,
    move_all, move_value, or_default, set, unique,
};
