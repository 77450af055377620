//! # Tollgate - Policy Enforcement Engine
//!
//! `tollgate` decides whether a request such as `(alice, data1, read)` is
//! allowed. Access control rules are described by a Casbin-syntax model and a
//! set of policy rules kept in a pluggable store:
//!
//! - **Model**: request, policy, role, effect and matcher sections
//! - **Matchers** compiled once, evaluated per rule
//! - **Role hierarchies** with optional domains (`g = _, _, _`)
//! - **Policy stores**: in-memory, CSV policy file, SQLite table
//! - **Change events** for hosts caching decisions elsewhere
//!
//! ## Quick Start
//!
//! ```rust
//! use tollgate::{Enforcer, MemoryAdapter, Model, Result};
//!
//! # fn main() -> Result<()> {
//! let model = Model::from_text(
//!     r#"
//! [request_definition]
//! r = sub, obj, act
//!
//! [policy_definition]
//! p = sub, obj, act
//!
//! [role_definition]
//! g = _, _
//!
//! [policy_effect]
//! e = some(where (p.eft == allow))
//!
//! [matchers]
//! m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
//! "#,
//! )?;
//!
//! let adapter = MemoryAdapter::with_rules(vec![
//!     ("p", vec!["alice", "data1", "read"]),
//!     ("p", vec!["data2_admin", "data2", "write"]),
//!     ("g", vec!["bob", "data2_admin"]),
//! ]);
//! let enforcer = Enforcer::new(model, adapter)?;
//!
//! assert!(enforcer.enforce(&["alice", "data1", "read"])?);
//! assert!(enforcer.enforce(&["bob", "data2", "write"])?);
//! assert!(!enforcer.enforce(&["bob", "data1", "read"])?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Persistent Stores
//!
//! ```rust,no_run
//! use tollgate::{Enforcer, Model, Result, SqliteAdapter, TableName};
//!
//! # fn main() -> Result<()> {
//! let model = Model::from_file("rbac_model.conf")?;
//! let adapter = SqliteAdapter::open("policy.db", TableName::default())?;
//! let enforcer = Enforcer::builder(model)
//!     .adapter(adapter)
//!     .cache(10_000, None)
//!     .build()?;
//!
//! // Written to the table before the in-memory rules change
//! enforcer.add_policy(&["alice", "data1", "read"])?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cache;
pub mod config;
pub mod effect;
pub mod enforcer;
pub mod error;
pub mod events;
pub mod matcher;
pub mod model;
pub mod rbac;
pub mod validation;

pub use adapter::{Adapter, FileAdapter, MemoryAdapter, SqliteAdapter};
pub use cache::DecisionCache;
pub use config::EnforcerConfig;
pub use effect::{Effect, EffectKind};
pub use enforcer::{Decision, EnforceContext, Enforcer, EnforcerBuilder, EnforcerState};
pub use error::{Error, Result};
pub use events::PolicyEvent;
pub use matcher::{match_function, MatchFunction, Value};
pub use model::Model;
pub use rbac::{DefaultRoleManager, RoleManager};
pub use validation::TableName;
