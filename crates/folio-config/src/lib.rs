//! Configuration store and template resolution for Folio.
//!
//! - [`ConfigStore`]: dotted-path access to a YAML or JSON company profile
//! - [`validate`](ConfigStore::validate): declarative and domain rules, aggregated
//! - [`FieldCatalog`]: explicit per-path field kinds, descriptions, and categories
//! - [`derived_variables`]: upper-case convenience variables computed from the store
//! - [`TemplateResolver`]: `{dotted.path}` and `[NAMED MARKER]` substitution

pub mod derived;
pub mod schema;
pub mod store;
pub mod template;
pub mod validation;

pub use derived::derived_variables;
pub use schema::{FieldCatalog, FieldInfo, FieldKind, FieldSpec};
pub use store::{ConfigFormat, ConfigStore, LoadStatus};
pub use template::{Resolution, TemplateResolver};
pub use validation::{RuleSet, ValidationResult, ValidationRule};
