pub mod config;
pub mod cursor;
pub mod plan;
pub mod query;
pub mod value;

pub use config::{DbConfig, DbDriver, MigrationConfig};
pub use cursor::Cursor;
pub use plan::{DocumentPlan, RelatedDocument};
pub use query::{FieldQuery, QueryOp};
pub use value::{Document, Value};
