pub mod error;
pub mod types;
pub mod value;

pub use error::{PersistError, Result};
pub use types::{Row, SQL_DATETIME_FORMAT, filter_by_keys, is_valid_id, sql_datetime};
pub use value::Value;
