//! Value objects - immutable types that represent platform concepts

mod snowflake;

pub use snowflake::{Snowflake, SnowflakeParseError};
