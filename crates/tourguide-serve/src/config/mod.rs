pub mod parser;
pub mod schema;
pub mod validator;

pub use parser::{parse_yaml_file, parse_yaml_str, parse_yaml_with};
pub use schema::*;
pub use validator::validate_config;
