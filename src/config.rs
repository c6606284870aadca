pub use self::parser::{Config, LogFormat, LoggingConfig, MirrorConfig};
pub use self::validator::ConfigError;

mod parser;
mod validator;
