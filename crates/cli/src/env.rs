use crate::error::CliError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Loads environment variables from the process and, optionally, a
/// `.env`-shaped file, with file values taking precedence.
#[derive(Debug, Clone, Default)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn new() -> Self {
        let vars = std::env::vars().collect();
        EnvManager { vars }
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("failed to read env file {}: {e}", path.display())))?;
        self.parse_env_content(&content)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<String, CliError> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| CliError::Config(format!("missing required environment variable: {key}")))
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.vars
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(eq_pos) = line.find('=') else {
                return Err(CliError::Config(format!(
                    "invalid env file: malformed line {} (expected KEY=VALUE)",
                    line_num + 1
                )));
            };

            let key = line[..eq_pos].trim();
            let value = line[eq_pos + 1..].trim();
            if key.is_empty() {
                return Err(CliError::Config(format!(
                    "invalid env file: empty key at line {}",
                    line_num + 1
                )));
            }

            self.vars.insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();
        if value.len() >= 2 {
            let bytes = value.as_bytes();
            let wrapped = (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
                || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'');
            if wrapped {
                return value[1..value.len() - 1].to_string();
            }
        }
        value.to_string()
    }
}
