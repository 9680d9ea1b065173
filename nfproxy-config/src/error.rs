use std::path::PathBuf;

use thiserror::Error;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid configuration:\n{}", describe(.0))]
    Validation(#[from] ValidationErrors),

    #[error("Configuration parsing error: {0}")]
    Parsing(#[from] figment::Error),
}

/// One line per failed field, nested sections flattened to `section.field`.
fn describe(errors: &ValidationErrors) -> String {
    use std::fmt::Write;
    use validator::ValidationErrorsKind;

    fn walk(prefix: &str, errors: &ValidationErrors, out: &mut String) {
        for (field, kind) in errors.errors() {
            let path = if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{prefix}.{field}")
            };
            match kind {
                ValidationErrorsKind::Field(failures) => {
                    for failure in failures {
                        let message = failure
                            .message
                            .as_ref()
                            .map_or_else(|| failure.code.to_string(), |m| m.to_string());
                        let _ = writeln!(out, "  {path}: {message}");
                    }
                }
                ValidationErrorsKind::Struct(inner) => walk(&path, inner, out),
                ValidationErrorsKind::List(items) => {
                    for (index, inner) in items {
                        walk(&format!("{path}[{index}]"), inner, out);
                    }
                }
            }
        }
    }

    let mut out = String::new();
    walk("", errors, &mut out);
    out
}
