//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use branchscope::EngineError;
use std::fmt;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add multiple suggestions
    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Identifier given on the command line could not be parsed
    pub fn invalid_id(kind: &str, value: &str, reason: impl fmt::Display) -> Self {
        Self::new(format!("Invalid {}: '{}'", kind, value))
            .with_context(reason.to_string())
            .with_suggestion("TRY: Copy the ID from: branchscope branches")
    }

    /// Unknown isolation mode on the command line
    pub fn invalid_mode(value: &str) -> Self {
        Self::new(format!("Unknown isolation mode: '{}'", value))
            .with_suggestion("TRY: Use one of: shared, isolated, hybrid")
    }

    /// Unknown cleanup action on the command line
    pub fn invalid_action(value: &str) -> Self {
        Self::new(format!("Unknown cleanup action: '{}'", value))
            .with_context("reassign moves foreign rows to this branch; delete removes them")
            .with_suggestion("TRY: Use one of: reassign, delete")
    }

    /// Map an engine error to an operator-facing message
    pub fn from_engine(err: EngineError) -> Self {
        match err {
            EngineError::Busy { branch } => Self::new(format!("Branch {} is busy", branch))
                .with_context("Another live cleanup holds this branch's maintenance lock")
                .with_suggestions([
                    "TRY: Wait for the other cleanup to finish, then re-run".to_string(),
                    "TRY: Preview without locking: omit --apply".to_string(),
                ]),
            EngineError::Validation(msg) if msg.contains("confirmation") => Self::new(msg)
                .with_context("Live cleanups change data owned by other branches")
                .with_suggestions([
                    "TRY: Preview first: branchscope cleanup --branch <ID>".to_string(),
                    "TRY: Confirm the live run with --yes".to_string(),
                ]),
            EngineError::Validation(msg) if msg.contains("not found") => Self::new(msg)
                .with_suggestions([
                    "TRY: List branches: branchscope branches --all".to_string(),
                    "TRY: Create it: branchscope branch-set <ID> --name <NAME>".to_string(),
                ]),
            EngineError::Validation(msg) => Self::new(msg),
            EngineError::Configuration(msg) => Self::new("Invalid configuration")
                .with_context(msg)
                .with_suggestions([
                    "TRY: Check ~/.branchscope/config.toml".to_string(),
                    "TRY: Regenerate defaults: branchscope init --force".to_string(),
                ]),
            EngineError::Database(e) => Self::new("Database error")
                .with_context(e.to_string())
                .with_suggestions([
                    "TRY: Check the --db path and file permissions".to_string(),
                    "TRY: Ensure the database is not locked by another process".to_string(),
                ]),
            other => Self::new(other.to_string()),
        }
    }
}

impl From<EngineError> for HelpfulError {
    fn from(err: EngineError) -> Self {
        Self::from_engine(err)
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Print an error as a JSON object on stdout (for --json callers)
pub fn print_json_error(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": helpful.message,
            "context": helpful.context,
            "suggestions": helpful.suggestions,
        }),
        None => serde_json::json!({ "error": format!("{:#}", err) }),
    };
    println!("{}", payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchscope_ids::BranchId;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While processing data")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While processing data"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_busy_branch_suggests_waiting() {
        let err = HelpfulError::from(EngineError::Busy {
            branch: BranchId::parse("A").unwrap(),
        });
        let display = format!("{}", err);
        assert!(display.contains("Branch A is busy"));
        assert!(display.contains("TRY:"));
    }

    #[test]
    fn test_unconfirmed_cleanup_suggests_yes() {
        let err = HelpfulError::from(EngineError::validation(
            "Live delete requires operator confirmation",
        ));
        assert!(err.suggestions.iter().any(|s| s.contains("--yes")));
    }
}
