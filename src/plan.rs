//! Plan files: handle operations replayed inside one transaction.
//!
//! ```toml
//! [[step]]
//! op = "create"
//! path = "notes/todo.txt"
//! content = "buy milk\n"
//!
//! [[step]]
//! op = "rename"
//! path = "notes/"
//! to = "archive/notes/"
//! ```
//!
//! Paths ending in `/` address directories. Supported ops: `create`, `mkdir`,
//! `write`, `append`, `rename`, `duplicate`, `delete`.

use crate::error::{Result, TxError};
use crate::path;
use crate::session::Session;

use colored::Colorize;
use std::fmt;
use std::fs;
use std::path::Path;
use toml_edit::{DocumentMut, Table};

/// One operation of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Create a file with `content`, or a directory if `path` ends with `/`.
    Create { path: String, content: String },
    Mkdir { path: String },
    Write { path: String, content: String },
    Append { path: String, content: String },
    Rename { path: String, to: String },
    Duplicate { path: String, to: String },
    Delete { path: String },
}

impl Step {
    fn from_table(idx: usize, table: &Table) -> Result<Self> {
        let field = |key: &str| -> Option<String> {
            table.get(key).and_then(|v| v.as_str()).map(str::to_string)
        };
        let required = |key: &str| -> Result<String> {
            field(key).ok_or_else(|| {
                TxError::InvalidPlan(format!("step {}: missing string '{}'", idx + 1, key))
            })
        };

        let op = required("op")?;
        let path = required("path")?;

        let step = match op.as_str() {
            "create" => Step::Create {
                path,
                content: field("content").unwrap_or_default(),
            },
            "mkdir" => Step::Mkdir { path },
            "write" => Step::Write {
                path,
                content: required("content")?,
            },
            "append" => Step::Append {
                path,
                content: required("content")?,
            },
            "rename" => Step::Rename {
                path,
                to: required("to")?,
            },
            "duplicate" => Step::Duplicate {
                path,
                to: required("to")?,
            },
            "delete" => Step::Delete { path },
            other => {
                return Err(TxError::InvalidPlan(format!(
                    "step {}: unknown op '{}'",
                    idx + 1,
                    other
                )));
            }
        };
        Ok(step)
    }

    /// Runs the step through handles obtained from `session`.
    pub fn apply(&self, session: &Session) -> Result<()> {
        log::debug!("Applying {}", self);
        match self {
            Step::Create { path, content } => {
                if path::is_dir(path) {
                    session.dir(path)?.create()
                } else {
                    session.file(path)?.create(content.as_bytes())
                }
            }
            Step::Mkdir { path } => session.dir(path)?.create(),
            Step::Write { path, content } => session.file(path)?.write(content.as_bytes()),
            Step::Append { path, content } => session.file(path)?.append(content.as_bytes()),
            Step::Rename { path, to } => {
                if path::is_dir(path) {
                    session.dir(path)?.rename(to)
                } else {
                    session.file(path)?.rename(to)
                }
            }
            Step::Duplicate { path, to } => {
                if path::is_dir(path) {
                    session.dir(path)?.duplicate(to).map(|_| ())
                } else {
                    session.file(path)?.duplicate(to).map(|_| ())
                }
            }
            Step::Delete { path } => {
                if path::is_dir(path) {
                    session.dir(path)?.delete()
                } else {
                    session.file(path)?.delete()
                }
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Create { path, .. } => write!(f, "Create: {}", path),
            Step::Mkdir { path } => write!(f, "Mkdir: {}", path),
            Step::Write { path, .. } => write!(f, "Write: {}", path),
            Step::Append { path, content } => {
                write!(f, "Append: {} (+{} bytes)", path, content.len())
            }
            Step::Rename { path, to } => write!(f, "Move: {} → {}", path, to),
            Step::Duplicate { path, to } => write!(f, "Copy: {} → {}", path, to),
            Step::Delete { path } => write!(f, "Delete: {}", path),
        }
    }
}

/// Ordered list of steps parsed from a TOML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// Parses a plan document. Every step is validated before any runs.
    pub fn parse(content: &str) -> Result<Self> {
        let doc = content.parse::<DocumentMut>()?;

        let Some(item) = doc.get("step") else {
            return Err(TxError::InvalidPlan("no [[step]] tables".to_string()));
        };
        let tables = item.as_array_of_tables().ok_or_else(|| {
            TxError::InvalidPlan("'step' must be an array of tables ([[step]])".to_string())
        })?;

        let steps = tables
            .iter()
            .enumerate()
            .map(|(idx, table)| Step::from_table(idx, table))
            .collect::<Result<Vec<_>>>()?;

        if steps.is_empty() {
            return Err(TxError::InvalidPlan("no [[step]] tables".to_string()));
        }
        Ok(Self { steps })
    }

    /// Reads and parses a plan file.
    pub fn load(file: &Path) -> Result<Self> {
        let content = fs::read_to_string(file).map_err(|e| {
            log::error!("Failed to read {}: {}", file.display(), e);
            TxError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", file.display(), e),
            ))
        })?;
        Self::parse(&content)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Applies every step in order, stopping at the first failure.
    ///
    /// The caller owns the transaction: begin before, commit or roll back after.
    pub fn apply(&self, session: &Session) -> Result<()> {
        for (idx, step) in self.steps.iter().enumerate() {
            step.apply(session).map_err(|e| {
                log::error!("Step {} ({}) failed: {}", idx + 1, step, e);
                e
            })?;
        }
        Ok(())
    }

    /// Returns human-readable preview of the steps.
    pub fn preview(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.to_string()).collect()
    }

    /// Prints categorized summary to stdout.
    ///
    /// Groups:
    /// - Created (files and directories)
    /// - Modified (writes and appends)
    /// - Moved and copied
    /// - Deleted
    pub fn print_summary(&self, rolled_back: bool, root: &Path) {
        if self.steps.is_empty() {
            println!("\n{}", "No changes needed".yellow());
            return;
        }

        let mut created = Vec::new();
        let mut modified = Vec::new();
        let mut moved = Vec::new();
        let mut deleted = Vec::new();

        for step in &self.steps {
            match step {
                Step::Create { path, .. } | Step::Mkdir { path } => created.push(path.clone()),
                Step::Write { path, .. } | Step::Append { path, .. } => {
                    modified.push(path.clone())
                }
                Step::Rename { path, to } => moved.push(format!("{} → {}", path, to.green())),
                Step::Duplicate { path, to } => moved.push(format!("{} ⇉ {}", path, to.green())),
                Step::Delete { path } => deleted.push(path.clone()),
            }
        }

        if rolled_back {
            println!(
                "\n{}",
                "DRY RUN - all changes were rolled back".yellow().bold()
            );
        } else {
            println!("\n{} {}", "Changes committed in".green().bold(), root.display());
        }

        let mark = if rolled_back {
            "•".to_string()
        } else {
            "✓".green().to_string()
        };
        let groups = [
            ("📄", "Created", &created),
            ("📝", "Modified", &modified),
            ("📁", "Moved", &moved),
            ("🗑", "Deleted", &deleted),
        ];

        for (icon, title, paths) in groups {
            if paths.is_empty() {
                continue;
            }
            println!(
                "\n{} {} ({} path{})",
                icon.bold(),
                title,
                paths.len(),
                if paths.len() == 1 { "" } else { "s" }
            );
            for path in paths.iter().take(8) {
                println!("   {} {}", mark, path.dimmed());
            }
            if paths.len() > 8 {
                println!("   {} {} more...", mark, paths.len() - 8);
            }
        }

        println!();
        if rolled_back {
            println!(
                "{} step{} checked. Run without {} to apply.",
                self.steps.len().to_string().cyan().bold(),
                if self.steps.len() == 1 { "" } else { "s" },
                "--dry-run".cyan()
            );
        } else {
            println!(
                "{} Successfully completed {} operations",
                "✓".green().bold(),
                self.steps.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const PLAN: &str = r#"
[[step]]
op = "mkdir"
path = "docs/"

[[step]]
op = "create"
path = "docs/a.txt"
content = "hi"

[[step]]
op = "append"
path = "docs/a.txt"
content = "!"

[[step]]
op = "rename"
path = "docs/"
to = "archive/"
"#;

    #[test]
    fn test_parse_steps() {
        let plan = Plan::parse(PLAN).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(
            plan.steps()[3],
            Step::Rename {
                path: "docs/".into(),
                to: "archive/".into()
            }
        );
        assert_eq!(plan.preview()[2], "Append: docs/a.txt (+1 bytes)");
    }

    #[test]
    fn test_parse_rejects_unknown_op() {
        let err = Plan::parse("[[step]]\nop = \"explode\"\npath = \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("unknown op 'explode'"));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        let err = Plan::parse("[[step]]\nop = \"rename\"\npath = \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("missing string 'to'"));

        let err = Plan::parse("[[step]]\nop = \"write\"\npath = \"a\"\n").unwrap_err();
        assert!(err.to_string().contains("missing string 'content'"));
    }

    #[test]
    fn test_parse_rejects_empty_and_malformed() {
        assert!(matches!(Plan::parse(""), Err(TxError::InvalidPlan(_))));
        assert!(matches!(Plan::parse("step = 1"), Err(TxError::InvalidPlan(_))));
        assert!(matches!(Plan::parse("[[step]"), Err(TxError::Toml(_))));
    }

    #[test]
    fn test_apply_then_commit() {
        let session = Session::new(MemoryStorage::new());
        let plan = Plan::parse(PLAN).unwrap();

        session.begin().unwrap();
        plan.apply(&session).unwrap();
        session.commit().unwrap();

        assert_eq!(session.storage().read("/archive/a.txt").unwrap(), b"hi!");
        assert!(!session.storage().exists("/docs/").unwrap());
    }

    #[test]
    fn test_apply_then_rollback() {
        let storage = MemoryStorage::new();
        let session = Session::new(storage);
        let plan = Plan::parse(PLAN).unwrap();

        session.begin().unwrap();
        plan.apply(&session).unwrap();
        session.rollback().unwrap();

        assert!(!session.storage().exists("/archive/").unwrap());
        assert!(!session.storage().exists("/docs/").unwrap());
    }

    #[test]
    fn test_print_summary_does_not_panic() {
        let plan = Plan::parse(PLAN).unwrap();
        plan.print_summary(true, Path::new("/tmp"));
        plan.print_summary(false, Path::new("/tmp"));
        Plan::default().print_summary(false, Path::new("/tmp"));
    }
}
