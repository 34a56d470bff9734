//! Write a starter `codebox.toml` into a directory.
//!
//! Filesystem access is passed in as closures so the core logic is testable
//! without touching disk.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::CONFIG_FILE;
use crate::templates;

// -----------------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------------

/// Runs the init command in the current directory.
pub(crate) fn run(force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    info!("Initializing codebox in {}", cwd.display());

    let files = init_files();

    let results = init_project(
        &files,
        force,
        |path| cwd.join(path).exists(),
        |path, content| {
            fs::write(cwd.join(path), content)
                .with_context(|| format!("Failed to write {}", path.display()))
        },
    )?;

    print!("{}", format_results(&results, &files));

    Ok(())
}

// -----------------------------------------------------------------------------
// Internal types
// -----------------------------------------------------------------------------

/// File to be written during init.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InitFile {
    path: PathBuf,
    content: &'static str,
    description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteResult {
    Created,
    Overwritten,
    Skipped,
}

// -----------------------------------------------------------------------------
// Helper functions
// -----------------------------------------------------------------------------

fn init_files() -> Vec<InitFile> {
    vec![InitFile {
        path: PathBuf::from(CONFIG_FILE),
        content: templates::CODEBOX_TOML,
        description: "Sandbox and backend configuration",
    }]
}

/// Writes each file unless it exists and `force` is off.
fn init_project<E, W>(
    files: &[InitFile],
    force: bool,
    exists: E,
    mut write_file: W,
) -> Result<Vec<(PathBuf, WriteResult)>>
where
    E: Fn(&Path) -> bool,
    W: FnMut(&Path, &str) -> Result<()>,
{
    let mut results = Vec::with_capacity(files.len());

    for file in files {
        let existed = exists(&file.path);
        let result = match (existed, force) {
            (true, false) => WriteResult::Skipped,
            (true, true) => {
                write_file(&file.path, file.content)?;
                WriteResult::Overwritten
            }
            (false, _) => {
                write_file(&file.path, file.content)?;
                WriteResult::Created
            }
        };
        results.push((file.path.clone(), result));
    }

    Ok(results)
}

fn format_results(results: &[(PathBuf, WriteResult)], files: &[InitFile]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\n{} codebox initialized\n", "✓".green().bold());

    for (path, result) in results {
        let desc = files
            .iter()
            .find(|f| &f.path == path)
            .map_or("", |f| f.description);

        let _ = match result {
            WriteResult::Created => {
                writeln!(out, "  {} - {}", path.display().to_string().cyan(), desc)
            }
            WriteResult::Overwritten => {
                writeln!(out, "  {} {} (overwritten)", "↻".blue(), path.display())
            }
            WriteResult::Skipped => writeln!(
                out,
                "  {} {} (already exists, use --force to overwrite)",
                "⊘".yellow(),
                path.display()
            ),
        };
    }

    let _ = writeln!(out, "\n{}", "Next steps:".yellow().bold());
    let _ = writeln!(
        out,
        "  1. Edit {} to pick a backend and image",
        CONFIG_FILE.cyan()
    );
    let _ = writeln!(out, "  2. Run {} to fetch the image", "codebox image pull".green());
    let _ = writeln!(
        out,
        "  3. Run {} to try it",
        "codebox run --code 'print(2+2)'".green()
    );

    out
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    fn recording_writer(
        written: &RefCell<HashMap<PathBuf, String>>,
    ) -> impl FnMut(&Path, &str) -> Result<()> + '_ {
        move |path, content| {
            written
                .borrow_mut()
                .insert(path.to_path_buf(), content.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_init_files_contains_config() {
        let files = init_files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, Path::new("codebox.toml"));
        assert!(files[0].content.contains("[sandbox]"));
    }

    #[test]
    fn test_init_project_creates_files() {
        let files = init_files();
        let written = RefCell::new(HashMap::new());

        let results = init_project(&files, false, |_| false, recording_writer(&written)).unwrap();

        assert_eq!(
            results,
            vec![(PathBuf::from("codebox.toml"), WriteResult::Created)]
        );
        assert_eq!(
            written.borrow().get(Path::new("codebox.toml")).map(String::as_str),
            Some(templates::CODEBOX_TOML)
        );
    }

    #[test]
    fn test_init_project_skips_existing_without_force() {
        let files = init_files();
        let written = RefCell::new(HashMap::new());

        let results = init_project(&files, false, |_| true, recording_writer(&written)).unwrap();

        assert!(results.iter().all(|(_, r)| *r == WriteResult::Skipped));
        assert!(written.borrow().is_empty());
    }

    #[test]
    fn test_init_project_overwrites_with_force() {
        let files = init_files();
        let written = RefCell::new(HashMap::new());

        let results = init_project(&files, true, |_| true, recording_writer(&written)).unwrap();

        assert!(results.iter().all(|(_, r)| *r == WriteResult::Overwritten));
        assert_eq!(written.borrow().len(), files.len());
    }

    #[test]
    fn test_init_project_force_on_fresh_dir_creates() {
        let files = init_files();
        let written = RefCell::new(HashMap::new());

        let results = init_project(&files, true, |_| false, recording_writer(&written)).unwrap();

        assert!(results.iter().all(|(_, r)| *r == WriteResult::Created));
    }

    #[test]
    fn test_init_project_write_error_propagates() {
        let files = init_files();

        let result = init_project(&files, false, |_| false, |_, _| {
            anyhow::bail!("read-only filesystem")
        });

        assert!(result.is_err());
    }

    #[test]
    fn test_format_results() {
        let files = init_files();

        let created = format_results(
            &[(PathBuf::from("codebox.toml"), WriteResult::Created)],
            &files,
        );
        assert!(created.contains("codebox initialized"));
        assert!(created.contains("codebox.toml"));
        assert!(created.contains("Next steps"));

        let skipped = format_results(
            &[(PathBuf::from("codebox.toml"), WriteResult::Skipped)],
            &files,
        );
        assert!(skipped.contains("--force"));

        let overwritten = format_results(
            &[(PathBuf::from("codebox.toml"), WriteResult::Overwritten)],
            &files,
        );
        assert!(overwritten.contains("overwritten"));
    }
}
