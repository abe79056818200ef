//! Jupyter notebook to Python script conversion.
//!
//! Output follows the layout of `jupyter nbconvert --to script`: input
//! prompts above code cells, markdown as comments, and IPython magics
//! rewritten into plain `get_ipython()` calls.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const SCRIPT_HEADER: &str = "#!/usr/bin/env python\n# coding: utf-8\n";

#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a valid notebook: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("nbformat {0} is not supported, expected 4")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Deserialize)]
pub struct Notebook {
    pub nbformat: u32,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum Cell {
    Code {
        source: Source,
        #[serde(default)]
        execution_count: Option<u64>,
    },
    Markdown {
        source: Source,
    },
    Raw {
        source: Source,
    },
}

/// nbformat stores cell sources either as one string or as a list of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Text(String),
    Lines(Vec<String>),
}

impl Source {
    pub fn text(&self) -> String {
        match self {
            Source::Text(text) => text.clone(),
            Source::Lines(lines) => lines.concat(),
        }
    }
}

impl Notebook {
    pub fn from_json(json: &str) -> Result<Self, NotebookError> {
        let notebook: Notebook = serde_json::from_str(json)?;
        if notebook.nbformat != 4 {
            return Err(NotebookError::UnsupportedVersion(notebook.nbformat));
        }
        Ok(notebook)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<Self, NotebookError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| NotebookError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Render the notebook as a Python script.
    pub fn export_script(&self) -> String {
        let mut script = String::from(SCRIPT_HEADER);

        for cell in &self.cells {
            match cell {
                Cell::Code {
                    source,
                    execution_count,
                } => {
                    let prompt = execution_count
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| " ".to_string());
                    script.push_str(&format!("\n# In[{}]:\n\n\n", prompt));
                    script.push_str(&ipython_to_python(&source.text()));
                    script.push_str("\n\n");
                }
                Cell::Markdown { source } => {
                    script.push('\n');
                    script.push_str(&comment_lines(&source.text()));
                    script.push('\n');
                }
                Cell::Raw { source } => {
                    script.push('\n');
                    script.push_str(&source.text());
                    script.push('\n');
                }
            }
        }

        let mut script = script.trim_end().to_string();
        script.push('\n');
        script
    }
}

/// Where `nb2script` writes when no output path is given.
pub fn default_output_path(notebook_path: &Path) -> PathBuf {
    notebook_path.with_extension("py")
}

/// Read `input`, convert it and write the script to `output` as UTF-8.
pub fn convert_file(input: &Path, output: &Path) -> Result<(), NotebookError> {
    let script = Notebook::read(input)?.export_script();
    std::fs::write(output, script).map_err(|source| NotebookError::Write {
        path: output.to_path_buf(),
        source,
    })
}

fn comment_lines(text: &str) -> String {
    text.lines()
        .map(|line| format!("# {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn ipython_to_python(source: &str) -> String {
    if let Some(rest) = source.strip_prefix("%%") {
        let (header, body) = rest.split_once('\n').unwrap_or((rest, ""));
        let (name, args) = split_magic(header);
        return format!(
            "get_ipython().run_cell_magic({}, {}, {})",
            py_str(name),
            py_str(args),
            py_str(body)
        );
    }

    source
        .lines()
        .map(translate_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn translate_line(line: &str) -> String {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    if let Some(magic) = trimmed.strip_prefix('%') {
        let (name, args) = split_magic(magic);
        return format!(
            "{}get_ipython().run_line_magic({}, {})",
            indent,
            py_str(name),
            py_str(args)
        );
    }

    if let Some(command) = trimmed.strip_prefix('!') {
        return format!("{}get_ipython().system({})", indent, py_str(command.trim()));
    }

    // `files = !ls`
    if let Some((target, command)) = trimmed.split_once("= !") {
        let target = target.trim();
        if !target.is_empty() && target.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return format!(
                "{}{} = get_ipython().getoutput({})",
                indent,
                target,
                py_str(command.trim())
            );
        }
    }

    line.to_string()
}

fn split_magic(magic: &str) -> (&str, &str) {
    let magic = magic.trim();
    match magic.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (magic, ""),
    }
}

// single-quoted Python string literal
fn py_str(text: &str) -> String {
    let mut literal = String::with_capacity(text.len() + 2);
    literal.push('\'');
    for c in text.chars() {
        match c {
            '\\' => literal.push_str("\\\\"),
            '\'' => literal.push_str("\\'"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c => literal.push(c),
        }
    }
    literal.push('\'');
    literal
}
