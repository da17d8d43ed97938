//! Language detection from file names and shebangs.

use std::path::Path;

/// Languages the highlighter knows about. `Text` is the fallback and
/// disables tokenization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
  Rust,
  C,
  Cpp,
  Python,
  JavaScript,
  TypeScript,
  Go,
  Java,
  Ruby,
  Shell,
  Html,
  Css,
  Json,
  Toml,
  Yaml,
  Markdown,
  Makefile,
  Dockerfile,
  #[default]
  Text,
}

impl Language {
  /// Detect from the file name: special names first (Makefile,
  /// Dockerfile), then the extension.
  pub fn from_path(path: &Path) -> Self {
    let file_name = path
      .file_name()
      .and_then(|name| name.to_str())
      .unwrap_or_default();

    match file_name {
      "Makefile" | "makefile" | "GNUmakefile" => return Language::Makefile,
      "Dockerfile" | "Containerfile" => return Language::Dockerfile,
      _ => {},
    }
    if file_name.starts_with("Dockerfile.") {
      return Language::Dockerfile;
    }

    let ext = path
      .extension()
      .and_then(|ext| ext.to_str())
      .unwrap_or_default()
      .to_ascii_lowercase();

    match ext.as_str() {
      "rs" => Language::Rust,
      "c" | "h" => Language::C,
      "cc" | "cpp" | "cxx" | "hpp" | "hh" => Language::Cpp,
      "py" | "pyw" | "pyi" => Language::Python,
      "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
      "ts" | "mts" | "tsx" => Language::TypeScript,
      "go" => Language::Go,
      "java" => Language::Java,
      "rb" | "rake" | "gemspec" => Language::Ruby,
      "sh" | "bash" | "zsh" => Language::Shell,
      "html" | "htm" | "xhtml" => Language::Html,
      "css" => Language::Css,
      "json" => Language::Json,
      "toml" => Language::Toml,
      "yaml" | "yml" => Language::Yaml,
      "md" | "markdown" => Language::Markdown,
      "mk" => Language::Makefile,
      _ => Language::Text,
    }
  }

  /// Detect from a `#!` line when the file name was inconclusive.
  pub fn from_shebang(first_line: &str) -> Option<Self> {
    let rest = first_line.strip_prefix("#!")?;
    // "#!/usr/bin/env python3" or "#!/bin/sh".
    let interpreter = rest
      .split_whitespace()
      .find(|word| !word.ends_with("/env"))
      .map(|word| word.rsplit('/').next().unwrap_or(word))?;
    let interpreter = interpreter.trim_end_matches(|ch: char| ch.is_ascii_digit() || ch == '.');

    match interpreter {
      "python" => Some(Language::Python),
      "node" | "nodejs" | "deno" => Some(Language::JavaScript),
      "ruby" => Some(Language::Ruby),
      "sh" | "bash" | "zsh" | "dash" | "ksh" => Some(Language::Shell),
      _ => None,
    }
  }

  /// Combined detection: file name, then shebang, then plain text.
  pub fn detect(path: &Path, first_line: &str) -> Self {
    match Self::from_path(path) {
      Language::Text => Self::from_shebang(first_line).unwrap_or(Language::Text),
      language => language,
    }
  }

  /// How many lines around an edit must be re-highlighted so multi-line
  /// constructs (block comments, raw strings, heredocs) re-color
  /// correctly.
  pub fn highlight_context_lines(self) -> usize {
    match self {
      Language::Text => 0,
      // Triple-quoted strings and heredocs span far; widen more.
      Language::Python | Language::Ruby | Language::Shell => 30,
      Language::Markdown | Language::Yaml => 20,
      _ => 10,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extension_detection() {
    assert_eq!(Language::from_path(Path::new("src/main.rs")), Language::Rust);
    assert_eq!(Language::from_path(Path::new("app.PY")), Language::Python);
    assert_eq!(Language::from_path(Path::new("index.tsx")), Language::TypeScript);
    assert_eq!(Language::from_path(Path::new("notes.txt")), Language::Text);
    assert_eq!(Language::from_path(Path::new("no_extension")), Language::Text);
  }

  #[test]
  fn special_file_names_win_over_extensions() {
    assert_eq!(Language::from_path(Path::new("Makefile")), Language::Makefile);
    assert_eq!(Language::from_path(Path::new("Dockerfile")), Language::Dockerfile);
    assert_eq!(
      Language::from_path(Path::new("Dockerfile.release")),
      Language::Dockerfile
    );
  }

  #[test]
  fn shebang_detection() {
    assert_eq!(
      Language::from_shebang("#!/usr/bin/env python3"),
      Some(Language::Python)
    );
    assert_eq!(Language::from_shebang("#!/bin/sh"), Some(Language::Shell));
    assert_eq!(Language::from_shebang("#!/usr/bin/ruby"), Some(Language::Ruby));
    assert_eq!(Language::from_shebang("plain text"), None);
    assert_eq!(Language::from_shebang("#!/opt/weird/thing"), None);
  }

  #[test]
  fn detect_prefers_path_over_shebang() {
    assert_eq!(
      Language::detect(Path::new("script.rb"), "#!/usr/bin/env python3"),
      Language::Ruby
    );
    assert_eq!(
      Language::detect(Path::new("script"), "#!/usr/bin/env python3"),
      Language::Python
    );
  }
}
