//! Parser/Transform service
//!
//! The bundler core talks to source code only through the [`Transform`]
//! trait: parse text into a tree, list the tree's import specifiers, and
//! compile the tree into code that runs under the bundle loader. The
//! [`EsmTransform`] implementation parses JavaScript ES modules with swc and
//! lowers their `import`/`export` declarations onto the loader's `require`
//! and `exports` bindings.

mod codegen;
pub mod syntax;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::syntax::SyntaxTree;

/// Source text that could not be turned into a syntax tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {line}:{column}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// A valid tree that cannot be compiled for the requested target
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransformError(pub String);

/// Output language level of generated module code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// ES2015 syntax is lowered and generated bindings use `var`
    #[default]
    Es5,
    /// Source syntax is kept and generated bindings use `const`
    Es2015,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Es5 => write!(f, "es5"),
            Self::Es2015 => write!(f, "es2015"),
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "es5" => Ok(Self::Es5),
            "es2015" | "es6" => Ok(Self::Es2015),
            other => Err(format!("unknown target '{other}' (expected es5 or es2015)")),
        }
    }
}

/// The three operations the bundler needs from a language front end
pub trait Transform: Send + Sync {
    type Tree: Send;

    /// Parse source text into a syntax tree
    fn parse(&self, source: &str) -> Result<Self::Tree, ParseError>;

    /// Import specifiers of the tree, in order of appearance
    fn extract_imports(&self, tree: &Self::Tree) -> Vec<String>;

    /// Compile the tree into code runnable under the bundle loader
    fn generate_code(&self, tree: &Self::Tree, target: Target) -> Result<String, TransformError>;
}

/// ES module front end
#[derive(Debug, Clone, Copy, Default)]
pub struct EsmTransform;

impl EsmTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Transform for EsmTransform {
    type Tree = SyntaxTree;

    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        syntax::parse(source)
    }

    fn extract_imports(&self, tree: &SyntaxTree) -> Vec<String> {
        tree.import_sources().map(str::to_owned).collect()
    }

    fn generate_code(&self, tree: &SyntaxTree, target: Target) -> Result<String, TransformError> {
        codegen::generate(tree, target)
    }
}
