//! Parsing of ES module source into an swc syntax tree

use std::fmt;

use swc_core::{
    common::{BytePos, FileName, SourceMap, Spanned, sync::Lrc},
    ecma::{
        ast::{EsVersion, Module, ModuleDecl, ModuleItem, Str},
        parser::{EsSyntax, Syntax, error::Error as SwcParseError, parse_file_as_module},
    },
};

use super::ParseError;

/// A parsed module and the source map its spans point into
pub struct SyntaxTree {
    pub(crate) source_map: Lrc<SourceMap>,
    pub(crate) module: Module,
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("items", &self.module.body.len())
            .field("hashbang", &self.module.shebang.is_some())
            .finish_non_exhaustive()
    }
}

impl SyntaxTree {
    /// Sources of `import` declarations and `export ... from` re-exports in
    /// order of appearance. `import()` expressions are not included.
    pub fn import_sources(&self) -> impl Iterator<Item = &str> {
        self.module
            .body
            .iter()
            .filter_map(|item| match item {
                ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => Some(&*import.src),
                ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(export)) => export.src.as_deref(),
                ModuleItem::ModuleDecl(ModuleDecl::ExportAll(export)) => Some(&*export.src),
                _ => None,
            })
            .map(|src: &Str| &*src.value)
    }

    /// 1-based line and column of a position inside this tree
    pub(crate) fn location(&self, pos: BytePos) -> (u32, u32) {
        let loc = self.source_map.lookup_char_pos(pos);
        (loc.line as u32, loc.col.0 as u32 + 1)
    }
}

/// Parse module source. Any syntax error, including ones the parser could
/// recover from, rejects the module.
pub fn parse(source: &str) -> Result<SyntaxTree, ParseError> {
    let source_map: Lrc<SourceMap> = Lrc::default();
    let file = source_map.new_source_file(Lrc::new(FileName::Anon), source.to_owned());

    let mut recovered = Vec::new();
    let parsed = parse_file_as_module(
        &file,
        Syntax::Es(EsSyntax::default()),
        EsVersion::latest(),
        None,
        &mut recovered,
    );

    let module = match parsed {
        Ok(module) => module,
        Err(err) => return Err(to_parse_error(&source_map, &err)),
    };
    if let Some(err) = recovered.first() {
        return Err(to_parse_error(&source_map, err));
    }

    Ok(SyntaxTree { source_map, module })
}

fn to_parse_error(source_map: &SourceMap, err: &SwcParseError) -> ParseError {
    let loc = source_map.lookup_char_pos(err.span().lo);
    ParseError::new(
        err.kind().msg(),
        loc.line as u32,
        loc.col.0 as u32 + 1,
    )
}
