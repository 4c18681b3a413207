//! ES module to `require`/`exports` lowering
//!
//! Runs swc's CommonJS module pass over the parsed tree. Imported bindings are
//! rewritten into member reads on the required exports object and exported
//! bindings are published through getters, so both stay live across import
//! cycles. `Target::Es5` additionally lowers ES2015 syntax.

use swc_core::{
    common::{BytePos, GLOBALS, Globals, Mark, comments::SingleThreadedComments},
    ecma::{
        ast::{
            ArrowExpr, AwaitExpr, EsVersion, ForOfStmt, Function, MetaPropExpr, MetaPropKind,
            Pass, Program,
        },
        codegen::to_code_default,
        transforms::{
            base::{
                feature::enable_available_feature_from_es_version,
                fixer::fixer,
                helpers::{HELPERS, Helpers, inject_helpers},
                hygiene::hygiene,
                resolver,
            },
            compat::es2015::{self, es2015},
            module::{common_js, path::Resolver},
        },
        visit::{Visit, VisitWith},
    },
};

use super::{Target, TransformError, syntax::SyntaxTree};

pub(crate) fn generate(tree: &SyntaxTree, target: Target) -> Result<String, TransformError> {
    check_supported(tree)?;

    let mut module = tree.module.clone();
    // The module body runs inside a function, where `#!` is not valid
    module.shebang = None;
    let mut program = Program::Module(module);

    GLOBALS.set(&Globals::new(), || {
        HELPERS.set(&Helpers::new(false), || {
            let unresolved_mark = Mark::new();
            let top_level_mark = Mark::new();

            resolver(unresolved_mark, top_level_mark, false).process(&mut program);
            if target == Target::Es5 {
                es2015(
                    unresolved_mark,
                    None::<SingleThreadedComments>,
                    es2015::Config::default(),
                )
                .process(&mut program);
            }
            common_js::common_js(
                Resolver::Default,
                unresolved_mark,
                module_config(),
                enable_available_feature_from_es_version(target.es_version()),
            )
            .process(&mut program);
            inject_helpers(unresolved_mark).process(&mut program);
            hygiene().process(&mut program);
            fixer(None).process(&mut program);
        });
    });

    Ok(to_code_default(tree.source_map.clone(), None, &program))
}

fn module_config() -> common_js::Config {
    common_js::Config {
        strict_mode: true,
        // `import()` stays a runtime call; its target is not part of the graph
        ignore_dynamic: true,
        ..common_js::Config::default()
    }
}

impl Target {
    fn es_version(self) -> EsVersion {
        match self {
            Self::Es5 => EsVersion::Es5,
            Self::Es2015 => EsVersion::Es2015,
        }
    }
}

/// Module-level constructs the function-wrapped loader cannot run
fn check_supported(tree: &SyntaxTree) -> Result<(), TransformError> {
    let mut finder = UnsupportedFinder::default();
    tree.module.visit_with(&mut finder);

    match finder.found {
        None => Ok(()),
        Some((what, pos)) => {
            let (line, _) = tree.location(pos);
            Err(TransformError(format!(
                "{what} is not supported in bundled modules (line {line})"
            )))
        }
    }
}

#[derive(Default)]
struct UnsupportedFinder {
    found: Option<(&'static str, BytePos)>,
}

impl UnsupportedFinder {
    fn record(&mut self, what: &'static str, pos: BytePos) {
        if self.found.is_none() {
            self.found = Some((what, pos));
        }
    }
}

impl Visit for UnsupportedFinder {
    fn visit_await_expr(&mut self, node: &AwaitExpr) {
        self.record("top-level await", node.span.lo);
    }

    fn visit_for_of_stmt(&mut self, node: &ForOfStmt) {
        if node.is_await {
            self.record("top-level for await", node.span.lo);
        }
        node.visit_children_with(self);
    }

    fn visit_meta_prop_expr(&mut self, node: &MetaPropExpr) {
        if node.kind == MetaPropKind::ImportMeta {
            self.record("import.meta", node.span.lo);
        }
    }

    // Nested function bodies are their own await scope
    fn visit_function(&mut self, node: &Function) {
        let mut nested = NestedFinder::default();
        node.visit_children_with(&mut nested);
        if let Some(pos) = nested.import_meta {
            self.record("import.meta", pos);
        }
    }

    fn visit_arrow_expr(&mut self, node: &ArrowExpr) {
        let mut nested = NestedFinder::default();
        node.visit_children_with(&mut nested);
        if let Some(pos) = nested.import_meta {
            self.record("import.meta", pos);
        }
    }
}

/// `import.meta` is rejected at any depth, `await` only at the top level
#[derive(Default)]
struct NestedFinder {
    import_meta: Option<BytePos>,
}

impl Visit for NestedFinder {
    fn visit_meta_prop_expr(&mut self, node: &MetaPropExpr) {
        if node.kind == MetaPropKind::ImportMeta && self.import_meta.is_none() {
            self.import_meta = Some(node.span.lo);
        }
    }
}
