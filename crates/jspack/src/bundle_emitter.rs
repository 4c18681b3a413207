//! Bundle Emitter
//!
//! Wraps the module table and a fixed runtime loader into one self-invoking
//! expression. The loader keeps one exports object per module identity and
//! registers it in its cache before the module body runs, so diamonds share
//! a single instance and import cycles observe partially filled exports
//! instead of recursing.

use std::{collections::BTreeMap, fmt, str::FromStr};

use cow_utils::CowUtils;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    errors::EmitError,
    types::{DependencyMap, ModuleId, ModuleTable},
    util::{sha256_hex, short_hash},
};

/// How module code is stored in the artifact and executed by the loader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderStyle {
    /// Code is a string evaluated with `new Function("require", "exports", code)`
    #[default]
    Eval,
    /// Code is emitted as a `function (require, exports) { ... }` unit
    Factory,
}

impl fmt::Display for LoaderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eval => write!(f, "eval"),
            Self::Factory => write!(f, "factory"),
        }
    }
}

impl FromStr for LoaderStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eval" => Ok(Self::Eval),
            "factory" => Ok(Self::Factory),
            other => Err(format!(
                "unknown loader '{other}' (expected eval or factory)"
            )),
        }
    }
}

/// The emitted artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub text: String,
    /// SHA-256 of everything after the banner line
    pub hash: String,
    pub module_count: usize,
}

const LOADER_HEAD: &str = r#"(function (modules) {
  var cache = {};
  var hasOwn = Object.prototype.hasOwnProperty;
  function require(id) {
    if (hasOwn.call(cache, id)) {
      return cache[id];
    }
    if (!hasOwn.call(modules, id)) {
      throw new Error("Cannot find module '" + id + "' in bundle");
    }
    var record = modules[id];
    var exports = {};
    cache[id] = exports;
    function localRequire(specifier) {
      if (!hasOwn.call(record.deps, specifier)) {
        throw new Error("Cannot resolve '" + specifier + "' from module '" + id + "'");
      }
      return require(record.deps[specifier]);
    }
"#;

const EVAL_INVOKE: &str =
    "    new Function(\"require\", \"exports\", record.code)(localRequire, exports);\n";

const FACTORY_INVOKE: &str = "    record.factory(localRequire, exports);\n";

const LOADER_TAIL: &str = "    return exports;\n  }\n";

#[derive(Serialize)]
struct TableEntry<'a> {
    code: &'a str,
    deps: &'a DependencyMap,
}

/// Emit the bundle for `entry`.
///
/// Fails without producing any text when the entry is not in the table or
/// when a dependency map points outside of it.
pub fn emit(
    entry: &ModuleId,
    table: &ModuleTable,
    style: LoaderStyle,
) -> Result<Bundle, EmitError> {
    if !table.contains(entry) {
        return Err(EmitError::MissingEntry(entry.clone()));
    }
    if let Some((module, specifier, target)) = table.missing_dependencies().into_iter().next() {
        return Err(EmitError::DanglingDependency {
            module: module.clone(),
            specifier: specifier.to_owned(),
            target: target.clone(),
        });
    }

    let mut body = String::from(LOADER_HEAD);
    body.push_str(match style {
        LoaderStyle::Eval => EVAL_INVOKE,
        LoaderStyle::Factory => FACTORY_INVOKE,
    });
    body.push_str(LOADER_TAIL);
    body.push_str(&format!(
        "  require({});\n}})(",
        serde_json::to_string(entry.as_str())?
    ));
    match style {
        LoaderStyle::Eval => body.push_str(&eval_table(table)?),
        LoaderStyle::Factory => body.push_str(&factory_table(table)?),
    }
    body.push_str(");\n");

    let hash = sha256_hex(body.as_bytes());
    let banner = format!(
        "/* jspack {} | entry {} | {} modules | loader {style} | sha256 {} */\n",
        env!("CARGO_PKG_VERSION"),
        entry.as_str().cow_replace("*/", "*\\/"),
        table.len(),
        short_hash(&hash, 16)
    );
    debug!(
        "Emitted {} bytes for {} module(s) with the {style} loader",
        banner.len() + body.len(),
        table.len()
    );

    let mut text = banner;
    text.push_str(&body);
    Ok(Bundle {
        text,
        hash,
        module_count: table.len(),
    })
}

/// `{"<id>": {"code": "...", "deps": {...}}, ...}` with identities sorted
fn eval_table(table: &ModuleTable) -> Result<String, EmitError> {
    let sorted: BTreeMap<&str, TableEntry<'_>> = table
        .iter()
        .map(|record| {
            (
                record.id.as_str(),
                TableEntry {
                    code: &record.code,
                    deps: &record.deps,
                },
            )
        })
        .collect();
    Ok(serde_json::to_string(&sorted)?)
}

/// Object literal whose values carry the module code as factory functions
fn factory_table(table: &ModuleTable) -> Result<String, EmitError> {
    let mut records: Vec<_> = table.iter().collect();
    records.sort_by(|a, b| a.id.cmp(&b.id));

    let mut out = String::from("{\n");
    for (index, record) in records.iter().enumerate() {
        out.push_str(&format!(
            "{}: {{\ndeps: {},\nfactory: function (require, exports) {{\n{}",
            serde_json::to_string(record.id.as_str())?,
            serde_json::to_string(&record.deps)?,
            record.code
        ));
        if !record.code.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("}\n}");
        if index + 1 < records.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push('}');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::ModuleRecord;

    fn id(path: &str) -> ModuleId {
        ModuleId::from_path(Path::new(path)).unwrap()
    }

    fn record(module: &str, code: &str, deps: &[(&str, &str)]) -> ModuleRecord {
        ModuleRecord {
            id: id(module),
            code: code.to_owned(),
            deps: deps
                .iter()
                .map(|(spec, target)| ((*spec).to_owned(), id(target)))
                .collect(),
            content_hash: String::new(),
        }
    }

    fn body(bundle: &Bundle) -> &str {
        bundle
            .text
            .split_once('\n')
            .map_or(bundle.text.as_str(), |(_, rest)| rest)
    }

    fn two_module_table() -> ModuleTable {
        let mut table = ModuleTable::new();
        table.insert(record(
            "/app/main.js",
            "var _a = require(\"./a.js\");\n",
            &[("./a.js", "/app/a.js")],
        ));
        table.insert(record("/app/a.js", "exports.x = 1;\n", &[]));
        table
    }

    #[test]
    fn test_eval_bundle_layout() {
        let bundle = emit(&id("/app/main.js"), &two_module_table(), LoaderStyle::Eval).unwrap();

        assert!(bundle.text.starts_with("/* jspack "));
        assert_eq!(bundle.module_count, 2);
        assert_snapshot!(body(&bundle), @r#"
        (function (modules) {
          var cache = {};
          var hasOwn = Object.prototype.hasOwnProperty;
          function require(id) {
            if (hasOwn.call(cache, id)) {
              return cache[id];
            }
            if (!hasOwn.call(modules, id)) {
              throw new Error("Cannot find module '" + id + "' in bundle");
            }
            var record = modules[id];
            var exports = {};
            cache[id] = exports;
            function localRequire(specifier) {
              if (!hasOwn.call(record.deps, specifier)) {
                throw new Error("Cannot resolve '" + specifier + "' from module '" + id + "'");
              }
              return require(record.deps[specifier]);
            }
            new Function("require", "exports", record.code)(localRequire, exports);
            return exports;
          }
          require("/app/main.js");
        })({"/app/a.js":{"code":"exports.x = 1;\n","deps":{}},"/app/main.js":{"code":"var _a = require(\"./a.js\");\n","deps":{"./a.js":"/app/a.js"}}});
        "#);
    }

    #[test]
    fn test_factory_bundle_embeds_functions() {
        let bundle = emit(
            &id("/app/main.js"),
            &two_module_table(),
            LoaderStyle::Factory,
        )
        .unwrap();

        let text = body(&bundle);
        assert!(text.contains("    record.factory(localRequire, exports);\n"));
        assert!(text.contains(
            "\"/app/a.js\": {\ndeps: {},\nfactory: function (require, exports) {\nexports.x = 1;\n}\n},\n"
        ));
        assert!(text.ends_with("}\n}\n});\n"));
        assert!(!text.contains("new Function"));
    }

    #[test]
    fn test_output_does_not_depend_on_insertion_order() {
        let forward = two_module_table();
        let mut backward = ModuleTable::new();
        for record in forward.iter().collect::<Vec<_>>().into_iter().rev() {
            backward.insert(record.clone());
        }

        for style in [LoaderStyle::Eval, LoaderStyle::Factory] {
            let a = emit(&id("/app/main.js"), &forward, style).unwrap();
            let b = emit(&id("/app/main.js"), &backward, style).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_entry_is_json_escaped() {
        let mut table = ModuleTable::new();
        table.insert(record("/app/we\"ird*/.js", "", &[]));
        let bundle = emit(&id("/app/we\"ird*/.js"), &table, LoaderStyle::Eval).unwrap();

        assert!(bundle.text.contains("require(\"/app/we\\\"ird*/.js\");"));
        let banner = bundle.text.lines().next().unwrap();
        assert!(banner.contains("entry /app/we\"ird*\\/.js"), "{banner}");
        assert_eq!(banner.matches("*/").count(), 1);
    }

    #[test]
    fn test_missing_entry_is_rejected() {
        let err = emit(&id("/app/other.js"), &two_module_table(), LoaderStyle::Eval).unwrap_err();
        assert!(matches!(err, EmitError::MissingEntry(ref m) if m.as_str() == "/app/other.js"));
    }

    #[test]
    fn test_dangling_dependency_is_rejected() {
        let mut table = ModuleTable::new();
        table.insert(record("/app/main.js", "", &[("./gone.js", "/app/gone.js")]));
        let err = emit(&id("/app/main.js"), &table, LoaderStyle::Eval).unwrap_err();
        assert_eq!(
            err.to_string(),
            "module /app/main.js maps './gone.js' to /app/gone.js, which is not part of the \
             module table"
        );
    }

    #[test]
    fn test_banner_hash_matches_body() {
        let bundle = emit(&id("/app/main.js"), &two_module_table(), LoaderStyle::Eval).unwrap();
        assert_eq!(bundle.hash, sha256_hex(body(&bundle).as_bytes()));
        assert!(bundle.text.lines().next().unwrap().contains(&bundle.hash[..16]));
    }

    #[test]
    fn test_loader_style_from_str() {
        assert_eq!("Factory".parse::<LoaderStyle>(), Ok(LoaderStyle::Factory));
        assert!("amd".parse::<LoaderStyle>().is_err());
    }
}
