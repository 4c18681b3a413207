use std::{fs, path::Path, sync::Arc};

use jspack::{
    bundle_emitter::LoaderStyle,
    config::Config,
    errors::BundleError,
    graph_builder::GraphBuilder,
    module_builder::ModuleBuilder,
    orchestrator::BundleOrchestrator,
    resolver,
    storage::FileSystem,
    transform::{EsmTransform, Target},
    types::ModuleId,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn module(dir: &Path, name: &str) -> ModuleId {
    resolver::resolve(dir, name).unwrap()
}

fn orchestrator(dir: &Path, entry: &str, loader: LoaderStyle, jobs: usize) -> BundleOrchestrator {
    let config = Config {
        entry: Some(entry.into()),
        jobs,
        loader,
        ..Config::default()
    };
    BundleOrchestrator::new(config, Arc::new(FileSystem), dir)
}

#[test]
fn test_entry_with_two_imports_on_disk() {
    let dir = write_project(&[
        (
            "main.js",
            "import { a } from './a.js';\nimport { b } from './b.js';\nconsole.log(a, b);\n",
        ),
        ("a.js", "export const a = 'a';\n"),
        ("b.js", "import './lib/util.js';\nexport const b = 'b';\n"),
        ("lib/util.js", "export const util = 0;\n"),
    ]);
    let root = dir.path();

    let builder = ModuleBuilder::new(EsmTransform::new(), Arc::new(FileSystem), Target::Es5);
    let table = GraphBuilder::new(builder)
        .with_jobs(2)
        .discover(&module(root, "main.js"))
        .unwrap();

    assert_eq!(table.len(), 4);
    let entry = table.get(&module(root, "main.js")).unwrap();
    assert_eq!(entry.deps.len(), 2);
    assert_eq!(entry.deps["./a.js"], module(root, "a.js"));
    assert_eq!(entry.deps["./b.js"], module(root, "b.js"));

    let b = table.get(&module(root, "b.js")).unwrap();
    assert_eq!(b.deps["./lib/util.js"], module(root, "lib/util.js"));
}

#[test]
fn test_bundle_is_written_to_output_directory() {
    let dir = write_project(&[
        ("src/main.js", "import { greet } from './greet.js';\ngreet();\n"),
        ("src/greet.js", "export function greet() { return 'hi'; }\n"),
    ]);

    let summary = orchestrator(dir.path(), "src/main.js", LoaderStyle::Eval, 2)
        .bundle()
        .unwrap();

    assert_eq!(summary.output_path, dir.path().join("dist/main.js"));
    assert_eq!(summary.module_count, 2);
    let text = fs::read_to_string(&summary.output_path).unwrap();
    assert!(text.starts_with("/* jspack "));
    assert!(text.contains(&format!("sha256 {}", &summary.hash[..16])));
}

#[test]
fn test_missing_import_fails_without_artifact() {
    let dir = write_project(&[("main.js", "import { x } from './missing.js';\n")]);

    let err = orchestrator(dir.path(), "main.js", LoaderStyle::Eval, 2)
        .bundle()
        .unwrap_err();

    let BundleError::Discovery(discovery) = &err else {
        panic!("expected a discovery error, got {err:?}");
    };
    assert_eq!(discovery.module, module(dir.path(), "missing.js"));
    assert_eq!(discovery.specifier.as_deref(), Some("./missing.js"));
    assert!(err.to_string().contains("missing.js"));
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn test_syntax_error_names_the_module() {
    let dir = write_project(&[
        ("main.js", "import './broken.js';\n"),
        ("broken.js", "function broken( {\n"),
    ]);

    let err = orchestrator(dir.path(), "main.js", LoaderStyle::Eval, 1)
        .bundle()
        .unwrap_err();

    let BundleError::Discovery(discovery) = &err else {
        panic!("expected a discovery error, got {err:?}");
    };
    assert_eq!(discovery.source.kind(), "ParseError");
    assert_eq!(discovery.module, module(dir.path(), "broken.js"));
    assert!(!dir.path().join("dist").exists());
}

#[test]
fn test_cycles_are_bundled_and_reported() {
    let dir = write_project(&[
        ("main.js", "import './a.js';\n"),
        ("a.js", "import './b.js';\n"),
        ("b.js", "import './a.js';\n"),
    ]);

    let summary = orchestrator(dir.path(), "main.js", LoaderStyle::Eval, 2)
        .bundle()
        .unwrap();

    assert_eq!(summary.module_count, 3);
    assert_eq!(summary.cycles.len(), 1);
    assert_eq!(
        summary.cycles[0].modules,
        vec![module(dir.path(), "a.js"), module(dir.path(), "b.js")]
    );
}

#[test]
fn test_two_spellings_share_one_record() {
    let dir = write_project(&[
        ("main.js", "import './lib/a.js';\nimport './lib/../lib/./a.js';\n"),
        ("lib/a.js", "export const a = 1;\n"),
    ]);

    let output = orchestrator(dir.path(), "main.js", LoaderStyle::Eval, 2)
        .build()
        .unwrap();

    assert_eq!(output.table.len(), 2);
    let entry = output.table.get(&module(dir.path(), "main.js")).unwrap();
    assert_eq!(entry.deps.len(), 2);
    assert_eq!(entry.deps["./lib/a.js"], entry.deps["./lib/../lib/./a.js"]);
}

#[test]
fn test_output_is_identical_across_runs_and_job_counts() {
    let dir = write_project(&[
        (
            "main.js",
            "import './a.js';\nimport './b.js';\nimport './c.js';\nimport './d.js';\n",
        ),
        ("a.js", "import './shared.js';\nexport const a = 1;\n"),
        ("b.js", "import './shared.js';\nexport const b = 2;\n"),
        ("c.js", "import './b.js';\nexport const c = 3;\n"),
        ("d.js", "import './a.js';\nexport const d = 4;\n"),
        ("shared.js", "export default {};\n"),
    ]);

    for loader in [LoaderStyle::Eval, LoaderStyle::Factory] {
        let first = orchestrator(dir.path(), "main.js", loader, 1).build().unwrap();
        let second = orchestrator(dir.path(), "main.js", loader, 8).build().unwrap();
        assert_eq!(first.bundle.text, second.bundle.text);
        assert_eq!(first.bundle.hash, second.bundle.hash);
    }
}

#[test]
fn test_project_config_file_drives_the_run() {
    let dir = write_project(&[
        (
            "jspack.toml",
            "entry = \"app/index.js\"\noutput_directory = \"build\"\noutput_filename = \"app.js\"\nloader = \"factory\"\ntarget = \"es2015\"\n",
        ),
        ("app/index.js", "import { v } from './v.js';\nconsole.log(v);\n"),
        ("app/v.js", "export const v = 1;\n"),
    ]);

    let config = Config::load_from(None, dir.path(), None, |_| None).unwrap();
    let summary = BundleOrchestrator::new(config, Arc::new(FileSystem), dir.path())
        .bundle()
        .unwrap();

    assert_eq!(summary.output_path, dir.path().join("build/app.js"));
    let text = fs::read_to_string(&summary.output_path).unwrap();
    assert!(text.contains("| loader factory |"));
    assert!(text.contains("const _v = require(\"./v.js\")"), "{text}");
    assert!(text.contains("console.log(_v.v)"), "{text}");
}
