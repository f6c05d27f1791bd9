//! End-to-end build tests
//!
//! Runs the whole pipeline against a temporary project with a fake toolchain
//! that lays down the files `npm install` and `prisma generate` would produce.

use std::cell::RefCell;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use layerpack::{
    BuildStage, LayerBuilder, LayerError, LayerLayout, LayerPaths, RemovalStatus, ToolCommand,
    ToolError, ToolRunner,
};
use tempfile::TempDir;

const SCHEMA: &str = "generator client {\n  provider = \"prisma-client-js\"\n  binaryTargets = [\"native\"]\n}\n";

/// Writes the artifacts each toolchain step would generate in the staging dir
#[derive(Default)]
struct FakeToolchain {
    calls: RefCell<Vec<(String, PathBuf)>>,
    fail_on: Option<&'static str>,
}

impl ToolRunner for FakeToolchain {
    fn run(&self, tool: &ToolCommand, cwd: &Path) -> Result<(), ToolError> {
        self.calls
            .borrow_mut()
            .push((tool.label.clone(), cwd.to_path_buf()));
        if self.fail_on == Some(tool.label.as_str()) {
            return Err(ToolError::ExitedNonZero {
                label: tool.label.clone(),
                code: Some(1),
            });
        }

        let modules = cwd.join("node_modules");
        match tool.label.as_str() {
            "npm install" => {
                for dir in ["@prisma/engines/dist", "@prisma/client", ".bin", ".cache/prisma", "prisma/build"] {
                    fs::create_dir_all(modules.join(dir)).unwrap();
                }
                fs::write(modules.join("@prisma/engines/dist/index.js"), "engines").unwrap();
                fs::write(modules.join("@prisma/client/index.js"), "client").unwrap();
                fs::write(modules.join(".bin/prisma"), "#!/bin/sh\n").unwrap();
                fs::write(modules.join("prisma/build/index.js"), "cli").unwrap();
            }
            "prisma generate" => {
                let client = modules.join(".prisma/client");
                fs::create_dir_all(&client).unwrap();
                fs::write(client.join("index.js"), "generated").unwrap();
                fs::write(client.join("schema.prisma"), "copied schema").unwrap();
                fs::write(client.join("query_engine-rhel-openssl-1.0.x.so.node"), "bin").unwrap();
                fs::write(client.join("query_engine-darwin.dylib.node"), "bin").unwrap();
            }
            _ => {}
        }
        Ok(())
    }
}

fn project() -> (TempDir, LayerPaths) {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join(".env.develop"), "DATABASE_URL=postgres://localhost/dev\n").unwrap();
    fs::create_dir_all(root.join("prisma")).unwrap();
    fs::write(root.join("prisma/schema.prisma"), SCHEMA).unwrap();
    fs::create_dir_all(root.join("layers/api_prisma_layer/nodejs")).unwrap();
    fs::write(
        root.join("layers/api_prisma_layer/nodejs/package.json"),
        "{\"dependencies\":{\"@prisma/client\":\"*\"}}",
    )
    .unwrap();
    let paths = LayerPaths::from_project_root(root, ".env.develop", &LayerLayout::default()).unwrap();
    (temp, paths)
}

fn archive_names(archive: &Path) -> Vec<String> {
    let zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
    zip.file_names().map(str::to_string).collect()
}

#[test]
fn full_build_produces_pruned_archive() {
    let (_temp, paths) = project();
    let staging = paths.staging_dir.clone();
    let archive = paths.archive.clone();
    let tools = FakeToolchain::default();

    let report = LayerBuilder::new(paths, LayerLayout::default(), &tools)
        .run()
        .unwrap();

    // Every tool ran inside staging
    let calls = tools.calls.borrow();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(_, cwd)| *cwd == staging));

    // Staged inputs
    assert_eq!(
        fs::read_to_string(staging.join(".env")).unwrap(),
        "DATABASE_URL=postgres://localhost/dev\n"
    );
    let schema = fs::read_to_string(staging.join("schema.prisma")).unwrap();
    assert!(schema.contains("  binaryTargets = [\"rhel-openssl-1.0.x\"]\n"));
    assert!(!schema.contains("native"));
    assert_eq!(report.patch.replaced, 1);

    let names = archive_names(&archive);
    for kept in [
        "nodejs/.env",
        "nodejs/package.json",
        "nodejs/schema.prisma",
        "nodejs/node_modules/@prisma/client/index.js",
        "nodejs/node_modules/.prisma/client/index.js",
        "nodejs/node_modules/.prisma/client/schema.prisma",
    ] {
        assert!(names.iter().any(|n| n == kept), "{} missing from archive", kept);
    }
    for pruned in [
        "nodejs/schema.prisma.bak",
        "nodejs/node_modules/@prisma/engines/",
        "nodejs/node_modules/.bin/",
        "nodejs/node_modules/.cache/",
        "nodejs/node_modules/prisma/",
        "nodejs/node_modules/.prisma/client/query_engine",
    ] {
        assert!(
            !names.iter().any(|n| n.starts_with(pruned)),
            "{} should have been pruned",
            pruned
        );
    }
    assert_eq!(report.archive.entries, names.len());
}

#[test]
fn report_records_every_stage_in_order() {
    let (_temp, paths) = project();

    let report = LayerBuilder::new(paths, LayerLayout::default(), &FakeToolchain::default())
        .run()
        .unwrap();

    let stages: Vec<BuildStage> = report.stages.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec![
            BuildStage::ArgsValidated,
            BuildStage::Staged,
            BuildStage::Patched,
            BuildStage::ToolchainRun,
            BuildStage::Pruned,
            BuildStage::Archived,
        ]
    );
    assert_eq!(
        report.toolchain,
        vec![
            "npm install",
            "npx dotenv -e .env -- npx prisma format --schema ./schema.prisma",
            "npx dotenv -e .env -- npx prisma generate --schema ./schema.prisma",
        ]
    );
}

#[test]
fn previous_run_leftovers_are_replaced() {
    let (_temp, paths) = project();
    let staging = paths.staging_dir.clone();
    let archive = paths.archive.clone();
    fs::create_dir_all(staging.join("node_modules/stale-package")).unwrap();
    fs::write(staging.join("yarn.lock"), "# stale").unwrap();
    fs::write(staging.join(".env"), "OLD=1\n").unwrap();
    fs::write(&archive, "not a zip from an earlier build").unwrap();

    let report = LayerBuilder::new(paths, LayerLayout::default(), &FakeToolchain::default())
        .run()
        .unwrap();

    assert_eq!(report.previous_archive.status, RemovalStatus::Removed { count: 1 });
    let names = archive_names(&archive);
    assert!(!names.iter().any(|n| n.contains("stale-package")));
    assert!(!names.iter().any(|n| n.ends_with("yarn.lock")));
    assert!(fs::read_to_string(staging.join(".env")).unwrap().starts_with("DATABASE_URL"));
}

#[test]
fn failing_generate_aborts_without_archive() {
    let (_temp, paths) = project();
    let archive = paths.archive.clone();
    let tools = FakeToolchain {
        fail_on: Some("prisma generate"),
        ..Default::default()
    };

    let err = LayerBuilder::new(paths, LayerLayout::default(), &tools)
        .run()
        .unwrap_err();

    assert_eq!(err.stage(), Some(BuildStage::ToolchainRun));
    assert!(matches!(
        err.root(),
        LayerError::Tool(ToolError::ExitedNonZero { code: Some(1), .. })
    ));
    assert!(!archive.exists());
}

#[test]
fn missing_schema_aborts_before_staging() {
    let (temp, paths) = project();
    fs::remove_file(temp.path().join("prisma/schema.prisma")).unwrap();
    let staging = paths.staging_dir.clone();
    let tools = FakeToolchain::default();

    let err = LayerBuilder::new(paths, LayerLayout::default(), &tools)
        .run()
        .unwrap_err();

    assert_eq!(err.stage(), Some(BuildStage::ArgsValidated));
    assert!(matches!(err.root(), LayerError::SchemaNotFound(_)));
    assert!(!staging.join(".env").exists());
    assert!(tools.calls.borrow().is_empty());
}

/// Toolchain that is not installed at all
struct MissingToolchain;

impl ToolRunner for MissingToolchain {
    fn preflight(&self, programs: &[&str]) -> Result<(), ToolError> {
        Err(ToolError::NotFound {
            program: programs[programs.len() - 1].to_string(),
        })
    }

    fn run(&self, tool: &ToolCommand, _cwd: &Path) -> Result<(), ToolError> {
        panic!("{} ran although preflight failed", tool.label);
    }
}

#[test]
fn missing_toolchain_aborts_before_staging() {
    let (_temp, paths) = project();
    let staging = paths.staging_dir.clone();
    fs::create_dir_all(staging.join("node_modules/left-from-last-run")).unwrap();

    let err = LayerBuilder::new(paths, LayerLayout::default(), &MissingToolchain)
        .run()
        .unwrap_err();

    assert_eq!(err.stage(), Some(BuildStage::ArgsValidated));
    assert!(matches!(
        err.root(),
        LayerError::Tool(ToolError::NotFound { program }) if program == "npx"
    ));
    assert!(staging.join("node_modules/left-from-last-run").is_dir());
    assert!(!staging.join(".env").exists());
    assert!(!staging.join("schema.prisma").exists());
}

#[test]
fn unreadable_schema_aborts_at_patch() {
    let (temp, paths) = project();
    let staging = paths.staging_dir.clone();
    // Not valid UTF-8, so the staged copy cannot be read as text
    fs::write(temp.path().join("prisma/schema.prisma"), [0x62, 0xff, 0xfe, 0x0a]).unwrap();
    let tools = FakeToolchain::default();

    let err = LayerBuilder::new(paths, LayerLayout::default(), &tools)
        .run()
        .unwrap_err();

    assert_eq!(err.stage(), Some(BuildStage::Patched));
    assert!(matches!(err.root(), LayerError::Patch(_)));
    assert!(staging.join("schema.prisma").exists());
    assert!(tools.calls.borrow().is_empty());
}
