// tests/pipeline.rs

//! Whole-pipeline behaviour: real git for the checkout, a scripted `dotnet`
//! for build, queries and runs.

mod common;
use crate::common::builders::{ConfigFileBuilder, PatcherConfigBuilder};
use crate::common::{
    DEFAULT_BRANCH, FakeProcessRunner, FakeResponse, GitFixture, PROJECT_SUBPATH, init_tracing,
    with_timeout,
};

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use patchrun::engine::ScopedQueues;
use patchrun::errors::PatchrunError;
use patchrun::fs::RealFileSystem;
use patchrun::patcher::PatcherPipeline;
use patchrun::protocol::{
    BuildMeta, ExitCode, LibraryPackages, RunnabilityOutcome, SettingsLineParser, SettingsStyle,
    SettingsTarget,
};

type TestResult = Result<(), Box<dyn Error>>;

const NAME: &str = "Demo";

fn pipeline_with(
    fx: &GitFixture,
    fake: &FakeProcessRunner,
    build_meta: Option<&Path>,
    parser: Option<Arc<dyn SettingsLineParser>>,
) -> PatcherPipeline {
    let mut patcher = PatcherConfigBuilder::new(&fx.local, PROJECT_SUBPATH).branch(DEFAULT_BRANCH);
    if let Some(path) = build_meta {
        patcher = patcher.build_meta(path);
    }
    let cfg = ConfigFileBuilder::new()
        .with_data_folder("/games/Skyrim/Data")
        .with_patcher(NAME, patcher.build())
        .build();
    let patcher = cfg.patcher(NAME).cloned().expect("patcher configured");

    fake.pass_through("git");
    let queues = ScopedQueues::new();
    let process = Arc::new(fake.clone());
    let fs = Arc::new(RealFileSystem);
    match parser {
        Some(parser) => {
            PatcherPipeline::with_parser(patcher, cfg.runner.clone(), process, fs, &queues, parser)
        }
        None => PatcherPipeline::new(patcher, cfg.runner.clone(), process, fs, &queues),
    }
}

fn pipeline(fx: &GitFixture, fake: &FakeProcessRunner) -> PatcherPipeline {
    pipeline_with(fx, fake, None, None)
}

#[tokio::test]
async fn run_checks_out_builds_checks_and_runs() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    let pipeline = pipeline(&fx, &fake);
    let cancel = CancellationToken::new();

    let output = PathBuf::from("/tmp/out/Synthesis.esp");
    let report = with_timeout(pipeline.run(Path::new("/tmp/plugins.txt"), &output, &cancel)).await?;

    assert_eq!(report.commit, fx.initial_commit);
    assert_eq!(report.output_path, output);
    assert!(report.runnability.is_runnable());

    assert_eq!(fake.count("build"), 1);
    assert_eq!(fake.count("CheckRunnability"), 1);
    assert_eq!(fake.count("RunPatcher"), 1);

    // git is passed through, so the build is the first scripted call.
    assert_eq!(fake.calls()[0].args[0], "build");

    let run = fake
        .calls()
        .into_iter()
        .find(|inv| inv.args.iter().any(|a| a == "RunPatcher"))
        .expect("patcher was run");
    let pos = run.args.iter().position(|a| a == "--PatcherName").expect("name passed");
    assert_eq!(run.args[pos + 1], NAME);
    assert!(run.args.iter().any(|a| a == "/tmp/out/Synthesis.esp"));
    Ok(())
}

#[tokio::test]
async fn not_runnable_stops_before_the_run() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    fake.respond(
        "CheckRunnability",
        FakeResponse::exit(ExitCode::NotRunnable.raw())
            .stdout(["Missing master: Dawnguard.esm", "Enable it and retry"]),
    );
    let pipeline = pipeline(&fx, &fake);
    let cancel = CancellationToken::new();

    let err = with_timeout(pipeline.run(
        Path::new("/tmp/plugins.txt"),
        Path::new("/tmp/out.esp"),
        &cancel,
    ))
    .await
    .unwrap_err();

    match err {
        PatchrunError::NotRunnable(reason) => {
            assert_eq!(reason, "Missing master: Dawnguard.esm\nEnable it and retry");
        }
        other => panic!("expected NotRunnable, got {other:?}"),
    }
    assert_eq!(fake.count("RunPatcher"), 0);
    Ok(())
}

#[tokio::test]
async fn wrapped_not_runnable_code_is_recognised() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    fake.respond("CheckRunnability", FakeResponse::exit(252).stdout(["nope"]));
    let pipeline = pipeline(&fx, &fake);

    let outcome = with_timeout(
        pipeline.check_runnability(Path::new("/tmp/plugins.txt"), &CancellationToken::new()),
    )
    .await?;
    assert_eq!(outcome, RunnabilityOutcome::NotRunnable("nope".to_string()));
    Ok(())
}

#[tokio::test]
async fn build_failure_reports_compiler_errors() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    fake.respond(
        "build",
        FakeResponse::exit(1).stdout([
            "  Determining projects to restore...",
            "Program.cs(3,1): error CS1002: ; expected [Patcher.csproj]",
            "Program.cs(3,1): error CS1002: ; expected [Patcher.csproj]",
            "Build FAILED.",
        ]),
    );
    let pipeline = pipeline(&fx, &fake);

    let err = with_timeout(pipeline.check_runnability(
        Path::new("/tmp/plugins.txt"),
        &CancellationToken::new(),
    ))
    .await
    .unwrap_err();

    match err {
        PatchrunError::Build(reason) => {
            assert!(reason.contains("CS1002"));
            assert_eq!(reason.matches("CS1002").count(), 1);
        }
        other => panic!("expected Build, got {other:?}"),
    }
    assert_eq!(fake.count("CheckRunnability"), 0);
    Ok(())
}

#[tokio::test]
async fn not_needed_is_cached_and_short_circuits() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let meta_dir = tempfile::tempdir()?;
    let meta_path = meta_dir.path().join("bin").join("BuildMeta.json");
    let fake = FakeProcessRunner::new();
    fake.respond(
        "CheckRunnability",
        FakeResponse::exit(ExitCode::NotNeeded.raw()),
    );
    let pipeline = pipeline_with(&fx, &fake, Some(&meta_path), None);
    let cancel = CancellationToken::new();
    let load_order = Path::new("/tmp/plugins.txt");

    let first = with_timeout(pipeline.check_runnability(load_order, &cancel)).await?;
    assert_eq!(first, RunnabilityOutcome::Runnable(ExitCode::NotNeeded));

    let meta: BuildMeta = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
    assert!(meta.does_not_have_runnability);
    assert_eq!(meta.commit.as_deref(), Some(fx.initial_commit.as_str()));

    let second = with_timeout(pipeline.check_runnability(load_order, &cancel)).await?;
    assert_eq!(second, RunnabilityOutcome::ShortCircuited);
    assert_eq!(fake.count("CheckRunnability"), 1);
    assert_eq!(fake.count("build"), 2);
    Ok(())
}

#[tokio::test]
async fn meta_from_another_commit_is_replaced() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let meta_dir = tempfile::tempdir()?;
    let meta_path = meta_dir.path().join("BuildMeta.json");
    std::fs::write(
        &meta_path,
        r#"{ "identity": "0000", "does_not_have_runnability": true }"#,
    )?;
    let fake = FakeProcessRunner::new();
    let pipeline = pipeline_with(&fx, &fake, Some(&meta_path), None);

    let outcome = with_timeout(
        pipeline.check_runnability(Path::new("/tmp/plugins.txt"), &CancellationToken::new()),
    )
    .await?;
    assert_eq!(outcome, RunnabilityOutcome::Runnable(ExitCode::Success));
    assert_eq!(fake.count("CheckRunnability"), 1);

    let meta: BuildMeta = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
    assert!(!meta.does_not_have_runnability);
    Ok(())
}

#[tokio::test]
async fn failing_patcher_reports_exit_code_and_output() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    fake.respond(
        "RunPatcher",
        FakeResponse::exit(3).stderr(["Unhandled exception: boom"]),
    );
    let pipeline = pipeline(&fx, &fake);

    let err = with_timeout(pipeline.run(
        Path::new("/tmp/plugins.txt"),
        Path::new("/tmp/out.esp"),
        &CancellationToken::new(),
    ))
    .await
    .unwrap_err();

    match err {
        PatchrunError::PatcherFailed { code, message } => {
            assert_eq!(code, 3);
            assert!(message.contains("boom"));
        }
        other => panic!("expected PatcherFailed, got {other:?}"),
    }
    Ok(())
}

struct CountingParser(Arc<AtomicUsize>);

impl SettingsLineParser for CountingParser {
    fn parse(&self, lines: &[String]) -> Vec<SettingsTarget> {
        self.0.fetch_add(1, Ordering::SeqCst);
        lines
            .iter()
            .map(|l| SettingsTarget {
                type_name: l.clone(),
                anchor_path: String::new(),
                target_path: String::new(),
            })
            .collect()
    }
}

#[tokio::test]
async fn settings_style_parses_reflected_classes_once() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    fake.respond(
        "SettingsQuery",
        FakeResponse::exit(ExitCode::AutogeneratedSettingsClass.raw())
            .stdout(["Demo.Settings", "Demo.Extra"]),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with(&fx, &fake, None, Some(Arc::new(CountingParser(calls.clone()))));

    let result =
        with_timeout(pipeline.settings_style(false, &CancellationToken::new())).await?;
    assert_eq!(result.style, SettingsStyle::SpecifiedClass);
    assert_eq!(result.targets.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fake.count("build"), 0);
    Ok(())
}

#[tokio::test]
async fn settings_style_open_and_none() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    fake.respond(
        "SettingsQuery",
        FakeResponse::exit(ExitCode::OpensForSettings.raw()),
    );
    let pipeline = pipeline(&fx, &fake);

    let result = with_timeout(pipeline.settings_style(true, &CancellationToken::new())).await?;
    assert_eq!(result.style, SettingsStyle::Open);
    assert!(result.targets.is_empty());
    assert_eq!(fake.count("build"), 1);

    let other = FakeProcessRunner::new();
    other.respond("SettingsQuery", FakeResponse::exit(ExitCode::Unsupported.raw()));
    let pipeline = pipeline_with(&fx, &other, None, None);
    let result = with_timeout(pipeline.settings_style(false, &CancellationToken::new())).await?;
    assert_eq!(result.style, SettingsStyle::None);
    Ok(())
}

#[tokio::test]
async fn versions_are_read_and_recorded() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let meta_dir = tempfile::tempdir()?;
    let meta_path = meta_dir.path().join("BuildMeta.json");
    let fake = FakeProcessRunner::new();
    fake.respond(
        "list",
        FakeResponse::exit(0).stdout([
            "Project 'Patcher' has the following package references",
            "   [net8.0]: ",
            "   Top-level Package             Requested   Resolved   Latest",
            "   > Mutagen.Bethesda.Skyrim     0.40.0      0.40.0     0.41.2",
            "   > Mutagen.Bethesda.Synthesis  0.28.0      0.28.0     0.29.1",
        ]),
    );
    let pipeline = pipeline_with(&fx, &fake, Some(&meta_path), None);

    let versions = with_timeout(pipeline.versions(
        &LibraryPackages::default(),
        true,
        false,
        &CancellationToken::new(),
    ))
    .await?;
    assert_eq!(versions.library.as_deref(), Some("0.40.0"));
    assert_eq!(versions.framework.as_deref(), Some("0.28.0"));

    let meta: BuildMeta = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
    assert_eq!(meta.library_version.as_deref(), Some("0.40.0"));
    assert_eq!(meta.framework_version.as_deref(), Some("0.28.0"));

    let list = fake
        .calls()
        .into_iter()
        .find(|inv| inv.args.iter().any(|a| a == "list"))
        .expect("listing ran");
    assert!(!list.args.iter().any(|a| a == "--outdated"));
    Ok(())
}

#[tokio::test]
async fn listing_stderr_fails_the_query() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    fake.respond(
        "list",
        FakeResponse::exit(0)
            .stdout(["Top-level Package", "> Mutagen.Bethesda 1 1 2"])
            .stderr(["error: NU1101 Unable to find package"]),
    );
    let pipeline = pipeline(&fx, &fake);

    let err = with_timeout(pipeline.versions(
        &LibraryPackages::default(),
        false,
        true,
        &CancellationToken::new(),
    ))
    .await
    .unwrap_err();
    match err {
        PatchrunError::PackageListing(message) => assert!(message.contains("NU1101")),
        other => panic!("expected PackageListing, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn cancelling_a_running_patcher_returns_cancelled() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    fake.respond("RunPatcher", FakeResponse::hang());
    let pipeline = pipeline(&fx, &fake);
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        let fake = fake.clone();
        tokio::spawn(async move {
            while fake.count("RunPatcher") == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
            cancel.cancel();
        })
    };

    let err = with_timeout(pipeline.run(
        Path::new("/tmp/plugins.txt"),
        Path::new("/tmp/out.esp"),
        &cancel,
    ))
    .await
    .unwrap_err();
    assert!(err.is_cancelled());
    canceller.await?;
    Ok(())
}

#[tokio::test]
async fn settings_and_package_queries_wait_for_a_running_build() -> TestResult {
    init_tracing();
    let fx = GitFixture::new();
    let fake = FakeProcessRunner::new();
    let slow = Duration::from_millis(50);
    fake.respond("build", FakeResponse::exit(0).delayed(slow));
    fake.respond("restore", FakeResponse::exit(0).delayed(slow));
    fake.respond("list", FakeResponse::exit(0).delayed(slow));
    fake.respond(
        "SettingsQuery",
        FakeResponse::exit(ExitCode::OpensForSettings.raw()).delayed(slow),
    );
    let pipeline = pipeline(&fx, &fake);
    let cancel = CancellationToken::new();

    let checkout = with_timeout(pipeline.checkout(&cancel)).await?;
    let packages = LibraryPackages::default();
    let (built, settings, versions) = with_timeout(async {
        tokio::join!(
            pipeline.build(&checkout, &cancel),
            pipeline.settings_style(false, &cancel),
            pipeline.versions(&packages, true, false, &cancel),
        )
    })
    .await;
    built?;
    assert_eq!(settings?.style, SettingsStyle::Open);
    versions?;

    assert_eq!(fake.count("build"), 1);
    assert_eq!(fake.count("restore"), 1);
    assert_eq!(fake.count("SettingsQuery"), 1);
    assert_eq!(fake.max_concurrent(), 1);
    Ok(())
}
