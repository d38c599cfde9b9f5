#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::process;

use buildtrail_config::{FileSpec, Settings};
use buildtrail_engine::collect::{collect_artifacts, collect_dependencies, DependencySource};
use buildtrail_engine::module::BuildTool;
use buildtrail_engine::remote::HttpRepository;
use buildtrail_engine::{
    BuildInfoManager, BuildRunKey, EngineError, FsPartialStore, ModuleResolver, PatternQuery,
    ResolveContext,
};
use buildtrail_util::glob::split_patterns;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(
    name = "buildtrail",
    about = "Record and aggregate build metadata across pipeline steps"
)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    build: BuildArgs,

    /// Step settings file
    #[arg(long, global = true, default_value = buildtrail_config::settings::SETTINGS_FILE)]
    config: PathBuf,

    /// Directory holding partial build info between steps
    #[arg(long, global = true, env = "BUILDTRAIL_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `debug`
    #[arg(long, global = true, env = "PLUGIN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Build identity and repository options shared by every subcommand.
#[derive(Debug, Args)]
struct BuildArgs {
    /// Build name
    #[arg(long, global = true, env = "PLUGIN_BUILD_NAME")]
    build_name: Option<String>,
    /// Build number
    #[arg(long, global = true, env = "PLUGIN_BUILD_NUMBER")]
    build_number: Option<String>,
    /// Project key the build belongs to
    #[arg(long, global = true, env = "PLUGIN_PROJECT")]
    project: Option<String>,
    /// Explicit module id; skips build tool detection
    #[arg(long, global = true, env = "PLUGIN_MODULE")]
    module: Option<String>,
    /// Build tool used by the step (`mvn`, `gradle`, ...)
    #[arg(long, global = true, env = "PLUGIN_BUILD_TOOL")]
    build_tool: Option<String>,
    /// Maven project descriptor (defaults to pom.xml)
    #[arg(long, global = true, env = "PLUGIN_POM_FILE")]
    pom_file: Option<PathBuf>,
    /// Artifact repository base URL
    #[arg(long, global = true, env = "PLUGIN_URL")]
    url: Option<String>,
    /// Bearer token for the artifact repository
    #[arg(long, global = true, env = "PLUGIN_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
}

/// Where collection patterns come from.
#[derive(Debug, Args)]
struct PatternArgs {
    /// File spec listing patterns
    #[arg(long, env = "PLUGIN_SPEC_PATH")]
    spec_path: Option<PathBuf>,
    /// `key=value` pairs substituted into the file spec
    #[arg(long, env = "PLUGIN_SPEC_VARS")]
    spec_vars: Option<String>,
    /// Comma-separated exclusion globs, applied to every pattern
    #[arg(long, env = "PLUGIN_EXCLUSIONS", default_value = "")]
    exclusions: String,
    /// Also match below the pattern's path
    #[arg(
        long,
        env = "PLUGIN_RECURSIVE",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    recursive: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the resolved module identity
    Module,
    /// Collect dependencies and record them for the current build
    AddDeps {
        /// Glob (local) or repository pattern to collect
        #[arg(long, env = "PLUGIN_DEPENDENCY")]
        dependency: Option<String>,
        #[command(flatten)]
        patterns: PatternArgs,
        /// Search the artifact repository instead of the local filesystem
        #[arg(long, env = "PLUGIN_FROM_RT", value_parser = BoolishValueParser::new())]
        from_rt: bool,
        /// Publish aggregated build info after recording
        #[arg(long, env = "PLUGIN_PUBLISH_BUILD_INFO", value_parser = BoolishValueParser::new())]
        publish: bool,
        /// Remove recorded partials after a successful publish
        #[arg(long, env = "PLUGIN_CLEANUP_AFTER_PUBLISH", value_parser = BoolishValueParser::new())]
        cleanup_after_publish: bool,
    },
    /// Record local files as artifacts of the current build
    AddArtifacts {
        /// Local glob of uploaded files
        #[arg(long)]
        pattern: Option<String>,
        /// Repository location the files were uploaded to
        #[arg(long, default_value = "")]
        target: String,
        /// Files were uploaded without their local hierarchy
        #[arg(long)]
        flat: bool,
        #[command(flatten)]
        patterns: PatternArgs,
    },
    /// Print the aggregated build info as JSON
    Show,
    /// Aggregate and publish build info
    Publish {
        /// Remove recorded partials after a successful publish
        #[arg(long, env = "PLUGIN_CLEANUP_AFTER_PUBLISH", value_parser = BoolishValueParser::new())]
        cleanup: bool,
    },
    /// Remove recorded partials for the current build
    Clean,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = run(cli);
    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> CliResult {
    let settings = Settings::from_path(&cli.config)?;
    let step = Step::new(&cli, settings);
    debug!(build = %step.key, cache = %step.cache_dir.display(), "step configured");

    match cli.command {
        Command::Module => cmd_module(&step),
        Command::AddDeps {
            dependency,
            patterns,
            from_rt,
            publish,
            cleanup_after_publish,
        } => cmd_add_deps(
            &step,
            dependency.as_deref(),
            &patterns,
            from_rt,
            publish,
            cleanup_after_publish,
        ),
        Command::AddArtifacts {
            pattern,
            target,
            flat,
            patterns,
        } => cmd_add_artifacts(&step, pattern.as_deref(), &target, flat, &patterns),
        Command::Show => cmd_show(&step),
        Command::Publish { cleanup } => cmd_publish(&step, cleanup),
        Command::Clean => cmd_clean(&step),
    }
}

/// Command-line values merged over `buildtrail.toml`.
#[derive(Debug)]
struct Step {
    key: BuildRunKey,
    module: Option<String>,
    build_tool: Option<String>,
    pom_file: Option<PathBuf>,
    cache_dir: PathBuf,
    url: Option<String>,
    access_token: Option<String>,
    timeout_secs: u64,
}

impl Step {
    fn new(cli: &Cli, settings: Settings) -> Self {
        let args = &cli.build;
        let cache_dir = cli.cache_dir.clone().unwrap_or_else(|| settings.cache_dir());
        let Settings { build, remote, .. } = settings;
        let pick = |flag: &Option<String>, file: Option<String>| {
            flag.clone().or(file).unwrap_or_default()
        };
        let key = BuildRunKey {
            name: pick(&args.build_name, build.name),
            number: pick(&args.build_number, build.number),
            project: pick(&args.project, build.project),
        };
        Self {
            key,
            module: args.module.clone().or(build.module),
            build_tool: args.build_tool.clone().or(build.build_tool),
            pom_file: args.pom_file.clone().or(build.pom_file),
            cache_dir,
            url: args.url.clone().or(remote.url),
            access_token: args.access_token.clone().or(remote.access_token),
            timeout_secs: remote.timeout_secs,
        }
    }

    fn manager(&self) -> BuildInfoManager<FsPartialStore> {
        BuildInfoManager::new(FsPartialStore::new(&self.cache_dir))
    }

    fn resolve_context(&self) -> Result<ResolveContext, Box<dyn Error>> {
        Ok(ResolveContext {
            module_override: self.module.clone(),
            build_tool: self.build_tool.as_deref().and_then(BuildTool::parse),
            pom_file: self.pom_file.clone(),
            working_dir: std::env::current_dir()?,
        })
    }

    fn repository(&self, purpose: &str) -> Result<HttpRepository, Box<dyn Error>> {
        let url = self
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| format!("a repository URL (--url or PLUGIN_URL) is required to {purpose}"))?;
        Ok(HttpRepository::new(
            url,
            self.access_token.clone(),
            self.timeout_secs,
        ))
    }
}

/// Queries from the file spec if one is given, else from the explicit pattern.
fn pattern_queries(
    explicit: Option<&str>,
    args: &PatternArgs,
) -> Result<Vec<PatternQuery>, Box<dyn Error>> {
    let exclusions = split_patterns(&args.exclusions);
    if let Some(spec_path) = &args.spec_path {
        let spec = FileSpec::from_path(spec_path, args.spec_vars.as_deref())?;
        return Ok(PatternQuery::from_file_spec(&spec, &exclusions)?);
    }
    match explicit.map(str::trim).filter(|p| !p.is_empty()) {
        Some(pattern) => Ok(vec![PatternQuery::explicit(pattern, &exclusions, args.recursive)]),
        None => Err(EngineError::NoPatterns.into()),
    }
}

fn cmd_module(step: &Step) -> CliResult {
    let resolution = ModuleResolver::standard().resolve(&step.resolve_context()?);
    for note in &resolution.notes {
        eprintln!("    Skipped {note}");
    }
    println!("{}", resolution.identity);
    Ok(())
}

fn cmd_add_deps(
    step: &Step,
    dependency: Option<&str>,
    patterns: &PatternArgs,
    from_rt: bool,
    publish: bool,
    cleanup_after_publish: bool,
) -> CliResult {
    step.key.require_tracked("add dependencies")?;
    let queries = pattern_queries(dependency, patterns)?;
    let identity = ModuleResolver::standard()
        .resolve(&step.resolve_context()?)
        .identity;

    let dependencies = if from_rt {
        let repo = step.repository("collect dependencies from the repository")?;
        collect_dependencies(&queries, DependencySource::Remote(&repo))?
    } else {
        collect_dependencies(&queries, DependencySource::Local)?
    };
    let count = dependencies.len();

    let manager = step.manager();
    manager.save_dependencies(&step.key, &identity, dependencies)?;
    eprintln!(
        "    Recorded {count} dependenc{} for {} (module {})",
        if count == 1 { "y" } else { "ies" },
        step.key,
        identity.id
    );

    if publish {
        let repo = step.repository("publish build info")?;
        let info = manager.publish_aggregated(&step.key, &repo, cleanup_after_publish)?;
        eprintln!(
            "   Published build info {}/{} ({} module(s))",
            info.name,
            info.number,
            info.modules.len()
        );
    }
    Ok(())
}

fn cmd_add_artifacts(
    step: &Step,
    pattern: Option<&str>,
    target: &str,
    flat: bool,
    patterns: &PatternArgs,
) -> CliResult {
    let mut queries = pattern_queries(pattern, patterns)?;
    if patterns.spec_path.is_none() {
        for query in &mut queries {
            query.target = target.to_owned();
            query.flat = flat;
        }
    }
    let identity = ModuleResolver::standard()
        .resolve(&step.resolve_context()?)
        .identity;

    let artifacts = collect_artifacts(&queries)?;
    let count = artifacts.len();
    if !step.key.is_tracked() {
        eprintln!("    Found {count} artifact(s); no build name/number set, nothing recorded");
        return Ok(());
    }
    step.manager()
        .save_artifacts(&step.key, &identity, artifacts)?;
    eprintln!(
        "    Recorded {count} artifact(s) for {} (module {})",
        step.key, identity.id
    );
    Ok(())
}

fn cmd_show(step: &Step) -> CliResult {
    let info = step.manager().aggregate(&step.key)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn cmd_publish(step: &Step, cleanup: bool) -> CliResult {
    let repo = step.repository("publish build info")?;
    let info = step
        .manager()
        .publish_aggregated(&step.key, &repo, cleanup)?;
    eprintln!(
        "   Published build info {}/{} ({} module(s))",
        info.name,
        info.number,
        info.modules.len()
    );
    Ok(())
}

fn cmd_clean(step: &Step) -> CliResult {
    step.manager().clean(&step.key)?;
    eprintln!("    Cleaned recorded build info for {}", step.key);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    /// Drop every `env = ...` fallback so the runner's `PLUGIN_*` variables
    /// cannot leak into parsed values.
    fn without_env(cmd: clap::Command) -> clap::Command {
        cmd.mut_args(|arg| arg.env(None::<&str>))
            .mut_subcommands(without_env)
    }

    fn parse(args: &[&str]) -> Cli {
        let matches = without_env(Cli::command())
            .try_get_matches_from(std::iter::once("buildtrail").chain(args.iter().copied()))
            .unwrap_or_else(|e| panic!("{e}"));
        Cli::from_arg_matches(&matches).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_add_deps_flags() {
        let cli = parse(&[
            "add-deps",
            "--build-name",
            "app",
            "--build-number",
            "7",
            "--dependency",
            "libs/*.jar",
            "--exclusions",
            "*-tests.jar",
            "--recursive",
            "false",
            "--from-rt",
        ]);
        assert_eq!(cli.build.build_name.as_deref(), Some("app"));
        match cli.command {
            Command::AddDeps {
                dependency,
                patterns,
                from_rt,
                publish,
                ..
            } => {
                assert_eq!(dependency.as_deref(), Some("libs/*.jar"));
                assert_eq!(patterns.exclusions, "*-tests.jar");
                assert!(!patterns.recursive);
                assert!(from_rt);
                assert!(!publish);
            }
            other => panic!("expected AddDeps, got {other:?}"),
        }
    }

    #[test]
    fn parsing_ignores_pipeline_environment() {
        std::env::set_var("PLUGIN_PROJECT", "from-env");
        let cli = parse(&["show"]);
        assert_eq!(cli.build.project, None);
    }

    #[test]
    fn recursive_defaults_to_true() {
        let cli = parse(&["add-deps", "--dependency", "a/*"]);
        match cli.command {
            Command::AddDeps { patterns, .. } => assert!(patterns.recursive),
            other => panic!("expected AddDeps, got {other:?}"),
        }
    }

    #[test]
    fn flags_override_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("buildtrail.toml");
        std::fs::write(
            &path,
            "[build]\nname = \"from-file\"\nnumber = \"3\"\n[cache]\ndir = \"/srv/cache\"\n",
        )
        .unwrap();
        let settings = Settings::from_path(&path).unwrap();
        let cli = parse(&["show", "--build-name", "from-flag"]);
        let step = Step::new(&cli, settings);
        assert_eq!(step.key.name, "from-flag");
        assert_eq!(step.key.number, "3");
        assert_eq!(step.cache_dir, PathBuf::from("/srv/cache"));
    }

    #[test]
    fn explicit_pattern_uses_global_exclusions() {
        let args = PatternArgs {
            spec_path: None,
            spec_vars: None,
            exclusions: " a/*.txt, ,b/**".to_owned(),
            recursive: true,
        };
        let queries = pattern_queries(Some("a/*"), &args).unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries.first().unwrap().exclusions, vec!["a/*.txt", "b/**"]);
    }

    #[test]
    fn missing_pattern_is_an_error() {
        let args = PatternArgs {
            spec_path: None,
            spec_vars: None,
            exclusions: String::new(),
            recursive: true,
        };
        let err = pattern_queries(Some("  "), &args).unwrap_err().to_string();
        assert!(err.contains("requires a pattern or a file spec"), "error was: {err}");
    }

    #[test]
    fn spec_file_supplies_queries() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = tmp.path().join("spec.json");
        std::fs::write(
            &spec,
            r#"{"files":[{"pattern":"${dir}/*.jar","exclusions":"*-sources.jar"}]}"#,
        )
        .unwrap();
        let args = PatternArgs {
            spec_path: Some(spec),
            spec_vars: Some("dir=libs".to_owned()),
            exclusions: "*.md".to_owned(),
            recursive: false,
        };
        let queries = pattern_queries(None, &args).unwrap();
        let query = queries.first().unwrap();
        assert_eq!(query.pattern, "libs/*.jar");
        assert_eq!(query.exclusions, vec!["*-sources.jar", "*.md"]);
        assert!(query.recursive);
    }

    #[test]
    fn publish_requires_url() {
        let cli = parse(&["publish", "--build-name", "a", "--build-number", "1"]);
        let step = Step::new(&cli, Settings::default());
        let err = step.repository("publish build info").unwrap_err().to_string();
        assert!(err.contains("repository URL"), "error was: {err}");
    }

    #[test]
    fn add_deps_requires_tracked_build() {
        let tmp = tempfile::tempdir().unwrap();
        let cli = parse(&["add-deps", "--dependency", "a/*"]);
        let mut step = Step::new(&cli, Settings::default());
        step.cache_dir = tmp.path().to_path_buf();
        let Command::AddDeps { patterns, .. } = &cli.command else {
            panic!("expected AddDeps");
        };
        let err = cmd_add_deps(&step, Some("a/*"), patterns, false, false, false)
            .unwrap_err()
            .to_string();
        assert!(err.contains("build name and number are required"), "error was: {err}");
    }
}
