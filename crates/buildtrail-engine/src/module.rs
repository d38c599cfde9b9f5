//! Module identity resolution.
//!
//! A [`ModuleResolver`] runs an ordered list of [`ModuleStrategy`] values and
//! takes the first identity one of them produces. Strategies never fail the
//! caller: a strategy that cannot produce an identity either reports that it
//! does not apply or declines with a reason, which is logged and kept as a
//! [`ResolveNote`]. When every strategy passes, the identity is `generic`.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use buildtrail_util::maven::{MavenCoordinate, DEFAULT_POM};
use buildtrail_util::process::{find_in_path, run_command, which};
use tracing::{debug, warn};

use crate::model::{ModuleIdentity, ModuleType};

/// The build tool a pipeline step was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTool {
    Maven,
    Gradle,
    Other,
}

impl BuildTool {
    /// Parse a build tool name. Matching is case-insensitive; blank input is `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let tool = match name.to_ascii_lowercase().as_str() {
            "mvn" | "maven" => Self::Maven,
            "gradle" | "gradlew" => Self::Gradle,
            _ => Self::Other,
        };
        Some(tool)
    }
}

/// Inputs available to every resolution strategy.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    /// Explicit module id chosen by the caller.
    pub module_override: Option<String>,
    pub build_tool: Option<BuildTool>,
    /// Project descriptor path, relative to `working_dir` unless absolute.
    pub pom_file: Option<PathBuf>,
    pub working_dir: PathBuf,
}

/// Outcome of one strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Resolved(ModuleIdentity),
    /// The strategy's precondition does not hold; nothing to report.
    NotApplicable,
    /// The strategy applied but could not produce an identity.
    Declined(String),
}

/// One precedence-ordered way of deriving a module identity.
pub trait ModuleStrategy {
    fn name(&self) -> &'static str;

    fn attempt(&self, ctx: &ResolveContext) -> Attempt;
}

/// A strategy that declined, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveNote {
    pub strategy: &'static str,
    pub reason: String,
}

impl fmt::Display for ResolveNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// The resolved identity plus what happened on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub identity: ModuleIdentity,
    /// Name of the strategy that produced the identity, `None` for the fallback.
    pub resolved_by: Option<&'static str>,
    pub notes: Vec<ResolveNote>,
}

/// Uses the caller's explicit module id.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverrideStrategy;

impl ModuleStrategy for OverrideStrategy {
    fn name(&self) -> &'static str {
        "override"
    }

    fn attempt(&self, ctx: &ResolveContext) -> Attempt {
        match ctx.module_override.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => {
                Attempt::Resolved(ModuleIdentity::new(id, ModuleType::Generic))
            }
            _ => Attempt::NotApplicable,
        }
    }
}

/// Reads `group:artifact:version` from the Maven project descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct MavenStrategy;

impl MavenStrategy {
    fn pom_path(ctx: &ResolveContext) -> PathBuf {
        let pom = ctx
            .pom_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(DEFAULT_POM));
        ctx.working_dir.join(pom)
    }
}

impl ModuleStrategy for MavenStrategy {
    fn name(&self) -> &'static str {
        "maven"
    }

    fn attempt(&self, ctx: &ResolveContext) -> Attempt {
        if ctx.build_tool != Some(BuildTool::Maven) {
            return Attempt::NotApplicable;
        }
        match MavenCoordinate::from_pom(&Self::pom_path(ctx)) {
            Ok(coord) => Attempt::Resolved(ModuleIdentity::new(&coord.to_string(), ModuleType::Maven)),
            Err(e) => Attempt::Declined(e.to_string()),
        }
    }
}

/// Asks `gradle properties -q` for the project's group, name and version.
#[derive(Debug, Clone)]
pub struct GradleStrategy {
    pub program: String,
    /// `PATH`-style list to search instead of the process `PATH`.
    pub search_path: Option<OsString>,
}

impl Default for GradleStrategy {
    fn default() -> Self {
        Self {
            program: "gradle".to_owned(),
            search_path: None,
        }
    }
}

impl GradleStrategy {
    fn locate(&self) -> Option<PathBuf> {
        match &self.search_path {
            Some(search_path) => find_in_path(&self.program, search_path),
            None => which(&self.program),
        }
    }
}

impl ModuleStrategy for GradleStrategy {
    fn name(&self) -> &'static str {
        "gradle"
    }

    fn attempt(&self, ctx: &ResolveContext) -> Attempt {
        if ctx.build_tool != Some(BuildTool::Gradle) {
            return Attempt::NotApplicable;
        }
        let Some(program) = self.locate() else {
            return Attempt::Declined(format!("'{}' not found in PATH", self.program));
        };

        let mut cmd = Command::new(&program);
        cmd.args(["properties", "-q"]);
        if !ctx.working_dir.as_os_str().is_empty() {
            cmd.current_dir(&ctx.working_dir);
        }
        debug!("running {} properties -q", program.display());
        let output = match run_command(&mut cmd) {
            Ok(output) => output,
            Err(e) => return Attempt::Declined(format!("failed to run '{} properties': {e}", self.program)),
        };
        // Output from a failed run is still used when it names the module.
        if let Some(id) = parse_gradle_properties(&output.stdout) {
            if !output.success {
                debug!(
                    exit = ?output.exit_code,
                    "using properties from a failed '{} properties' run",
                    self.program
                );
            }
            return Attempt::Resolved(ModuleIdentity::new(&id, ModuleType::Gradle));
        }
        if !output.success {
            return Attempt::Declined(format!(
                "'{} properties' exited with {}",
                self.program,
                output
                    .exit_code
                    .map_or_else(|| "a signal".to_owned(), |c| format!("code {c}"))
            ));
        }
        Attempt::Declined("could not derive group/name/version".to_owned())
    }
}

/// Extract `group:name:version` from `gradle properties` output.
///
/// Returns `None` if any of the three is missing. A version of
/// `unspecified` counts as missing.
pub fn parse_gradle_properties(output: &str) -> Option<String> {
    let mut group = "";
    let mut name = "";
    let mut version = "";
    for line in output.lines() {
        if let Some(v) = line.strip_prefix("group:") {
            group = v.trim();
        } else if let Some(v) = line.strip_prefix("name:") {
            name = v.trim();
        } else if let Some(v) = line.strip_prefix("version:") {
            version = v.trim();
        }
    }
    if version.eq_ignore_ascii_case("unspecified") {
        version = "";
    }
    if group.is_empty() || name.is_empty() || version.is_empty() {
        return None;
    }
    Some(format!("{group}:{name}:{version}"))
}

pub type BoxedStrategy = Box<dyn ModuleStrategy + Send + Sync>;

/// First-success chain of module strategies.
pub struct ModuleResolver {
    strategies: Vec<BoxedStrategy>,
}

impl fmt::Debug for ModuleResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("ModuleResolver").field("strategies", &names).finish()
    }
}

impl Default for ModuleResolver {
    fn default() -> Self {
        Self::standard()
    }
}

impl ModuleResolver {
    /// Override, then Maven, then Gradle.
    pub fn standard() -> Self {
        let strategies: Vec<BoxedStrategy> = vec![
            Box::new(OverrideStrategy),
            Box::new(MavenStrategy),
            Box::new(GradleStrategy::default()),
        ];
        Self::with_strategies(strategies)
    }

    pub fn with_strategies(strategies: Vec<BoxedStrategy>) -> Self {
        Self { strategies }
    }

    /// Resolve the module identity for `ctx`. Never fails.
    pub fn resolve(&self, ctx: &ResolveContext) -> Resolution {
        let mut notes = Vec::new();
        for strategy in &self.strategies {
            match strategy.attempt(ctx) {
                Attempt::Resolved(identity) => {
                    debug!(strategy = strategy.name(), module = %identity, "module resolved");
                    return Resolution {
                        identity,
                        resolved_by: Some(strategy.name()),
                        notes,
                    };
                }
                Attempt::NotApplicable => {}
                Attempt::Declined(reason) => {
                    warn!(
                        "{} module enrichment skipped: {reason}. Using 'generic' module.",
                        strategy.name()
                    );
                    notes.push(ResolveNote {
                        strategy: strategy.name(),
                        reason,
                    });
                }
            }
        }
        Resolution {
            identity: ModuleIdentity::generic(),
            resolved_by: None,
            notes,
        }
    }
}
