//! The local project: metadata, "is it built" and the `dotnet` build/publish
//! collaborators.

use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::process::{self, ProcessExit};
use crate::progress::ProgressSink;

const PROJECT_EXTENSIONS: [&str; 3] = ["csproj", "fsproj", "vbproj"];
const WEB_SDK: &str = "Microsoft.NET.Sdk.Web";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub name: String,
    /// Path of the project file.
    pub full_path: PathBuf,
    pub configuration: String,
    pub target_framework: String,
    pub assembly_name: String,
    pub is_web: bool,
}

impl ProjectInfo {
    /// Resolve a project from a project file or a directory holding one.
    pub fn discover(path: &Path, configuration: &str, framework: Option<&str>) -> Result<Self> {
        if !path.exists() {
            return Err(Error::project_no_active(path.display().to_string()));
        }

        let project_file = if path.is_dir() {
            find_project_file(path)?
        } else if is_project_file(path) {
            path.to_path_buf()
        } else {
            return Err(Error::project_unsupported(path.display().to_string()));
        };

        let content = fs::read_to_string(&project_file).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("read {}", project_file.display())))
        })?;

        let name = project_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        if !content.contains("<Project") {
            return Err(Error::project_unsupported(name));
        }

        let target_framework = match framework {
            Some(f) => f.to_string(),
            None => read_target_framework(&content).ok_or_else(|| {
                Error::validation_invalid_argument(
                    "framework",
                    format!("No <TargetFramework> in {}", project_file.display()),
                    None,
                )
                .with_hint("Pass --framework <tfm>, e.g. --framework net8.0")
            })?,
        };

        let assembly_name = read_tag(&content, "AssemblyName").unwrap_or_else(|| name.clone());

        Ok(Self {
            name,
            full_path: project_file,
            configuration: configuration.to_string(),
            target_framework,
            assembly_name,
            is_web: content.contains(&format!("Sdk=\"{}\"", WEB_SDK)),
        })
    }

    pub fn project_dir(&self) -> &Path {
        self.full_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// `bin/<configuration>/<framework>` under the project directory.
    pub fn output_dir(&self) -> PathBuf {
        self.project_dir()
            .join("bin")
            .join(&self.configuration)
            .join(&self.target_framework)
    }

    pub fn publish_dir(&self) -> PathBuf {
        self.output_dir().join("publish")
    }

    pub fn assembly_path(&self) -> PathBuf {
        self.output_dir().join(format!("{}.dll", self.assembly_name))
    }
}

fn is_project_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PROJECT_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

fn find_project_file(dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("read {}", dir.display()))))?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_project_file(p))
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| dir.display().to_string());
        Error::project_unsupported(name)
    })
}

/// Text of the first `<tag>` element, if non-empty. Attributes such as
/// MSBuild conditions are allowed on the opening tag.
fn read_tag(content: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"<{0}(?:\s[^>]*)?>([^<]*)</{0}\s*>", regex::escape(tag));
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(content)?.get(1)?.as_str().trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn read_target_framework(content: &str) -> Option<String> {
    read_tag(content, "TargetFramework").or_else(|| {
        read_tag(content, "TargetFrameworks")
            .and_then(|list| list.split(';').map(str::trim).find(|s| !s.is_empty()).map(String::from))
    })
}

/// Newest modification time of the project's sources, ignoring build output
/// and dot-directories.
fn newest_source_mtime(dir: &Path) -> std::io::Result<Option<SystemTime>> {
    let mut newest: Option<SystemTime> = None;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        let modified = if path.is_dir() {
            if name == "bin" || name == "obj" || name.starts_with('.') {
                continue;
            }
            newest_source_mtime(&path)?
        } else {
            Some(entry.metadata()?.modified()?)
        };

        if let Some(m) = modified {
            newest = Some(newest.map_or(m, |n| n.max(m)));
        }
    }

    Ok(newest)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published(PathBuf),
    Cancelled,
}

pub trait BuildCollaborator {
    fn is_up_to_date(&self, project: &ProjectInfo) -> Result<bool>;
    /// A failed build is an `Err`.
    fn build(
        &self,
        project: &ProjectInfo,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<BuildOutcome>;
}

pub trait PublishCollaborator {
    /// Produces the publish directory. A non-zero exit is an `Err`.
    fn publish(
        &self,
        project: &ProjectInfo,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<PublishOutcome>;
}

#[derive(Debug, Clone)]
pub struct DotnetBuild {
    program: String,
}

impl Default for DotnetBuild {
    fn default() -> Self {
        Self {
            program: "dotnet".to_string(),
        }
    }
}

impl DotnetBuild {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, project: &ProjectInfo) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("build")
            .arg(&project.full_path)
            .args(["-c", project.configuration.as_str(), "-f", project.target_framework.as_str()]);
        cmd
    }
}

impl BuildCollaborator for DotnetBuild {
    fn is_up_to_date(&self, project: &ProjectInfo) -> Result<bool> {
        let built = match fs::metadata(project.assembly_path()).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => return Ok(false),
        };

        let newest = newest_source_mtime(project.project_dir()).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("scan {}", project.project_dir().display())))
        })?;

        Ok(newest.map_or(true, |source| built >= source))
    }

    fn build(
        &self,
        project: &ProjectInfo,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<BuildOutcome> {
        let cmd = self.command(project);
        let display = process::display_command(&cmd);
        match process::run_cancellable(cmd, cancel, progress)? {
            ProcessExit::Cancelled => Ok(BuildOutcome::Cancelled),
            exit if exit.success() => Ok(BuildOutcome::Built),
            ProcessExit::Exited(code) => Err(Error::local_build_failed(display, code)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DotnetPublish {
    program: String,
}

impl Default for DotnetPublish {
    fn default() -> Self {
        Self {
            program: "dotnet".to_string(),
        }
    }
}

impl DotnetPublish {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, project: &ProjectInfo) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("publish")
            .arg(&project.full_path)
            .args(["-c", project.configuration.as_str(), "-f", project.target_framework.as_str(), "-o"])
            .arg(project.publish_dir());
        cmd
    }
}

impl PublishCollaborator for DotnetPublish {
    fn publish(
        &self,
        project: &ProjectInfo,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<PublishOutcome> {
        let cmd = self.command(project);
        let display = process::display_command(&cmd);
        progress.write_line(&display);

        match process::run_cancellable(cmd, cancel, progress)? {
            ProcessExit::Cancelled => Ok(PublishOutcome::Cancelled),
            exit if exit.success() => Ok(PublishOutcome::Published(project.publish_dir())),
            ProcessExit::Exited(code) => Err(Error::local_publish_failed(display, code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StepRecord;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Quiet;

    impl ProgressSink for Quiet {
        fn write_line(&self, _line: &str) {}
        fn report_step(&self, _record: &StepRecord) {}
    }

    const CONSOLE_PROJECT: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
    <TargetFramework>net8.0</TargetFramework>
  </PropertyGroup>
</Project>"#;

    const WEB_PROJECT: &str = r#"<Project Sdk="Microsoft.NET.Sdk.Web">
  <PropertyGroup>
    <TargetFrameworks>net8.0;net6.0</TargetFrameworks>
    <AssemblyName>Dashboard.Server</AssemblyName>
  </PropertyGroup>
</Project>"#;

    fn project_dir(name: &str, content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(format!("{}.csproj", name)), content).unwrap();
        fs::write(dir.path().join("Program.cs"), "// entry").unwrap();
        dir
    }

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn discovers_console_project_from_directory() {
        let dir = project_dir("Blinky", CONSOLE_PROJECT);
        let project = ProjectInfo::discover(dir.path(), "Debug", None).unwrap();

        assert_eq!(project.name, "Blinky");
        assert_eq!(project.assembly_name, "Blinky");
        assert_eq!(project.target_framework, "net8.0");
        assert!(!project.is_web);
        assert_eq!(
            project.publish_dir(),
            dir.path().join("bin").join("Debug").join("net8.0").join("publish")
        );
    }

    #[test]
    fn discovers_web_project_with_assembly_name_and_first_framework() {
        let dir = project_dir("Dashboard", WEB_PROJECT);
        let file = dir.path().join("Dashboard.csproj");
        let project = ProjectInfo::discover(&file, "Release", None).unwrap();

        assert!(project.is_web);
        assert_eq!(project.assembly_name, "Dashboard.Server");
        assert_eq!(project.target_framework, "net8.0");
        assert!(project.assembly_path().ends_with("Dashboard.Server.dll"));
    }

    #[test]
    fn framework_override_wins() {
        let dir = project_dir("Dashboard", WEB_PROJECT);
        let project = ProjectInfo::discover(dir.path(), "Debug", Some("net6.0")).unwrap();
        assert_eq!(project.target_framework, "net6.0");
    }

    #[test]
    fn directory_without_project_file_is_unsupported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        let err = ProjectInfo::discover(dir.path(), "Debug", None).unwrap_err();
        assert_eq!(err.code.as_str(), "project.unsupported");
    }

    #[test]
    fn missing_path_means_no_active_project() {
        let dir = TempDir::new().unwrap();
        let err = ProjectInfo::discover(&dir.path().join("nope"), "Debug", None).unwrap_err();
        assert_eq!(err.code.as_str(), "project.no_active");
    }

    #[test]
    fn tag_scan_ignores_empty_values() {
        assert_eq!(read_tag("<AssemblyName> </AssemblyName>", "AssemblyName"), None);
        assert_eq!(
            read_tag("<AssemblyName>App</AssemblyName>", "AssemblyName"),
            Some("App".to_string())
        );
    }

    #[test]
    fn conditioned_elements_are_read() {
        let content = r#"<PropertyGroup>
    <TargetFramework Condition="'$(OS)' != 'Windows_NT'">net8.0</TargetFramework>
    <AssemblyName
        Condition="'$(Configuration)' == 'Debug'">BlinkyDev</AssemblyName>
</PropertyGroup>"#;
        assert_eq!(read_target_framework(content), Some("net8.0".to_string()));
        assert_eq!(read_tag(content, "AssemblyName"), Some("BlinkyDev".to_string()));
    }

    #[test]
    fn plural_framework_list_is_not_mistaken_for_single() {
        let content = "<TargetFrameworks>net6.0;net8.0</TargetFrameworks>";
        assert_eq!(read_tag(content, "TargetFramework"), None);
        assert_eq!(read_target_framework(content), Some("net6.0".to_string()));
    }

    #[test]
    fn up_to_date_compares_assembly_with_sources() {
        let dir = project_dir("Blinky", CONSOLE_PROJECT);
        let project = ProjectInfo::discover(dir.path(), "Debug", None).unwrap();
        let build = DotnetBuild::default();

        assert!(!build.is_up_to_date(&project).unwrap());

        fs::create_dir_all(project.output_dir()).unwrap();
        fs::write(project.assembly_path(), "MZ").unwrap();

        let past = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&dir.path().join("Program.cs"), past);
        set_mtime(&dir.path().join("Blinky.csproj"), past);
        assert!(build.is_up_to_date(&project).unwrap());

        let future = SystemTime::now() + Duration::from_secs(3600);
        set_mtime(&dir.path().join("Program.cs"), future);
        assert!(!build.is_up_to_date(&project).unwrap());
    }

    #[test]
    fn build_output_and_dot_dirs_do_not_count_as_sources() {
        let dir = project_dir("Blinky", CONSOLE_PROJECT);
        let past = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&dir.path().join("Program.cs"), past);
        set_mtime(&dir.path().join("Blinky.csproj"), past);

        fs::create_dir_all(dir.path().join("obj")).unwrap();
        fs::write(dir.path().join("obj").join("project.assets.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join(".vs")).unwrap();
        fs::write(dir.path().join(".vs").join("state"), "").unwrap();

        let newest = newest_source_mtime(dir.path()).unwrap().unwrap();
        assert!(newest <= past + Duration::from_secs(1));
    }

    #[test]
    fn publish_reports_exit_code_on_failure() {
        let dir = project_dir("Blinky", CONSOLE_PROJECT);
        let project = ProjectInfo::discover(dir.path(), "Debug", None).unwrap();
        let publish = DotnetPublish::with_program("false");

        let err = publish
            .publish(&project, &CancellationToken::new(), &Quiet)
            .unwrap_err();
        assert_eq!(err.code.as_str(), "local.publish_failed");
        assert_eq!(err.message, "exitCode = 1");
    }

    #[test]
    fn publish_returns_publish_dir_on_success() {
        let dir = project_dir("Blinky", CONSOLE_PROJECT);
        let project = ProjectInfo::discover(dir.path(), "Debug", None).unwrap();
        let outcome = DotnetPublish::with_program("true")
            .publish(&project, &CancellationToken::new(), &Quiet)
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Published(project.publish_dir()));
    }

    #[test]
    fn cancelled_publish_is_not_a_failure() {
        let dir = project_dir("Blinky", CONSOLE_PROJECT);
        let project = ProjectInfo::discover(dir.path(), "Debug", None).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = DotnetPublish::with_program("true")
            .publish(&project, &cancel, &Quiet)
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Cancelled);
    }
}
