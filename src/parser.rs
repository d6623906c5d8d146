//! Manifest discovery and parsing for PyPI and npm projects

use crate::error::{Result, SirenError};
use crate::types::{CacheKey, Dependency, Ecosystem};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Manifest file names this parser understands
const MANIFEST_NAMES: &[&str] = &[
    "requirements.txt",
    "requirements-dev.txt",
    "Pipfile.lock",
    "poetry.lock",
    "package.json",
    "package-lock.json",
];

/// Directories never descended into during discovery
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    "site-packages",
    "__pycache__",
    "venv",
    "env",
    "target",
    "dist",
    "build",
];

const NPM_SECTIONS: &[&str] = &[
    "dependencies",
    "devDependencies",
    "optionalDependencies",
    "peerDependencies",
];

const REQUIREMENT_OPERATORS: &[&str] = &["~=", ">=", "<=", "!=", ">", "<"];

/// Everything extracted from a project directory
#[derive(Debug, Default)]
pub struct ParsedProject {
    /// Deduplicated dependencies in order of first appearance
    pub dependencies: Vec<Dependency>,
    /// Manifests that were parsed successfully
    pub manifests: Vec<PathBuf>,
    /// Manifests that could not be read
    pub errors: Vec<SirenError>,
}

/// Ordered dependency collection keyed by `(ecosystem, name)`.
///
/// Re-inserting a known package replaces its version and source in place, so
/// the last declaration wins while the position of the first one is kept.
#[derive(Debug, Default)]
pub struct DependencySet {
    entries: Vec<Dependency>,
    index: HashMap<CacheKey, usize>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dep: Dependency) {
        match self.index.get(&dep.key()) {
            Some(&position) => self.entries[position] = dep,
            None => {
                self.index.insert(dep.key(), self.entries.len());
                self.entries.push(dep);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Dependency> {
        self.entries
    }
}

impl Extend<Dependency> for DependencySet {
    fn extend<I: IntoIterator<Item = Dependency>>(&mut self, iter: I) {
        for dep in iter {
            self.insert(dep);
        }
    }
}

/// Parse every supported manifest under `root` into one deduplicated list
pub fn parse_project(root: &Path) -> Result<ParsedProject> {
    let manifests = discover_manifests(root);
    if manifests.is_empty() {
        return Err(SirenError::NoManifests(root.to_path_buf()));
    }

    let mut project = ParsedProject::default();
    let mut deps = DependencySet::new();

    for manifest in manifests {
        match parse_manifest(&manifest) {
            Ok(parsed) => {
                debug!(
                    "Parsed {} dependencies from {}",
                    parsed.len(),
                    manifest.display()
                );
                deps.extend(parsed);
                project.manifests.push(manifest);
            }
            Err(e) => {
                warn!("Skipping manifest: {}", e);
                project.errors.push(e);
            }
        }
    }

    if project.manifests.is_empty() {
        // Every discovered manifest failed; nothing left to scan
        return Err(project.errors.remove(0));
    }

    project.dependencies = deps.into_vec();
    Ok(project)
}

/// Find supported manifests under `root` in a stable, sorted order.
///
/// `root` may also point directly at a manifest file.
pub fn discover_manifests(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return if is_manifest(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_manifest(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| MANIFEST_NAMES.contains(&n))
        .unwrap_or(false)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

/// Parse a single manifest.
///
/// Unknown file names yield no dependencies; a file that cannot be read or
/// whose document is malformed yields `ManifestUnreadable`.
pub fn parse_manifest(path: &Path) -> Result<Vec<Dependency>> {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let parse: fn(&str, &Path) -> Result<Vec<Dependency>> = match file_name {
        "requirements.txt" | "requirements-dev.txt" => parse_requirements,
        "package.json" => parse_package_json,
        "package-lock.json" => parse_package_lock,
        "Pipfile.lock" => parse_pipfile_lock,
        "poetry.lock" => parse_poetry_lock,
        _ => return Ok(Vec::new()),
    };

    let content = fs::read_to_string(path).map_err(|e| SirenError::manifest(path, e))?;
    parse(&content, path)
}

fn parse_requirements(content: &str, path: &Path) -> Result<Vec<Dependency>> {
    Ok(content
        .lines()
        .filter_map(parse_requirement_line)
        .map(|(name, version)| Dependency::new(&name, version, Ecosystem::Pypi, path))
        .collect())
}

/// Split one requirements line into `(name, version)`.
///
/// Returns `None` for comments, pip options, direct URL references and
/// anything else that is not a plain `name[extras] <constraint>` spec.
fn parse_requirement_line(line: &str) -> Option<(String, String)> {
    let line = line.split('#').next()?.trim();
    if line.is_empty() || line.starts_with('-') {
        return None;
    }

    let line = line.split(';').next()?.trim();
    if line.contains('@') || line.contains("://") {
        return None;
    }

    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(line.len());
    let name = &line[..end];
    if name.is_empty() {
        return None;
    }

    let mut rest = line[end..].trim_start();
    if rest.starts_with('[') {
        let close = rest.find(']')?;
        rest = rest[close + 1..].trim_start();
    }
    // pip-compile output: trailing line continuation and per-requirement options
    let rest = rest.split(" --").next()?.trim_end().trim_end_matches('\\');
    let rest: String = rest
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split_whitespace()
        .collect();

    let version = if rest.is_empty() {
        "*".to_string()
    } else if let Some(pinned) = rest.strip_prefix("===").or_else(|| rest.strip_prefix("==")) {
        if pinned.is_empty() || pinned.contains(',') {
            rest.clone()
        } else {
            pinned.to_string()
        }
    } else if REQUIREMENT_OPERATORS.iter().any(|op| rest.starts_with(op)) {
        rest
    } else {
        return None;
    };

    Some((name.to_string(), version))
}

fn parse_package_json(content: &str, path: &Path) -> Result<Vec<Dependency>> {
    let payload: Value = serde_json::from_str(content).map_err(|e| SirenError::manifest(path, e))?;

    let mut deps = Vec::new();
    for section in NPM_SECTIONS {
        let Some(entries) = payload.get(*section).and_then(Value::as_object) else {
            continue;
        };
        for (name, spec) in entries {
            match spec.as_str() {
                Some(version) => deps.push(Dependency::new(name, version, Ecosystem::Npm, path)),
                None => debug!("Skipping non-string spec for {} in {}", name, path.display()),
            }
        }
    }
    Ok(deps)
}

fn parse_package_lock(content: &str, path: &Path) -> Result<Vec<Dependency>> {
    let payload: Value = serde_json::from_str(content).map_err(|e| SirenError::manifest(path, e))?;

    // Lockfile v2/v3 lists every installed package under "packages"
    if let Some(packages) = payload.get("packages").and_then(Value::as_object) {
        let mut deps = Vec::new();
        for (key, info) in packages {
            let Some(position) = key.rfind("node_modules/") else {
                continue;
            };
            if info.get("link").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let name = info
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(&key[position + "node_modules/".len()..]);
            let version = info.get("version").and_then(Value::as_str).unwrap_or("*");
            deps.push(Dependency::new(name, version, Ecosystem::Npm, path));
        }
        return Ok(deps);
    }

    let mut deps = Vec::new();
    if let Some(dependencies) = payload.get("dependencies").and_then(Value::as_object) {
        walk_lock_v1(dependencies, path, &mut deps);
    }
    Ok(deps)
}

fn walk_lock_v1(entries: &serde_json::Map<String, Value>, path: &Path, deps: &mut Vec<Dependency>) {
    for (name, info) in entries {
        let version = info.get("version").and_then(Value::as_str).unwrap_or("*");
        deps.push(Dependency::new(name, version, Ecosystem::Npm, path));
        if let Some(nested) = info.get("dependencies").and_then(Value::as_object) {
            walk_lock_v1(nested, path, deps);
        }
    }
}

fn parse_pipfile_lock(content: &str, path: &Path) -> Result<Vec<Dependency>> {
    let payload: Value = serde_json::from_str(content).map_err(|e| SirenError::manifest(path, e))?;

    let mut deps = Vec::new();
    for section in ["default", "develop"] {
        let Some(entries) = payload.get(section).and_then(Value::as_object) else {
            continue;
        };
        for (name, info) in entries {
            let version = info
                .get("version")
                .and_then(Value::as_str)
                .map(|v| v.trim_start_matches("==").to_string())
                .unwrap_or_else(|| "*".to_string());
            deps.push(Dependency::new(name, version, Ecosystem::Pypi, path));
        }
    }
    Ok(deps)
}

fn parse_poetry_lock(content: &str, path: &Path) -> Result<Vec<Dependency>> {
    let payload: toml::Value = toml::from_str(content).map_err(|e| SirenError::manifest(path, e))?;

    let Some(packages) = payload.get("package").and_then(toml::Value::as_array) else {
        return Ok(Vec::new());
    };

    Ok(packages
        .iter()
        .filter_map(|package| {
            let name = package.get("name")?.as_str()?;
            let version = package
                .get("version")
                .and_then(toml::Value::as_str)
                .unwrap_or("*");
            Some(Dependency::new(name, version, Ecosystem::Pypi, path))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(deps: &[Dependency]) -> Vec<&str> {
        deps.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_parse_requirements() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("requirements.txt");
        fs::write(
            &manifest,
            "requests==2.31.0\n# comment\nnumpy>=1.0\n-r other.txt\nDjango[argon2] >= 4.2, < 5 ; python_version > '3.8'\nflask\ngit+https://github.com/x/y.git\n",
        )
        .unwrap();

        let deps = parse_manifest(&manifest).unwrap();

        assert_eq!(names(&deps), vec!["requests", "numpy", "django", "flask"]);
        assert_eq!(deps[0].version, "2.31.0");
        assert_eq!(deps[1].version, ">=1.0");
        assert_eq!(deps[2].version, ">=4.2,<5");
        assert_eq!(deps[3].version, "*");
        assert!(deps.iter().all(|d| d.ecosystem == Ecosystem::Pypi));
    }

    #[test]
    fn test_requirement_line_skips_unsupported_syntax() {
        assert_eq!(parse_requirement_line("   "), None);
        assert_eq!(parse_requirement_line("--index-url https://x"), None);
        assert_eq!(parse_requirement_line("pkg @ https://example.com/pkg.whl"), None);
        assert_eq!(parse_requirement_line("pkg $$ 1.0"), None);
        assert_eq!(
            parse_requirement_line("Typing_Extensions===4.8.0  # pinned"),
            Some(("Typing_Extensions".to_string(), "4.8.0".to_string()))
        );
        assert_eq!(
            parse_requirement_line("requests==2.31.0 \\"),
            Some(("requests".to_string(), "2.31.0".to_string()))
        );
        assert_eq!(
            parse_requirement_line("requests==2.31.0 --hash=sha256:abcd"),
            Some(("requests".to_string(), "2.31.0".to_string()))
        );
        assert_eq!(
            parse_requirement_line("idna \\"),
            Some(("idna".to_string(), "*".to_string()))
        );
        assert_eq!(parse_requirement_line("    --hash=sha256:abcd \\"), None);
    }

    #[test]
    fn test_parse_hash_pinned_requirements() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("requirements.txt");
        fs::write(
            &manifest,
            "certifi==2023.7.22 \\\n    --hash=sha256:aaaa \\\n    --hash=sha256:bbbb\n    # via requests\nrequests==2.31.0 --hash=sha256:cccc\n",
        )
        .unwrap();

        let deps = parse_manifest(&manifest).unwrap();
        assert_eq!(names(&deps), vec!["certifi", "requests"]);
        assert_eq!(deps[0].version, "2023.7.22");
        assert_eq!(deps[1].version, "2.31.0");
    }

    #[test]
    fn test_parse_package_json() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(
            &manifest,
            r#"{"dependencies": {"react": "^18.0.0", "weird": {"x": 1}},
                "devDependencies": {"eslint": "^8.0.0"}}"#,
        )
        .unwrap();

        let deps = parse_manifest(&manifest).unwrap();
        assert_eq!(names(&deps), vec!["react", "eslint"]);
        assert_eq!(deps[0].version, "^18.0.0");
        assert!(deps.iter().all(|d| d.ecosystem == Ecosystem::Npm));
    }

    #[test]
    fn test_json_manifests_keep_declaration_order() {
        let dir = TempDir::new().unwrap();
        let package_json = dir.path().join("package.json");
        fs::write(
            &package_json,
            r#"{"dependencies": {"zod": "^3.22.0", "axios": "^1.6.0", "lodash": "^4.17.21"}}"#,
        )
        .unwrap();
        let lock = dir.path().join("package-lock.json");
        fs::write(
            &lock,
            r#"{"lockfileVersion": 3, "packages": {
                "node_modules/yargs": {"version": "17.7.2"},
                "node_modules/chalk": {"version": "5.3.0"}
            }}"#,
        )
        .unwrap();
        let pipfile = dir.path().join("Pipfile.lock");
        fs::write(
            &pipfile,
            r#"{"default": {"urllib3": {"version": "==2.0.7"}, "certifi": {"version": "==2023.7.22"}}}"#,
        )
        .unwrap();

        assert_eq!(
            names(&parse_manifest(&package_json).unwrap()),
            vec!["zod", "axios", "lodash"]
        );
        assert_eq!(names(&parse_manifest(&lock).unwrap()), vec!["yargs", "chalk"]);
        assert_eq!(
            names(&parse_manifest(&pipfile).unwrap()),
            vec!["urllib3", "certifi"]
        );
    }

    #[test]
    fn test_parse_package_lock_v3() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("package-lock.json");
        fs::write(
            &manifest,
            r#"{"lockfileVersion": 3, "packages": {
                "": {"name": "app"},
                "node_modules/@babel/core": {"version": "7.23.0"},
                "node_modules/a/node_modules/ms": {"version": "2.1.3"},
                "packages/local": {"version": "0.0.1"},
                "node_modules/local": {"link": true}
            }}"#,
        )
        .unwrap();

        let deps = parse_manifest(&manifest).unwrap();
        assert_eq!(names(&deps), vec!["@babel/core", "ms"]);
        assert_eq!(deps[1].version, "2.1.3");
    }

    #[test]
    fn test_parse_package_lock_v1_nested() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("package-lock.json");
        fs::write(
            &manifest,
            r#"{"dependencies": {"express": {"version": "4.18.2",
                "dependencies": {"debug": {"version": "2.6.9"}}}}}"#,
        )
        .unwrap();

        let deps = parse_manifest(&manifest).unwrap();
        assert_eq!(names(&deps), vec!["express", "debug"]);
    }

    #[test]
    fn test_parse_pipfile_and_poetry_locks() {
        let dir = TempDir::new().unwrap();
        let pipfile = dir.path().join("Pipfile.lock");
        fs::write(
            &pipfile,
            r#"{"default": {"certifi": {"version": "==2023.7.22"}},
                "develop": {"pytest": {"version": "==7.4.0"}}}"#,
        )
        .unwrap();
        let poetry = dir.path().join("poetry.lock");
        fs::write(
            &poetry,
            "[[package]]\nname = \"Click\"\nversion = \"8.1.7\"\n\n[[package]]\nname = \"idna\"\nversion = \"3.4\"\n",
        )
        .unwrap();

        let pip_deps = parse_manifest(&pipfile).unwrap();
        assert_eq!(names(&pip_deps), vec!["certifi", "pytest"]);
        assert_eq!(pip_deps[0].version, "2023.7.22");

        let poetry_deps = parse_manifest(&poetry).unwrap();
        assert_eq!(names(&poetry_deps), vec!["click", "idna"]);
        assert_eq!(poetry_deps[0].version, "8.1.7");
    }

    #[test]
    fn test_malformed_manifest_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(&manifest, "{ not json").unwrap();

        let err = parse_manifest(&manifest).unwrap_err();
        assert!(matches!(err, SirenError::ManifestUnreadable { .. }));
    }

    #[test]
    fn test_parse_project_dedups_last_version_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("requirements.txt"),
            "requests==2.0.0\nnumpy==1.0\nrequests==2.31.0\n",
        )
        .unwrap();
        fs::write(dir.path().join("requirements-dev.txt"), "pytest\nNumPy==1.26.0\n").unwrap();

        let project = parse_project(dir.path()).unwrap();

        // requirements-dev.txt sorts before requirements.txt
        assert_eq!(names(&project.dependencies), vec!["pytest", "numpy", "requests"]);
        assert_eq!(project.dependencies[1].version, "1.0");
        assert_eq!(project.dependencies[2].version, "2.31.0");
        assert_eq!(project.manifests.len(), 2);
    }

    #[test]
    fn test_parse_project_keeps_going_after_bad_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{ broken").unwrap();
        fs::write(dir.path().join("requirements.txt"), "flask==3.0.0\n").unwrap();

        let project = parse_project(dir.path()).unwrap();
        assert_eq!(names(&project.dependencies), vec!["flask"]);
        assert_eq!(project.errors.len(), 1);
    }

    #[test]
    fn test_parse_project_fails_when_every_manifest_is_unreadable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{ broken").unwrap();

        let err = parse_project(dir.path()).unwrap_err();
        assert!(matches!(err, SirenError::ManifestUnreadable { .. }));
    }

    #[test]
    fn test_discovery_skips_vendored_dirs() {
        let dir = TempDir::new().unwrap();
        let vendored = dir.path().join("node_modules").join("left-pad");
        fs::create_dir_all(&vendored).unwrap();
        fs::write(vendored.join("package.json"), "{}").unwrap();
        let nested = dir.path().join("web");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("package.json"), "{}").unwrap();

        let manifests = discover_manifests(dir.path());
        assert_eq!(manifests, vec![nested.join("package.json")]);
    }

    #[test]
    fn test_no_manifests() {
        let dir = TempDir::new().unwrap();
        let err = parse_project(dir.path()).unwrap_err();
        assert!(matches!(err, SirenError::NoManifests(_)));
    }
}
