//! Configuration types deserialized from `kiln.toml`.

use std::path::{Path, PathBuf};

use kiln_persist::{HeadData, Value};
use serde::Deserialize;

/// The top-level project configuration parsed from `kiln.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata (name, version).
    pub project: ProjectMeta,
    /// Where and how the build graph is cached.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Free-form project properties.
    ///
    /// These are recorded in the head metadata of the cached build graph, so
    /// changing any of them invalidates the cache.
    #[serde(default)]
    pub properties: toml::Table,
}

/// Core project metadata required in every `kiln.toml`.
#[derive(Debug, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// The project version string.
    pub version: String,
    /// A brief description of the project.
    #[serde(default)]
    pub description: String,
}

/// Build graph cache settings from the `[cache]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache directory, relative to the project directory unless absolute.
    pub dir: PathBuf,
    /// File name of the build graph inside the cache directory.
    pub file: String,
    /// Size of the write buffer used while saving, in KiB.
    pub write_buffer_kib: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".kiln-cache"),
            file: "build-graph.bin".to_string(),
            write_buffer_kib: 64,
        }
    }
}

impl CacheSettings {
    /// Resolves the cache directory against `project_dir`.
    pub fn cache_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.dir)
    }

    /// Full path of the build graph file for a project in `project_dir`.
    pub fn graph_path(&self, project_dir: &Path) -> PathBuf {
        self.cache_dir(project_dir).join(&self.file)
    }

    /// Write buffer size in bytes.
    pub fn write_buffer_bytes(&self) -> usize {
        self.write_buffer_kib.saturating_mul(1024)
    }
}

impl ProjectConfig {
    /// The configuration snapshot stored ahead of the build graph.
    ///
    /// Holds the project name and version under `project` and every entry
    /// of `[properties]` under `properties`. Cache settings are not part of
    /// it: moving the cache does not change what was built.
    pub fn head_data(&self) -> HeadData {
        let project: Value = [
            ("name".to_string(), Value::from(self.project.name.as_str())),
            ("version".to_string(), Value::from(self.project.version.as_str())),
        ]
        .into_iter()
        .collect();
        let mut head = HeadData::new();
        head.insert("project", project);
        head.insert("properties", table_to_value(&self.properties));
        head
    }
}

/// Converts a TOML value to a [`Value`].
///
/// TOML has no null, and datetimes have no counterpart, so they become their
/// RFC 3339 string form.
pub fn toml_to_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => table_to_value(table),
    }
}

fn table_to_value(table: &toml::Table) -> Value {
    table
        .iter()
        .map(|(key, value)| (key.clone(), toml_to_value(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(properties: &str) -> ProjectConfig {
        let text = format!(
            "[project]\nname = \"app\"\nversion = \"1.2.0\"\n\n[properties]\n{properties}"
        );
        toml::from_str(&text).unwrap()
    }

    #[test]
    fn cache_defaults() {
        let settings = CacheSettings::default();
        assert_eq!(settings.dir, PathBuf::from(".kiln-cache"));
        assert_eq!(settings.file, "build-graph.bin");
        assert_eq!(settings.write_buffer_bytes(), 64 * 1024);
        assert_eq!(
            settings.graph_path(Path::new("/work/app")),
            PathBuf::from("/work/app/.kiln-cache/build-graph.bin")
        );
    }

    #[test]
    fn absolute_cache_dir_is_kept() {
        let settings = CacheSettings {
            dir: PathBuf::from("/var/cache/kiln"),
            ..CacheSettings::default()
        };
        assert_eq!(
            settings.cache_dir(Path::new("/work/app")),
            PathBuf::from("/var/cache/kiln")
        );
    }

    #[test]
    fn scalar_properties_convert() {
        let cfg = config("profile = \"release\"\njobs = 8\nlto = true\nratio = 0.5\n");
        let props = cfg.head_data();
        let props = props.get("properties").unwrap();
        assert_eq!(props.get("profile"), Some(&Value::from("release")));
        assert_eq!(props.get("jobs"), Some(&Value::Int(8)));
        assert_eq!(props.get("lto"), Some(&Value::Bool(true)));
        assert_eq!(props.get("ratio"), Some(&Value::Float(0.5)));
    }

    #[test]
    fn nested_properties_convert() {
        let cfg = config("defines = [\"NDEBUG\", \"QT_NO_CAST\"]\n[properties.cpp]\nstd = 17\n");
        let head = cfg.head_data();
        let props = head.get("properties").unwrap();
        assert_eq!(
            props.get("defines").and_then(Value::as_list).map(<[Value]>::len),
            Some(2)
        );
        assert_eq!(props.get("cpp").and_then(|c| c.get("std")), Some(&Value::Int(17)));
    }

    #[test]
    fn datetimes_become_strings() {
        let cfg = config("released = 1979-05-27T07:32:00Z\n");
        let head = cfg.head_data();
        assert_eq!(
            head.get("properties").and_then(|p| p.get("released")),
            Some(&Value::from("1979-05-27T07:32:00Z"))
        );
    }

    #[test]
    fn head_records_project_identity() {
        let head = config("").head_data();
        let project = head.get("project").unwrap();
        assert_eq!(project.get("name"), Some(&Value::from("app")));
        assert_eq!(project.get("version"), Some(&Value::from("1.2.0")));
        assert_eq!(head.get("properties"), Some(&Value::Map(Default::default())));
    }

    #[test]
    fn property_change_changes_fingerprint() {
        let a = config("profile = \"debug\"\n").head_data();
        let b = config("profile = \"release\"\n").head_data();
        let c = config("profile = \"debug\"\n").head_data();
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }
}
