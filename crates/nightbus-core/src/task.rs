use crate::error::SpecError;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// A single task that we can run on one or more hosts.
///
/// `script` is fully assembled when the task is created: parameter
/// assignments, the shared prologue, included files and finally the task's
/// own commands, joined by newlines. Running a task never reads files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub script: String,
    /// Interpreter override, e.g. `bash -l -c`. `None` means the executor default.
    pub shell: Option<String>,
}

/// A literal parameter value from the task document.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            // Debug keeps the fractional part of whole numbers: `3.0`, not `3`.
            Scalar::Float(x) => write!(f, "{:?}", x),
            Scalar::Str(s) => write!(f, "{}", s),
        }
    }
}

/// One entry in a parameter's value list.
///
/// The value used in the script may be unsuitable for a task name (empty,
/// unprintable, contains slashes), so it can be given together with a
/// separate `repr` that is used for naming instead.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Detailed {
        value: Scalar,
        #[serde(default)]
        repr: Option<Scalar>,
    },
    Literal(Scalar),
}

impl ParameterValue {
    /// Text assigned to the parameter inside the script.
    pub fn value(&self) -> String {
        match self {
            ParameterValue::Detailed { value, .. } => value.to_string(),
            ParameterValue::Literal(value) => value.to_string(),
        }
    }

    /// Text used when naming the expanded task.
    pub fn repr(&self) -> String {
        match self {
            ParameterValue::Detailed {
                repr: Some(repr), ..
            } => repr.to_string(),
            _ => self.value(),
        }
    }
}

/// Parameter name to value list. Sorted by name, which fixes the expansion order.
pub type ParameterSet = BTreeMap<String, Vec<ParameterValue>>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "OneOrMany")]
struct IncludeList(Vec<PathBuf>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl From<OneOrMany> for IncludeList {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(path) => IncludeList(vec![path]),
            OneOrMany::Many(paths) => IncludeList(paths),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Defaults {
    #[serde(default)]
    shell: Option<String>,
    #[serde(default)]
    prologue: Option<String>,
    #[serde(default)]
    include: Option<IncludeList>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskEntry {
    name: String,
    commands: String,
    #[serde(default)]
    shell: Option<String>,
    #[serde(default)]
    include: Option<IncludeList>,
    #[serde(default)]
    parameters: Option<ParameterSet>,
}

/// The ordered list of tasks described by a tasks file.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: Vec<TaskSpec>,
}

impl TaskList {
    /// Read and parse a tasks file.
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parse a task document: either a bare list of tasks, or a mapping
    /// with a `tasks` list and optional `defaults`.
    pub fn parse(text: &str) -> Result<Self, SpecError> {
        let contents: Value = serde_yaml::from_str(text)?;

        let (defaults, entries) = match contents {
            Value::Sequence(_) => (Defaults::default(), contents),
            Value::Mapping(mut map) => {
                let entries = map
                    .remove("tasks")
                    .ok_or_else(|| SpecError::Malformed("missing 'tasks' list".into()))?;
                if !entries.is_sequence() {
                    return Err(SpecError::Malformed("'tasks' must be a list".into()));
                }
                let defaults = match map.remove("defaults") {
                    None | Some(Value::Null) => Defaults::default(),
                    Some(value) => serde_yaml::from_value(value)?,
                };
                if let Some((key, _)) = map.iter().next() {
                    return Err(SpecError::Malformed(format!(
                        "unexpected top-level key {}",
                        serde_yaml::to_string(key).unwrap_or_default().trim()
                    )));
                }
                (defaults, entries)
            }
            _ => {
                return Err(SpecError::Malformed(
                    "expected a list of tasks or a mapping with a 'tasks' list".into(),
                ))
            }
        };

        let entries: Vec<TaskEntry> = serde_yaml::from_value(entries)?;

        let mut tasks = Vec::new();
        for entry in &entries {
            tasks.extend(create_tasks(entry, &defaults)?);
        }

        let mut seen = HashSet::new();
        for task in &tasks {
            if !seen.insert(task.name.as_str()) {
                return Err(SpecError::DuplicateTaskName(task.name.clone()));
            }
        }

        Ok(Self { tasks })
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Tasks whose names appear in `names`, in document order. An empty
    /// selection means every task.
    pub fn select(&self, names: &[String]) -> Result<Vec<TaskSpec>, SpecError> {
        if names.is_empty() {
            return Ok(self.tasks.clone());
        }
        if let Some(unknown) = names.iter().find(|n| !self.tasks.iter().any(|t| &t.name == *n)) {
            return Err(SpecError::UnknownTask(unknown.clone()));
        }
        Ok(self
            .tasks
            .iter()
            .filter(|t| names.contains(&t.name))
            .cloned()
            .collect())
    }

    pub fn into_inner(self) -> Vec<TaskSpec> {
        self.tasks
    }
}

impl Deref for TaskList {
    type Target = [TaskSpec];

    fn deref(&self) -> &[TaskSpec] {
        &self.tasks
    }
}

/// Create one or more tasks for a task list entry. There is more than one
/// when the entry has `parameters`.
fn create_tasks(entry: &TaskEntry, defaults: &Defaults) -> Result<Vec<TaskSpec>, SpecError> {
    let include_paths = defaults
        .include
        .iter()
        .chain(entry.include.iter())
        .flat_map(|list| list.0.iter());

    let mut included = Vec::new();
    for path in include_paths {
        let text = std::fs::read_to_string(path).map_err(|source| SpecError::TaskDefinition {
            task: entry.name.clone(),
            path: path.clone(),
            source,
        })?;
        included.push(text);
    }

    let shell = entry.shell.clone().or_else(|| defaults.shell.clone());
    let prologue = defaults.prologue.as_deref();

    let Some(parameters) = &entry.parameters else {
        return Ok(vec![TaskSpec {
            name: entry.name.clone(),
            script: assemble_script(&[], prologue, &included, &entry.commands),
            shell,
        }]);
    };

    if let Some((name, _)) = parameters.iter().find(|(_, values)| values.is_empty()) {
        return Err(SpecError::InvalidTask {
            task: entry.name.clone(),
            reason: format!("parameter '{}' has no values", name),
        });
    }

    let tasks = combinations(parameters)
        .into_iter()
        .map(|combo| {
            let name = std::iter::once(entry.name.clone())
                .chain(combo.iter().map(|(_, value)| value.repr()))
                .collect::<Vec<_>>()
                .join(".");
            TaskSpec {
                name,
                script: assemble_script(&combo, prologue, &included, &entry.commands),
                shell: shell.clone(),
            }
        })
        .collect();
    Ok(tasks)
}

/// Every combination of parameter values, first parameter varying slowest.
fn combinations(parameters: &ParameterSet) -> Vec<Vec<(&str, &ParameterValue)>> {
    let mut combos = vec![Vec::new()];
    for (name, values) in parameters {
        combos = combos
            .into_iter()
            .flat_map(|combo| {
                values.iter().map(move |value| {
                    let mut next = combo.clone();
                    next.push((name.as_str(), value));
                    next
                })
            })
            .collect();
    }
    combos
}

fn assemble_script(
    parameters: &[(&str, &ParameterValue)],
    prologue: Option<&str>,
    included: &[String],
    commands: &str,
) -> String {
    let mut parts: Vec<String> = parameters
        .iter()
        .map(|(name, value)| format!("{}={}", name, value.value()))
        .collect();
    if let Some(prologue) = prologue.filter(|p| !p.is_empty()) {
        parts.push(prologue.to_string());
    }
    parts.extend(included.iter().cloned());
    parts.push(commands.to_string());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_simple() {
        let tasks = TaskList::parse(
            r#"
tasks:
- name: print-hello
  commands: echo "hello"
"#,
        )
        .unwrap();
        assert_eq!(tasks.names(), vec!["print-hello"]);
    }

    #[test]
    fn test_bare_list() {
        let tasks = TaskList::parse(
            r#"
- name: print-hello
  commands: echo "hello"
"#,
        )
        .unwrap();
        assert_eq!(tasks.names(), vec!["print-hello"]);
    }

    #[test]
    fn test_script_is_command_body_without_extras() {
        let tasks = TaskList::parse("- name: a\n  commands: make -j8 all\n").unwrap();
        assert_eq!(tasks[0].script, "make -j8 all");
        assert_eq!(tasks[0].shell, None);
    }

    #[test]
    fn test_defaults() {
        let tasks = TaskList::parse(
            r#"
defaults:
  shell: bash -l -c
  prologue: set -e
tasks:
  - name: print-hello
    commands: echo "hello"
  - name: say-goodbye
    shell: zsh -c
    commands: echo "goodbye"
"#,
        )
        .unwrap();

        assert_eq!(tasks[0].shell.as_deref(), Some("bash -l -c"));
        assert_eq!(tasks[0].script, "set -e\necho \"hello\"");
        assert_eq!(tasks[1].shell.as_deref(), Some("zsh -c"));
        assert_eq!(tasks[1].script, "set -e\necho \"goodbye\"");
    }

    #[test]
    fn test_include() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, text: &str| {
            let path = dir.path().join(name);
            let mut f = std::fs::File::create(&path).unwrap();
            f.write_all(text.as_bytes()).unwrap();
            path.display().to_string()
        };
        let inc1 = write("inc1", "set -e");
        let inc2 = write("inc2", "echo \"I am included\"");
        let inc3 = write("inc3", "echo \"I am also included\"");

        let doc = format!(
            r#"
defaults:
  include: {inc1}
tasks:
- name: print-hello
  include: {inc2}
  commands: echo "hello"
- name: print-hello-2
  include: [ {inc2}, {inc3} ]
  commands: echo "hello"
"#
        );
        let tasks = TaskList::parse(&doc).unwrap();

        assert_eq!(tasks[0].script, "set -e\necho \"I am included\"\necho \"hello\"");
        assert_eq!(
            tasks[1].script,
            "set -e\necho \"I am included\"\necho \"I am also included\"\necho \"hello\""
        );
    }

    #[test]
    fn test_missing_include_names_task_and_path() {
        let err = TaskList::parse(
            r#"
- name: build
  include: /nonexistent/nightbus-include.sh
  commands: make
"#,
        )
        .unwrap_err();
        match err {
            SpecError::TaskDefinition { task, path, .. } => {
                assert_eq!(task, "build");
                assert_eq!(path, PathBuf::from("/nonexistent/nightbus-include.sh"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parameters_expand_to_cartesian_product() {
        let tasks = TaskList::parse(
            r#"
- name: build
  parameters:
    target: [x86_64, aarch64, riscv64]
    profile: [debug, release]
  commands: cargo build --target $target --profile $profile
"#,
        )
        .unwrap();

        // Sorted by parameter name: profile first, then target.
        assert_eq!(
            tasks.names(),
            vec![
                "build.debug.x86_64",
                "build.debug.aarch64",
                "build.debug.riscv64",
                "build.release.x86_64",
                "build.release.aarch64",
                "build.release.riscv64",
            ]
        );
        assert_eq!(
            tasks[4].script,
            "profile=release\ntarget=aarch64\ncargo build --target $target --profile $profile"
        );
    }

    #[test]
    fn test_single_parameter() {
        let tasks = TaskList::parse(
            r#"
- name: test
  parameters:
    jobs: [1, 2, 4]
  commands: make -j$jobs check
"#,
        )
        .unwrap();
        assert_eq!(tasks.names(), vec!["test.1", "test.2", "test.4"]);
        assert_eq!(tasks[2].script, "jobs=4\nmake -j$jobs check");
    }

    #[test]
    fn test_float_parameters_keep_fraction() {
        let tasks = TaskList::parse(
            r#"
- name: py
  parameters:
    version: [3.0, 3.10, 2.7]
  commands: run $version
"#,
        )
        .unwrap();
        assert_eq!(tasks.names(), vec!["py.3.0", "py.3.1", "py.2.7"]);
        assert_eq!(tasks[0].script, "version=3.0\nrun $version");
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::Bool(true).to_string(), "true");
        assert_eq!(Scalar::Int(3).to_string(), "3");
        assert_eq!(Scalar::Float(1.5).to_string(), "1.5");
        assert_eq!(Scalar::Float(3.0).to_string(), "3.0");
        assert_eq!(Scalar::Str("text".into()).to_string(), "text");
    }

    #[test]
    fn test_parameter_repr() {
        let tasks = TaskList::parse(
            r#"
defaults:
  prologue: set -e
tasks:
- name: configure
  parameters:
    flags:
      - { value: "", repr: none }
      - { value: "--enable-debug", repr: debug }
      - plain
  commands: ./configure $flags
"#,
        )
        .unwrap();
        assert_eq!(
            tasks.names(),
            vec!["configure.none", "configure.debug", "configure.plain"]
        );
        assert_eq!(tasks[0].script, "flags=\nset -e\n./configure $flags");
        assert_eq!(
            tasks[1].script,
            "flags=--enable-debug\nset -e\n./configure $flags"
        );
    }

    #[test]
    fn test_empty_parameters_mapping_is_single_task() {
        let tasks =
            TaskList::parse("- name: a\n  parameters: {}\n  commands: 'true'\n").unwrap();
        assert_eq!(tasks.names(), vec!["a"]);
        assert_eq!(tasks[0].script, "true");
    }

    #[test]
    fn test_empty_parameter_list_is_rejected() {
        let err = TaskList::parse("- name: a\n  parameters: { p: [] }\n  commands: 'true'\n")
            .unwrap_err();
        assert!(matches!(err, SpecError::InvalidTask { ref task, .. } if task == "a"));
    }

    #[test]
    fn test_colliding_reprs_fail() {
        let err = TaskList::parse(
            r#"
- name: a
  parameters:
    p:
      - { value: 1, repr: same }
      - { value: 2, repr: same }
  commands: 'true'
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::DuplicateTaskName(ref n) if n == "a.same"));
    }

    #[test]
    fn test_malformed_documents() {
        for doc in ["just a string", "42", "", "defaults: {}", "tasks: nope"] {
            let err = TaskList::parse(doc).unwrap_err();
            assert!(matches!(err, SpecError::Malformed(_)), "{doc:?} gave {err:?}");
        }
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(TaskList::parse("- name: a\n  command: typo\n").is_err());
        assert!(TaskList::parse("tasks: []\nextra: 1\n").is_err());
        assert!(TaskList::parse("defaults: { shel: sh }\ntasks: []\n").is_err());
    }

    #[test]
    fn test_select_keeps_document_order() {
        let tasks = TaskList::parse(
            "- {name: a, commands: 'true'}\n- {name: b, commands: 'true'}\n- {name: c, commands: 'true'}\n",
        )
        .unwrap();
        let picked = tasks.select(&["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(picked.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), ["a", "c"]);
        assert_eq!(tasks.select(&[]).unwrap().len(), 3);
        assert!(matches!(
            tasks.select(&["zzz".to_string()]),
            Err(SpecError::UnknownTask(_))
        ));
    }
}
