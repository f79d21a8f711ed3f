use super::LaunchError;
use crate::render::quote;
use itertools::Itertools;
use serde::{
    de::{self, MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{fmt, iter, path::PathBuf};

/// A single scalar written in the launch file, kept as the exact text it was
/// written with. `0.010` stays `0.010` and `1e-3` stays `1e-3`, so
/// hyperparameters need no quoting.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Scalar(String);

impl Scalar {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        scalar.0
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One element of the argument vector, either a lone token or a flag
/// followed by its value.
///
/// In a launch file a lone token is a plain scalar and a pair is a single
/// entry map, e.g. `- --verbose` and `- -lr: 0.01`. Pair values keep their
/// text verbatim; a bare numeric token is reformatted by the YAML parser
/// and has to be quoted to survive unchanged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Argument {
    Flag(String),
    Pair(String, String),
}

impl Argument {
    pub fn flag(flag: impl Into<String>) -> Self {
        Self::Flag(flag.into())
    }

    pub fn pair(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Pair(flag.into(), value.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Flag(flag) | Self::Pair(flag, _) => flag,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Flag(_) => None,
            Self::Pair(_, value) => Some(value),
        }
    }

    /// tokens in the order they appear on the command line
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        iter::once(self.name()).chain(self.value())
    }
}

struct ArgumentVisitor;

impl<'de> Visitor<'de> for ArgumentVisitor {
    type Value = Argument;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a lone token or a single entry `flag: value` map")
    }

    fn visit_str<E: de::Error>(self, token: &str) -> Result<Argument, E> {
        Ok(Argument::flag(token))
    }

    fn visit_string<E: de::Error>(self, token: String) -> Result<Argument, E> {
        Ok(Argument::Flag(token))
    }

    fn visit_bool<E: de::Error>(self, token: bool) -> Result<Argument, E> {
        Ok(Argument::Flag(token.to_string()))
    }

    fn visit_i64<E: de::Error>(self, token: i64) -> Result<Argument, E> {
        Ok(Argument::Flag(token.to_string()))
    }

    fn visit_u64<E: de::Error>(self, token: u64) -> Result<Argument, E> {
        Ok(Argument::Flag(token.to_string()))
    }

    fn visit_f64<E: de::Error>(self, token: f64) -> Result<Argument, E> {
        Ok(Argument::Flag(token.to_string()))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Argument, A::Error> {
        // values go through `Scalar` so the parser hands over the written text
        let (flag, value) = map
            .next_entry::<String, Option<Scalar>>()?
            .ok_or_else(|| <A::Error as de::Error>::invalid_length(0, &self))?;

        if map.next_key::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(
                "a flag/value pair needs exactly one entry, split it into one item per flag",
            ));
        }

        Ok(match value {
            Some(value) => Argument::Pair(flag, value.into()),
            None => Argument::Flag(flag),
        })
    }
}

impl<'de> Deserialize<'de> for Argument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ArgumentVisitor)
    }
}

impl Serialize for Argument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Flag(flag) => serializer.serialize_str(flag),
            Self::Pair(flag, value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(flag, value)?;
                map.end()
            }
        }
    }
}

/// The program a job finally runs: `<interpreter> <script_path> <arguments...>`
/// started from `working_directory`. Argument semantics are opaque here.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InvocationSpec {
    // falls back to the directory the job was submitted from
    #[serde(default, alias = "workdir")]
    pub working_directory: Option<PathBuf>,
    pub interpreter: String,
    #[serde(alias = "script")]
    pub script_path: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

impl InvocationSpec {
    pub fn new(interpreter: impl Into<String>, script_path: impl Into<String>) -> Self {
        Self {
            working_directory: None,
            interpreter: interpreter.into(),
            script_path: script_path.into(),
            arguments: Vec::new(),
        }
    }

    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    pub fn arg(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn pair(self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.arg(Argument::pair(flag, value))
    }

    pub fn flag(self, flag: impl Into<String>) -> Self {
        self.arg(Argument::flag(flag))
    }

    pub fn validate(&self) -> Result<(), LaunchError> {
        if self.interpreter.trim().is_empty() {
            return Err(LaunchError::invocation("interpreter", "must not be empty"));
        }

        if self.script_path.trim().is_empty() {
            return Err(LaunchError::invocation("script_path", "must not be empty"));
        }

        if let Some(directory) = &self.working_directory {
            let directory = directory.to_string_lossy();
            if directory.trim().is_empty() || has_line_break(&directory) {
                return Err(LaunchError::invocation(
                    "working_directory",
                    "must be a non-empty single line path",
                ));
            }
        }

        if has_line_break(&self.interpreter) {
            return Err(LaunchError::invocation("interpreter", "must not contain line breaks"));
        }

        if has_line_break(&self.script_path) {
            return Err(LaunchError::invocation("script_path", "must not contain line breaks"));
        }

        for (position, argument) in self.arguments.iter().enumerate() {
            if argument.name().is_empty() {
                return Err(LaunchError::invocation(
                    "arguments",
                    format!("argument {position} has an empty flag"),
                ));
            }

            if argument.tokens().any(has_line_break) {
                return Err(LaunchError::invocation(
                    "arguments",
                    format!("argument {position} ({}) contains a line break", argument.name()),
                ));
            }
        }

        Ok(())
    }

    /// the invocation line, every argument kept as exactly one shell token
    pub fn command_line(&self) -> String {
        [self.interpreter.as_str(), self.script_path.as_str()]
            .into_iter()
            .chain(self.arguments.iter().flat_map(|argument| argument.tokens()))
            .map(quote)
            .join(" ")
    }
}

fn has_line_break(token: &str) -> bool {
    token.contains(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_keeps_argument_order() {
        let spec = InvocationSpec::new("python3", "./experiment_ss.py")
            .pair("-p", "uniform-varratio")
            .pair("-f", "TEST_experiment_ss")
            .pair("-data", "mnist");

        assert_eq!(
            spec.command_line(),
            "python3 ./experiment_ss.py -p uniform-varratio -f TEST_experiment_ss -data mnist"
        );
    }

    #[test]
    fn flags_and_pairs_interleave_without_dedup() {
        let spec = InvocationSpec::new("python3", "run.py")
            .flag("--verbose")
            .pair("-s", "1")
            .flag("--verbose")
            .pair("-s", "2");

        assert_eq!(
            spec.command_line(),
            "python3 run.py --verbose -s 1 --verbose -s 2"
        );
    }

    #[test]
    fn tokens_with_spaces_stay_single_tokens() {
        let spec = InvocationSpec::new("python3", "run.py")
            .pair("--comment", "first try")
            .pair("--empty", "");

        assert_eq!(
            spec.command_line(),
            "python3 run.py --comment 'first try' --empty ''"
        );
    }

    #[test]
    fn empty_interpreter_or_script_is_rejected() {
        assert!(matches!(
            InvocationSpec::new("", "run.py").validate(),
            Err(LaunchError::InvalidInvocation { field: "interpreter", .. })
        ));
        assert!(matches!(
            InvocationSpec::new("python3", " ").validate(),
            Err(LaunchError::InvalidInvocation { field: "script_path", .. })
        ));
    }

    #[test]
    fn broken_arguments_are_rejected() {
        let empty_flag = InvocationSpec::new("python3", "run.py").pair("", "1");
        assert!(matches!(
            empty_flag.validate(),
            Err(LaunchError::InvalidInvocation { field: "arguments", .. })
        ));

        let multiline = InvocationSpec::new("python3", "run.py").pair("-m", "a\nb");
        assert!(matches!(
            multiline.validate(),
            Err(LaunchError::InvalidInvocation { field: "arguments", .. })
        ));
    }

    #[test]
    fn deserializes_argument_forms() {
        let arguments: Vec<Argument> = serde_yaml::from_str(
            "- --verbose\n- -p: uniform-varratio\n- -lr: 0.01\n- -bayes: true\n- -n: 10\n- --dry:\n- 42\n",
        )
        .unwrap();

        assert_eq!(
            arguments,
            vec![
                Argument::flag("--verbose"),
                Argument::pair("-p", "uniform-varratio"),
                Argument::pair("-lr", "0.01"),
                Argument::pair("-bayes", "true"),
                Argument::pair("-n", "10"),
                Argument::flag("--dry"),
                Argument::flag("42"),
            ]
        );
    }

    #[test]
    fn values_keep_their_written_text() {
        let spec: InvocationSpec = serde_yaml::from_str(
            "interpreter: python3\nscript: run.py\narguments:\n  - -lr: 0.010\n  - -eps: 1e-3\n  - -tag: 1.10\n  - -seed: 007\n  - -rate: 0x1F\n  - \"0.50\"\n",
        )
        .unwrap();

        assert_eq!(
            spec.command_line(),
            "python3 run.py -lr 0.010 -eps 1e-3 -tag 1.10 -seed 007 -rate 0x1F 0.50"
        );
    }

    #[test]
    fn pairs_serialize_as_single_entry_maps() {
        let arguments = vec![Argument::flag("--verbose"), Argument::pair("-lr", "0.010")];
        let text = serde_yaml::to_string(&arguments).unwrap();
        let back: Vec<Argument> = serde_yaml::from_str(&text).unwrap();

        assert_eq!(back, arguments);
    }

    #[test]
    fn rejects_multi_entry_pairs() {
        assert!(serde_yaml::from_str::<Vec<Argument>>("- {-a: 1, -b: 2}\n").is_err());
        assert!(serde_yaml::from_str::<Vec<Argument>>("- [-a, 1]\n").is_err());
    }
}
