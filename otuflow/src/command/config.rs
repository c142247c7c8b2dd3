//! Directive files that configure external commands.
//!
//! Each line holds one directive:
//!
//! ```text
//! CMD usearch            # executable name
//! ENV /opt/usearch/bin   # directory the executable lives in
//! ARG -id 0.97           # flag with a value
//! VAL -quiet             # bare flag
//! ```
//!
//! Text after `#` is ignored, as are blank lines and lines whose first token is not a
//! known keyword. A known keyword with the wrong number of fields is an error, and a file
//! containing any such line applies nothing.

use super::ExternalCommand;
use crate::errors::{BadDirectiveError, ConfigError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One parsed configuration directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// `CMD name`: the executable token.
    Command(String),
    /// `ENV dir`: the executable's directory.
    ProgramDir(PathBuf),
    /// `ARG flag value`: a flag/value pair.
    Argument {
        /// The flag.
        flag: String,
        /// Its value.
        value: String,
    },
    /// `VAL flag`: a bare flag.
    Flag(String),
}

impl Directive {
    /// Applies the directive to `command`.
    pub fn apply(&self, command: &mut ExternalCommand) {
        match self {
            Self::Command(name) => command.set_program(name.clone()),
            Self::ProgramDir(dir) => command.set_program_dir(dir.clone()),
            Self::Argument { flag, value } => {
                command.arg(flag.clone(), value.clone());
            }
            Self::Flag(flag) => {
                command.flag(flag.clone());
            }
        }
    }
}

/// The result of parsing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// A well-formed directive.
    Directive(Directive),
    /// Blank, comment-only, or unknown keyword.
    Skip,
    /// A known keyword with the wrong field count.
    Malformed {
        /// The keyword.
        keyword: &'static str,
        /// Expected field count, keyword included.
        expected: usize,
        /// Actual field count, keyword included.
        found: usize,
    },
}

/// Parses a single line.
#[must_use]
pub fn parse_line(line: &str) -> ParsedLine {
    let content = line.split('#').next().unwrap_or_default();
    let fields: Vec<&str> = content.split_whitespace().collect();
    let Some(&keyword) = fields.first() else {
        return ParsedLine::Skip;
    };

    let (keyword, expected): (&'static str, usize) = match keyword {
        "ARG" => ("ARG", 3),
        "VAL" => ("VAL", 2),
        "ENV" => ("ENV", 2),
        "CMD" => ("CMD", 2),
        _ => return ParsedLine::Skip,
    };
    if fields.len() != expected {
        return ParsedLine::Malformed {
            keyword,
            expected,
            found: fields.len(),
        };
    }

    let directive = match keyword {
        "ARG" => Directive::Argument {
            flag: fields[1].to_string(),
            value: fields[2].to_string(),
        },
        "VAL" => Directive::Flag(fields[1].to_string()),
        "ENV" => Directive::ProgramDir(PathBuf::from(fields[1])),
        _ => Directive::Command(fields[1].to_string()),
    };
    ParsedLine::Directive(directive)
}

/// A fully parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandConfig {
    directives: Vec<Directive>,
}

impl CommandConfig {
    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns the first malformed directive, with its one-based line number.
    pub fn parse(text: &str) -> Result<Self, BadDirectiveError> {
        let mut directives = Vec::new();
        for (index, line) in text.lines().enumerate() {
            match parse_line(line) {
                ParsedLine::Directive(directive) => directives.push(directive),
                ParsedLine::Skip => {}
                ParsedLine::Malformed {
                    keyword,
                    expected,
                    found,
                } => {
                    return Err(BadDirectiveError {
                        line: index + 1,
                        keyword: keyword.to_string(),
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(Self { directives })
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing, and the read or parse
    /// error otherwise.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text)?)
    }

    /// The parsed directives in file order.
    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Applies every directive to `command`, in file order.
    pub fn apply(&self, command: &mut ExternalCommand) {
        for directive in &self.directives {
            directive.apply(command);
        }
    }
}

/// Resolves `<name>.config` files inside a fixed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a loader rooted at `config_dir`.
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// The directory configuration files are read from.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The path of the named configuration file.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{name}.config"))
    }

    /// Loads and parses the named configuration file.
    ///
    /// # Errors
    ///
    /// See [`CommandConfig::from_file`].
    pub fn load(&self, name: &str) -> Result<CommandConfig, ConfigError> {
        let path = self.path_for(name);
        debug!(config = %path.display(), "Loading command configuration");
        CommandConfig::from_file(&path)
    }

    /// Loads the named configuration and applies it to `command`.
    ///
    /// # Errors
    ///
    /// See [`CommandConfig::from_file`]. Nothing is applied on error.
    pub fn configure(&self, name: &str, command: &mut ExternalCommand) -> Result<(), ConfigError> {
        self.load(name)?.apply(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_line_kinds() {
        assert_eq!(parse_line(""), ParsedLine::Skip);
        assert_eq!(parse_line("   # only a comment"), ParsedLine::Skip);
        assert_eq!(parse_line("FOO bar baz"), ParsedLine::Skip);
        assert_eq!(
            parse_line("ARG -id 0.97 # identity"),
            ParsedLine::Directive(Directive::Argument {
                flag: "-id".to_string(),
                value: "0.97".to_string(),
            })
        );
        assert_eq!(
            parse_line("\tVAL   -quiet"),
            ParsedLine::Directive(Directive::Flag("-quiet".to_string()))
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(parse_line("arg -a b"), ParsedLine::Skip);
    }

    #[test]
    fn test_round_trip_to_argv() {
        let config = CommandConfig::parse("CMD x\nENV p\nARG -a v\nVAL -f\n").unwrap();
        let mut command = ExternalCommand::new("placeholder");
        config.apply(&mut command);
        assert_eq!(command.argv(), vec!["p/x", "-a", "v", "-f"]);
    }

    #[test]
    fn test_repeated_val_directives_in_order() {
        let config = CommandConfig::parse("VAL -v\nVAL -quiet\nVAL -v\n").unwrap();
        let mut command = ExternalCommand::new("tool");
        config.apply(&mut command);
        assert_eq!(command.argv(), vec!["tool", "-v", "-quiet", "-v"]);
    }

    #[test]
    fn test_malformed_line_applies_nothing() {
        let err = CommandConfig::parse("CMD tool\nARG onlyonearg\n").unwrap_err();
        assert_eq!(
            err,
            BadDirectiveError {
                line: 2,
                keyword: "ARG".to_string(),
                expected: 3,
                found: 2,
            }
        );
    }

    #[test]
    fn test_extra_fields_are_malformed() {
        assert_eq!(
            parse_line("CMD usearch extra"),
            ParsedLine::Malformed {
                keyword: "CMD",
                expected: 2,
                found: 3,
            }
        );
    }

    #[test]
    fn test_config_overrides_stage_arguments() {
        let mut command = ExternalCommand::new("usearch");
        command.arg("-otus", "otus.fasta").arg("-relabel", "OTU_");
        CommandConfig::parse("ARG -relabel Otu\nARG -minsize 2")
            .unwrap()
            .apply(&mut command);
        assert_eq!(
            command.argv(),
            vec!["usearch", "-otus", "otus.fasta", "-relabel", "Otu", "-minsize", "2"]
        );
    }

    #[test]
    fn test_loader_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path());
        let err = loader.load("pandaseq").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p.ends_with("pandaseq.config")));
    }

    #[test]
    fn test_loader_configures_command() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pandaseq.config"), "CMD pandaseq\nVAL -N\n").unwrap();

        let loader = ConfigLoader::new(dir.path());
        let mut command = ExternalCommand::new("unset");
        loader.configure("pandaseq", &mut command).unwrap();
        assert_eq!(command.argv(), vec!["pandaseq", "-N"]);
    }
}
