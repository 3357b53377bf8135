//! Operator commands
//!
//! One command per line, e.g. `factor 0.0041` or `stop`. Parsing rejects
//! anything non-numeric before it can reach the shared parameters.

use std::str::FromStr;

use super::{ConfigError, SharedParameters};

/// A command typed by the operator while a session runs
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    /// Set the distance factor
    Factor(f64),
    /// Set the stabilization wait
    Stabilize(f64),
    /// Set the commit wait
    Commit(f64),
    /// Set the confidence threshold
    Confidence(f32),
    /// Begin playing
    Start,
    /// Stop playing (the sensing loop keeps running)
    Stop,
    /// Print the current status
    Status,
    /// Save the latest annotated frame as an image
    Snapshot(String),
    /// End the session
    Quit,
}

impl OperatorCommand {
    /// Apply a parameter change. Returns `false` for commands that are not
    /// parameter changes.
    pub fn apply(&self, params: &SharedParameters) -> Result<bool, ConfigError> {
        match *self {
            OperatorCommand::Factor(v) => params.set_factor(v)?,
            OperatorCommand::Stabilize(v) => params.set_stabilize_seconds(v)?,
            OperatorCommand::Commit(v) => params.set_commit_seconds(v)?,
            OperatorCommand::Confidence(v) => params.set_confidence_threshold(v)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl FromStr for OperatorCommand {
    type Err = ConfigError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Err(ConfigError::UnknownCommand(String::new()));
        };
        let arg = parts.next();

        match keyword.to_ascii_lowercase().as_str() {
            "factor" => Ok(OperatorCommand::Factor(number(arg, "factor")?)),
            "stabilize" => Ok(OperatorCommand::Stabilize(number(arg, "stabilize")?)),
            "commit" => Ok(OperatorCommand::Commit(number(arg, "commit")?)),
            "confidence" => Ok(OperatorCommand::Confidence(
                number(arg, "confidence")? as f32,
            )),
            "start" => Ok(OperatorCommand::Start),
            "stop" => Ok(OperatorCommand::Stop),
            "status" => Ok(OperatorCommand::Status),
            "snapshot" => arg
                .map(|path| OperatorCommand::Snapshot(path.to_string()))
                .ok_or(ConfigError::MissingArgument("snapshot")),
            "quit" | "exit" => Ok(OperatorCommand::Quit),
            other => Err(ConfigError::UnknownCommand(other.to_string())),
        }
    }
}

fn number(arg: Option<&str>, name: &'static str) -> Result<f64, ConfigError> {
    let raw = arg.ok_or(ConfigError::MissingArgument(name))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| ConfigError::NotANumber(raw.to_string()))?;
    if !value.is_finite() {
        return Err(ConfigError::NotANumber(raw.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parameter_commands() {
        assert_eq!(
            "factor 0.0041".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Factor(0.0041)
        );
        assert_eq!(
            "  Commit 1.25 ".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Commit(1.25)
        );
        assert_eq!(
            "confidence 0.5".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Confidence(0.5)
        );
    }

    #[test]
    fn test_parse_control_commands() {
        assert_eq!("start".parse::<OperatorCommand>().unwrap(), OperatorCommand::Start);
        assert_eq!("STOP".parse::<OperatorCommand>().unwrap(), OperatorCommand::Stop);
        assert_eq!("exit".parse::<OperatorCommand>().unwrap(), OperatorCommand::Quit);
        assert_eq!(
            "snapshot /tmp/frame.png".parse::<OperatorCommand>().unwrap(),
            OperatorCommand::Snapshot("/tmp/frame.png".into())
        );
    }

    #[test]
    fn test_non_numeric_rejected() {
        assert!(matches!(
            "factor fast".parse::<OperatorCommand>(),
            Err(ConfigError::NotANumber(_))
        ));
        assert!(matches!(
            "stabilize inf".parse::<OperatorCommand>(),
            Err(ConfigError::NotANumber(_))
        ));
        assert!(matches!(
            "commit".parse::<OperatorCommand>(),
            Err(ConfigError::MissingArgument("commit"))
        ));
        assert!(matches!(
            "jump".parse::<OperatorCommand>(),
            Err(ConfigError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_apply_updates_parameters() {
        let params = SharedParameters::default();

        assert!(OperatorCommand::Stabilize(0.8).apply(&params).unwrap());
        assert_eq!(params.snapshot().stabilize_seconds, 0.8);

        assert!(!OperatorCommand::Status.apply(&params).unwrap());
        assert!(OperatorCommand::Factor(-1.0).apply(&params).is_err());
    }
}
