use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

/// Submit and manage cloudjob jobs on a remote server
#[derive(Debug, Parser)]
pub struct ArgParser {
    /// The address of the server
    #[clap(short = 's', long = "server", env = "CLOUDJOB_SERVER")]
    pub server: String,
    /// CA certificate (PEM) of the server. Connects over TLS when given
    #[clap(long)]
    pub ca_cert: Option<PathBuf>,
    /// Client certificate (PEM), for servers that verify clients
    #[clap(long)]
    pub cert: Option<PathBuf>,
    /// Client private key (PEM)
    #[clap(long)]
    pub key: Option<PathBuf>,
    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum SubCommand {
    /// submit a new job
    Submit {
        #[clap(long)]
        /// provider to run the job with
        provider: String,

        #[clap(long)]
        /// file holding the source of the callable
        source: PathBuf,

        #[clap(long)]
        /// name of the function to call
        entrypoint: String,

        #[clap(long, multiple_values = true, parse(try_from_str = json_value))]
        /// positional arguments, each a JSON value
        args: Vec<Value>,

        #[clap(long, multiple_values = true, parse(try_from_str = name_eq_json))]
        /// keyword arguments as NAME=JSON
        kwargs: Vec<(String, Value)>,

        #[clap(long)]
        /// JSON file with the job config
        config: Option<PathBuf>,

        #[clap(long)]
        /// block until the job finishes and print its result
        wait: bool,
    },
    /// get a job's status
    Status {
        /// Uuid v4 string
        job_id: Uuid,
    },
    /// wait for a job to finish and print its result
    Wait {
        /// Uuid v4 string
        job_id: Uuid,
    },
    /// cancel a job
    Cancel {
        /// Uuid v4 string
        job_id: Uuid,
    },
    /// list every job the server knows
    List,
}

fn json_value(s: &str) -> Result<Value, String> {
    serde_json::from_str(s).map_err(|err| format!("not a JSON value: {}", err))
}

/// try_from_str parse function for keyword arguments
fn name_eq_json(s: &str) -> Result<(String, Value), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), json_value(value)?)),
        _ => Err("Required format is NAME=JSON".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keyword_arguments() {
        assert_eq!(
            name_eq_json("scale=2.5"),
            Ok(("scale".to_string(), json!(2.5)))
        );
        assert_eq!(
            name_eq_json(r#"tags=["a","b=c"]"#),
            Ok(("tags".to_string(), json!(["a", "b=c"])))
        );
        assert!(name_eq_json("=1").is_err());
        assert!(name_eq_json("scale").is_err());
        assert!(name_eq_json("scale=nope").is_err());
    }

    #[test]
    fn submit_command() {
        let parsed = ArgParser::parse_from([
            "cli", "-s", "[::1]:50051", "submit", "--provider", "ssh", "--source", "job.py",
            "--entrypoint", "main", "--args", "1", r#""two""#, "--kwargs", "flag=true", "--wait",
        ]);
        assert_eq!(parsed.server, "[::1]:50051");
        match parsed.sub_command {
            SubCommand::Submit {
                provider,
                args,
                kwargs,
                config,
                wait,
                ..
            } => {
                assert_eq!(provider, "ssh");
                assert_eq!(args, vec![json!(1), json!("two")]);
                assert_eq!(kwargs, vec![("flag".to_string(), json!(true))]);
                assert!(config.is_none());
                assert!(wait);
            }
            other => panic!("parsed {:?}", other),
        }
    }
}
