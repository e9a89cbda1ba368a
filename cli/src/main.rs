mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::{ClientCli, ConnectOptions};
use cloudjob::{JobConfig, Payload};

use clap::Parser;
use std::error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();
    let options = ConnectOptions {
        ca_cert: args.ca_cert,
        cert: args.cert,
        key: args.key,
    };
    let mut client = ClientCli::connect(&args.server, options).await?;

    match args.sub_command {
        SubCommand::Submit {
            provider,
            source,
            entrypoint,
            args,
            kwargs,
            config,
            wait,
        } => {
            let source = tokio::fs::read_to_string(&source).await?;
            let mut payload = Payload::new(source, entrypoint);
            payload.args = args;
            payload.kwargs = kwargs.into_iter().collect();
            let config: Option<JobConfig> = match config {
                Some(path) => Some(serde_json::from_slice(&tokio::fs::read(&path).await?)?),
                None => None,
            };
            let job_id = client
                .submit_job(&provider, &payload, config.as_ref())
                .await?;
            if wait {
                client.wait_result(job_id).await?;
            }
        }
        SubCommand::Status { job_id } => {
            client.query_status(job_id.as_bytes().to_vec()).await?;
        }
        SubCommand::Wait { job_id } => {
            client.wait_result(job_id.as_bytes().to_vec()).await?;
        }
        SubCommand::Cancel { job_id } => {
            client.cancel_job(job_id.as_bytes().to_vec()).await?;
        }
        SubCommand::List => {
            client.list_jobs().await?;
        }
    }

    Ok(())
}
