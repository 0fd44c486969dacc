use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use sparkle_engine::DriverLog;

#[derive(Parser, Debug)]
#[command(
    name = "sparkle",
    author,
    version,
    about = "Submit batch jobs to Livy/YARN clusters and follow them to completion",
    long_about = None
)]
pub struct Args {
    /// Path to the config file (defaults to <config dir>/sparkle/config.toml)
    #[arg(short, long, global = true, env = "SPARKLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a batch job
    Submit {
        /// Name of the cluster in the config file
        cluster: String,

        /// Remote URI of the job artifact (wasbs://, abfss://, adl://, hdfs://, https://)
        #[arg(long)]
        file: String,

        /// Main class of the job
        #[arg(long)]
        class_name: Option<String>,

        /// Job name shown by the batch service
        #[arg(long)]
        name: Option<String>,

        /// Spark configuration entry, repeatable
        #[arg(long = "conf", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        conf: Vec<(String, String)>,

        /// Wait for the job, tail its driver output and report the outcome
        #[arg(long)]
        follow: bool,

        /// Arguments passed to the job
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show the state of a batch job
    Status {
        cluster: String,
        /// Batch id (job UUID for serverless clusters)
        id: String,
    },

    /// Print the logs of a batch job
    Logs {
        cluster: String,
        /// Batch id (job UUID for serverless clusters)
        id: String,

        /// Tail the driver container's stdout or stderr instead of the batch log
        #[arg(long, value_enum)]
        driver: Option<DriverLog>,
    },

    /// Kill a batch job
    Kill {
        cluster: String,
        /// Batch id (job UUID for serverless clusters)
        id: String,
    },

    /// List configured clusters
    Clusters,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_key_val(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{input}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{input}`"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
