// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use promoter::output::OutputMode;
use promoter::promotion::Destination;
use promoter::types::{EnvironmentName, ImageRef};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "promoter")]
#[command(about = "Promote container builds from staging to production with health gates and rollback")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputMode::Normal, global = true)]
    pub output: OutputMode,

    /// Path to the configuration file (default: discover promoter.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new promoter.yml configuration file
    Init {
        /// Application name
        #[arg(long)]
        app: Option<String>,

        /// Image reference (registry/repository:tag)
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Deploy a build to staging, verify it, and promote it to production
    Promote {
        /// Build tag applied to the configured image repository
        #[arg(short, long, conflicts_with = "image")]
        tag: Option<String>,

        /// Full candidate image reference
        #[arg(long, value_parser = parse_image_ref)]
        image: Option<ImageRef>,

        /// Stop after staging or continue to production
        #[arg(long, value_enum, default_value_t = Destination::Production)]
        to: Destination,

        /// Approve production in advance
        #[arg(long, conflicts_with = "approval_file")]
        approve: bool,

        /// Poll this file for "approve" or "reject"
        #[arg(long)]
        approval_file: Option<PathBuf>,

        /// How long to wait for approval (e.g. 30m)
        #[arg(long, value_parser = parse_duration)]
        approval_timeout: Option<Duration>,

        /// Maximum health probe attempts per environment
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        health_attempts: Option<u32>,

        /// Wait between health probe attempts (e.g. 3s)
        #[arg(long, value_parser = parse_duration)]
        health_interval: Option<Duration>,

        /// Break deploy locks held by other processes
        #[arg(long)]
        force: bool,
    },

    /// Show what each environment runs and its deployment record
    Status,

    /// Restore the previous image of an environment
    Rollback {
        /// Environment to roll back (staging or production)
        #[arg(value_parser = parse_environment)]
        environment: EnvironmentName,

        /// Break deploy locks held by other processes
        #[arg(long)]
        force: bool,
    },
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

fn parse_image_ref(value: &str) -> Result<ImageRef, String> {
    ImageRef::parse(value).map_err(|e| e.to_string())
}

fn parse_environment(value: &str) -> Result<EnvironmentName, String> {
    EnvironmentName::new(value).map_err(|e| e.to_string())
}
