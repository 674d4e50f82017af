//! Command line interface for the `replygate` demo binary.
//!
//! Drives request/reply exchanges against the in-memory loopback broker, so
//! timeouts, polling and reply destination modes can be tried without a real
//! messaging system. The same definition feeds man page generation.

use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

/// How the simulated remote party answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplyBehaviour {
    /// Echo each request with its correlation key.
    Echo,
    /// Answer with the wrong correlation key.
    Mismatch,
    /// Answer without a correlation key.
    Uncorrelated,
    /// Never answer.
    Silent,
}

/// Command line arguments for the `replygate` binary.
#[derive(Debug, Parser)]
#[command(
    name = "replygate",
    version,
    about = "Run synchronous request/reply exchanges over a loopback transport"
)]
pub struct Cli {
    /// Number of concurrent exchanges.
    #[arg(short = 'n', long, default_value_t = 3)]
    pub requests: u32,

    /// Receive timeout in milliseconds.
    #[arg(short, long = "timeout-ms", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Polling interval in milliseconds.
    #[arg(short, long = "interval-ms", default_value_t = 500)]
    pub interval_ms: u64,

    /// Delay before the remote party answers, in milliseconds.
    #[arg(short, long = "delay-ms", default_value_t = 0)]
    pub delay_ms: u64,

    /// How the remote party answers.
    #[arg(short, long, value_enum, default_value_t = ReplyBehaviour::Echo)]
    pub behaviour: ReplyBehaviour,

    /// Receive all replies on this shared destination instead of creating
    /// one per request.
    #[arg(long)]
    pub shared_reply: Option<String>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
