use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

/// Serves a directory of static files and runs handler scripts for POSTs.
#[derive(Parser, Debug, Clone)]
#[command(name = "porchlight")]
pub struct Config {
    /// The IP address to serve on.
    pub address: IpAddr,

    /// The port to serve on.
    pub port: u16,

    /// The directory containing the files to serve. This directory must
    /// exist.
    #[arg(short = 'l', long, default_value = "live")]
    pub live_path: PathBuf,

    /// The subpath of the directory of handler scripts for POST requests,
    /// within the directory of files to serve.
    #[arg(short = 's', long, default_value = "scripts")]
    pub scripts_path: String,

    /// The path of the log file in which to record requests.
    #[arg(short = 'o', long, default_value = "porchlight.log")]
    pub log_path: PathBuf,

    /// The path of the file in which to save the time of the last POST
    /// request.
    #[arg(short = 'p', long, default_value = "last_post_time.int")]
    pub last_post_time_path: PathBuf,

    /// The list of request headers to log.
    #[arg(
        short = 'e',
        long,
        num_args = 1..,
        default_values_t = [
            "user-agent".to_string(),
            "referer".to_string(),
            "content-type".to_string(),
            "content-length".to_string(),
        ],
    )]
    pub log_headers: Vec<String>,

    /// The length to which parameter values are truncated when logging them.
    #[arg(short = 'r', long, default_value_t = 200)]
    pub log_request_len: usize,

    /// The minimum number of seconds between accepted POST requests.
    #[arg(long, default_value_t = 15)]
    pub min_post_interval: i64,
}
