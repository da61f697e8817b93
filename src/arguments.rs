use clap::Parser;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "sentibot",
    about = "Automated trading decision engine fusing technical signals with LLM sentiment"
)]
pub struct Arguments {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    pub config: String,

    /// Override the cycle interval (seconds)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Starting paper balance in quote asset terms
    #[arg(long, default_value_t = 1000.0)]
    pub balance: f64,

    /// Enable verbose debug logging
    #[arg(long)]
    pub debug: bool,
}
